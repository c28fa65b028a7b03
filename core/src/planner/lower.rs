//! Lowering of parsed segments into plan items, plus plan post-processing.

use super::normalize::speakable_text;
use super::segment::Segment;
use super::{CodeSpeechPolicy, PauseReason, PlanItem, PlannerConfig, SpeakStyle};

const GENERIC_COMMAND_PHRASE: &str = "A command suggestion is shown.";

pub(crate) fn lower_segments(segments: &[Segment], cfg: &PlannerConfig) -> Vec<PlanItem> {
    let mut items = Vec::new();
    for segment in segments {
        lower_segment(segment, cfg, &mut items);
    }
    items
}

fn pause(cfg: &PlannerConfig, reason: PauseReason) -> PlanItem {
    PlanItem::Pause {
        duration_ms: cfg.pause_profile.duration_ms(reason),
        reason,
    }
}

fn lower_segment(segment: &Segment, cfg: &PlannerConfig, out: &mut Vec<PlanItem>) {
    match segment {
        Segment::Blank => out.push(pause(cfg, PauseReason::Paragraph)),
        Segment::Heading(text) => {
            let text = speakable_text(text);
            if !text.is_empty() {
                out.push(PlanItem::Speak {
                    text,
                    style: SpeakStyle::Heading,
                });
                out.push(pause(cfg, PauseReason::Heading));
            }
        }
        Segment::Label(text) => {
            let text = speakable_text(text);
            if !text.is_empty() {
                out.push(PlanItem::Speak {
                    text: ensure_sentence_end(&text),
                    style: SpeakStyle::Label,
                });
                out.push(pause(cfg, PauseReason::Label));
            }
        }
        Segment::Bullet(text) => {
            let utterances = split_utterances(&speakable_text(text), cfg);
            for (i, utterance) in utterances.iter().enumerate() {
                if i > 0 {
                    out.push(pause(cfg, PauseReason::Sentence));
                }
                out.push(PlanItem::Speak {
                    text: utterance.clone(),
                    style: SpeakStyle::ListItem,
                });
            }
            if !utterances.is_empty() {
                out.push(pause(cfg, PauseReason::List));
            }
        }
        Segment::Command(text) => lower_command(text, cfg, out),
        Segment::Paragraph(text) => {
            let utterances = split_utterances(&speakable_text(text), cfg);
            for (i, utterance) in utterances.iter().enumerate() {
                if i > 0 {
                    out.push(pause(cfg, PauseReason::Sentence));
                }
                out.push(PlanItem::Speak {
                    text: utterance.clone(),
                    style: SpeakStyle::Normal,
                });
            }
            if !utterances.is_empty() {
                out.push(pause(cfg, PauseReason::Paragraph));
            }
        }
        Segment::Code { language, lines } => lower_code(language, lines, cfg, out),
    }
}

fn lower_command(text: &str, cfg: &PlannerConfig, out: &mut Vec<PlanItem>) {
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return;
    }
    match cfg.code_policy {
        CodeSpeechPolicy::Summarize => {
            let phrase = if normalized.len() <= cfg.short_command_max_chars {
                ensure_sentence_end(&format!("Command suggested: {normalized}"))
            } else {
                GENERIC_COMMAND_PHRASE.to_string()
            };
            out.push(PlanItem::Speak {
                text: phrase,
                style: SpeakStyle::CodeSummary,
            });
            out.push(pause(cfg, PauseReason::Sentence));
        }
        CodeSpeechPolicy::Short => {
            if normalized.len() <= cfg.short_command_max_chars {
                out.push(PlanItem::Speak {
                    text: ensure_sentence_end(&normalized),
                    style: SpeakStyle::Normal,
                });
            } else {
                out.push(PlanItem::Speak {
                    text: GENERIC_COMMAND_PHRASE.to_string(),
                    style: SpeakStyle::CodeSummary,
                });
            }
            out.push(pause(cfg, PauseReason::Sentence));
        }
        CodeSpeechPolicy::Verbatim => {
            let utterances = split_utterances(&normalized, cfg);
            for (i, utterance) in utterances.iter().enumerate() {
                if i > 0 {
                    out.push(pause(cfg, PauseReason::Sentence));
                }
                out.push(PlanItem::Speak {
                    text: utterance.clone(),
                    style: SpeakStyle::Normal,
                });
            }
            if !utterances.is_empty() {
                out.push(pause(cfg, PauseReason::Sentence));
            }
        }
    }
}

fn lower_code(language: &str, lines: &[String], cfg: &PlannerConfig, out: &mut Vec<PlanItem>) {
    let non_blank = lines.iter().filter(|l| !l.trim().is_empty()).count();
    let flat: String = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let speak_verbatim = |out: &mut Vec<PlanItem>| {
        let utterances = split_utterances(&flat, cfg);
        for (i, utterance) in utterances.iter().enumerate() {
            if i > 0 {
                out.push(pause(cfg, PauseReason::Sentence));
            }
            out.push(PlanItem::Speak {
                text: utterance.clone(),
                style: SpeakStyle::Normal,
            });
        }
    };

    match cfg.code_policy {
        CodeSpeechPolicy::Summarize => {
            out.push(PlanItem::Speak {
                text: code_summary(language, non_blank),
                style: SpeakStyle::CodeSummary,
            });
        }
        CodeSpeechPolicy::Short => {
            if lines.len() <= cfg.short_code_max_lines && flat.len() <= cfg.short_code_max_chars {
                speak_verbatim(out);
            } else {
                out.push(PlanItem::Speak {
                    text: code_summary(language, non_blank),
                    style: SpeakStyle::CodeSummary,
                });
            }
        }
        CodeSpeechPolicy::Verbatim => speak_verbatim(out),
    }
    out.push(pause(cfg, PauseReason::CodeTransition));
}

fn code_summary(language: &str, non_blank_lines: usize) -> String {
    let label = if language.is_empty() {
        "Code".to_string()
    } else {
        language.to_uppercase()
    };
    let noun = if non_blank_lines == 1 { "line" } else { "lines" };
    format!("{label} snippet shown with {non_blank_lines} {noun}.")
}

fn ensure_sentence_end(text: &str) -> String {
    if text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

/// Split prose into utterances: sentence boundaries first, then greedy
/// packing while both the character budget and the sentence budget hold.
/// Oversized sentences break on word boundaries; oversized words are
/// hard-split by character count.
pub(crate) fn split_utterances(text: &str, cfg: &PlannerConfig) -> Vec<String> {
    let max_chars = cfg.max_speak_chars.max(1);
    let max_sentences = cfg.max_sentences_per_utterance.max(1);

    let mut utterances = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for sentence in split_sentences(text) {
        for piece in bound_sentence(&sentence, max_chars) {
            let packed_len = if current.is_empty() {
                piece.len()
            } else {
                current.len() + 1 + piece.len()
            };
            if !current.is_empty() && (packed_len > max_chars || count >= max_sentences) {
                utterances.push(std::mem::take(&mut current));
                count = 0;
            }
            if current.is_empty() {
                current = piece;
            } else {
                current.push(' ');
                current.push_str(&piece);
            }
            count += 1;
        }
    }
    if !current.is_empty() {
        utterances.push(current);
    }
    utterances
}

// Split on `.`/`!`/`?` runs followed by whitespace or end of input, keeping
// the terminator with its sentence. `3.14` stays together.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                None => {}
                Some(&next) if next.is_whitespace() => {}
                _ => continue,
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

fn bound_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.len() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if word.len() > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            pieces.extend(split_word(word, max_chars));
            continue;
        }
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

// Hard split on char boundaries.
fn split_word(word: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        if !current.is_empty() && current.len() + ch.len_utf8() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Enforce the plan-level guarantees: no empty speaks, no zero pauses, no
/// adjacent pauses (the longer one wins), no pause at either edge.
pub(crate) fn postprocess(items: Vec<PlanItem>) -> Vec<PlanItem> {
    let mut out: Vec<PlanItem> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            PlanItem::Speak { ref text, .. } if text.trim().is_empty() => {}
            PlanItem::Pause { duration_ms: 0, .. } => {}
            PlanItem::Pause {
                duration_ms,
                reason,
            } => {
                if out.is_empty() {
                    continue; // leading pause dropped
                }
                if matches!(out.last(), Some(PlanItem::Pause { .. })) {
                    if let Some(PlanItem::Pause {
                        duration_ms: prev_ms,
                        reason: prev_reason,
                    }) = out.last_mut()
                    {
                        // Merge by maximum, never by sum.
                        if duration_ms > *prev_ms {
                            *prev_ms = duration_ms;
                            *prev_reason = reason;
                        }
                    }
                } else {
                    out.push(PlanItem::Pause {
                        duration_ms,
                        reason,
                    });
                }
            }
            speak => out.push(speak),
        }
    }
    while matches!(out.last(), Some(PlanItem::Pause { .. })) {
        out.pop();
    }
    out
}
