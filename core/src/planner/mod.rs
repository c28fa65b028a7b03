//! Speech plan compiler.
//!
//! Turns raw assistant text into an ordered list of [`PlanItem`]s: speak
//! instructions interleaved with pauses. A pure transform with no I/O;
//! identical input always yields an identical plan.
//!
//! Pipeline: normalize the input, tokenize it into line-level segments
//! (headings, bullets, labels, command lines, code fences, prose), lower
//! each segment into speak/pause items, then post-process so the plan never
//! starts or ends with a pause and never contains two pauses in a row.

mod lower;
mod normalize;
mod segment;

/// Speaking style attached to a speak instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStyle {
    Normal,
    Heading,
    Label,
    ListItem,
    CodeSummary,
}

/// Why a pause was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Sentence,
    Paragraph,
    Heading,
    Label,
    List,
    CodeTransition,
}

/// One instruction in a speech plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    Speak { text: String, style: SpeakStyle },
    Pause { duration_ms: u64, reason: PauseReason },
}

impl PlanItem {
    pub fn is_pause(&self) -> bool {
        matches!(self, PlanItem::Pause { .. })
    }
}

/// Named table of pause durations per break reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseProfile {
    Fast,
    #[default]
    Balanced,
    Expressive,
}

impl PauseProfile {
    /// Pause length in milliseconds for a break reason.
    pub fn duration_ms(&self, reason: PauseReason) -> u64 {
        use PauseReason::*;
        match self {
            PauseProfile::Fast => match reason {
                Sentence => 180,
                Paragraph => 310,
                Heading => 280,
                Label => 200,
                List => 220,
                CodeTransition => 250,
            },
            PauseProfile::Balanced => match reason {
                Sentence => 300,
                Paragraph => 520,
                Heading => 460,
                Label => 340,
                List => 360,
                CodeTransition => 420,
            },
            PauseProfile::Expressive => match reason {
                Sentence => 420,
                Paragraph => 730,
                Heading => 640,
                Label => 480,
                List => 500,
                CodeTransition => 590,
            },
        }
    }
}

impl std::str::FromStr for PauseProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(PauseProfile::Fast),
            "balanced" => Ok(PauseProfile::Balanced),
            "expressive" => Ok(PauseProfile::Expressive),
            other => Err(format!("unknown pause profile: {other}")),
        }
    }
}

/// How code blocks and command-like lines are rendered as speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeSpeechPolicy {
    /// One summary phrase per block.
    #[default]
    Summarize,
    /// Verbatim when small, summary otherwise.
    Short,
    /// Always the full text, length-bounded like prose.
    Verbatim,
}

impl std::str::FromStr for CodeSpeechPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summarize" => Ok(CodeSpeechPolicy::Summarize),
            "short" => Ok(CodeSpeechPolicy::Short),
            "verbatim" => Ok(CodeSpeechPolicy::Verbatim),
            other => Err(format!("unknown code speech policy: {other}")),
        }
    }
}

/// Planner tuning knobs.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Utterance length ceiling; fed per call from the supervisor's
    /// adaptive chunk size.
    pub max_speak_chars: usize,
    /// Most sentences packed into a single utterance.
    pub max_sentences_per_utterance: usize,
    pub pause_profile: PauseProfile,
    pub code_policy: CodeSpeechPolicy,
    /// `Short` policy: verbatim code up to this many lines...
    pub short_code_max_lines: usize,
    /// ...and this many characters.
    pub short_code_max_chars: usize,
    /// Commands longer than this fall back to a generic phrase.
    pub short_command_max_chars: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_speak_chars: 220,
            max_sentences_per_utterance: 3,
            pause_profile: PauseProfile::default(),
            code_policy: CodeSpeechPolicy::default(),
            short_code_max_lines: 3,
            short_code_max_chars: 200,
            short_command_max_chars: 110,
        }
    }
}

/// Compile `text` into an ordered speech plan.
///
/// Never fails: empty or whitespace-only input yields an empty plan.
pub fn plan(text: &str, cfg: &PlannerConfig) -> Vec<PlanItem> {
    let normalized = normalize::normalize_input(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    let segments = segment::segment_lines(&normalized);
    let items = lower::lower_segments(&segments, cfg);
    lower::postprocess(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_profile_matches_expected_table() {
        let p = PauseProfile::Balanced;
        assert_eq!(p.duration_ms(PauseReason::Heading), 460);
        assert_eq!(p.duration_ms(PauseReason::Paragraph), 520);
        assert_eq!(p.duration_ms(PauseReason::Sentence), 300);
    }

    #[test]
    fn profiles_are_ordered_fast_to_expressive() {
        for reason in [
            PauseReason::Sentence,
            PauseReason::Paragraph,
            PauseReason::Heading,
            PauseReason::Label,
            PauseReason::List,
            PauseReason::CodeTransition,
        ] {
            let fast = PauseProfile::Fast.duration_ms(reason);
            let balanced = PauseProfile::Balanced.duration_ms(reason);
            let expressive = PauseProfile::Expressive.duration_ms(reason);
            assert!(fast < balanced && balanced < expressive);
        }
    }

    #[test]
    fn profile_and_policy_parse_from_strings() {
        assert_eq!("fast".parse(), Ok(PauseProfile::Fast));
        assert_eq!(" Balanced ".parse(), Ok(PauseProfile::Balanced));
        assert!("brisk".parse::<PauseProfile>().is_err());
        assert_eq!("verbatim".parse(), Ok(CodeSpeechPolicy::Verbatim));
        assert!("loud".parse::<CodeSpeechPolicy>().is_err());
    }
}
