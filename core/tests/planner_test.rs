/// Plan-level tests for the speech planner: structural guarantees,
/// worked scenarios and policy behavior.
use aloud_core::{
    plan, CodeSpeechPolicy, PauseProfile, PauseReason, PlanItem, PlannerConfig, SpeakStyle,
};

fn cfg() -> PlannerConfig {
    PlannerConfig::default()
}

fn speak_texts(items: &[PlanItem]) -> Vec<&str> {
    items
        .iter()
        .filter_map(|i| match i {
            PlanItem::Speak { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Empty and whitespace-only input yields an empty plan.
#[test]
fn empty_input_yields_empty_plan() {
    assert!(plan("", &cfg()).is_empty());
    assert!(plan("   \n\t \n  ", &cfg()).is_empty());
}

/// Repeated calls with identical input produce identical plans.
#[test]
fn planning_is_pure() {
    let text = "# Setup\n\nRun `npm install`.\n\n- first\n- second\n\n```rust\nfn main() {}\n```";
    let c = cfg();
    assert_eq!(plan(text, &c), plan(text, &c));
}

/// A plan never starts or ends with a pause and never holds two in a row.
#[test]
fn pause_placement_invariants_hold() {
    let inputs = [
        "# Title\n\nSome text here.",
        "\n\nLeading blanks.\n\n\n\nAnd more.\n\n",
        "- a\n- b\n\n## Next\n\nnpm install foo\n\n```py\nx\n```",
        "Note:\n\nJust a note.",
        "***\n\n**only markup**",
    ];
    for input in inputs {
        let items = plan(input, &cfg());
        if let Some(first) = items.first() {
            assert!(!first.is_pause(), "plan starts with a pause for {input:?}");
        }
        if let Some(last) = items.last() {
            assert!(!last.is_pause(), "plan ends with a pause for {input:?}");
        }
        for pair in items.windows(2) {
            assert!(
                !(pair[0].is_pause() && pair[1].is_pause()),
                "adjacent pauses for {input:?}"
            );
        }
    }
}

/// Worked scenario: heading plus paragraph under the balanced profile.
#[test]
fn heading_and_paragraph_scenario() {
    let items = plan("# Title\n\nSome text here.", &cfg());
    assert_eq!(
        items,
        vec![
            PlanItem::Speak {
                text: "Title".to_string(),
                style: SpeakStyle::Heading,
            },
            PlanItem::Pause {
                duration_ms: 460,
                reason: PauseReason::Heading,
            },
            PlanItem::Speak {
                text: "Some text here.".to_string(),
                style: SpeakStyle::Normal,
            },
        ]
    );
}

/// Worked scenario: a ten-line Python fence under the summarize policy.
#[test]
fn code_fence_summary_scenario() {
    let body: String = (1..=10).map(|i| format!("line_{i} = {i}\n")).collect();
    let text = format!("```python\n{body}```\nDone.");
    let items = plan(&text, &cfg());
    assert_eq!(
        items,
        vec![
            PlanItem::Speak {
                text: "PYTHON snippet shown with 10 lines.".to_string(),
                style: SpeakStyle::CodeSummary,
            },
            PlanItem::Pause {
                duration_ms: 420,
                reason: PauseReason::CodeTransition,
            },
            PlanItem::Speak {
                text: "Done.".to_string(),
                style: SpeakStyle::Normal,
            },
        ]
    );
}

/// Worked scenario: a short command line under the summarize policy.
#[test]
fn command_summary_scenario() {
    let items = plan("npm install foo\nThanks.", &cfg());
    assert_eq!(
        items,
        vec![
            PlanItem::Speak {
                text: "Command suggested: npm install foo.".to_string(),
                style: SpeakStyle::CodeSummary,
            },
            PlanItem::Pause {
                duration_ms: 300,
                reason: PauseReason::Sentence,
            },
            PlanItem::Speak {
                text: "Thanks.".to_string(),
                style: SpeakStyle::Normal,
            },
        ]
    );
}

/// No speak text carries literal markdown emphasis, link or inline-code
/// syntax.
#[test]
fn markdown_markup_never_reaches_speech() {
    let text = "**Bold** statement with [a link](https://example.com) and `inline()`.\n\n\
                - bullet with *emphasis* and snake_case_name\n\n# A **bold** heading";
    let items = plan(text, &cfg());
    for speak in speak_texts(&items) {
        assert!(!speak.contains('*'), "emphasis in {speak:?}");
        assert!(!speak.contains('`'), "inline code in {speak:?}");
        assert!(!speak.contains("]("), "link syntax in {speak:?}");
        assert!(!speak.contains("https://"), "link target in {speak:?}");
    }
    assert!(speak_texts(&items)
        .iter()
        .any(|s| s.contains("snake case name")));
}

/// Normal-style utterances respect the character budget.
#[test]
fn normal_speech_respects_char_budget() {
    let mut c = cfg();
    c.max_speak_chars = 40;
    let text = "This is a sentence. Here is another sentence. And one more for good measure. \
                Plus a final one to overflow the first utterance.";
    let items = plan(text, &c);
    for item in &items {
        if let PlanItem::Speak {
            text,
            style: SpeakStyle::Normal,
        } = item
        {
            assert!(text.len() <= 40, "utterance too long: {text:?}");
        }
    }
    assert!(speak_texts(&items).len() > 1);
}

/// A single oversized token is hard-split by character count.
#[test]
fn oversized_token_is_hard_split() {
    let mut c = cfg();
    c.max_speak_chars = 50;
    let token = "x".repeat(180);
    let items = plan(&token, &c);
    assert!(!items.is_empty());
    for speak in speak_texts(&items) {
        assert!(speak.len() <= 50);
    }
}

/// Bullets speak as list items separated by list pauses.
#[test]
fn bullets_become_list_items() {
    let items = plan("- first point\n- second point", &cfg());
    assert_eq!(
        items,
        vec![
            PlanItem::Speak {
                text: "first point".to_string(),
                style: SpeakStyle::ListItem,
            },
            PlanItem::Pause {
                duration_ms: 360,
                reason: PauseReason::List,
            },
            PlanItem::Speak {
                text: "second point".to_string(),
                style: SpeakStyle::ListItem,
            },
        ]
    );
}

/// A short label line speaks with a closing period.
#[test]
fn label_line_gets_a_period() {
    let items = plan("Note:\nRemember this.", &cfg());
    assert_eq!(
        items[0],
        PlanItem::Speak {
            text: "Note.".to_string(),
            style: SpeakStyle::Label,
        }
    );
    assert_eq!(
        items[1],
        PlanItem::Pause {
            duration_ms: 340,
            reason: PauseReason::Label,
        }
    );
}

/// An unterminated fence still produces a code summary.
#[test]
fn unterminated_fence_is_summarized() {
    let items = plan("Look:\n```rust\nlet a = 1;\nlet b = 2;", &cfg());
    assert!(speak_texts(&items)
        .iter()
        .any(|s| *s == "RUST snippet shown with 2 lines."));
}

/// The short policy speaks small code verbatim and summarizes the rest.
#[test]
fn short_policy_switches_on_size() {
    let mut c = cfg();
    c.code_policy = CodeSpeechPolicy::Short;

    let items = plan("```\nx = 1\n```", &c);
    assert_eq!(speak_texts(&items), vec!["x = 1"]);

    let big: String = (1..=8).map(|i| format!("value_{i} = {i}\n")).collect();
    let items = plan(&format!("```\n{big}```"), &c);
    assert_eq!(speak_texts(&items), vec!["Code snippet shown with 8 lines."]);
}

/// The verbatim policy speaks commands in full, length-bounded.
#[test]
fn verbatim_policy_speaks_commands_in_full() {
    let mut c = cfg();
    c.code_policy = CodeSpeechPolicy::Verbatim;
    let items = plan("cargo build --release --workspace", &c);
    assert_eq!(
        speak_texts(&items),
        vec!["cargo build --release --workspace"]
    );
    match &items[0] {
        PlanItem::Speak { style, .. } => assert_eq!(*style, SpeakStyle::Normal),
        other => panic!("unexpected item: {other:?}"),
    }
}

/// Command lines over the threshold fall back to the generic phrase.
#[test]
fn long_command_uses_generic_phrase() {
    let mut c = cfg();
    c.short_command_max_chars = 20;
    let items = plan("cargo build --release --workspace --all-features", &c);
    assert_eq!(
        speak_texts(&items),
        vec!["A command suggestion is shown."]
    );
}

/// The expressive profile stretches every pause relative to fast.
#[test]
fn profile_choice_scales_pauses() {
    let text = "# A\n\nb.";
    let mut fast = cfg();
    fast.pause_profile = PauseProfile::Fast;
    let mut expressive = cfg();
    expressive.pause_profile = PauseProfile::Expressive;

    let pause_of = |items: &[PlanItem]| -> u64 {
        items
            .iter()
            .find_map(|i| match i {
                PlanItem::Pause { duration_ms, .. } => Some(*duration_ms),
                _ => None,
            })
            .unwrap()
    };
    assert!(pause_of(&plan(text, &fast)) < pause_of(&plan(text, &expressive)));
}
