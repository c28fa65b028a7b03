//! Line classification into planner segments.
//!
//! One pass over normalized input. The only stateful piece is the
//! triple-backtick fence: inside a fence every line is captured verbatim,
//! and an unterminated fence still yields a final code segment. Outside,
//! each non-blank line runs through an ordered list of classifiers; the
//! first match wins.

/// Ephemeral parse product, consumed by the lowering step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Blank,
    Heading(String),
    Label(String),
    Bullet(String),
    Command(String),
    Paragraph(String),
    Code { language: String, lines: Vec<String> },
}

pub(crate) fn segment_lines(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut code: Option<(String, Vec<String>)> = None;

    for raw in text.lines() {
        if let Some((language, lines)) = code.as_mut() {
            if is_fence(raw.trim()) {
                segments.push(Segment::Code {
                    language: std::mem::take(language),
                    lines: std::mem::take(lines),
                });
                code = None;
            } else {
                lines.push(raw.to_string());
            }
            continue;
        }

        let line = raw.trim();
        if is_fence(line) {
            flush_paragraph(&mut paragraph, &mut segments);
            code = Some((fence_language(line), Vec::new()));
            continue;
        }
        if line.is_empty() {
            // Blank lines only matter as prose separators; after structural
            // segments the lowering already inserted its own pause.
            if !paragraph.is_empty() {
                flush_paragraph(&mut paragraph, &mut segments);
                segments.push(Segment::Blank);
            }
            continue;
        }

        // Ordered classifiers; first match wins.
        if let Some(text) = heading_text(line) {
            flush_paragraph(&mut paragraph, &mut segments);
            segments.push(Segment::Heading(text));
        } else if let Some(text) = bullet_text(line) {
            flush_paragraph(&mut paragraph, &mut segments);
            segments.push(Segment::Bullet(text));
        } else if let Some(text) = label_text(line) {
            flush_paragraph(&mut paragraph, &mut segments);
            segments.push(Segment::Label(text));
        } else if let Some(text) = command_text(line) {
            flush_paragraph(&mut paragraph, &mut segments);
            segments.push(Segment::Command(text));
        } else {
            paragraph.push(line.to_string());
        }
    }

    if let Some((language, lines)) = code {
        segments.push(Segment::Code { language, lines });
    }
    flush_paragraph(&mut paragraph, &mut segments);
    segments
}

fn flush_paragraph(paragraph: &mut Vec<String>, segments: &mut Vec<Segment>) {
    if !paragraph.is_empty() {
        segments.push(Segment::Paragraph(paragraph.join(" ")));
        paragraph.clear();
    }
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```")
}

fn fence_language(line: &str) -> String {
    line.trim_start_matches('`')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// `# Heading` through `###### Heading`.
pub(crate) fn heading_text(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = line[hashes..].strip_prefix(' ')?;
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `- item`, `* item`, `1. item`, `2) item`.
pub(crate) fn bullet_text(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        let text = rest.trim();
        return (!text.is_empty()).then(|| text.to_string());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(r) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            let text = r.trim();
            return (!text.is_empty()).then(|| text.to_string());
        }
    }
    None
}

const LABEL_MAX_CHARS: usize = 48;
const LABEL_MAX_WORDS: usize = 6;

/// A short `Word...:` line introducing what follows.
pub(crate) fn label_text(line: &str) -> Option<String> {
    let body = line.strip_suffix(':')?.trim();
    if body.is_empty() || body.len() > LABEL_MAX_CHARS || body.contains(':') {
        return None;
    }
    if body.split_whitespace().count() > LABEL_MAX_WORDS {
        return None;
    }
    Some(body.to_string())
}

const CLI_NAMES: &[&str] = &[
    "npm", "npx", "yarn", "pnpm", "pip", "pip3", "python", "python3", "node", "cargo", "rustup",
    "git", "docker", "kubectl", "make", "brew", "apt", "apt-get", "go", "curl", "wget", "ssh",
    "cd", "ls", "mkdir", "rm", "cp", "mv", "cat", "grep", "uv",
];

/// A line the user would run rather than read: a single backticked span, a
/// shell-prompt line, a `./` executable, or a known CLI name with arguments.
pub(crate) fn command_text(line: &str) -> Option<String> {
    if line.len() >= 2 && line.starts_with('`') && line.ends_with('`') {
        let inner = line[1..line.len() - 1].trim();
        if !inner.is_empty() && !inner.contains('`') {
            return Some(inner.to_string());
        }
    }
    if let Some(rest) = line.strip_prefix("$ ") {
        let text = rest.trim();
        return (!text.is_empty()).then(|| text.to_string());
    }
    if line.starts_with("./") {
        return Some(line.to_string());
    }
    let mut words = line.split_whitespace();
    let first = words.next()?;
    if words.next().is_some() && CLI_NAMES.contains(&first) {
        return Some(line.to_string());
    }
    None
}
