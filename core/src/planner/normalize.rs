//! Input canonicalization and markdown-to-speech text cleanup.

/// Canonicalize raw input: one newline convention, no tabs, at most one
/// blank line in a row, trimmed edges.
pub(crate) fn normalize_input(text: &str) -> String {
    let unified = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\t', "    ");

    let mut out = String::with_capacity(unified.len());
    let mut newline_run = 0usize;
    for ch in unified.chars() {
        if ch == '\n' {
            newline_run += 1;
            // A run of two newlines is one blank line; longer runs collapse.
            if newline_run <= 2 {
                out.push('\n');
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out.trim().to_string()
}

/// Rewrite markdown-ish text the way it should be spoken: link targets and
/// emphasis/inline-code markers removed, separator-joined identifiers split
/// into words. Whitespace collapses to single spaces.
pub(crate) fn speakable_text(text: &str) -> String {
    let without_links = strip_links(text);
    let mut stripped = without_links.replace("**", "").replace("__", "");
    stripped.retain(|c| c != '*' && c != '`');

    let mut words: Vec<String> = Vec::new();
    for token in stripped.split_whitespace() {
        if should_split_token(token) {
            words.extend(
                token
                    .split(['-', '_'])
                    .filter(|w| !w.is_empty())
                    .map(str::to_string),
            );
        } else {
            words.push(token.to_string());
        }
    }
    words.join(" ")
}

// Separator-joined identifiers read better as words, but paths, flags and
// dotted names must survive verbatim.
fn should_split_token(token: &str) -> bool {
    if !token.contains('-') && !token.contains('_') {
        return false;
    }
    if token.starts_with('-') {
        return false; // flag
    }
    if token.contains('/') || token.starts_with('~') {
        return false; // path
    }
    if token.contains('.') {
        return false; // file or version
    }
    true
}

// `[text](url)` keeps the text, `![alt](url)` keeps the alt.
fn strip_links(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '!' && i + 1 < chars.len() && chars[i + 1] == '[' {
            i += 1;
            continue;
        }
        if chars[i] == '[' {
            if let Some(close) = find_from(&chars, i + 1, ']') {
                if close + 1 < chars.len() && chars[close + 1] == '(' {
                    if let Some(paren) = find_from(&chars, close + 2, ')') {
                        out.extend(&chars[i + 1..close]);
                        i = paren + 1;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn find_from(chars: &[char], start: usize, needle: char) -> Option<usize> {
    chars[start..]
        .iter()
        .position(|&c| c == needle)
        .map(|p| start + p)
}
