//! Sanitization boundary for user-supplied text
//!
//! Every piece of user text that later lands in behavior content or gets
//! injected into an agent's context passes through here first. The content
//! sanitizer neutralizes markdown/markup structure that could hijack the
//! injection surface; the name sanitizer reduces slugs to a safe charset.
//! The learning loop always sanitizes before persisting; the rendering path
//! may re-sanitize.

/// Maximum persisted content length in characters
pub const MAX_CONTENT_LEN: usize = 2000;

/// Maximum behavior name length in characters
pub const MAX_NAME_LEN: usize = 80;

/// Sanitize free text destined for behavior content.
///
/// - strips control characters except LF and HT
/// - turns markdown heading lines into `- ` bullets
/// - blanks horizontal-rule lines (`---`, `***`, `___`)
/// - removes XML/HTML tags, including self-closing ones
/// - reduces triple backticks to a single backtick
/// - collapses three or more consecutive LFs to two
/// - truncates to [`MAX_CONTENT_LEN`] characters with an ellipsis
pub fn sanitize_content(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect();

    let untagged = strip_markup_tags(&stripped);

    let mut lines: Vec<String> = Vec::new();
    for line in untagged.split('\n') {
        let trimmed = line.trim_start();
        if is_horizontal_rule(trimmed) {
            lines.push(String::new());
        } else if let Some(rest) = heading_text(trimmed) {
            lines.push(format!("- {}", rest));
        } else {
            lines.push(line.to_string());
        }
    }

    let mut text = lines.join("\n").replace("```", "`");

    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }

    truncate_chars(&text, MAX_CONTENT_LEN)
}

/// Sanitize a behavior name: keep only `[a-zA-Z0-9/_-]`, collapse runs of
/// `-` and `_`, cap at [`MAX_NAME_LEN`] characters.
pub fn sanitize_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev: Option<char> = None;
    for c in input.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '/' || c == '_' || c == '-';
        if !keep {
            continue;
        }
        if (c == '-' || c == '_') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
        if out.chars().count() >= MAX_NAME_LEN {
            break;
        }
    }
    out
}

/// Lowercase slug for generated behavior names: word characters survive,
/// everything else becomes a single `-`, leading/trailing dashes trimmed.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else {
            slug.push('-');
        }
    }
    sanitize_name(&slug).trim_matches('-').to_string()
}

/// Heading lines are one or more `#` followed by whitespace or text.
/// Returns the heading text when the line is a heading.
fn heading_text(trimmed: &str) -> Option<&str> {
    if !trimmed.starts_with('#') {
        return None;
    }
    let rest = trimmed.trim_start_matches('#');
    Some(rest.trim_start())
}

fn is_horizontal_rule(trimmed: &str) -> bool {
    let t = trimmed.trim_end();
    t.len() >= 3
        && (t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*') || t.chars().all(|c| c == '_'))
}

/// Remove `<tag>`, `</tag>` and `<tag/>` sequences. Only sequences that
/// look like markup (first char alphabetic, `/` or `!`) are removed; a bare
/// `<` comparison survives. An unterminated tag swallows to end of input.
fn strip_markup_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let looks_like_tag = chars
                .peek()
                .is_some_and(|&n| n.is_ascii_alphabetic() || n == '/' || n == '!');
            if looks_like_tag {
                for inner in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ============================================================================
// TESTS
// ============================================================================
