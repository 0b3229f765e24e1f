//! Narrow markup-to-text transform for chapter bodies.
//!
//! The content endpoints emit a small, stable set of tags, so this is a set of
//! greedy, non-nesting regex substitutions rather than an HTML parser.
//! Unbalanced or malformed tags are simply dropped.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Indent placed in front of every non-blank body line.
pub const PARAGRAPH_INDENT: &str = "    ";

static WRAPPER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:header|footer|article)\b[^>]*>").expect("wrapper tag pattern")
});

static BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</p\s*>|<br\s*/?>|</div\s*>|</h[1-6]\s*>").expect("break tag pattern")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("entity pattern")
});

/// Removes header/footer/article wrapper tags, keeping their content.
pub fn strip_wrappers(html: &str) -> String {
    WRAPPER_TAG.replace_all(html, "").into_owned()
}

/// Turns paragraph-boundary tags into line breaks.
pub fn breaks_to_newlines(html: &str) -> String {
    BREAK_TAG.replace_all(html, "\n").into_owned()
}

/// Removes every remaining tag.
pub fn strip_tags(html: &str) -> String {
    ANY_TAG.replace_all(html, "").into_owned()
}

/// Resolves numeric entities and the handful of named ones the endpoints use.
/// Unknown entities are left as written.
pub fn unescape_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let resolved = if let Some(hex) = body.strip_prefix("#x").or(body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            resolved.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "emsp" | "ensp" => Some(' '),
        "hellip" => Some('…'),
        "mdash" => Some('—'),
        "ldquo" => Some('“'),
        "rdquo" => Some('”'),
        _ => None,
    }
}

/// Drops a leading copy of `title` from `body`.
pub fn strip_title_prefix<'a>(body: &'a str, title: Option<&str>) -> &'a str {
    let body = body.trim_start();
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => body
            .strip_prefix(title)
            .map(str::trim_start)
            .unwrap_or(body),
        None => body,
    }
}

/// Trims every line, collapses runs of blank lines to one, drops leading and
/// trailing blank lines and indents every non-blank line.
pub fn normalize_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(PARAGRAPH_INDENT);
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Full body transform for markup content.
///
/// `transform` is applied to the plain text before title de-duplication;
/// reader-style payloads use it for the cipher decode.
pub fn markup_to_text(
    html: &str,
    title: Option<&str>,
    transform: impl Fn(&str) -> String,
) -> String {
    let text = strip_tags(&breaks_to_newlines(&strip_wrappers(html)));
    let text = transform(&unescape_entities(&text));
    normalize_lines(strip_title_prefix(&text, title))
}
