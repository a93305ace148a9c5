//! Post-processing: deterministic cleanup of LLM narration before it is
//! written to disk.
//!
//! Narration goes straight into a TTS engine and a subtitle track, so any
//! Markdown the model emits despite the prompt would be read aloud ("hash
//! hash Overview") or shown verbatim. These rules strip that syntax while
//! keeping every word.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw reply; links are rewritten before emphasis so `[**x**](u)`
//! collapses cleanly; whitespace is collapsed last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Drop image syntax, keep link text
/// 5. Drop heading markers
/// 6. Drop bullet and numbered-list markers
/// 7. Drop emphasis and inline-code markers
/// 8. Collapse whitespace: lines joined within a paragraph, paragraphs
///    separated by one blank line
///
/// The result is trimmed; an empty string means the reply had no speakable
/// content and the caller must treat it as a failure.
pub fn clean_narration(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = strip_links(&s);
    let s = strip_headings(&s);
    let s = strip_list_markers(&s);
    let s = strip_emphasis(&s);
    collapse_whitespace(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Links and images ────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());

fn strip_links(input: &str) -> String {
    let s = RE_IMAGE.replace_all(input, "");
    RE_LINK.replace_all(&s, "$1").to_string()
}

// ── Rule 5: Heading markers ─────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").unwrap());

fn strip_headings(input: &str) -> String {
    RE_HEADING.replace_all(input, "").to_string()
}

// ── Rule 6: List markers ────────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*+•]|\d{1,3}[.)])[ \t]+").unwrap());

fn strip_list_markers(input: &str) -> String {
    RE_BULLET.replace_all(input, "").to_string()
}

// ── Rule 7: Emphasis ────────────────────────────────────────────────────────

static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\*\*|__)([^\n]+?)(\*\*|__)").unwrap());
static RE_EM_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static RE_EM_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s(])_([^_\n]+)_").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

fn strip_emphasis(input: &str) -> String {
    let s = RE_STRONG.replace_all(input, "$2");
    let s = RE_EM_STAR.replace_all(&s, "$1");
    let s = RE_EM_UNDERSCORE.replace_all(&s, "$1$2");
    RE_CODE.replace_all(&s, "$1").to_string()
}

// ── Rule 8: Collapse whitespace ─────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in input.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(words.join(" "));
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs.join("\n\n")
}
