//! Post-processing: deterministic cleanup of model translations.
//!
//! Even with an explicit prompt, models wrap answers in ```` ``` ```` fences,
//! answer with `\r\n` line endings, or restyle the page-break marker
//! (`**=== Page Break ===**`, `===PAGE BREAK===`). The reassembler splits on
//! the exact marker, so restoring it here decides whether a chunk's pages
//! come back one per page or merged onto the first.
//!
//! ## Rule Order
//!
//! Line endings are normalised before trimming, fences are stripped before
//! markers are restored so a fenced answer is matched on clean input, and
//! the final-newline pass runs last.

use crate::job::PAGE_BREAK_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw translation.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Restore restyled page-break markers to the canonical form
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Strip invisible Unicode (zero-width space, BOM, soft hyphen, word joiner)
/// 7. Ensure the text ends with exactly one newline
pub fn clean_translation(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = restore_page_breaks(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*)\r?\n```\s*$").unwrap()
});

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Restore page-break markers ───────────────────────────────────────

static RE_PAGE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t*_#>-]*={2,}[ \t]*page[ \t]*break[ \t]*={2,}[ \t*_]*$")
        .unwrap()
});

fn restore_page_breaks(input: &str) -> String {
    RE_PAGE_BREAK
        .replace_all(input, PAGE_BREAK_MARKER)
        .into_owned()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────
//
// ZWNJ (U+200C) and ZWJ (U+200D) are kept: Persian and other scripts use
// them inside words.

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

// ── Rule 7: Ensure a single final newline ────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
