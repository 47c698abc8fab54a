//! Text canonicalization used for every text-derived cache key

/// Punctuation kept by [`normalize`] in addition to `[a-z0-9]` and spaces.
const KEPT_PUNCTUATION: &[char] = &['\'', '.', ',', '!', '?', '-'];

/// Canonicalize free text for key derivation.
///
/// Lowercases, drops every character outside `[a-z0-9 '.,!?-]`, collapses
/// whitespace runs to a single space and trims both ends. Two utterances
/// that differ only in casing, stray symbols or spacing normalize to the
/// same string.
///
/// The function is total and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !is_kept(c) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

/// First `max_chars` characters of an already-normalized string.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn is_kept(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || KEPT_PUNCTUATION.contains(&c)
}
