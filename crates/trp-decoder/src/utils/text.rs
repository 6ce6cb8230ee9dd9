//! Heuristic text recovery for length-delimited payloads

/// Decode `bytes` as UTF-8, falling back to Latin-1, and keep the result only when it
/// reads like text.
///
/// Leading and trailing NULs and whitespace are stripped. Returns `None` for empty
/// results or when fewer than `min_printable_ratio` of the characters are printable.
pub fn decode_text(bytes: &[u8], min_printable_ratio: f64) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let decoded = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    };

    let trimmed = decoded.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }

    if printable_ratio(trimmed) < min_printable_ratio {
        return None;
    }

    Some(trimmed.to_owned())
}

/// Share of characters that are not control characters (tab, CR and LF count as printable)
pub fn printable_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut printable = 0usize;
    for c in text.chars() {
        total += 1;
        if !c.is_control() || matches!(c, '\t' | '\n' | '\r') {
            printable += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    printable as f64 / total as f64
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
