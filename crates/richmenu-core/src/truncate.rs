//! Message truncation helpers.
//!
//! Upstream error bodies and run-outcome messages are stored in fixed-size
//! columns and shown in the editor UI, so they are cut to a bounded number of
//! characters before they leave the crate that produced them.

/// Keep at most `max_chars` characters of `text`.
///
/// The cut is made on character boundaries (not bytes), so multi-byte
/// sequences such as CJK menu names are never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        // Fast path: byte length bounds char count.
        return text.to_owned();
    }

    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_owned(),
        None => text.to_owned(),
    }
}
