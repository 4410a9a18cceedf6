//! Outbound text limits.
//!
//! Telegram rejects messages over 4096 characters; replies are cut at 4000.
//! Lengths are counted in `char`s so a cut never lands inside a UTF-8
//! sequence. Word boundaries are not respected.

/// Maximum characters per outbound message.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Split `text` into consecutive pieces of at most `max` chars.
///
/// Concatenating the result reproduces `text` exactly. Empty input yields
/// no chunks.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    assert!(max > 0, "chunk size must be positive");
    let mut chunks = Vec::with_capacity(text.len() / max + 1);
    let mut rest = text;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(max)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(cut);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

/// Keep at most the first `max` chars of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_chunks("hi there", MAX_MESSAGE_LENGTH), vec!["hi there"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_chunks("", MAX_MESSAGE_LENGTH).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let text = "a".repeat(8000);
        let chunks = split_chunks(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() == 4000));
    }

    #[test]
    fn nine_thousand_chars_make_three_chunks() {
        let text: String = (0..9000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_chunks(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], text[..4000]);
        assert_eq!(chunks[1], text[4000..8000]);
        assert_eq!(chunks[2], text[8000..]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_count_is_ceiling_for_many_lengths() {
        for len in [1usize, 3999, 4000, 4001, 12_000, 12_001] {
            let text = "x".repeat(len);
            let chunks = split_chunks(&text, MAX_MESSAGE_LENGTH);
            assert_eq!(chunks.len(), len.div_ceil(MAX_MESSAGE_LENGTH), "len {len}");
            assert_eq!(chunks.concat(), text);
        }
    }

    #[test]
    fn multibyte_chars_are_counted_not_bytes() {
        let text = "é".repeat(5);
        let chunks = split_chunks(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn truncate_keeps_prefix() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("🤖🤖🤖", 2), "🤖🤖");
    }
}
