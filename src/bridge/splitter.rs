//! Message splitting for platforms with a per-message length limit.

use crate::common::types::PlatformMessageType;

/// Split `text` into consecutive chunks of at most `max_chars` characters.
///
/// Empty input yields no chunks. Never splits inside a multi-byte
/// character.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let split_at = char_boundary_after(remaining, max_chars);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }

    chunks
}

/// Record type of the chunk at `index`.
pub fn chunk_kind(index: usize) -> PlatformMessageType {
    if index == 0 {
        PlatformMessageType::Message
    } else {
        PlatformMessageType::SplitMessage
    }
}

/// Byte offset just past the first `chars` characters of `s`.
fn char_boundary_after(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_4001() {
        let text = "a".repeat(4001);
        let chunks = split_chunks(&text, 2000);

        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![2000, 2000, 1]);

        let kinds: Vec<PlatformMessageType> = (0..chunks.len()).map(chunk_kind).collect();
        assert_eq!(
            kinds,
            vec![
                PlatformMessageType::Message,
                PlatformMessageType::SplitMessage,
                PlatformMessageType::SplitMessage
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(split_chunks("", 2000).is_empty());
    }

    #[test]
    fn test_short_input_single_chunk() {
        assert_eq!(split_chunks("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn test_exact_multiple() {
        let text = "b".repeat(4000);
        assert_eq!(split_chunks(&text, 2000).len(), 2);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let text = "é".repeat(5);
        let chunks = split_chunks(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert_eq!(chunks.concat(), text);
    }
}
