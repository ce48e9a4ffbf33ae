use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)([^.!?]+[.!?]+)|([^.!?]+$)").unwrap());

/// Split text on sentence boundaries and regroup sentences into chunks of at
/// most `max_chars` (a single longer sentence stays whole).
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    for m in SENTENCE.find_iter(text) {
        let s = m.as_str().trim();
        if !s.is_empty() {
            sentences.push(s.to_string());
        }
    }
    if sentences.is_empty() {
        warn!("No sentence breaks found; returning whole text as one chunk");
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for s in sentences {
        if current.is_empty() {
            current.push_str(&s);
        } else if current.len() + 1 + s.len() <= max_chars {
            current.push(' ');
            current.push_str(&s);
        } else {
            chunks.push(current);
            current = s;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// First `n` whitespace separated words of `text`.
pub fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Short hex tag of a uuid, used in output file names.
pub fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Base64 encode bytes (standard alphabet, padded).
pub fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as usize;
        let b1 = chunk.get(1).copied().unwrap_or(0) as usize;
        let b2 = chunk.get(2).copied().unwrap_or(0) as usize;
        let combined = (b0 << 16) | (b1 << 8) | b2;

        result.push(ALPHABET[(combined >> 18) & 0x3F] as char);
        result.push(ALPHABET[(combined >> 12) & 0x3F] as char);
        result.push(if chunk.len() > 1 {
            ALPHABET[(combined >> 6) & 0x3F] as char
        } else {
            '='
        });
        result.push(if chunk.len() > 2 {
            ALPHABET[combined & 0x3F] as char
        } else {
            '='
        });
    }
    result
}

/// Guess an image MIME type from its magic bytes (defaults to JPEG).
pub fn image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "image/png"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// `data:` URL carrying an uploaded image.
pub fn image_data_url(data: &[u8]) -> String {
    format!("data:{};base64,{}", image_mime(data), base64_encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_groups_sentences() {
        let chunks = chunk_text("One. Two! Three? Four", 10);
        assert_eq!(chunks, vec!["One. Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_chunk_text_keeps_long_sentence() {
        let long = "a".repeat(50) + ".";
        let chunks = chunk_text(&long, 10);
        assert_eq!(chunks, vec![long]);
    }

    #[test]
    fn test_first_words() {
        assert_eq!(first_words("a b  c\nd e", 3), "a b c");
        assert_eq!(first_words("", 10), "");
    }

    #[test]
    fn test_base64_encode() {
        assert_eq!(base64_encode(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(base64_encode(b"ab"), "YWI=");
        assert_eq!(base64_encode(b""), "");
    }

    #[test]
    fn test_image_data_url() {
        let png = b"\x89PNG\r\n\x1a\n";
        assert!(image_data_url(png).starts_with("data:image/png;base64,"));
        assert!(image_data_url(&[0xFF, 0xD8, 0xFF]).starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_short_id_len() {
        assert_eq!(short_id(&uuid::Uuid::new_v4()).len(), 8);
    }
}
