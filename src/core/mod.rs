//! Core domain types: documents and hierarchically chunked passages.

pub mod chunk;
pub mod document;

pub use chunk::{Chunk, ChunkFingerprint, ChunkId, SpecValue};
pub use document::DocumentRecord;

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap)]
#[must_use]
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Finds a valid UTF-8 character boundary at or before the given position.
#[must_use]
pub fn find_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut boundary = pos;
    while !s.is_char_boundary(boundary) && boundary > 0 {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_positive() {
        assert!(unix_now() > 0);
    }

    #[test]
    fn test_find_char_boundary_ascii() {
        assert_eq!(find_char_boundary("hello", 3), 3);
        assert_eq!(find_char_boundary("hello", 99), 5);
    }

    #[test]
    fn test_find_char_boundary_multibyte() {
        // 'Ω' is 2 bytes; position 1 falls inside it
        let s = "Ωm";
        assert_eq!(find_char_boundary(s, 1), 0);
        assert_eq!(find_char_boundary(s, 2), 2);
    }
}
