//! Small string helpers shared across modules.
//!
//! Upstream model services answer in Korean, so any byte-length truncation of
//! their output has to respect UTF-8 char boundaries.

/// Find the nearest valid UTF-8 char boundary at or before the given byte index.
#[inline]
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Truncate a string to at most `max_len` bytes on a valid UTF-8 boundary.
/// Returns a slice of the original string.
#[inline]
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let boundary = floor_char_boundary(s, max_len);
        &s[..boundary]
    }
}
