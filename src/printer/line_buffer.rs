//! # ASCII Line Buffer
//!
//! Tracks the printer's own ASCII line so that text arrives in whole rows.
//! The device prints its internal buffer on `LF` or when the row is full;
//! mirroring that here keeps our view and the device's view in sync.
//!
//! ## Flush Rules
//!
//! | Input | Effect |
//! |-------|--------|
//! | `'\n'` | flush current buffer (possibly empty), newline not included |
//! | printable ASCII | append; flush when length reaches `row_characters` |
//! | anything else | dropped |
//!
//! After every [`append`](LineBuffer::append) the buffer holds fewer than
//! `row_characters` bytes.

/// Whether a character may be sent in the device's ASCII mode.
#[inline]
pub fn is_printable_ascii(ch: char) -> bool {
    (' '..='~').contains(&ch)
}

/// Drop everything except printable ASCII and newlines.
///
/// ```
/// use peripage::printer::line_buffer::filter_ascii;
///
/// assert_eq!(filter_ascii("héllo\twörld\n"), "hllowrld\n");
/// ```
pub fn filter_ascii(text: &str) -> String {
    text.chars()
        .filter(|&ch| ch == '\n' || is_printable_ascii(ch))
        .collect()
}

/// # Line Buffer
///
/// ```
/// use peripage::printer::LineBuffer;
///
/// let mut buffer = LineBuffer::new(4);
/// let chunks = buffer.append("abcdef");
/// assert_eq!(chunks, vec![b"abcd".to_vec()]);
/// assert_eq!(buffer.current_buffer(), b"ef");
/// assert_eq!(buffer.flush(), b"ef".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct LineBuffer {
    row_characters: usize,
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer for rows of `row_characters` characters.
    pub fn new(row_characters: usize) -> Self {
        Self {
            row_characters: row_characters.max(1),
            buf: Vec::with_capacity(row_characters),
        }
    }

    /// Characters per row.
    pub fn row_characters(&self) -> usize {
        self.row_characters
    }

    /// Unflushed bytes.
    pub fn current_buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume `text`, returning the chunks flushed along the way, in order.
    pub fn append(&mut self, text: &str) -> Vec<Vec<u8>> {
        let mut flushed = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                flushed.push(self.take());
            } else if is_printable_ascii(ch) {
                self.buf.push(ch as u8);
                if self.buf.len() == self.row_characters {
                    flushed.push(self.take());
                }
            }
        }

        flushed
    }

    /// Take the remaining partial row (may be empty).
    pub fn flush(&mut self) -> Vec<u8> {
        self.take()
    }

    /// Drop the buffered characters without sending them.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buf, Vec::with_capacity(self.row_characters))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: usize = 32;

    #[test]
    fn test_short_text_stays_buffered() {
        let mut buffer = LineBuffer::new(ROW);
        let chunks = buffer.append("hello");
        assert!(chunks.is_empty());
        assert_eq!(buffer.current_buffer(), b"hello");
    }

    #[test]
    fn test_exact_row_flushes_once() {
        let mut buffer = LineBuffer::new(ROW);
        let text = "x".repeat(ROW);
        let chunks = buffer.append(&text);
        assert_eq!(chunks, vec![text.into_bytes()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_wraps() {
        let mut buffer = LineBuffer::new(ROW);
        let text = format!("{}{}", "a".repeat(ROW), "b".repeat(5));
        let chunks = buffer.append(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "a".repeat(ROW).into_bytes());
        assert_eq!(buffer.current_buffer(), b"bbbbb");
    }

    #[test]
    fn test_double_newline_flushes_two_empty_chunks() {
        let mut buffer = LineBuffer::new(ROW);
        let chunks = buffer.append("\n\n");
        assert_eq!(chunks, vec![Vec::<u8>::new(), Vec::new()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_newline_flushes_partial_row() {
        let mut buffer = LineBuffer::new(ROW);
        buffer.append("abc");
        let chunks = buffer.append("def\nghi");
        assert_eq!(chunks, vec![b"abcdef".to_vec()]);
        assert_eq!(buffer.current_buffer(), b"ghi");
    }

    #[test]
    fn test_non_ascii_dropped_without_counting() {
        let mut buffer = LineBuffer::new(4);
        let chunks = buffer.append("aé\tb\u{7f}cd");
        assert_eq!(chunks, vec![b"abcd".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_flush_returns_remainder() {
        let mut buffer = LineBuffer::new(ROW);
        assert_eq!(buffer.flush(), Vec::<u8>::new());
        buffer.append("tail");
        assert_eq!(buffer.flush(), b"tail".to_vec());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_never_reaches_row_width() {
        let mut buffer = LineBuffer::new(7);
        for len in 0..40 {
            buffer.append(&"z".repeat(len));
            assert!(buffer.current_buffer().len() < 7);
        }
    }

    #[test]
    fn test_clear() {
        let mut buffer = LineBuffer::new(ROW);
        buffer.append("pending");
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
