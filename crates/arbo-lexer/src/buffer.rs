//! Buffered access to a chunked text input.

use arbo_text::{TextInput, TextSize};

/// Accumulates chunks from a [`TextInput`] into a contiguous byte buffer.
///
/// The buffer only ever grows; backtracking re-reads already-fetched bytes
/// without touching the input. One buffer is shared by every stack version
/// of a parse.
pub struct SourceBuffer<'a> {
    input: &'a dyn TextInput,
    buf: Vec<u8>,
    /// Total input length, once an empty chunk has been observed.
    eof: Option<usize>,
}

impl<'a> SourceBuffer<'a> {
    pub fn new(input: &'a dyn TextInput) -> Self {
        Self { input, buf: Vec::new(), eof: None }
    }

    /// Fetches chunks until the buffer covers `end` or input is exhausted.
    fn ensure(&mut self, end: usize) {
        while self.buf.len() < end && self.eof.is_none() {
            let offset = TextSize::new(self.buf.len() as u32);
            let chunk = self.input.read(offset);
            if chunk.is_empty() {
                self.eof = Some(self.buf.len());
            } else {
                self.buf.extend_from_slice(chunk);
            }
        }
    }

    /// Whether `offset` is at or past the end of input.
    pub fn is_at_end(&mut self, offset: usize) -> bool {
        self.ensure(offset + 1);
        offset >= self.buf.len()
    }

    /// The bytes `range`, clamped to the available input.
    pub fn bytes(&mut self, start: usize, end: usize) -> &[u8] {
        self.ensure(end);
        let end = end.min(self.buf.len());
        let start = start.min(end);
        &self.buf[start..end]
    }

    /// Decodes the character at `offset`.
    ///
    /// Returns the character and its byte length, or `None` at end of
    /// input. An invalid byte decodes as `(REPLACEMENT, 1)` so that any
    /// byte sequence can be scanned.
    pub fn char_at(&mut self, offset: usize) -> Option<(char, usize)> {
        self.ensure(offset + 4);
        if offset >= self.buf.len() {
            return None;
        }
        let bytes = &self.buf[offset..(offset + 4).min(self.buf.len())];
        match std::str::from_utf8(bytes) {
            Ok(text) => text.chars().next().map(|ch| (ch, ch.len_utf8())),
            Err(error) if error.valid_up_to() > 0 => {
                let text = std::str::from_utf8(&bytes[..error.valid_up_to()]).expect("valid prefix");
                text.chars().next().map(|ch| (ch, ch.len_utf8()))
            }
            Err(_) => Some((char::REPLACEMENT_CHARACTER, 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use arbo_text::ChunkedInput;

    use super::*;

    #[test]
    fn refills_across_chunk_boundaries() {
        let input = ChunkedInput::new("abc\u{00e9}d".as_bytes(), 2);
        let mut buffer = SourceBuffer::new(&input);

        assert_eq!(buffer.char_at(0), Some(('a', 1)));
        assert_eq!(buffer.char_at(3), Some(('\u{00e9}', 2)));
        assert_eq!(buffer.char_at(5), Some(('d', 1)));
        assert_eq!(buffer.char_at(6), None);
        assert!(buffer.is_at_end(6));
        assert!(!buffer.is_at_end(5));
    }

    #[test]
    fn invalid_bytes_decode_one_at_a_time() {
        let bytes: &[u8] = &[b'a', 0xff, 0xfe, b'b'];
        let mut buffer = SourceBuffer::new(&bytes);

        assert_eq!(buffer.char_at(0), Some(('a', 1)));
        assert_eq!(buffer.char_at(1), Some((char::REPLACEMENT_CHARACTER, 1)));
        assert_eq!(buffer.char_at(2), Some((char::REPLACEMENT_CHARACTER, 1)));
        assert_eq!(buffer.char_at(3), Some(('b', 1)));
    }
}
