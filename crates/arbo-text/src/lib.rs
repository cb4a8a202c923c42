//! Byte-oriented positions, edits, and source input for the parsing engine.
//!
//! Offsets are `text_size::TextSize` everywhere. Source text reaches the
//! engine through [`TextInput`], a pure chunked-read interface: the same
//! offset must always yield the same bytes for the duration of a parse.

pub use text_size::{TextRange, TextSize};

/// A zero-based row/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub const ZERO: Self = Self { row: 0, column: 0 };

    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Advances the position over a single character.
    pub fn advance(&mut self, ch: char) {
        if ch == '\n' {
            self.row += 1;
            self.column = 0;
        } else {
            self.column += ch.len_utf8() as u32;
        }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

/// A single text mutation, described in byte offsets.
///
/// The bytes `start..old_end` of the previous text were replaced by
/// `start..new_end` of the new text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub start: TextSize,
    pub old_end: TextSize,
    pub new_end: TextSize,
}

impl Edit {
    pub fn new(start: u32, old_end: u32, new_end: u32) -> Self {
        debug_assert!(start <= old_end && start <= new_end);
        Self {
            start: TextSize::new(start),
            old_end: TextSize::new(old_end),
            new_end: TextSize::new(new_end),
        }
    }

    /// An insertion of `len` bytes at `start`.
    pub fn insert(start: u32, len: u32) -> Self {
        Self::new(start, start, start + len)
    }

    /// A deletion of the bytes `start..old_end`.
    pub fn delete(start: u32, old_end: u32) -> Self {
        Self::new(start, old_end, start)
    }

    /// The number of bytes the replacement inserted.
    pub fn inserted_len(&self) -> TextSize {
        self.new_end - self.start
    }

    /// Applies this edit to a total text length.
    pub fn apply_to_len(&self, len: TextSize) -> TextSize {
        let deleted = self.old_end.min(len) - self.start.min(len);
        len - deleted + self.inserted_len()
    }
}

/// Pure chunked access to source bytes.
///
/// `read(offset)` returns the bytes starting at `offset`; an empty slice
/// signals end of input. Implementations must behave as pure functions of
/// the offset: the engine re-reads offsets freely while backtracking.
pub trait TextInput {
    fn read(&self, offset: TextSize) -> &[u8];
}

impl TextInput for &str {
    fn read(&self, offset: TextSize) -> &[u8] {
        let offset = usize::from(offset).min(self.len());
        &self.as_bytes()[offset..]
    }
}

impl TextInput for &[u8] {
    fn read(&self, offset: TextSize) -> &[u8] {
        let offset = usize::from(offset).min(self.len());
        &self[offset..]
    }
}

impl<T: TextInput + ?Sized> TextInput for &T {
    fn read(&self, offset: TextSize) -> &[u8] {
        (**self).read(offset)
    }
}

/// Serves a backing buffer in fixed-size chunks.
///
/// Exercises the chunk-boundary paths of the lexer the way a callback-backed
/// document (a rope, an editor buffer) would.
pub struct ChunkedInput<'a> {
    bytes: &'a [u8],
    chunk_len: usize,
}

impl<'a> ChunkedInput<'a> {
    pub fn new(bytes: &'a [u8], chunk_len: usize) -> Self {
        assert!(chunk_len > 0, "chunk length must be non-zero");
        Self { bytes, chunk_len }
    }
}

impl TextInput for ChunkedInput<'_> {
    fn read(&self, offset: TextSize) -> &[u8] {
        let start = usize::from(offset).min(self.bytes.len());
        let end = (start + self.chunk_len).min(self.bytes.len());
        &self.bytes[start..end]
    }
}
