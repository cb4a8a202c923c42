//! The grammar-supplied external scanner hook.

use arbo_text::TextSize;

use crate::symbol::{Symbol, SymbolSet};

/// Lookahead access handed to an external scanner.
///
/// Mirrors the engine's own lexing cursor: one character of lookahead,
/// explicit advancement, and an optional end mark so a scanner can look
/// past the token it produces.
pub trait ScanCursor {
    /// The character at the current position, or `None` at end of input.
    fn lookahead(&mut self) -> Option<char>;
    /// Consumes the current character.
    fn advance(&mut self);
    /// Records the current position as the end of the produced token.
    fn mark_end(&mut self);
    /// The current byte offset.
    fn offset(&self) -> TextSize;
}

/// A token produced by an external scanner.
#[derive(Debug, Clone, Copy)]
pub struct ExternalToken {
    pub symbol: Symbol,
}

/// A grammar-supplied scanner for context-sensitive tokens (heredocs,
/// string interpolation, indentation).
///
/// Called before the built-in rules whenever an external symbol is valid.
/// Returning `None` hands lexing back to the grammar's own tables; the
/// engine rewinds the cursor first, so a scanner may consume freely while
/// deciding. Scanners are shared read-only across parser instances and must
/// derive everything from the cursor and the valid-symbol set.
pub trait ExternalScanner: Send + Sync {
    fn scan(&self, cursor: &mut dyn ScanCursor, valid: &SymbolSet) -> Option<ExternalToken>;
}
