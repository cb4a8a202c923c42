//! Incremental, error-tolerant parsing.
//!
//! Feed a [`Grammar`] and some text to a [`Parser`] and get back a [`Tree`]:
//! a persistent concrete syntax tree that is cheap to clone, survives any
//! input, and can be re-parsed after an [`Edit`] while sharing unchanged
//! subtrees with its predecessor. [`Query`] patterns match structurally over
//! the result.
//!
//! This crate only re-exports the engine's pieces under one roof; each lives
//! in its own crate below `crates/`.

pub use arbo_grammar::{
    ExternalScanner, ExternalToken, FieldId, Grammar, GrammarBuilder, GrammarError, LexPattern,
    ScanCursor, StateId, Symbol, SymbolKind, SymbolSet,
};
pub use arbo_lexer::{Lexer, SourceBuffer, Token};
pub use arbo_parse::{ParseError, Parser};
pub use arbo_query::{
    Predicate, PredicateArg, Query, QueryCapture, QueryCursor, QueryError, QueryErrorKind,
    QueryMatch, QueryMatches,
};
pub use arbo_text::{ChunkedInput, Edit, Point, TextInput, TextRange, TextSize};
pub use arbo_tree::{Children, Node, NoMove, Subtree, SubtreeFlags, Tree, TreeCursor};
pub use triomphe::Arc;
