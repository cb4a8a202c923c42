//! Pattern matching over syntax trees.
//!
//! A [`Query`] compiles a set of S-expression patterns against a grammar
//! once; a [`QueryCursor`] then runs it over any tree produced by that
//! grammar, yielding [`QueryMatch`]es lazily in document order.

mod compile;
mod cursor;
mod error;
mod parse;

use arbo_grammar::Grammar;

pub use crate::compile::{Predicate, PredicateArg};
pub use crate::cursor::{
    DEFAULT_MATCH_LIMIT, QueryCapture, QueryCursor, QueryMatch, QueryMatches,
};
pub use crate::error::{QueryError, QueryErrorKind};

/// A set of patterns compiled against one grammar.
#[derive(Debug)]
pub struct Query {
    patterns: Vec<compile::Pattern>,
    capture_names: Vec<Box<str>>,
}

impl Query {
    /// Parses and compiles `source`, resolving node kinds and fields against
    /// `grammar`.
    pub fn new(grammar: &Grammar, source: &str) -> Result<Self, QueryError> {
        let asts = parse::parse(source)?;
        let (patterns, capture_names) = compile::compile(grammar, &asts)?;
        tracing::debug!(
            "compiled query with {} patterns and {} captures",
            patterns.len(),
            capture_names.len()
        );
        Ok(Self { patterns, capture_names })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn capture_count(&self) -> usize {
        self.capture_names.len()
    }

    pub fn capture_name(&self, index: u16) -> &str {
        &self.capture_names[index as usize]
    }

    pub fn capture_index_for_name(&self, name: &str) -> Option<u16> {
        self.capture_names.iter().position(|known| **known == *name).map(|index| index as u16)
    }

    /// The predicates attached to the pattern at `pattern_index`.
    pub fn predicates(&self, pattern_index: usize) -> &[Predicate] {
        &self.patterns[pattern_index].predicates
    }

    pub(crate) fn patterns(&self) -> &[compile::Pattern] {
        &self.patterns
    }
}
