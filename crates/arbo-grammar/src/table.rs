//! Table entries of the grammar descriptor: lexical rules and parse actions.

use rustc_hash::FxHashMap;

use crate::symbol::{StateId, Symbol, SymbolSet};

/// A lexical rule shape: how one terminal's text is recognized.
///
/// These are the tables an external grammar compiler emits; the engine only
/// matches against them.
#[derive(Debug, Clone)]
pub enum LexPattern {
    /// An exact byte sequence (`"+"`, `"=="`).
    Literal(Box<str>),
    /// One or more characters drawn from a set of inclusive ranges.
    CharClass(Box<[(char, char)]>),
    /// An identifier shape: one character from `first`, any number from
    /// `rest`.
    Word { first: Box<[(char, char)]>, rest: Box<[(char, char)]> },
    /// A delimited span (`"..."`); no escapes, delegated to an external
    /// scanner when escapes matter.
    Delimited { open: char, close: char },
}

impl LexPattern {
    /// Whether `ch` falls in any of the inclusive `ranges`.
    pub fn in_ranges(ranges: &[(char, char)], ch: char) -> bool {
        ranges.iter().any(|&(lo, hi)| lo <= ch && ch <= hi)
    }
}

/// One entry of the lexical table.
#[derive(Debug, Clone)]
pub struct LexRule {
    pub symbol: Symbol,
    pub pattern: LexPattern,
}

/// One entry of the action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAction {
    /// Consume the lookahead (terminal) or a reduced subtree (nonterminal,
    /// the goto half of the table) and move to `state`.
    Shift { state: StateId },
    /// Pop `child_count` non-extra subtrees, combine them into a `symbol`
    /// node, and continue via the goto entry for `symbol`.
    Reduce { symbol: Symbol, child_count: u16 },
    /// The version spans the whole input in a final state.
    Accept,
}

/// One row of the action table.
#[derive(Debug, Clone, Default)]
pub struct ParseState {
    pub(crate) actions: FxHashMap<Symbol, Vec<ParseAction>>,
    /// Terminals lexically valid in this state (including extras and the
    /// word token when a keyword is expected). Drives the lexer.
    pub(crate) terminals: SymbolSet,
}

impl ParseState {
    pub fn actions(&self, symbol: Symbol) -> &[ParseAction] {
        self.actions.get(&symbol).map_or(&[], Vec::as_slice)
    }

    pub fn terminals(&self) -> &SymbolSet {
        &self.terminals
    }

    /// The state a shift (or goto) of `symbol` would lead to, if any.
    pub fn shift_target(&self, symbol: Symbol) -> Option<StateId> {
        self.actions(symbol).iter().find_map(|action| match action {
            ParseAction::Shift { state } => Some(*state),
            _ => None,
        })
    }
}
