//! The opaque grammar descriptor the engine consumes.
//!
//! A grammar is an immutable bundle of tables: symbols, lexical rules, the
//! shift/reduce action table (nonterminal entries double as the goto
//! table), field names, keyword reclassification, and an optional external
//! scanner hook. It is produced once by an external compiler (or a test's
//! [`GrammarBuilder`]), shared read-only via `Arc`, and consumed through
//! fixed accessors.

mod builder;
mod external;
mod symbol;
mod table;

use rustc_hash::FxHashMap;

pub use builder::{GrammarBuilder, GrammarError};
pub use external::{ExternalScanner, ExternalToken, ScanCursor};
pub use symbol::{FieldId, StateId, Symbol, SymbolKind, SymbolSet};
pub use table::{LexPattern, LexRule, ParseAction, ParseState};

#[derive(Debug, Clone)]
pub(crate) struct SymbolInfo {
    name: Box<str>,
    kind: SymbolKind,
    terminal: bool,
}

/// A compiled language description. See the module docs.
pub struct Grammar {
    name: Box<str>,
    symbols: Vec<SymbolInfo>,
    lex_rules: Vec<LexRule>,
    states: Vec<ParseState>,
    extras: SymbolSet,
    externals: SymbolSet,
    word_symbol: Option<Symbol>,
    keywords: FxHashMap<Box<str>, Symbol>,
    fields: Vec<Box<str>>,
    field_map: FxHashMap<(Symbol, u16), FieldId>,
    scanner: Option<Box<dyn ExternalScanner>>,
    root: Symbol,
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("symbols", &self.symbols.len())
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The symbol a finished parse rolls up to.
    pub fn root_symbol(&self) -> Symbol {
        self.root
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        match symbol {
            Symbol::END => "end",
            Symbol::ERROR => "ERROR",
            _ => self.symbols.get(symbol.index()).map_or("?", |info| &info.name),
        }
    }

    pub fn symbol_kind(&self, symbol: Symbol) -> SymbolKind {
        match symbol {
            Symbol::END => SymbolKind::Hidden,
            Symbol::ERROR => SymbolKind::Named,
            _ => self.symbols.get(symbol.index()).map_or(SymbolKind::Hidden, |info| info.kind),
        }
    }

    /// Whether nodes of this symbol appear in the visible tree.
    pub fn is_visible(&self, symbol: Symbol) -> bool {
        !matches!(self.symbol_kind(symbol), SymbolKind::Hidden)
    }

    /// Whether nodes of this symbol are named (as opposed to anonymous
    /// literal tokens).
    pub fn is_named(&self, symbol: Symbol) -> bool {
        matches!(self.symbol_kind(symbol), SymbolKind::Named)
    }

    pub fn is_terminal(&self, symbol: Symbol) -> bool {
        match symbol {
            Symbol::END | Symbol::ERROR => true,
            _ => self.symbols.get(symbol.index()).is_some_and(|info| info.terminal),
        }
    }

    pub fn is_extra(&self, symbol: Symbol) -> bool {
        self.extras.contains(symbol)
    }

    pub fn is_external(&self, symbol: Symbol) -> bool {
        self.externals.contains(symbol)
    }

    pub fn externals(&self) -> &SymbolSet {
        &self.externals
    }

    pub fn extras(&self) -> &SymbolSet {
        &self.extras
    }

    /// Resolves a symbol by name, filtered by namedness. Query compilation
    /// uses this to turn pattern text into symbol constraints.
    pub fn symbol_for_name(&self, name: &str, named: bool) -> Option<Symbol> {
        if named && name == "ERROR" {
            return Some(Symbol::ERROR);
        }
        self.symbols.iter().enumerate().find_map(|(index, info)| {
            let matches = &*info.name == name
                && match info.kind {
                    SymbolKind::Named => named,
                    SymbolKind::Anonymous => !named,
                    SymbolKind::Hidden => false,
                };
            matches.then(|| Symbol::new(index as u16))
        })
    }

    pub fn lex_rules(&self) -> &[LexRule] {
        &self.lex_rules
    }

    pub fn state(&self, state: StateId) -> &ParseState {
        &self.states[state.index()]
    }

    /// All actions for a `(state, symbol)` pair; more than one drives GLR
    /// forking.
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        self.state(state).actions(symbol)
    }

    /// Terminals lexically valid in `state` (including extras).
    pub fn valid_terminals(&self, state: StateId) -> &SymbolSet {
        self.state(state).terminals()
    }

    pub fn word_symbol(&self) -> Option<Symbol> {
        self.word_symbol
    }

    /// The keyword symbol `text` reclassifies to, if any.
    pub fn keyword_for(&self, text: &str) -> Option<Symbol> {
        self.keywords.get(text).copied()
    }

    pub fn field_name(&self, field: FieldId) -> &str {
        self.fields.get(field.index()).map_or("?", |name| name)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|field| &**field == name).map(|index| FieldId(index as u16))
    }

    /// The field assigned to child `index` of a `parent` production.
    pub fn field_for_child(&self, parent: Symbol, index: u16) -> Option<FieldId> {
        self.field_map.get(&(parent, index)).copied()
    }

    pub fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        self.scanner.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits() -> LexPattern {
        LexPattern::CharClass(Box::new([('0', '9')]))
    }

    #[test]
    fn build_and_read_back() {
        let mut b = GrammarBuilder::new("arith");
        let number = b.token("number", digits());
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);

        let s0 = b.state();
        let s1 = b.state();
        b.shift(s0, number, s1);
        b.reduce(s1, plus, rep, 0);
        b.accept(s1, Symbol::END);

        let grammar = b.build().unwrap();
        assert_eq!(grammar.symbol_name(number), "number");
        assert_eq!(grammar.symbol_name(plus), "+");
        assert!(grammar.is_named(number));
        assert!(!grammar.is_named(plus));
        assert!(!grammar.is_visible(rep));
        assert!(grammar.is_terminal(number));
        assert!(!grammar.is_terminal(sum));

        assert_eq!(grammar.symbol_for_name("number", true), Some(number));
        assert_eq!(grammar.symbol_for_name("+", false), Some(plus));
        assert_eq!(grammar.symbol_for_name("_sum_repeat", true), None);

        assert_eq!(
            grammar.actions(s0, number),
            &[ParseAction::Shift { state: s1 }]
        );
        assert!(grammar.valid_terminals(s0).contains(number));
        assert!(!grammar.valid_terminals(s0).contains(plus));
        assert!(grammar.valid_terminals(s1).contains(plus));
    }

    #[test]
    fn shape_checks_catch_dangling_targets() {
        let mut b = GrammarBuilder::new("bad");
        let number = b.token("number", digits());
        let sum = b.named("sum");
        b.root(sum);
        let s0 = b.state();
        b.shift(s0, number, StateId(7));
        assert!(matches!(b.build(), Err(GrammarError::DanglingShift { .. })));
    }

    #[test]
    fn shape_checks_require_root() {
        let mut b = GrammarBuilder::new("rootless");
        b.state();
        assert!(matches!(b.build(), Err(GrammarError::NoRoot)));
    }

    #[test]
    fn keywords_require_word_token() {
        let mut b = GrammarBuilder::new("kw");
        let sum = b.named("sum");
        b.root(sum);
        b.keyword("if");
        b.state();
        assert!(matches!(b.build(), Err(GrammarError::KeywordWithoutWord(_))));
    }
}
