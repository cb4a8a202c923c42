//! Table-level construction of a grammar descriptor.
//!
//! An external grammar compiler (or a test) assembles finished tables here;
//! `build` performs only minimal shape checks. Translating rule definitions
//! into tables is out of scope for the engine.

use rustc_hash::FxHashMap;

use crate::external::ExternalScanner;
use crate::symbol::{FieldId, StateId, Symbol, SymbolKind, SymbolSet};
use crate::table::{LexPattern, LexRule, ParseAction, ParseState};
use crate::{Grammar, SymbolInfo};

/// A malformed grammar descriptor, caught at build time.
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("grammar has no parse states")]
    NoStates,
    #[error("grammar declares no root symbol")]
    NoRoot,
    #[error("shift on `{symbol}` in {state} targets missing state s{target}")]
    DanglingShift { state: StateId, symbol: Box<str>, target: u16 },
    #[error("reduce target `{0}` is not a nonterminal")]
    ReduceToTerminal(Box<str>),
    #[error("extra symbol `{0}` is not a terminal")]
    ExtraNonTerminal(Box<str>),
    #[error("word symbol `{0}` is not a terminal")]
    WordNonTerminal(Box<str>),
    #[error("keyword `{0}` declared without a word token")]
    KeywordWithoutWord(Box<str>),
    #[error("too many symbols")]
    TooManySymbols,
}

/// Builds an immutable [`Grammar`] from finished tables.
pub struct GrammarBuilder {
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
    root: Option<Symbol>,
}

impl GrammarBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            symbols: Vec::new(),
            lex_rules: Vec::new(),
            states: Vec::new(),
            extras: SymbolSet::new(),
            externals: SymbolSet::new(),
            word_symbol: None,
            keywords: FxHashMap::default(),
            fields: Vec::new(),
            field_map: FxHashMap::default(),
            scanner: None,
            root: None,
        }
    }

    fn add_symbol(&mut self, name: &str, kind: SymbolKind, terminal: bool) -> Symbol {
        assert!(self.symbols.len() < Symbol::MAX_REGULAR, "too many symbols");
        let symbol = Symbol::new(self.symbols.len() as u16);
        self.symbols.push(SymbolInfo { name: name.into(), kind, terminal });
        symbol
    }

    /// Declares a named terminal recognized by `pattern`.
    pub fn token(&mut self, name: &str, pattern: LexPattern) -> Symbol {
        let symbol = self.add_symbol(name, SymbolKind::Named, true);
        self.lex_rules.push(LexRule { symbol, pattern });
        symbol
    }

    /// Declares an anonymous terminal matching `text` exactly.
    pub fn literal(&mut self, text: &str) -> Symbol {
        let symbol = self.add_symbol(text, SymbolKind::Anonymous, true);
        self.lex_rules.push(LexRule { symbol, pattern: LexPattern::Literal(text.into()) });
        symbol
    }

    /// Declares a keyword terminal reached only by reclassifying the word
    /// token; `text` is both its name and its spelling.
    pub fn keyword(&mut self, text: &str) -> Symbol {
        let symbol = self.add_symbol(text, SymbolKind::Anonymous, true);
        self.keywords.insert(text.into(), symbol);
        symbol
    }

    /// Declares a terminal produced solely by the external scanner.
    pub fn external(&mut self, name: &str) -> Symbol {
        let symbol = self.add_symbol(name, SymbolKind::Named, true);
        self.externals.insert(symbol);
        symbol
    }

    /// Declares a visible, named nonterminal.
    pub fn named(&mut self, name: &str) -> Symbol {
        self.add_symbol(name, SymbolKind::Named, false)
    }

    /// Declares a hidden nonterminal; its children are spliced into the
    /// parent in the visible tree.
    pub fn hidden(&mut self, name: &str) -> Symbol {
        self.add_symbol(name, SymbolKind::Hidden, false)
    }

    /// Marks a terminal as valid anywhere (whitespace, comments).
    pub fn extra(&mut self, symbol: Symbol) {
        self.extras.insert(symbol);
    }

    /// Sets the word token that keyword reclassification applies to.
    pub fn word(&mut self, symbol: Symbol) {
        self.word_symbol = Some(symbol);
    }

    /// Declares the symbol a finished parse rolls up to.
    pub fn root(&mut self, symbol: Symbol) {
        self.root = Some(symbol);
    }

    /// Declares a field name.
    pub fn field(&mut self, name: &str) -> FieldId {
        let id = FieldId(self.fields.len() as u16);
        self.fields.push(name.into());
        id
    }

    /// Assigns `field` to child `index` of `parent` productions.
    pub fn field_for_child(&mut self, parent: Symbol, index: u16, field: FieldId) {
        self.field_map.insert((parent, index), field);
    }

    /// Installs the external scanner hook.
    pub fn scanner(&mut self, scanner: Box<dyn ExternalScanner>) {
        self.scanner = Some(scanner);
    }

    /// Appends an empty parse state and returns its id.
    pub fn state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u16);
        self.states.push(ParseState::default());
        id
    }

    fn push_action(&mut self, state: StateId, symbol: Symbol, action: ParseAction) {
        self.states[state.index()].actions.entry(symbol).or_default().push(action);
    }

    /// Adds a shift (terminal) or goto (nonterminal) entry.
    pub fn shift(&mut self, state: StateId, symbol: Symbol, target: StateId) {
        self.push_action(state, symbol, ParseAction::Shift { state: target });
    }

    /// Adds a reduce entry: on lookahead `on`, pop `child_count` children
    /// into a `symbol` node.
    pub fn reduce(&mut self, state: StateId, on: Symbol, symbol: Symbol, child_count: u16) {
        self.push_action(state, on, ParseAction::Reduce { symbol, child_count });
    }

    /// Adds an accept entry on lookahead `on` (normally `Symbol::END`).
    pub fn accept(&mut self, state: StateId, on: Symbol) {
        self.push_action(state, on, ParseAction::Accept);
    }

    pub fn build(mut self) -> Result<Grammar, GrammarError> {
        if self.states.is_empty() {
            return Err(GrammarError::NoStates);
        }
        let root = self.root.ok_or(GrammarError::NoRoot)?;

        let symbol_name = |symbols: &[SymbolInfo], symbol: Symbol| -> Box<str> {
            symbols.get(symbol.index()).map_or_else(|| "?".into(), |info| info.name.clone())
        };
        let is_terminal = |symbols: &[SymbolInfo], symbol: Symbol| -> bool {
            symbol.is_sentinel() || symbols.get(symbol.index()).is_some_and(|info| info.terminal)
        };

        let state_count = self.states.len() as u16;
        for (index, state) in self.states.iter().enumerate() {
            for (&symbol, actions) in &state.actions {
                for action in actions {
                    match *action {
                        ParseAction::Shift { state: target } if target.0 >= state_count => {
                            return Err(GrammarError::DanglingShift {
                                state: StateId(index as u16),
                                symbol: symbol_name(&self.symbols, symbol),
                                target: target.0,
                            });
                        }
                        ParseAction::Reduce { symbol: target, .. }
                            if is_terminal(&self.symbols, target) =>
                        {
                            return Err(GrammarError::ReduceToTerminal(symbol_name(
                                &self.symbols,
                                target,
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }

        for symbol in self.extras.iter() {
            if !is_terminal(&self.symbols, symbol) {
                return Err(GrammarError::ExtraNonTerminal(symbol_name(&self.symbols, symbol)));
            }
        }
        if let Some(word) = self.word_symbol
            && !is_terminal(&self.symbols, word)
        {
            return Err(GrammarError::WordNonTerminal(symbol_name(&self.symbols, word)));
        }
        if !self.keywords.is_empty() && self.word_symbol.is_none() {
            let text = self.keywords.keys().next().expect("non-empty").clone();
            return Err(GrammarError::KeywordWithoutWord(text));
        }

        // Cache per-state valid terminals: every terminal with an action,
        // every extra, and the word token wherever a keyword is expected.
        let keyword_symbols: SymbolSet = self.keywords.values().copied().collect();
        for state in &mut self.states {
            let mut terminals = SymbolSet::new();
            let mut keyword_expected = false;
            for &symbol in state.actions.keys() {
                if is_terminal(&self.symbols, symbol) {
                    terminals.insert(symbol);
                }
                if keyword_symbols.contains(symbol) {
                    keyword_expected = true;
                }
            }
            for extra in self.extras.iter() {
                terminals.insert(extra);
            }
            if keyword_expected && let Some(word) = self.word_symbol {
                terminals.insert(word);
            }
            state.terminals = terminals;
        }

        Ok(Grammar {
            name: self.name,
            symbols: self.symbols,
            lex_rules: self.lex_rules,
            states: self.states,
            extras: self.extras,
            externals: self.externals,
            word_symbol: self.word_symbol,
            keywords: self.keywords,
            fields: self.fields,
            field_map: self.field_map,
            scanner: self.scanner,
            root,
        })
    }
}
