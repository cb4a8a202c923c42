use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use arbo_grammar::{Grammar, ParseAction, StateId, Symbol};
use arbo_lexer::{Lexer, SourceBuffer, Token};
use arbo_text::{Edit, Point, TextInput, TextRange, TextSize};
use arbo_tree::{Subtree, SubtreeFlags, Tree};
use rustc_hash::FxHashMap;
use triomphe::Arc;

use crate::reuse::ReuseCursor;
use crate::stack::{
    MAX_ACTIONS_PER_POSITION, MAX_CONSECUTIVE_MISSING, MAX_COST_DIFFERENCE, MAX_VERSIONS,
    StackVersion,
};

/// Cancellation is polled once per this many version steps.
const CANCELLATION_CHECK_INTERVAL: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The deadline passed or the cancellation flag was raised; no tree is
    /// produced.
    #[error("parse cancelled")]
    Cancelled,
}

/// A reusable parser for one grammar.
///
/// Parsing never fails on malformed input: errors surface as MISSING and
/// ERROR nodes in the produced tree. The only failure mode is
/// cancellation.
pub struct Parser {
    grammar: Arc<Grammar>,
    deadline: Option<Instant>,
    cancellation_flag: Option<Arc<AtomicBool>>,
}

impl Parser {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self { grammar, deadline: None, cancellation_flag: None }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Aborts parses that run past `deadline` with [`ParseError::Cancelled`].
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Aborts in-flight parses when the flag is set from another thread.
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.cancellation_flag = flag;
    }

    /// Parses `input`, reusing unchanged subtrees of `old_tree` when one is
    /// given. The caller must have recorded every edit on `old_tree` via
    /// [`Tree::edit`] before re-parsing.
    pub fn parse(&self, input: &dyn TextInput, old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        let mut run = ParseRun {
            grammar: &self.grammar,
            src: SourceBuffer::new(input),
            reuse: old_tree.map(|tree| ReuseCursor::new(tree.root_subtree().clone())),
            versions: vec![StackVersion::new(0)],
            accepted: None,
            best_halted: None,
            serial: 1,
            ticks: 0,
            single_version: true,
            token_cache: FxHashMap::default(),
            deadline: self.deadline,
            cancellation_flag: self.cancellation_flag.as_deref(),
        };
        let root = run.run()?;
        Ok(Tree::new(self.grammar.clone(), root))
    }

    /// Convenience over [`Parser::parse`]: applies `edits` to a copy of
    /// `old_tree` first, in order.
    pub fn parse_with_edits(
        &self,
        input: &dyn TextInput,
        old_tree: &Tree,
        edits: &[Edit],
    ) -> Result<Tree, ParseError> {
        let mut old = old_tree.clone();
        for edit in edits {
            old.edit(edit);
        }
        self.parse(input, Some(&old))
    }
}

struct Accepted {
    root: Subtree,
    cost: u32,
    created: u32,
}

enum Step {
    Continue,
    Halted,
    Accepted,
}

struct ParseRun<'a> {
    grammar: &'a Grammar,
    src: SourceBuffer<'a>,
    reuse: Option<ReuseCursor>,
    versions: Vec<StackVersion>,
    accepted: Option<Accepted>,
    best_halted: Option<StackVersion>,
    serial: u32,
    ticks: u32,
    single_version: bool,
    token_cache: FxHashMap<(TextSize, StateId), Option<Token>>,
    deadline: Option<Instant>,
    cancellation_flag: Option<&'a AtomicBool>,
}

impl ParseRun<'_> {
    fn run(&mut self) -> Result<Subtree, ParseError> {
        while !self.versions.is_empty() {
            let round = std::mem::take(&mut self.versions);
            self.single_version = round.len() == 1;
            for mut version in round {
                self.check_cancelled()?;
                match self.step(&mut version) {
                    Step::Continue => self.versions.push(version),
                    Step::Halted => self.halt(version),
                    Step::Accepted => {}
                }
            }
            self.merge();
            self.prune();
        }

        match self.accepted.take() {
            Some(accepted) => Ok(accepted.root),
            None => Ok(self.collapse_into_error_root()),
        }
    }

    fn step(&mut self, version: &mut StackVersion) -> Step {
        if version.actions_at_position > MAX_ACTIONS_PER_POSITION {
            tracing::debug!("halting version {}: no progress", version.created);
            return Step::Halted;
        }
        let state = version.top_state();

        // Incremental reuse: only while a single unambiguous version runs.
        if self.single_version
            && let Some(reuse) = &mut self.reuse
            && let Some((subtree, target)) = reuse.candidate(self.grammar, version.position, state)
        {
            tracing::debug!(
                "reusing {} spanning {:?} at {:?}",
                self.grammar.symbol_name(subtree.symbol()),
                subtree.byte_len(),
                version.position,
            );
            let range = TextRange::at(version.position, subtree.byte_len());
            version.shift(target, subtree);
            advance_point(&mut self.src, &mut version.point, range);
            return Step::Continue;
        }

        let token = self.lookahead(version.position, version.point, state);
        let symbol = token.map_or(Symbol::END, |token| token.symbol);

        let actions = self.grammar.actions(state, symbol);
        if !actions.is_empty() {
            // Conflicting actions fork; the first continues this version.
            for &action in &actions[1..] {
                let mut fork = version.fork(self.next_serial());
                tracing::trace!(
                    "forking version {} from {} on {}",
                    fork.created,
                    version.created,
                    self.grammar.symbol_name(symbol),
                );
                match self.apply(&mut fork, action, token) {
                    Step::Continue => self.versions.push(fork),
                    Step::Halted => self.halt(fork),
                    Step::Accepted => {}
                }
            }
            let first = actions[0];
            return self.apply(version, first, token);
        }

        if let Some(token) = token
            && self.grammar.is_extra(token.symbol)
        {
            let leaf = self.token_leaf(token, SubtreeFlags::EXTRA);
            advance_point(&mut self.src, &mut version.point, token.range);
            version.shift_extra(leaf);
            return Step::Continue;
        }

        self.recover(version, token)
    }

    fn apply(&mut self, version: &mut StackVersion, action: ParseAction, token: Option<Token>) -> Step {
        match action {
            ParseAction::Shift { state } => {
                let Some(token) = token else {
                    return Step::Halted;
                };
                let leaf = self.token_leaf(token, SubtreeFlags::default());
                advance_point(&mut self.src, &mut version.point, token.range);
                version.shift(state, leaf);
                Step::Continue
            }
            ParseAction::Reduce { symbol, child_count } => {
                if version.reduce(self.grammar, symbol, child_count) {
                    Step::Continue
                } else {
                    tracing::debug!(
                        "halting version {}: no goto for {}",
                        version.created,
                        self.grammar.symbol_name(symbol),
                    );
                    Step::Halted
                }
            }
            ParseAction::Accept => {
                let root = self.assemble_root(version.take_subtrees());
                let candidate =
                    Accepted { root, cost: version.error_cost, created: version.created };
                let better = match &self.accepted {
                    Some(existing) => {
                        (candidate.cost, candidate.created) < (existing.cost, existing.created)
                    }
                    None => true,
                };
                if better {
                    tracing::debug!(
                        "accepting version {} with cost {}",
                        candidate.created,
                        candidate.cost,
                    );
                    self.accepted = Some(candidate);
                }
                Step::Accepted
            }
        }
    }

    /// Error recovery: fork one version per insertable missing token, then
    /// let this version skip the offending lookahead. At end of input the
    /// version halts instead (its forks carry on).
    fn recover(&mut self, version: &mut StackVersion, token: Option<Token>) -> Step {
        let state = version.top_state();
        tracing::debug!(
            "recovering at {:?} in {state}, lookahead {}",
            version.position,
            token.map_or("end", |token| self.grammar.symbol_name(token.symbol)),
        );

        if version.consecutive_missing < MAX_CONSECUTIVE_MISSING {
            // Terminal order is ascending by symbol id, so recovery forks
            // are created deterministically.
            let insertable: Vec<Symbol> = self
                .grammar
                .valid_terminals(state)
                .iter()
                .filter(|&symbol| self.grammar.state(state).shift_target(symbol).is_some())
                .collect();
            for symbol in insertable {
                let mut fork = version.fork(self.next_serial());
                if fork.push_missing(self.grammar, symbol) {
                    tracing::trace!(
                        "version {} inserts missing {}",
                        fork.created,
                        self.grammar.symbol_name(symbol),
                    );
                    self.versions.push(fork);
                }
            }
        }

        match token {
            Some(token) => {
                let leaf = self.token_leaf(token, SubtreeFlags::default());
                advance_point(&mut self.src, &mut version.point, token.range);
                version.skip_token(self.grammar, leaf);
                Step::Continue
            }
            None => Step::Halted,
        }
    }

    /// Lexes (or recalls) the lookahead at `position` under `state`'s valid
    /// terminal set. `None` is end of input.
    fn lookahead(&mut self, position: TextSize, point: Point, state: StateId) -> Option<Token> {
        let key = (position, state);
        if let Some(&cached) = self.token_cache.get(&key) {
            return cached;
        }
        let valid = self.grammar.valid_terminals(state);
        let mut lexer = Lexer::new(&mut self.src, self.grammar);
        let token = lexer.next_token(position, point, valid);
        self.token_cache.insert(key, token);
        token
    }

    fn token_leaf(&self, token: Token, mut flags: SubtreeFlags) -> Subtree {
        if token.is_keyword {
            flags = flags | SubtreeFlags::KEYWORD;
        }
        if token.is_external {
            flags = flags | SubtreeFlags::EXTERNAL;
        }
        if token.is_error {
            flags = flags | SubtreeFlags::ERROR;
        }
        Subtree::leaf(self.grammar, token.symbol, token.len(), flags)
    }

    fn next_serial(&mut self) -> u32 {
        let serial = self.serial;
        self.serial += 1;
        serial
    }

    fn halt(&mut self, version: StackVersion) {
        let keep = match &self.best_halted {
            Some(best) => {
                version.position > best.position
                    || (version.position == best.position && version.outranks(best))
            }
            None => true,
        };
        if keep {
            self.best_halted = Some(version);
        }
    }

    /// Collapses versions that converged on the same state and position,
    /// keeping the cheaper (then earlier) one.
    fn merge(&mut self) {
        if self.versions.len() < 2 {
            return;
        }
        let round = std::mem::take(&mut self.versions);
        'next: for version in round {
            for existing in &mut self.versions {
                if existing.top_state() == version.top_state()
                    && existing.position == version.position
                {
                    if version.outranks(existing) {
                        tracing::trace!(
                            "merge: version {} supersedes {}",
                            version.created,
                            existing.created,
                        );
                        *existing = version;
                    } else {
                        tracing::trace!("merge: version {} dropped", version.created);
                    }
                    continue 'next;
                }
            }
            self.versions.push(version);
        }
    }

    /// Drops versions that cost too much or exceed the live-version cap,
    /// and everything that can no longer beat an accepted parse.
    fn prune(&mut self) {
        if let Some(accepted) = &self.accepted {
            let (cost, created) = (accepted.cost, accepted.created);
            self.versions.retain(|version| {
                version.error_cost < cost
                    || (version.error_cost == cost && version.created < created)
            });
        }
        if self.versions.is_empty() {
            return;
        }
        let best = self.versions.iter().map(|version| version.error_cost).min().unwrap_or(0);
        self.versions.retain(|version| version.error_cost <= best + MAX_COST_DIFFERENCE);
        if self.versions.len() > MAX_VERSIONS {
            self.versions.sort_by_key(|version| (version.error_cost, version.created));
            self.versions.truncate(MAX_VERSIONS);
        }
    }

    /// The accepted stack usually holds exactly the root production;
    /// leading or trailing extras are spliced into it.
    fn assemble_root(&self, mut subtrees: Vec<Subtree>) -> Subtree {
        if subtrees.len() == 1 {
            return subtrees.remove(0);
        }
        let root_symbol = self.grammar.root_symbol();
        let only_extras_besides_root = subtrees
            .iter()
            .filter(|subtree| !subtree.is_extra())
            .all(|subtree| subtree.symbol() == root_symbol);
        let root_count = subtrees.iter().filter(|subtree| !subtree.is_extra()).count();

        if only_extras_besides_root && root_count == 1 {
            let mut children = Vec::with_capacity(subtrees.len());
            for subtree in subtrees {
                if subtree.is_extra() {
                    children.push(subtree);
                } else {
                    children.extend(subtree.children().iter().cloned());
                }
            }
            return Subtree::node(self.grammar, root_symbol, children);
        }
        Subtree::node(self.grammar, root_symbol, subtrees)
    }

    /// No version accepted: wrap whatever the furthest version had parsed,
    /// plus any unconsumed trailing input, in an ERROR root. A tree is
    /// produced for every input.
    fn collapse_into_error_root(&mut self) -> Subtree {
        let mut version = self.best_halted.take().unwrap_or_else(|| StackVersion::new(0));
        let mut children = version.take_subtrees();
        let remaining = self.remaining_len(version.position);
        if remaining > TextSize::new(0) {
            children.push(Subtree::leaf(
                self.grammar,
                Symbol::ERROR,
                remaining,
                SubtreeFlags::ERROR,
            ));
        }
        Subtree::error_node(self.grammar, children)
    }

    fn remaining_len(&mut self, position: TextSize) -> TextSize {
        let mut offset = usize::from(position);
        while let Some((_, len)) = self.src.char_at(offset) {
            offset += len;
        }
        TextSize::new(offset as u32) - position
    }

    fn check_cancelled(&mut self) -> Result<(), ParseError> {
        let due = self.ticks % CANCELLATION_CHECK_INTERVAL == 0;
        self.ticks = self.ticks.wrapping_add(1);
        if !due {
            return Ok(());
        }
        if let Some(deadline) = self.deadline
            && Instant::now() > deadline
        {
            return Err(ParseError::Cancelled);
        }
        if let Some(flag) = self.cancellation_flag
            && flag.load(Ordering::Relaxed)
        {
            return Err(ParseError::Cancelled);
        }
        Ok(())
    }
}

/// Advances a row/column point over a consumed byte range.
fn advance_point(src: &mut SourceBuffer<'_>, point: &mut Point, range: TextRange) {
    let mut offset = usize::from(range.start());
    let end = usize::from(range.end());
    while offset < end {
        match src.char_at(offset) {
            Some((ch, len)) => {
                point.advance(ch);
                offset += len;
            }
            None => break,
        }
    }
}
