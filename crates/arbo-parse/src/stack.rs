//! The multi-version parse stack.
//!
//! A version is a flat vector of (state, subtree) entries. Conflicting
//! actions fork a version (subtree clones are refcount bumps), error
//! recovery synthesizes missing tokens or skips unparsable ones, and the
//! parser merges versions that converge on the same state and position,
//! keeping the cheaper one.

use arbo_grammar::{Grammar, StateId, Symbol};
use arbo_text::{Point, TextSize};
use arbo_tree::{Subtree, SubtreeFlags};

/// Live version cap; the cheapest versions survive a prune.
pub(crate) const MAX_VERSIONS: usize = 8;
/// Versions costing more than the best plus this margin are dropped.
pub(crate) const MAX_COST_DIFFERENCE: u32 = 500;
/// Cap on back-to-back missing-token insertions in one version.
pub(crate) const MAX_CONSECUTIVE_MISSING: u32 = 3;
/// Cap on non-consuming actions at one position before a version halts.
/// Guards against reduction cycles in malformed tables.
pub(crate) const MAX_ACTIONS_PER_POSITION: u32 = 256;

#[derive(Debug, Clone)]
pub(crate) struct StackEntry {
    pub(crate) state: StateId,
    /// `None` only for the bottom-of-stack entry.
    pub(crate) subtree: Option<Subtree>,
}

#[derive(Debug, Clone)]
pub(crate) struct StackVersion {
    pub(crate) entries: Vec<StackEntry>,
    pub(crate) position: TextSize,
    pub(crate) point: Point,
    pub(crate) error_cost: u32,
    /// Creation order; the merge and accept tie-breaker.
    pub(crate) created: u32,
    pub(crate) consecutive_missing: u32,
    pub(crate) actions_at_position: u32,
}

impl StackVersion {
    pub(crate) fn new(created: u32) -> Self {
        Self {
            entries: vec![StackEntry { state: StateId::START, subtree: None }],
            position: TextSize::new(0),
            point: Point::ZERO,
            error_cost: 0,
            created,
            consecutive_missing: 0,
            actions_at_position: 0,
        }
    }

    pub(crate) fn fork(&self, created: u32) -> Self {
        let mut fork = self.clone();
        fork.created = created;
        fork
    }

    pub(crate) fn top_state(&self) -> StateId {
        self.entries.last().expect("stack always has a bottom entry").state
    }

    fn advance(&mut self, len: TextSize) {
        self.position += len;
        if len > TextSize::new(0) {
            self.actions_at_position = 0;
        }
    }

    /// Pushes a consumed token or a reused subtree and enters `state`.
    pub(crate) fn shift(&mut self, state: StateId, subtree: Subtree) {
        self.advance(subtree.byte_len());
        self.consecutive_missing = 0;
        self.entries.push(StackEntry { state, subtree: Some(subtree) });
    }

    /// Pushes an extra (e.g. whitespace, comment) without changing state.
    pub(crate) fn shift_extra(&mut self, subtree: Subtree) {
        let state = self.top_state();
        self.advance(subtree.byte_len());
        self.entries.push(StackEntry { state, subtree: Some(subtree) });
    }

    /// Pops until `child_count` non-extra subtrees are collected (extras in
    /// between come along), pushes the combined node, and follows the goto
    /// entry. `false` halts the version: the table has no continuation.
    pub(crate) fn reduce(&mut self, grammar: &Grammar, symbol: Symbol, child_count: u16) -> bool {
        let mut children = Vec::new();
        let mut remaining = child_count;
        while remaining > 0 {
            let Some(entry) = self.entries.pop() else { return false };
            let Some(subtree) = entry.subtree else { return false };
            if !subtree.is_extra() {
                remaining -= 1;
            }
            children.push(subtree);
        }
        children.reverse();

        let node = Subtree::node(grammar, symbol, children);
        let Some(target) = grammar.state(self.top_state()).shift_target(symbol) else {
            return false;
        };
        self.actions_at_position += 1;
        self.entries.push(StackEntry { state: target, subtree: Some(node) });
        true
    }

    /// Synthesizes a zero-width missing token for `symbol` and shifts it.
    /// `false` when the state cannot shift `symbol` or the synthesis cap is
    /// reached.
    pub(crate) fn push_missing(&mut self, grammar: &Grammar, symbol: Symbol) -> bool {
        if self.consecutive_missing >= MAX_CONSECUTIVE_MISSING {
            return false;
        }
        let Some(target) = grammar.state(self.top_state()).shift_target(symbol) else {
            return false;
        };
        let missing = Subtree::missing(symbol);
        self.error_cost += missing.error_cost();
        self.consecutive_missing += 1;
        self.actions_at_position += 1;
        self.entries.push(StackEntry { state: target, subtree: Some(missing) });
        true
    }

    /// Wraps an unparsable token in an extra ERROR node and consumes it
    /// without changing state.
    pub(crate) fn skip_token(&mut self, grammar: &Grammar, token: Subtree) {
        let wrapped = Subtree::error_node(grammar, vec![token]).with_flags(SubtreeFlags::EXTRA);
        self.error_cost += wrapped.error_cost();
        self.consecutive_missing = 0;
        self.shift_extra(wrapped);
    }

    /// Drains the stack into its subtrees, bottom first.
    pub(crate) fn take_subtrees(&mut self) -> Vec<Subtree> {
        std::mem::take(&mut self.entries).into_iter().filter_map(|entry| entry.subtree).collect()
    }

    /// Merge precedence: cheaper wins, ties go to the earlier version.
    pub(crate) fn outranks(&self, other: &Self) -> bool {
        (self.error_cost, self.created) < (other.error_cost, other.created)
    }
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{GrammarBuilder, LexPattern};

    use super::*;

    /// sum := number ("+" number)*, with explicit LR states.
    fn sum_grammar() -> (Grammar, [Symbol; 4]) {
        let mut b = GrammarBuilder::new("sum");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);

        let s0 = b.state();
        let s1 = b.state();
        let s2 = b.state();
        let s3 = b.state();
        let s4 = b.state();
        let s5 = b.state();
        b.shift(s0, number, s1);
        b.reduce(s1, plus, rep, 0);
        b.reduce(s1, Symbol::END, rep, 0);
        b.shift(s1, rep, s2);
        b.shift(s2, plus, s3);
        b.reduce(s2, Symbol::END, sum, 2);
        b.shift(s3, number, s4);
        b.reduce(s4, plus, rep, 3);
        b.reduce(s4, Symbol::END, rep, 3);
        b.shift(s0, sum, s5);
        b.accept(s5, Symbol::END);

        (b.build().unwrap(), [number, plus, sum, rep])
    }

    fn leaf(grammar: &Grammar, symbol: Symbol, len: u32) -> Subtree {
        Subtree::leaf(grammar, symbol, TextSize::new(len), SubtreeFlags::default())
    }

    fn shift_token(version: &mut StackVersion, grammar: &Grammar, symbol: Symbol, len: u32) {
        let target = grammar.state(version.top_state()).shift_target(symbol).unwrap();
        version.shift(target, leaf(grammar, symbol, len));
    }

    #[test]
    fn shift_and_reduce_follow_the_tables() {
        let (grammar, [number, plus, _, rep]) = sum_grammar();
        let mut version = StackVersion::new(0);

        // Drive "1+2" by hand: shift number, reduce the empty repeat, then
        // reduce the grown repeat over three entries.
        shift_token(&mut version, &grammar, number, 1);
        let s1 = version.top_state();
        assert!(version.reduce(&grammar, rep, 0));
        let s2 = version.top_state();
        assert_ne!(s1, s2);

        shift_token(&mut version, &grammar, plus, 1);
        shift_token(&mut version, &grammar, number, 1);
        assert!(version.reduce(&grammar, rep, 3));
        assert_eq!(version.position, TextSize::new(3));
    }

    #[test]
    fn reduce_without_goto_halts() {
        let (grammar, [number, _, _, rep]) = sum_grammar();
        let mut version = StackVersion::new(0);
        shift_token(&mut version, &grammar, number, 1);
        // There is no goto for the repeat from the start state.
        assert!(!version.reduce(&grammar, rep, 1));
    }

    #[test]
    fn missing_tokens_cost_and_cap() {
        let (grammar, [number, ..]) = sum_grammar();
        let mut version = StackVersion::new(0);
        assert!(version.push_missing(&grammar, number));
        assert_eq!(version.error_cost, arbo_tree::COST_PER_MISSING_TREE);
        assert_eq!(version.position, TextSize::new(0));

        let mut capped = 1;
        while version.push_missing(&grammar, number) {
            capped += 1;
        }
        assert!(capped <= MAX_CONSECUTIVE_MISSING);
    }

    #[test]
    fn skipped_tokens_keep_the_state() {
        let (grammar, [number, ..]) = sum_grammar();
        let mut version = StackVersion::new(0);
        shift_token(&mut version, &grammar, number, 1);
        let state = version.top_state();
        version.skip_token(&grammar, leaf(&grammar, Symbol::ERROR, 1));
        assert_eq!(version.top_state(), state);
        assert_eq!(version.position, TextSize::new(2));
        assert!(version.error_cost > 0);
    }

    #[test]
    fn fork_and_outrank_order() {
        let base = StackVersion::new(0);
        let mut fork = base.fork(1);
        // Equal cost: the earlier version wins; higher cost always loses.
        assert!(base.outranks(&fork));
        fork.error_cost = 10;
        assert!(base.outranks(&fork));
        assert!(!fork.outranks(&base));
    }
}
