//! Subtree reuse for incremental parsing.
//!
//! The edited old tree is walked left to right alongside the new parse.
//! Whenever the single live version sits exactly at the start of an old
//! subtree that carries no edits and no errors, and the current state has
//! a shift or goto entry for its symbol, the whole subtree is pushed onto
//! the stack by a refcount bump and its bytes are never re-lexed. Rejected
//! candidates break apart into their children; leaves fall back to fresh
//! lexing.

use arbo_grammar::{Grammar, StateId};
use arbo_text::TextSize;
use arbo_tree::Subtree;

pub(crate) struct ReuseCursor {
    /// Pending (subtree, start offset) pairs, rightmost deepest last, so
    /// the top of the stack is always the leftmost unconsumed region.
    stack: Vec<(Subtree, TextSize)>,
}

impl ReuseCursor {
    pub(crate) fn new(root: Subtree) -> Self {
        Self { stack: vec![(root, TextSize::new(0))] }
    }

    /// The deepest reusable subtree starting exactly at `position` that
    /// `state` can consume, together with the state it shifts into.
    pub(crate) fn candidate(
        &mut self,
        grammar: &Grammar,
        position: TextSize,
        state: StateId,
    ) -> Option<(Subtree, StateId)> {
        loop {
            let (top, start) = self.stack.last()?.clone();
            let end = start + top.byte_len();

            // Entirely behind the parse position: consumed some other way.
            if end < position || (end == position && top.byte_len() > TextSize::new(0)) {
                self.stack.pop();
                continue;
            }
            // Straddles the position: only its right part is still ahead.
            if start < position {
                self.stack.pop();
                self.push_children(&top, start);
                continue;
            }
            // Not reached yet.
            if start > position {
                return None;
            }

            if top.is_reusable()
                && let Some(target) = grammar.state(state).shift_target(top.symbol())
            {
                self.stack.pop();
                return Some((top, target));
            }
            if top.is_leaf() {
                // A leaf the table will not take wholesale: re-lex it.
                return None;
            }
            self.stack.pop();
            self.push_children(&top, start);
        }
    }

    fn push_children(&mut self, parent: &Subtree, parent_start: TextSize) {
        let mut offsets = Vec::with_capacity(parent.children().len());
        let mut offset = parent_start;
        for child in parent.children() {
            offsets.push(offset);
            offset += child.byte_len();
        }
        for (child, offset) in parent.children().iter().zip(offsets).rev() {
            self.stack.push((child.clone(), offset));
        }
    }
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{GrammarBuilder, LexPattern, Symbol};
    use arbo_tree::SubtreeFlags;

    use super::*;

    fn grammar() -> (Grammar, [Symbol; 4]) {
        let mut b = GrammarBuilder::new("reuse-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);
        let s0 = b.state();
        let s1 = b.state();
        let s2 = b.state();
        b.shift(s0, number, s1);
        b.shift(s1, rep, s2);
        (b.build().unwrap(), [number, plus, sum, rep])
    }

    fn leaf(g: &Grammar, symbol: Symbol, len: u32) -> Subtree {
        Subtree::leaf(g, symbol, TextSize::new(len), SubtreeFlags::default())
    }

    #[test]
    fn clean_subtree_at_position_is_offered() {
        let (g, [number, plus, _, rep]) = grammar();
        let tail = Subtree::node(&g, rep, vec![leaf(&g, plus, 1), leaf(&g, number, 1)]);
        let root = Subtree::node(&g, Symbol::ERROR, vec![leaf(&g, number, 1), tail.clone()]);
        // The root has error cost, so only descendants can be reused.
        let mut cursor = ReuseCursor::new(root);

        // At offset 0 in a state that shifts `number`, the first leaf wins.
        let (sub, target) = cursor.candidate(&g, TextSize::new(0), StateId::START).unwrap();
        assert_eq!(sub.symbol(), number);
        assert_eq!(u32::from(sub.byte_len()), 1);

        // At offset 1 the repeat node is offered wholesale via its goto.
        let (sub, _) = cursor.candidate(&g, TextSize::new(1), target).unwrap();
        assert!(sub.ptr_eq(&tail));
    }

    #[test]
    fn edited_subtrees_break_apart() {
        let (g, [number, plus, _, rep]) = grammar();
        let tail = Subtree::node(&g, rep, vec![leaf(&g, plus, 1), leaf(&g, number, 1)]);
        let root = Subtree::node(&g, rep, vec![leaf(&g, number, 1), tail]);
        let edited = root.edit(&arbo_text::Edit::insert(0, 1));

        let mut cursor = ReuseCursor::new(edited);
        // The first leaf absorbed the edit; nothing reusable at offset 0.
        assert!(cursor.candidate(&g, TextSize::new(0), StateId::START).is_none());
    }

    #[test]
    fn consumed_regions_are_skipped() {
        let (g, [number, ..]) = grammar();
        let root = Subtree::node(
            &g,
            Symbol::ERROR,
            vec![leaf(&g, number, 1), leaf(&g, number, 1), leaf(&g, number, 1)],
        );
        let mut cursor = ReuseCursor::new(root);
        // Jump straight to offset 2: earlier leaves are discarded.
        let (sub, _) = cursor.candidate(&g, TextSize::new(2), StateId::START).unwrap();
        assert_eq!(sub.symbol(), number);
    }
}
