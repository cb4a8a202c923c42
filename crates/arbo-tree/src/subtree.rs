//! The immutable, reference-counted tree node everything else rests on.
//!
//! Subtrees store byte lengths, not positions: a node's offset is implicit
//! in the sum of its left siblings. That makes the structure persistent:
//! an edit rewrites only the spine overlapping the edited range and shares
//! every other node with the previous tree by bumping a refcount.

use arbo_grammar::{Grammar, Symbol};
use arbo_text::{Edit, TextSize};
use triomphe::Arc;

/// Error-cost penalty for a synthesized missing token.
pub const COST_PER_MISSING_TREE: u32 = 110;
/// Error-cost penalty for a skipped (unparsable) token, plus one per byte.
pub const COST_PER_SKIPPED_TREE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubtreeFlags(u8);

impl SubtreeFlags {
    pub const ERROR: Self = Self(1 << 0);
    pub const MISSING: Self = Self(1 << 1);
    pub const EXTRA: Self = Self(1 << 2);
    pub const HAS_CHANGES: Self = Self(1 << 3);
    pub const KEYWORD: Self = Self(1 << 4);
    pub const EXTERNAL: Self = Self(1 << 5);
    const VISIBLE: Self = Self(1 << 6);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for SubtreeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[derive(Debug)]
pub(crate) struct SubtreeData {
    pub(crate) symbol: Symbol,
    pub(crate) flags: SubtreeFlags,
    pub(crate) byte_len: TextSize,
    pub(crate) error_cost: u32,
    pub(crate) node_count: u32,
    /// Number of visible child slots after flattening hidden children.
    pub(crate) visible_children: u32,
    pub(crate) children: Vec<Subtree>,
}

impl Drop for SubtreeData {
    fn drop(&mut self) {
        // Deep uniform trees must free without recursing: drain the
        // children into an explicit worklist instead.
        if self.children.is_empty() {
            return;
        }
        let mut worklist = std::mem::take(&mut self.children);
        while let Some(Subtree { data }) = worklist.pop() {
            if let Ok(mut data) = Arc::try_unwrap(data) {
                worklist.append(&mut data.children);
            }
        }
    }
}

/// An immutable parse tree node: a leaf token or a production.
///
/// Cloning is a refcount bump; the count is atomic, so subtrees may be
/// shared across threads by the trees that own them.
#[derive(Debug, Clone)]
pub struct Subtree {
    pub(crate) data: Arc<SubtreeData>,
}

impl Subtree {
    /// A leaf built from a lexed token.
    pub fn leaf(grammar: &Grammar, symbol: Symbol, len: TextSize, flags: SubtreeFlags) -> Self {
        let flags = if grammar.is_visible(symbol) { flags | SubtreeFlags::VISIBLE } else { flags };
        Self {
            data: Arc::new(SubtreeData {
                symbol,
                flags,
                byte_len: len,
                error_cost: 0,
                node_count: 1,
                visible_children: 0,
                children: Vec::new(),
            }),
        }
    }

    /// A zero-width synthesized token standing in for required input that
    /// was not present.
    pub fn missing(symbol: Symbol) -> Self {
        Self {
            data: Arc::new(SubtreeData {
                symbol,
                // Missing nodes are always surfaced, hidden or not.
                flags: SubtreeFlags::MISSING | SubtreeFlags::VISIBLE,
                byte_len: TextSize::new(0),
                error_cost: COST_PER_MISSING_TREE,
                node_count: 1,
                visible_children: 0,
                children: Vec::new(),
            }),
        }
    }

    /// An internal node combining `children` under `symbol`.
    ///
    /// Aggregates (span, cost, counts) are computed in time proportional to
    /// the child count.
    pub fn node(grammar: &Grammar, symbol: Symbol, children: Vec<Subtree>) -> Self {
        let mut byte_len = TextSize::new(0);
        let mut error_cost = 0u32;
        let mut node_count = 1u32;
        let mut visible_children = 0u32;
        for child in &children {
            byte_len += child.byte_len();
            error_cost += child.error_cost();
            node_count += child.node_count();
            visible_children += if child.is_visible() { 1 } else { child.visible_child_count() };
        }
        let mut flags = SubtreeFlags::default();
        if grammar.is_visible(symbol) {
            flags = flags | SubtreeFlags::VISIBLE;
        }
        if symbol == Symbol::ERROR {
            flags = flags | SubtreeFlags::ERROR | SubtreeFlags::VISIBLE;
            error_cost += COST_PER_SKIPPED_TREE + u32::from(byte_len);
        }
        Self {
            data: Arc::new(SubtreeData {
                symbol,
                flags,
                byte_len,
                error_cost,
                node_count,
                visible_children,
                children,
            }),
        }
    }

    /// Wraps unparsable input in a visible ERROR node.
    pub fn error_node(grammar: &Grammar, children: Vec<Subtree>) -> Self {
        Self::node(grammar, Symbol::ERROR, children)
    }

    /// A copy of this subtree with extra flag variants added (used when a
    /// token is shifted as an extra or skipped during recovery).
    pub fn with_flags(&self, flags: SubtreeFlags) -> Self {
        let data = &self.data;
        Self {
            data: Arc::new(SubtreeData {
                symbol: data.symbol,
                flags: data.flags | flags,
                byte_len: data.byte_len,
                error_cost: data.error_cost,
                node_count: data.node_count,
                visible_children: data.visible_children,
                children: data.children.clone(),
            }),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.data.symbol
    }

    pub fn byte_len(&self) -> TextSize {
        self.data.byte_len
    }

    pub fn error_cost(&self) -> u32 {
        self.data.error_cost
    }

    pub fn node_count(&self) -> u32 {
        self.data.node_count
    }

    pub fn children(&self) -> &[Subtree] {
        &self.data.children
    }

    pub fn is_leaf(&self) -> bool {
        self.data.children.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.data.flags.contains(SubtreeFlags::VISIBLE)
    }

    /// Visible slots beneath this node after flattening hidden children.
    pub fn visible_child_count(&self) -> u32 {
        self.data.visible_children
    }

    pub fn is_error(&self) -> bool {
        self.data.flags.contains(SubtreeFlags::ERROR)
    }

    pub fn is_missing(&self) -> bool {
        self.data.flags.contains(SubtreeFlags::MISSING)
    }

    pub fn is_extra(&self) -> bool {
        self.data.flags.contains(SubtreeFlags::EXTRA)
    }

    pub fn has_changes(&self) -> bool {
        self.data.flags.contains(SubtreeFlags::HAS_CHANGES)
    }

    /// Whether an incremental parse may push this subtree wholesale: clean
    /// of edits and of any error-recovery synthesis.
    pub fn is_reusable(&self) -> bool {
        !self.has_changes() && self.error_cost() == 0 && !self.is_missing()
    }

    /// Shared-ownership identity; the basis of changed-range skipping.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Applies an edit, rewriting only the spine that overlaps it.
    ///
    /// Children entirely before or after the edited range are shared with
    /// the previous tree; offsets after the edit shift implicitly because
    /// positions are sums of lengths. Rewritten nodes are flagged
    /// `HAS_CHANGES`, which is what forces re-lexing during the next parse.
    pub fn edit(&self, edit: &Edit) -> Self {
        let mut insertion_pending = true;
        self.edit_at(TextSize::new(0), edit, &mut insertion_pending)
    }

    fn edit_at(&self, start: TextSize, edit: &Edit, insertion_pending: &mut bool) -> Self {
        let end = start + self.byte_len();
        debug_assert!(start <= edit.old_end && edit.start <= end, "edit_at on unaffected node");

        let data = &self.data;
        if data.children.is_empty() {
            let clamp = |offset: TextSize| offset.clamp(start, end);
            let removed = clamp(edit.old_end) - clamp(edit.start);
            let mut new_len = self.byte_len() - removed;
            // The replacement text lands in the first childless node whose
            // span touches the edit start.
            if *insertion_pending && edit.start >= start && edit.start <= end {
                new_len += edit.inserted_len();
                *insertion_pending = false;
            }
            return Self {
                data: Arc::new(SubtreeData {
                    symbol: data.symbol,
                    flags: data.flags | SubtreeFlags::HAS_CHANGES,
                    byte_len: new_len,
                    error_cost: data.error_cost,
                    node_count: data.node_count,
                    visible_children: data.visible_children,
                    children: Vec::new(),
                }),
            };
        }

        let mut new_children = Vec::with_capacity(data.children.len());
        let mut new_len = TextSize::new(0);
        let mut child_start = start;
        for child in &data.children {
            let child_end = child_start + child.byte_len();
            let affected = child_start <= edit.old_end && edit.start <= child_end;
            let new_child = if affected {
                child.edit_at(child_start, edit, insertion_pending)
            } else {
                child.clone()
            };
            new_len += new_child.byte_len();
            new_children.push(new_child);
            child_start = child_end;
        }

        Self {
            data: Arc::new(SubtreeData {
                symbol: data.symbol,
                flags: data.flags | SubtreeFlags::HAS_CHANGES,
                byte_len: new_len,
                error_cost: data.error_cost,
                node_count: data.node_count,
                visible_children: data.visible_children,
                children: new_children,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{GrammarBuilder, LexPattern};

    use super::*;

    fn grammar() -> (Grammar, Symbol, Symbol, Symbol, Symbol) {
        let mut b = GrammarBuilder::new("subtree-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);
        b.state();
        (b.build().unwrap(), number, plus, sum, rep)
    }

    fn leaf(grammar: &Grammar, symbol: Symbol, len: u32) -> Subtree {
        Subtree::leaf(grammar, symbol, TextSize::new(len), SubtreeFlags::default())
    }

    #[test]
    fn aggregates_are_computed_from_children() {
        let (g, number, plus, sum, rep) = grammar();
        let inner = Subtree::node(&g, rep, vec![leaf(&g, plus, 1), leaf(&g, number, 1)]);
        let root = Subtree::node(&g, sum, vec![leaf(&g, number, 1), inner.clone()]);

        assert_eq!(root.byte_len(), TextSize::new(3));
        assert_eq!(root.node_count(), 5);
        assert_eq!(root.error_cost(), 0);
        assert!(root.is_visible());
        assert!(!inner.is_visible());
        // number, then the flattened "+" and number.
        assert_eq!(root.visible_child_count(), 3);
    }

    #[test]
    fn missing_nodes_carry_cost() {
        let (_, number, ..) = grammar();
        let missing = Subtree::missing(number);
        assert_eq!(missing.byte_len(), TextSize::new(0));
        assert_eq!(missing.error_cost(), COST_PER_MISSING_TREE);
        assert!(missing.is_missing());
        assert!(!missing.is_reusable());
    }

    #[test]
    fn edit_rewrites_only_the_overlapping_spine() {
        let (g, number, plus, sum, rep) = grammar();
        let tail = Subtree::node(&g, rep, vec![leaf(&g, plus, 1), leaf(&g, number, 1)]);
        let root = Subtree::node(&g, sum, vec![leaf(&g, number, 1), tail.clone()]);

        // Prepend one byte: "1+2" -> "91+2".
        let edited = root.edit(&Edit::insert(0, 1));
        assert_eq!(edited.byte_len(), TextSize::new(4));
        assert!(edited.has_changes());

        let first = &edited.children()[0];
        assert_eq!(first.byte_len(), TextSize::new(2));
        assert!(first.has_changes());
        assert!(!first.is_reusable());

        // The tail is shared untouched with the old tree.
        assert!(edited.children()[1].ptr_eq(&tail));
        assert!(edited.children()[1].is_reusable());
    }

    #[test]
    fn edit_deletion_spanning_children() {
        let (g, number, plus, sum, rep) = grammar();
        let tail = Subtree::node(&g, rep, vec![leaf(&g, plus, 1), leaf(&g, number, 1)]);
        let root = Subtree::node(&g, sum, vec![leaf(&g, number, 1), tail]);

        // Delete "+2" from "1+2".
        let edited = root.edit(&Edit::delete(1, 3));
        assert_eq!(edited.byte_len(), TextSize::new(1));
        assert_eq!(edited.children()[1].byte_len(), TextSize::new(0));
    }

    #[test]
    fn deep_trees_drop_without_recursion() {
        let (g, number, _, sum, _) = grammar();
        let mut tree = leaf(&g, number, 1);
        for _ in 0..200_000 {
            tree = Subtree::node(&g, sum, vec![tree]);
        }
        drop(tree);
    }
}
