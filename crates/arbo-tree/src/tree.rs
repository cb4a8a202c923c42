use arbo_grammar::Grammar;
use arbo_text::{Edit, TextRange, TextSize};
use triomphe::Arc;

use crate::changed_ranges::changed_ranges;
use crate::cursor::TreeCursor;
use crate::node::Node;
use crate::subtree::Subtree;

/// An immutable snapshot of a parse: the root subtree plus the grammar it
/// was parsed with.
///
/// Cloning a tree is cheap, and distinct trees produced by incremental
/// parses share unchanged subtrees. Trees are `Send + Sync`; readers on
/// other threads see a consistent snapshot.
#[derive(Debug, Clone)]
pub struct Tree {
    root: Subtree,
    grammar: Arc<Grammar>,
}

impl Tree {
    pub fn new(grammar: Arc<Grammar>, root: Subtree) -> Self {
        Self { root, grammar }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn text_len(&self) -> TextSize {
        self.root.byte_len()
    }

    pub fn root(&self) -> Node<'_> {
        Node::new(self, &self.root, TextSize::new(0), None)
    }

    /// The raw root, for seeding an incremental parse.
    pub fn root_subtree(&self) -> &Subtree {
        &self.root
    }

    /// Records a source edit, adjusting spans so a later incremental parse
    /// knows which regions to re-examine. Call once per edit, in the order
    /// the edits were applied to the text.
    pub fn edit(&mut self, edit: &Edit) {
        self.root = self.root.edit(edit);
    }

    pub fn walk(&self) -> TreeCursor<'_> {
        TreeCursor::new(self)
    }

    /// Ranges of `new` (in its own coordinates) whose structure differs
    /// from this tree. Subtrees shared between the two snapshots are
    /// skipped in O(1) by pointer identity.
    pub fn changed_ranges(&self, new: &Tree) -> Vec<TextRange> {
        changed_ranges(&self.root, &new.root)
    }
}
