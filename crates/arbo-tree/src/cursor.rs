use std::fmt;

use arbo_grammar::{FieldId, Grammar};
use arbo_text::TextSize;

use crate::node::Node;
use crate::subtree::Subtree;
use crate::tree::Tree;

/// The requested movement has nowhere to go; the cursor stays put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMove;

impl fmt::Display for NoMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cursor cannot move in that direction")
    }
}

impl std::error::Error for NoMove {}

/// A stateful walker over the visible nodes of a tree.
///
/// Unlike repeated [`Node::child`] calls, moving the cursor is amortized
/// O(1): it keeps one frame per visible ancestor and mutates them in
/// place. Hidden symbols are traversed internally and never surfaced.
pub struct TreeCursor<'tree> {
    tree: &'tree Tree,
    // Never empty; the first frame is the root.
    frames: Vec<Frame<'tree>>,
}

struct Frame<'tree> {
    subtree: &'tree Subtree,
    offset: TextSize,
    field: Option<FieldId>,
    /// Raw steps from the previous visible frame down to this node,
    /// through hidden symbols. Empty for the root frame.
    path: Vec<RawStep<'tree>>,
}

#[derive(Clone, Copy)]
struct RawStep<'tree> {
    parent: &'tree Subtree,
    index: usize,
    /// Byte offset of `parent.children()[index]`.
    child_offset: TextSize,
    /// Field inherited by all children of `parent`.
    inherited: Option<FieldId>,
}

/// Walks to the leftmost visible descendant under `parent`, recording the
/// raw steps taken. `None` when nothing visible is beneath `parent`.
fn descend_leftmost<'tree>(
    grammar: &Grammar,
    path: &mut Vec<RawStep<'tree>>,
    mut parent: &'tree Subtree,
    mut parent_offset: TextSize,
    mut inherited: Option<FieldId>,
) -> Option<(&'tree Subtree, TextSize, Option<FieldId>)> {
    'descend: loop {
        let mut child_offset = parent_offset;
        for (index, child) in parent.children().iter().enumerate() {
            if child.is_visible() || child.visible_child_count() > 0 {
                let field = grammar.field_for_child(parent.symbol(), index as u16).or(inherited);
                path.push(RawStep { parent, index, child_offset, inherited });
                if child.is_visible() {
                    return Some((child, child_offset, field));
                }
                parent = child;
                parent_offset = child_offset;
                inherited = field;
                continue 'descend;
            }
            child_offset += child.byte_len();
        }
        return None;
    }
}

impl<'tree> TreeCursor<'tree> {
    pub(crate) fn new(tree: &'tree Tree) -> Self {
        let mut cursor = Self { tree, frames: Vec::new() };
        cursor.reset(tree);
        cursor
    }

    /// Repoints the cursor at the root of `tree`, keeping the allocated
    /// frame storage.
    pub fn reset(&mut self, tree: &'tree Tree) {
        self.tree = tree;
        self.frames.clear();
        self.frames.push(Frame {
            subtree: tree.root_subtree(),
            offset: TextSize::new(0),
            field: None,
            path: Vec::new(),
        });
    }

    fn frame(&self) -> &Frame<'tree> {
        self.frames.last().expect("cursor always has a root frame")
    }

    /// The node the cursor currently points at.
    pub fn node(&self) -> Node<'tree> {
        let frame = self.frame();
        Node::new(self.tree, frame.subtree, frame.offset, frame.field)
    }

    pub fn field_name(&self) -> Option<&'tree str> {
        self.frame().field.map(|field| self.tree.grammar().field_name(field))
    }

    pub fn goto_first_child(&mut self) -> Result<(), NoMove> {
        let grammar = self.tree.grammar();
        let frame = self.frame();
        let mut path = Vec::new();
        let Some((subtree, offset, field)) =
            descend_leftmost(grammar, &mut path, frame.subtree, frame.offset, None)
        else {
            return Err(NoMove);
        };
        self.frames.push(Frame { subtree, offset, field, path });
        Ok(())
    }

    pub fn goto_next_sibling(&mut self) -> Result<(), NoMove> {
        if self.frames.len() == 1 {
            return Err(NoMove);
        }
        let grammar = self.tree.grammar();
        let mut path = self.frame().path.clone();

        while let Some(mut step) = path.pop() {
            // Step past the child this raw level was positioned on.
            step.child_offset += step.parent.children()[step.index].byte_len();
            step.index += 1;
            while let Some(child) = step.parent.children().get(step.index) {
                if child.is_visible() {
                    let field = grammar
                        .field_for_child(step.parent.symbol(), step.index as u16)
                        .or(step.inherited);
                    let offset = step.child_offset;
                    path.push(step);
                    return Ok(self.commit(child, offset, field, path));
                }
                if child.visible_child_count() > 0 {
                    let field = grammar
                        .field_for_child(step.parent.symbol(), step.index as u16)
                        .or(step.inherited);
                    let saved = path.len();
                    let offset = step.child_offset;
                    path.push(step);
                    match descend_leftmost(grammar, &mut path, child, offset, field) {
                        Some((subtree, offset, field)) => {
                            return Ok(self.commit(subtree, offset, field, path));
                        }
                        None => path.truncate(saved),
                    }
                }
                step.child_offset += child.byte_len();
                step.index += 1;
            }
            // This raw level is exhausted; resume in the enclosing one.
        }
        Err(NoMove)
    }

    pub fn goto_parent(&mut self) -> Result<(), NoMove> {
        if self.frames.len() == 1 {
            return Err(NoMove);
        }
        self.frames.pop();
        Ok(())
    }

    fn commit(
        &mut self,
        subtree: &'tree Subtree,
        offset: TextSize,
        field: Option<FieldId>,
        path: Vec<RawStep<'tree>>,
    ) {
        let frame = self.frames.last_mut().expect("cursor always has a root frame");
        frame.subtree = subtree;
        frame.offset = offset;
        frame.field = field;
        frame.path = path;
    }
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{GrammarBuilder, LexPattern};
    use triomphe::Arc;

    use super::*;
    use crate::subtree::SubtreeFlags;

    fn sample_tree() -> Tree {
        let mut b = GrammarBuilder::new("cursor-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);
        b.state();
        let grammar = b.build().unwrap();

        let leaf = |symbol, len| {
            Subtree::leaf(&grammar, symbol, TextSize::new(len), SubtreeFlags::default())
        };
        // "1+2+3": sum(number, _rep(_rep("+", number), "+", number))
        let inner = Subtree::node(&grammar, rep, vec![leaf(plus, 1), leaf(number, 1)]);
        let outer = Subtree::node(&grammar, rep, vec![inner, leaf(plus, 1), leaf(number, 1)]);
        let root = Subtree::node(&grammar, sum, vec![leaf(number, 1), outer]);
        Tree::new(Arc::new(grammar), root)
    }

    #[test]
    fn walks_flattened_children_in_order() {
        let tree = sample_tree();
        let mut cursor = tree.walk();
        assert_eq!(cursor.node().kind(), "sum");

        cursor.goto_first_child().unwrap();
        let mut kinds = vec![cursor.node().kind()];
        while cursor.goto_next_sibling().is_ok() {
            kinds.push(cursor.node().kind());
        }
        assert_eq!(kinds, ["number", "+", "number", "+", "number"]);

        assert_eq!(cursor.goto_next_sibling(), Err(NoMove));
        assert_eq!(cursor.node().kind(), "number");
    }

    #[test]
    fn sibling_offsets_accumulate_across_hidden_levels() {
        let tree = sample_tree();
        let mut cursor = tree.walk();
        cursor.goto_first_child().unwrap();
        let mut starts = vec![u32::from(cursor.node().start_byte())];
        while cursor.goto_next_sibling().is_ok() {
            starts.push(u32::from(cursor.node().start_byte()));
        }
        assert_eq!(starts, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn round_trip_returns_to_the_start() {
        let tree = sample_tree();
        let mut cursor = tree.walk();
        cursor.goto_first_child().unwrap();
        cursor.goto_next_sibling().unwrap();
        let start = cursor.node();

        cursor.goto_parent().unwrap();
        assert_eq!(cursor.node().kind(), "sum");
        cursor.goto_first_child().unwrap();
        cursor.goto_next_sibling().unwrap();
        assert!(cursor.node().same_node(&start));

        assert_eq!(cursor.goto_parent().and(cursor.goto_parent()), Err(NoMove));
        cursor.reset(&tree);
        assert!(cursor.node().same_node(&tree.root()));
    }

    #[test]
    fn leaf_has_no_children() {
        let tree = sample_tree();
        let mut cursor = tree.walk();
        cursor.goto_first_child().unwrap();
        assert_eq!(cursor.goto_first_child(), Err(NoMove));
        assert_eq!(cursor.node().kind(), "number");
    }
}
