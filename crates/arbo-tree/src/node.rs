use std::fmt;

use arbo_grammar::{FieldId, Symbol};
use arbo_text::{TextRange, TextSize};

use crate::subtree::Subtree;
use crate::tree::Tree;

/// A view of one visible node: a subtree plus its absolute byte offset.
///
/// Hidden symbols never appear as nodes; their children surface in place
/// as children of the nearest visible ancestor.
#[derive(Clone, Copy)]
pub struct Node<'tree> {
    tree: &'tree Tree,
    subtree: &'tree Subtree,
    offset: TextSize,
    field: Option<FieldId>,
}

impl<'tree> Node<'tree> {
    pub(crate) fn new(
        tree: &'tree Tree,
        subtree: &'tree Subtree,
        offset: TextSize,
        field: Option<FieldId>,
    ) -> Self {
        Self { tree, subtree, offset, field }
    }

    pub fn symbol(&self) -> Symbol {
        self.subtree.symbol()
    }

    /// The grammar-facing name of this node, e.g. `"sum"` or `"+"`.
    pub fn kind(&self) -> &'tree str {
        self.tree.grammar().symbol_name(self.subtree.symbol())
    }

    pub fn byte_range(&self) -> TextRange {
        TextRange::at(self.offset, self.subtree.byte_len())
    }

    pub fn start_byte(&self) -> TextSize {
        self.offset
    }

    pub fn end_byte(&self) -> TextSize {
        self.offset + self.subtree.byte_len()
    }

    pub fn is_named(&self) -> bool {
        let symbol = self.subtree.symbol();
        symbol == Symbol::ERROR || self.tree.grammar().is_named(symbol)
    }

    pub fn is_error(&self) -> bool {
        self.subtree.is_error()
    }

    pub fn is_missing(&self) -> bool {
        self.subtree.is_missing()
    }

    pub fn is_extra(&self) -> bool {
        self.subtree.is_extra()
    }

    /// Whether this node or any descendant records a syntax error.
    pub fn has_error(&self) -> bool {
        self.subtree.error_cost() > 0
    }

    /// The field this node fills in its parent, if any.
    pub fn field_name(&self) -> Option<&'tree str> {
        self.field.map(|field| self.tree.grammar().field_name(field))
    }

    /// The field id this node fills in its parent, if any.
    pub fn field_id(&self) -> Option<FieldId> {
        self.field
    }

    pub fn child_count(&self) -> usize {
        self.subtree.visible_child_count() as usize
    }

    pub fn children(&self) -> Children<'tree> {
        Children::new(*self)
    }

    pub fn child(&self, index: usize) -> Option<Node<'tree>> {
        self.children().nth(index)
    }

    pub fn named_children(&self) -> impl Iterator<Item = Node<'tree>> + use<'tree> {
        self.children().filter(|child| child.is_named())
    }

    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'tree>> {
        let field = self.tree.grammar().field_id(name)?;
        self.children().find(|child| child.field == Some(field))
    }

    /// Two views of the same node in the same tree.
    pub fn same_node(&self, other: &Node<'_>) -> bool {
        self.subtree.ptr_eq(other.subtree) && self.offset == other.offset
    }

    /// Re-descends from the root; `None` for the root itself.
    pub fn parent(&self) -> Option<Node<'tree>> {
        let root = self.tree.root();
        if root.same_node(self) {
            return None;
        }
        root.find_parent_of(self)
    }

    fn find_parent_of(&self, target: &Node<'_>) -> Option<Node<'tree>> {
        for child in self.children() {
            if child.same_node(target) {
                return Some(*self);
            }
            if child.offset <= target.offset && target.end_byte() <= child.end_byte() {
                if let Some(found) = child.find_parent_of(target) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn write_sexp(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.field_name() {
            write!(f, "{name}: ")?;
        }
        if self.is_missing() {
            return write!(f, "(MISSING {})", self.kind());
        }
        write!(f, "({}", self.kind())?;
        for child in self.children() {
            if child.is_named() {
                write!(f, " ")?;
                child.write_sexp(f)?;
            }
        }
        write!(f, ")")
    }
}

/// S-expression rendering of named structure, for diagnostics and
/// snapshot tests.
impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_sexp(f)
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.kind(), self.byte_range())
    }
}

/// Iterates the visible children of a node in document order, descending
/// through hidden symbols without surfacing them.
pub struct Children<'tree> {
    tree: &'tree Tree,
    stack: Vec<RawFrame<'tree>>,
}

struct RawFrame<'tree> {
    parent: &'tree Subtree,
    next_index: usize,
    next_offset: TextSize,
    inherited_field: Option<FieldId>,
}

impl<'tree> Children<'tree> {
    fn new(node: Node<'tree>) -> Self {
        let stack = vec![RawFrame {
            parent: node.subtree,
            next_index: 0,
            next_offset: node.offset,
            inherited_field: None,
        }];
        Self { tree: node.tree, stack }
    }
}

impl<'tree> Iterator for Children<'tree> {
    type Item = Node<'tree>;

    fn next(&mut self) -> Option<Self::Item> {
        let grammar = self.tree.grammar();
        loop {
            let frame = self.stack.last_mut()?;
            let Some(child) = frame.parent.children().get(frame.next_index) else {
                self.stack.pop();
                continue;
            };
            let index = frame.next_index;
            let offset = frame.next_offset;
            let field = grammar
                .field_for_child(frame.parent.symbol(), index as u16)
                .or(frame.inherited_field);
            frame.next_index += 1;
            frame.next_offset += child.byte_len();
            if child.is_visible() {
                return Some(Node::new(self.tree, child, offset, field));
            }
            // Hidden: splice its children in at this position.
            if child.visible_child_count() > 0 {
                self.stack.push(RawFrame {
                    parent: child,
                    next_index: 0,
                    next_offset: offset,
                    inherited_field: field,
                });
            }
        }
    }
}
