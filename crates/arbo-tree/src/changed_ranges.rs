//! Structural diff between two tree snapshots.
//!
//! Incremental parsing shares unchanged subtrees between the old and new
//! tree by refcount, so the diff walks both trees in lockstep and skips
//! any pair of pointer-identical children in O(1). Reported ranges are in
//! the new tree's coordinates.

use arbo_text::{TextRange, TextSize};

use crate::subtree::Subtree;

pub(crate) fn changed_ranges(old: &Subtree, new: &Subtree) -> Vec<TextRange> {
    let mut ranges = Vec::new();
    diff(old, new, TextSize::new(0), &mut ranges);
    merge(ranges)
}

fn diff(old: &Subtree, new: &Subtree, new_offset: TextSize, out: &mut Vec<TextRange>) {
    if old.ptr_eq(new) {
        return;
    }
    let old_children = old.children();
    let new_children = new.children();
    if old.symbol() != new.symbol() || old_children.is_empty() || new_children.is_empty() {
        out.push(TextRange::at(new_offset, new.byte_len()));
        return;
    }

    // Strip pointer-identical children off both ends; whatever is left in
    // the middle is where the trees disagree.
    let mut lo = 0;
    let mut offset = new_offset;
    while lo < old_children.len()
        && lo < new_children.len()
        && old_children[lo].ptr_eq(&new_children[lo])
    {
        offset += new_children[lo].byte_len();
        lo += 1;
    }
    let mut old_hi = old_children.len();
    let mut new_hi = new_children.len();
    while old_hi > lo && new_hi > lo && old_children[old_hi - 1].ptr_eq(&new_children[new_hi - 1]) {
        old_hi -= 1;
        new_hi -= 1;
    }

    if old_hi == lo + 1 && new_hi == lo + 1 {
        // A single differing child on each side: narrow the diff.
        diff(&old_children[lo], &new_children[lo], offset, out);
        return;
    }
    if lo == old_hi && lo == new_hi {
        return;
    }

    // The middles disagree in shape; report the new-side middle as changed
    // (zero-width when the change was a pure removal).
    let mut middle_len = TextSize::new(0);
    for child in &new_children[lo..new_hi] {
        middle_len += child.byte_len();
    }
    out.push(TextRange::at(offset, middle_len));
}

/// Collapses an ordered range list into minimal non-overlapping form.
fn merge(ranges: Vec<TextRange>) -> Vec<TextRange> {
    let mut merged: Vec<TextRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start() <= last.end() => {
                *last = TextRange::new(last.start(), last.end().max(range.end()));
            }
            _ => merged.push(range),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{Grammar, GrammarBuilder, LexPattern, Symbol};

    use super::*;
    use crate::subtree::SubtreeFlags;

    struct Symbols {
        number: Symbol,
        plus: Symbol,
        sum: Symbol,
        rep: Symbol,
    }

    fn grammar() -> (Grammar, Symbols) {
        let mut b = GrammarBuilder::new("ranges-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let plus = b.literal("+");
        let sum = b.named("sum");
        let rep = b.hidden("_sum_repeat");
        b.root(sum);
        b.state();
        (b.build().unwrap(), Symbols { number, plus, sum, rep })
    }

    fn leaf(g: &Grammar, symbol: Symbol, len: u32) -> Subtree {
        Subtree::leaf(g, symbol, TextSize::new(len), SubtreeFlags::default())
    }

    #[test]
    fn identical_trees_have_no_changed_ranges() {
        let (g, s) = grammar();
        let tree = Subtree::node(&g, s.sum, vec![leaf(&g, s.number, 1)]);
        assert_eq!(changed_ranges(&tree, &tree.clone()), []);
    }

    #[test]
    fn shared_suffix_is_skipped() {
        let (g, s) = grammar();
        let tail = Subtree::node(&g, s.rep, vec![leaf(&g, s.plus, 1), leaf(&g, s.number, 1)]);
        // "1+2" vs "17+2": same tail subtree, new first leaf.
        let old = Subtree::node(&g, s.sum, vec![leaf(&g, s.number, 1), tail.clone()]);
        let new = Subtree::node(&g, s.sum, vec![leaf(&g, s.number, 2), tail]);

        let ranges = changed_ranges(&old, &new);
        assert_eq!(ranges, [TextRange::new(TextSize::new(0), TextSize::new(2))]);
    }

    #[test]
    fn differing_middle_is_reported_once() {
        let (g, s) = grammar();
        let first = leaf(&g, s.number, 1);
        let tail = Subtree::node(&g, s.rep, vec![leaf(&g, s.plus, 1), leaf(&g, s.number, 1)]);
        // "1+2" vs "1+2+3": the repeat grows an extra level.
        let old = Subtree::node(&g, s.sum, vec![first.clone(), tail.clone()]);
        let grown =
            Subtree::node(&g, s.rep, vec![tail, leaf(&g, s.plus, 1), leaf(&g, s.number, 1)]);
        let new = Subtree::node(&g, s.sum, vec![first, grown]);

        let ranges = changed_ranges(&old, &new);
        assert_eq!(ranges, [TextRange::new(TextSize::new(1), TextSize::new(5))]);
    }

    #[test]
    fn adjacent_ranges_merge() {
        let merged = merge(vec![
            TextRange::new(TextSize::new(0), TextSize::new(2)),
            TextRange::new(TextSize::new(2), TextSize::new(4)),
            TextRange::new(TextSize::new(6), TextSize::new(7)),
        ]);
        assert_eq!(
            merged,
            [
                TextRange::new(TextSize::new(0), TextSize::new(4)),
                TextRange::new(TextSize::new(6), TextSize::new(7)),
            ]
        );
    }
}
