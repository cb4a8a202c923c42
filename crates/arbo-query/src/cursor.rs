//! Lazy execution of compiled queries over a tree.

use std::collections::VecDeque;

use arbo_text::TextRange;
use arbo_tree::Node;

use crate::Query;
use crate::compile::{QueryStep, StepKind};

/// Default step budget for one `matches` call.
pub const DEFAULT_MATCH_LIMIT: u32 = 1_000_000;

/// Runs queries against trees.
///
/// The cursor holds execution settings only; it borrows nothing and can be
/// reused across queries and trees.
#[derive(Debug, Clone)]
pub struct QueryCursor {
    match_limit: u32,
    byte_range: Option<TextRange>,
}

impl QueryCursor {
    pub fn new() -> Self {
        Self { match_limit: DEFAULT_MATCH_LIMIT, byte_range: None }
    }

    /// Caps the number of matching steps one `matches` call may spend.
    ///
    /// When the budget runs out the iterator stops early and the results are
    /// truncated.
    pub fn set_match_limit(&mut self, limit: u32) {
        self.match_limit = limit;
    }

    /// Restricts matching to nodes whose span intersects `range`.
    pub fn set_byte_range(&mut self, range: TextRange) {
        self.byte_range = Some(range);
    }

    /// Iterates matches in document order, rooted anywhere below `node`.
    pub fn matches<'q, 'tree>(&self, query: &'q Query, node: Node<'tree>) -> QueryMatches<'q, 'tree> {
        QueryMatches {
            query,
            stack: vec![node],
            pending: VecDeque::new(),
            budget: self.match_limit,
            byte_range: self.byte_range,
        }
    }
}

impl Default for QueryCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// One successful application of a pattern to a node.
#[derive(Debug, Clone)]
pub struct QueryMatch<'tree> {
    pub pattern_index: usize,
    /// Captures in pattern preorder: a node's own captures come before those
    /// of its children.
    pub captures: Vec<QueryCapture<'tree>>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryCapture<'tree> {
    pub index: u16,
    pub node: Node<'tree>,
}

impl<'tree> QueryMatch<'tree> {
    pub fn nodes_for_capture_index(&self, index: u16) -> impl Iterator<Item = Node<'tree>> + '_ {
        self.captures
            .iter()
            .filter(move |capture| capture.index == index)
            .map(|capture| capture.node)
    }
}

/// Document-order iterator over query matches.
pub struct QueryMatches<'q, 'tree> {
    query: &'q Query,
    stack: Vec<Node<'tree>>,
    pending: VecDeque<QueryMatch<'tree>>,
    budget: u32,
    byte_range: Option<TextRange>,
}

impl<'tree> Iterator for QueryMatches<'_, 'tree> {
    type Item = QueryMatch<'tree>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(found);
            }

            if self.budget == 0 && !self.stack.is_empty() {
                tracing::warn!("query step budget exhausted, match results are truncated");
                self.stack.clear();
            }

            let node = self.stack.pop()?;
            if let Some(range) = self.byte_range
                && node.byte_range().intersect(range).is_none()
            {
                continue;
            }

            let children: Vec<_> = node.children().collect();
            self.stack.extend(children.into_iter().rev());

            let query = self.query;
            for (pattern_index, pattern) in query.patterns().iter().enumerate() {
                for variant in &pattern.variants {
                    let mut captures = Vec::new();
                    if match_step(variant, 0, node, &mut captures, &mut self.budget) {
                        self.pending.push_back(QueryMatch { pattern_index, captures });
                        break;
                    }
                }
            }
        }
    }
}

fn kind_matches(step: &QueryStep, node: Node<'_>) -> bool {
    match step.kind {
        StepKind::Symbol(symbol) => node.symbol() == symbol,
        StepKind::AnyNamed => node.is_named(),
        StepKind::Any => true,
    }
}

/// Matches the step at `index` against `node`, appending its captures.
///
/// On failure the captures list is left exactly as it was.
fn match_step<'tree>(
    steps: &[QueryStep],
    index: u16,
    node: Node<'tree>,
    captures: &mut Vec<QueryCapture<'tree>>,
    budget: &mut u32,
) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;

    let step = &steps[index as usize];
    if !kind_matches(step, node) {
        return false;
    }
    if let Some(field) = step.field
        && node.field_id() != Some(field)
    {
        return false;
    }

    let children: Vec<_> = node.children().collect();
    for &negated in &step.negated_fields {
        if children.iter().any(|child| child.field_id() == Some(negated)) {
            return false;
        }
    }

    let mark = captures.len();
    for &index in &step.captures {
        captures.push(QueryCapture { index, node });
    }

    if step.children.is_empty() || match_seq(steps, &step.children, &children, captures, budget) {
        return true;
    }
    captures.truncate(mark);
    false
}

/// One backtracking checkpoint: resume the occurrence scan for `pattern` at
/// `scan` after dropping every capture past `mark`.
struct SeqFrame {
    pattern: usize,
    scan: usize,
    base: usize,
    matched: bool,
    mark: usize,
}

/// Matches a child pattern list as an in-order, non-contiguous subsequence of
/// `nodes`.
///
/// Quantifiers are greedy. Failed branches are revisited through an explicit
/// checkpoint trail, so sibling count never deepens the call stack; only
/// pattern nesting does, through [`match_step`].
fn match_seq<'tree>(
    steps: &[QueryStep],
    patterns: &[u16],
    nodes: &[Node<'tree>],
    captures: &mut Vec<QueryCapture<'tree>>,
    budget: &mut u32,
) -> bool {
    let entry_mark = captures.len();
    let mut trail: Vec<SeqFrame> = Vec::new();

    // `scan` is where the occurrence search resumes; `base` is where the
    // next pattern starts once this one is satisfied, which after a dropped
    // occurrence is not the same position.
    let mut pattern = 0;
    let mut scan = 0;
    let mut base = 0;
    let mut matched = false;

    loop {
        let Some(&step_index) = patterns.get(pattern) else {
            return true;
        };
        let quantifier = steps[step_index as usize].quantifier;

        let mut found = None;
        for at in scan..nodes.len() {
            let mark = captures.len();
            if match_step(steps, step_index, nodes[at], captures, budget) {
                found = Some((at, mark));
                break;
            }
            if *budget == 0 {
                captures.truncate(entry_mark);
                return false;
            }
        }

        match found {
            Some((at, mark)) => {
                trail.push(SeqFrame { pattern, scan: at + 1, base, matched, mark });
                scan = at + 1;
                base = at + 1;
                if quantifier.allows_many() {
                    matched = true;
                } else {
                    pattern += 1;
                    matched = false;
                }
            }
            None if matched || quantifier.allows_zero() => {
                pattern += 1;
                scan = base;
                matched = false;
            }
            None => {
                let Some(frame) = trail.pop() else {
                    captures.truncate(entry_mark);
                    return false;
                };
                captures.truncate(frame.mark);
                pattern = frame.pattern;
                scan = frame.scan;
                base = frame.base;
                matched = frame.matched;
            }
        }
    }
}
