//! Lowers parsed patterns into flat step arrays.
//!
//! Every alternation is expanded up front, so a compiled pattern is a set of
//! alternation-free variants. Each variant is a preorder array of
//! [`QueryStep`]s whose `children` indices mirror the pattern's shape, which
//! keeps the matcher free of any AST walking.

use arbo_grammar::{FieldId, Grammar, Symbol};

use crate::error::{QueryError, QueryErrorKind};
use crate::parse::{AstChild, AstNode, AstPattern, AstPredicate, AstPredicateArg};

/// Cap on the cartesian product of alternation branches within one pattern.
const MAX_VARIANTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quantifier {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Quantifier {
    pub(crate) fn allows_zero(self) -> bool {
        matches!(self, Self::ZeroOrOne | Self::ZeroOrMore)
    }

    pub(crate) fn allows_many(self) -> bool {
        matches!(self, Self::ZeroOrMore | Self::OneOrMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKind {
    /// A specific named or anonymous symbol.
    Symbol(Symbol),
    /// `(_)`: any named node.
    AnyNamed,
    /// `_`: any node at all.
    Any,
}

#[derive(Debug, Clone)]
pub(crate) struct QueryStep {
    pub(crate) kind: StepKind,
    pub(crate) field: Option<FieldId>,
    pub(crate) negated_fields: Box<[FieldId]>,
    pub(crate) captures: Box<[u16]>,
    pub(crate) quantifier: Quantifier,
    pub(crate) children: Box<[u16]>,
}

/// A predicate attached to a pattern, e.g. `(#eq? @name "main")`.
///
/// Predicates are carried through compilation and surfaced on matches; the
/// engine assigns them no semantics of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: Box<str>,
    pub args: Vec<PredicateArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateArg {
    /// A capture index into the query's capture table.
    Capture(u16),
    Literal(Box<str>),
}

#[derive(Debug)]
pub(crate) struct Pattern {
    pub(crate) variants: Vec<Vec<QueryStep>>,
    pub(crate) predicates: Vec<Predicate>,
}

pub(crate) fn compile(
    grammar: &Grammar,
    asts: &[AstPattern],
) -> Result<(Vec<Pattern>, Vec<Box<str>>), QueryError> {
    let mut captures = Vec::new();
    let mut patterns = Vec::new();

    for ast in asts {
        let mut predicates = Vec::new();
        collect_predicates(ast, &mut captures, &mut predicates)?;

        let expanded = expand(ast)?;
        let mut variants = Vec::with_capacity(expanded.len());
        for variant in &expanded {
            let mut steps = Vec::new();
            flatten(grammar, variant, &mut steps, &mut captures)?;
            variants.push(steps);
        }

        patterns.push(Pattern { variants, predicates });
    }

    Ok((patterns, captures))
}

fn intern_capture(captures: &mut Vec<Box<str>>, name: &str) -> u16 {
    if let Some(index) = captures.iter().position(|known| **known == *name) {
        return index as u16;
    }
    captures.push(name.into());
    (captures.len() - 1) as u16
}

fn collect_predicates(
    pattern: &AstPattern,
    captures: &mut Vec<Box<str>>,
    out: &mut Vec<Predicate>,
) -> Result<(), QueryError> {
    let children = match &pattern.node {
        AstNode::Node { children, .. } => children.as_slice(),
        AstNode::Alternation { branches, .. } => {
            for branch in branches {
                collect_predicates(branch, captures, out)?;
            }
            return Ok(());
        }
        AstNode::Group { pattern, predicates } => {
            collect_predicates(pattern, captures, out)?;
            for predicate in predicates {
                out.push(resolve_predicate(predicate, captures));
            }
            return Ok(());
        }
        AstNode::Anonymous { .. } | AstNode::Wildcard => return Ok(()),
    };

    for child in children {
        match child {
            AstChild::Pattern(child) => collect_predicates(child, captures, out)?,
            AstChild::NegatedField { .. } => {}
            AstChild::Predicate(predicate) => out.push(resolve_predicate(predicate, captures)),
        }
    }

    Ok(())
}

fn resolve_predicate(predicate: &AstPredicate, captures: &mut Vec<Box<str>>) -> Predicate {
    let args = predicate
        .args
        .iter()
        .map(|arg| match arg {
            AstPredicateArg::Capture { name, .. } => {
                PredicateArg::Capture(intern_capture(captures, name))
            }
            AstPredicateArg::Literal(text) => PredicateArg::Literal(text.clone()),
        })
        .collect();
    Predicate { name: predicate.name.clone(), args }
}

/// Applies a wrapper pattern's quantifier, captures, and field to an
/// expanded branch.
fn merge_suffixes(outer: &AstPattern, mut inner: AstPattern) -> AstPattern {
    if outer.quantifier != Quantifier::One {
        inner.quantifier = outer.quantifier;
    }
    inner.captures.extend(outer.captures.iter().cloned());
    if inner.field.is_none() {
        inner.field = outer.field.clone();
    }
    inner
}

/// Rewrites a pattern into its alternation-free forms.
fn expand(pattern: &AstPattern) -> Result<Vec<AstPattern>, QueryError> {
    match &pattern.node {
        AstNode::Anonymous { .. } | AstNode::Wildcard => Ok(vec![pattern.clone()]),

        AstNode::Alternation { branches, offset } => {
            let mut variants = Vec::new();
            for branch in branches {
                for expanded in expand(branch)? {
                    variants.push(merge_suffixes(pattern, expanded));
                }
                if variants.len() > MAX_VARIANTS {
                    return Err(QueryError::new(*offset, QueryErrorKind::TooManyVariants));
                }
            }
            Ok(variants)
        }

        AstNode::Group { pattern: inner, .. } => Ok(expand(inner)?
            .into_iter()
            .map(|expanded| merge_suffixes(pattern, expanded))
            .collect()),

        AstNode::Node { name, name_offset, children } => {
            let mut variants = vec![Vec::new()];
            for child in children {
                let AstChild::Pattern(child) = child else {
                    for variant in &mut variants {
                        variant.push(child.clone());
                    }
                    continue;
                };

                let expansions = expand(child)?;
                if variants.len() * expansions.len() > MAX_VARIANTS {
                    return Err(QueryError::new(*name_offset, QueryErrorKind::TooManyVariants));
                }

                let mut next = Vec::with_capacity(variants.len() * expansions.len());
                for variant in &variants {
                    for expansion in &expansions {
                        let mut extended = variant.clone();
                        extended.push(AstChild::Pattern(expansion.clone()));
                        next.push(extended);
                    }
                }
                variants = next;
            }

            Ok(variants
                .into_iter()
                .map(|children| AstPattern {
                    node: AstNode::Node {
                        name: name.clone(),
                        name_offset: *name_offset,
                        children,
                    },
                    quantifier: pattern.quantifier,
                    captures: pattern.captures.clone(),
                    field: pattern.field.clone(),
                })
                .collect())
        }
    }
}

/// Appends the steps for one alternation-free pattern, returning the index of
/// the step for `pattern` itself.
fn flatten(
    grammar: &Grammar,
    pattern: &AstPattern,
    steps: &mut Vec<QueryStep>,
    captures: &mut Vec<Box<str>>,
) -> Result<u16, QueryError> {
    let kind = match &pattern.node {
        AstNode::Node { name: Some(name), name_offset, .. } => {
            let symbol = grammar.symbol_for_name(name, true).ok_or_else(|| {
                QueryError::new(*name_offset, QueryErrorKind::UnknownNodeKind(name.clone()))
            })?;
            StepKind::Symbol(symbol)
        }
        AstNode::Node { name: None, .. } => StepKind::AnyNamed,
        AstNode::Anonymous { text, offset } => {
            let symbol = grammar.symbol_for_name(text, false).ok_or_else(|| {
                QueryError::new(*offset, QueryErrorKind::UnknownNodeKind(text.clone()))
            })?;
            StepKind::Symbol(symbol)
        }
        AstNode::Wildcard => StepKind::Any,
        AstNode::Alternation { .. } | AstNode::Group { .. } => {
            unreachable!("alternations and groups are expanded before flattening")
        }
    };

    let field = match &pattern.field {
        Some((name, offset)) => Some(resolve_field(grammar, name, *offset)?),
        None => None,
    };

    let index = steps.len() as u16;
    steps.push(QueryStep {
        kind,
        field,
        negated_fields: Box::default(),
        captures: pattern
            .captures
            .iter()
            .map(|name| intern_capture(captures, name))
            .collect(),
        quantifier: pattern.quantifier,
        children: Box::default(),
    });

    let mut negated_fields = Vec::new();
    let mut children = Vec::new();
    if let AstNode::Node { children: ast_children, .. } = &pattern.node {
        for child in ast_children {
            match child {
                AstChild::Pattern(child) => {
                    children.push(flatten(grammar, child, steps, captures)?);
                }
                AstChild::NegatedField { name, offset } => {
                    negated_fields.push(resolve_field(grammar, name, *offset)?);
                }
                AstChild::Predicate(_) => {}
            }
        }
    }

    steps[index as usize].negated_fields = negated_fields.into();
    steps[index as usize].children = children.into();
    Ok(index)
}

fn resolve_field(grammar: &Grammar, name: &str, offset: usize) -> Result<FieldId, QueryError> {
    grammar
        .field_id(name)
        .ok_or_else(|| QueryError::new(offset, QueryErrorKind::UnknownField(name.into())))
}
