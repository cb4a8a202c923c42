//! Textual pattern syntax for queries.
//!
//! Patterns are S-expressions over node kinds: `(sum (number) @lhs)`. A
//! leading `_` matches any node, quoted strings match anonymous tokens,
//! brackets introduce alternations, `field:` and `!field` constrain fields,
//! and `(#name ...)` attaches a predicate to the enclosing pattern.

use crate::compile::Quantifier;
use crate::error::{QueryError, QueryErrorKind};

#[derive(Debug, Clone)]
pub(crate) struct AstPattern {
    pub(crate) node: AstNode,
    pub(crate) quantifier: Quantifier,
    pub(crate) captures: Vec<Box<str>>,
    pub(crate) field: Option<(Box<str>, usize)>,
}

#[derive(Debug, Clone)]
pub(crate) enum AstNode {
    /// `(kind ...)` when `name` is set, `(_ ...)` otherwise.
    Node {
        name: Option<Box<str>>,
        name_offset: usize,
        children: Vec<AstChild>,
    },
    /// `"token"`
    Anonymous { text: Box<str>, offset: usize },
    /// Bare `_`.
    Wildcard,
    /// `[a b c]`
    Alternation {
        branches: Vec<AstPattern>,
        offset: usize,
    },
    /// `((pattern) (#pred ...))`: a parenthesized pattern with predicates
    /// attached.
    Group {
        pattern: Box<AstPattern>,
        predicates: Vec<AstPredicate>,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum AstChild {
    Pattern(AstPattern),
    NegatedField { name: Box<str>, offset: usize },
    Predicate(AstPredicate),
}

#[derive(Debug, Clone)]
pub(crate) struct AstPredicate {
    pub(crate) name: Box<str>,
    pub(crate) args: Vec<AstPredicateArg>,
}

#[derive(Debug, Clone)]
pub(crate) enum AstPredicateArg {
    Capture { name: Box<str>, offset: usize },
    Literal(Box<str>),
}

pub(crate) fn parse(source: &str) -> Result<Vec<AstPattern>, QueryError> {
    let mut parser = PatternParser { source, offset: 0 };
    let mut patterns = Vec::new();

    loop {
        parser.skip_trivia();
        if parser.peek().is_none() {
            break;
        }
        patterns.push(parser.pattern()?);
    }

    Ok(patterns)
}

struct PatternParser<'a> {
    source: &'a str,
    offset: usize,
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_capture_char(ch: char) -> bool {
    is_name_char(ch) || ch == '.' || ch == '-'
}

fn is_predicate_char(ch: char) -> bool {
    is_capture_char(ch) || ch == '?' || ch == '!'
}

impl PatternParser<'_> {
    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            return true;
        }
        false
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == ';' {
                while self.peek().is_some_and(|ch| ch != '\n') {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn unexpected(&self) -> QueryError {
        match self.peek() {
            Some(ch) => QueryError::new(self.offset, QueryErrorKind::Unexpected(ch)),
            None => QueryError::new(self.offset, QueryErrorKind::UnexpectedEof),
        }
    }

    fn name(&mut self, accept: fn(char) -> bool) -> Result<Box<str>, QueryError> {
        let start = self.offset;
        while self.peek().is_some_and(accept) {
            self.bump();
        }
        if self.offset == start {
            return Err(self.unexpected());
        }
        Ok(self.source[start..self.offset].into())
    }

    /// One pattern with its trailing quantifier and capture suffixes.
    fn pattern(&mut self) -> Result<AstPattern, QueryError> {
        let node = self.node()?;
        let mut quantifier = Quantifier::One;
        let mut captures = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                Some('*') => {
                    self.bump();
                    quantifier = Quantifier::ZeroOrMore;
                }
                Some('+') => {
                    self.bump();
                    quantifier = Quantifier::OneOrMore;
                }
                Some('?') => {
                    self.bump();
                    quantifier = Quantifier::ZeroOrOne;
                }
                Some('@') => {
                    self.bump();
                    captures.push(self.name(is_capture_char)?);
                }
                _ => break,
            }
        }

        Ok(AstPattern { node, quantifier, captures, field: None })
    }

    fn node(&mut self) -> Result<AstNode, QueryError> {
        self.skip_trivia();
        match self.peek() {
            Some('(') => {
                self.bump();
                self.parenthesized()
            }
            Some('"') => self.anonymous(),
            Some('_') => {
                self.bump();
                Ok(AstNode::Wildcard)
            }
            Some('[') => self.alternation(),
            _ => Err(self.unexpected()),
        }
    }

    fn parenthesized(&mut self) -> Result<AstNode, QueryError> {
        self.skip_trivia();
        if let Some('(' | '"' | '[') = self.peek() {
            return self.group();
        }
        let name_offset = self.offset;
        let name = if self.eat('_') {
            None
        } else {
            Some(self.name(is_name_char)?)
        };

        let mut children = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('!') => {
                    self.bump();
                    let offset = self.offset;
                    let name = self.name(is_name_char)?;
                    children.push(AstChild::NegatedField { name, offset });
                }
                Some(_) => children.push(self.child()?),
                None => return Err(self.unexpected()),
            }
        }

        Ok(AstNode::Node { name, name_offset, children })
    }

    /// The body of a parenthesized group: one pattern plus any predicates.
    fn group(&mut self) -> Result<AstNode, QueryError> {
        let pattern = Box::new(self.pattern()?);
        let mut predicates = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('(') => {
                    let start = self.offset;
                    self.bump();
                    self.skip_trivia();
                    if !self.eat('#') {
                        return Err(QueryError::new(start, QueryErrorKind::Unexpected('(')));
                    }
                    predicates.push(self.predicate()?);
                }
                _ => return Err(self.unexpected()),
            }
        }

        Ok(AstNode::Group { pattern, predicates })
    }

    /// A child position: a field-prefixed pattern, a predicate, or a plain
    /// pattern.
    fn child(&mut self) -> Result<AstChild, QueryError> {
        let start = self.offset;

        if self.eat('(') {
            self.skip_trivia();
            if self.eat('#') {
                return Ok(AstChild::Predicate(self.predicate()?));
            }
            self.offset = start;
        }

        if self.peek().is_some_and(is_name_char) {
            let name = self.name(is_name_char)?;
            if self.eat(':') {
                let mut pattern = self.pattern()?;
                pattern.field = Some((name, start));
                return Ok(AstChild::Pattern(pattern));
            }
            self.offset = start;
        }

        Ok(AstChild::Pattern(self.pattern()?))
    }

    fn predicate(&mut self) -> Result<AstPredicate, QueryError> {
        let name = self.name(is_predicate_char)?;
        let mut args = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('@') => {
                    self.bump();
                    let offset = self.offset;
                    args.push(AstPredicateArg::Capture { name: self.name(is_capture_char)?, offset });
                }
                Some('"') => {
                    let AstNode::Anonymous { text, .. } = self.anonymous()? else {
                        unreachable!("anonymous() only builds string nodes");
                    };
                    args.push(AstPredicateArg::Literal(text));
                }
                Some(ch) if is_predicate_char(ch) => {
                    args.push(AstPredicateArg::Literal(self.name(is_predicate_char)?));
                }
                Some(_) => {
                    return Err(QueryError::new(self.offset, QueryErrorKind::InvalidPredicateArg));
                }
                None => return Err(self.unexpected()),
            }
        }

        Ok(AstPredicate { name, args })
    }

    fn anonymous(&mut self) -> Result<AstNode, QueryError> {
        let offset = self.offset;
        self.expect('"')?;
        let mut text = String::new();

        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some(ch @ ('"' | '\\')) => text.push(ch),
                    Some(ch) => {
                        return Err(QueryError::new(
                            self.offset - ch.len_utf8(),
                            QueryErrorKind::Unexpected(ch),
                        ));
                    }
                    None => return Err(self.unexpected()),
                },
                Some(ch) => text.push(ch),
                None => return Err(self.unexpected()),
            }
        }

        Ok(AstNode::Anonymous { text: text.into(), offset })
    }

    fn alternation(&mut self) -> Result<AstNode, QueryError> {
        let offset = self.offset;
        self.expect('[')?;
        let mut branches = Vec::new();

        loop {
            self.skip_trivia();
            if self.eat(']') {
                break;
            }
            if self.peek().is_none() {
                return Err(self.unexpected());
            }
            branches.push(self.pattern()?);
        }

        Ok(AstNode::Alternation { branches, offset })
    }
}
