use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use arbo_grammar::{Grammar, GrammarBuilder, LexPattern, Symbol};
use arbo_text::{Edit, TextRange, TextSize};
use arbo_tree::Tree;
use expect_test::{Expect, expect};
use triomphe::Arc;

use crate::{ParseError, Parser};

/// sum := number ("+" number)*, written out as LR states.
fn sum_grammar() -> Grammar {
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

    b.build().unwrap()
}

fn sum_grammar_with_whitespace() -> Grammar {
    let mut b = GrammarBuilder::new("sum-ws");
    let ws = b.token("whitespace", LexPattern::CharClass(Box::new([(' ', ' '), ('\n', '\n')])));
    b.extra(ws);
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

    b.build().unwrap()
}

fn parse(grammar: Grammar, text: &str) -> Tree {
    let parser = Parser::new(Arc::new(grammar));
    parser.parse(&text, None).unwrap()
}

fn check(tree: &Tree, expected: Expect) {
    expected.assert_eq(&tree.root().to_string());
}

#[test]
fn parses_a_flat_sum() {
    let tree = parse(sum_grammar(), "1+2+3");
    assert_eq!(tree.text_len(), TextSize::new(5));
    assert!(!tree.root().has_error());
    assert_eq!(tree.root().child_count(), 5);
    check(&tree, expect![["(sum (number) (number) (number))"]]);
}

#[test]
fn empty_input_synthesizes_the_required_token() {
    let tree = parse(sum_grammar(), "");
    assert!(tree.root().has_error());
    assert_eq!(tree.text_len(), TextSize::new(0));
    check(&tree, expect![["(sum (MISSING number))"]]);
}

#[test]
fn trailing_operator_inserts_a_missing_number() {
    let tree = parse(sum_grammar(), "1+");
    assert!(tree.root().has_error());
    assert_eq!(tree.text_len(), TextSize::new(2));
    check(&tree, expect![["(sum (number) (MISSING number))"]]);
}

#[test]
fn unparsable_input_is_skipped_inside_error_nodes() {
    let tree = parse(sum_grammar(), "1@2");
    assert!(tree.root().has_error());
    assert_eq!(tree.text_len(), TextSize::new(3));
    check(&tree, expect![["(sum (number) (ERROR (ERROR)) (ERROR (ERROR)))"]]);
}

#[test]
fn leading_garbage_recovers_into_the_root() {
    // Invalid UTF-8 on the way in; the tree still spans every byte.
    let bytes: &[u8] = &[0xFF, b'1'];
    let parser = Parser::new(Arc::new(sum_grammar()));
    let tree = parser.parse(&bytes, None).unwrap();
    assert_eq!(tree.text_len(), TextSize::new(2));
    assert!(tree.root().has_error());
    check(&tree, expect![["(sum (ERROR (ERROR)) (number))"]]);
}

#[test]
fn extras_interleave_without_state_changes() {
    let tree = parse(sum_grammar_with_whitespace(), "1 + 2");
    assert_eq!(tree.text_len(), TextSize::new(5));
    assert!(!tree.root().has_error());
    let extras: Vec<_> =
        tree.root().children().filter(|node| node.is_extra()).map(|node| node.byte_range()).collect();
    assert_eq!(
        extras,
        [
            TextRange::new(1.into(), 2.into()),
            TextRange::new(3.into(), 4.into()),
        ]
    );
    check(&tree, expect![["(sum (number) (whitespace) (whitespace) (number))"]]);
}

#[test]
fn incremental_reparse_reuses_the_untouched_tail() {
    let parser = Parser::new(Arc::new(sum_grammar()));
    let mut old = parser.parse(&"1+2+3", None).unwrap();

    // "1+2+3" -> "91+2+3": the first number grows, the tail is untouched.
    old.edit(&Edit::insert(0, 1));
    let new = parser.parse(&"91+2+3", Some(&old)).unwrap();

    assert_eq!(new.text_len(), TextSize::new(6));
    check(&new, expect![["(sum (number) (number) (number))"]]);

    let ranges = old.changed_ranges(&new);
    assert_eq!(ranges, [TextRange::new(TextSize::new(0), TextSize::new(2))]);
}

#[test]
fn parse_with_edits_applies_the_edits_first() {
    let parser = Parser::new(Arc::new(sum_grammar()));
    let old = parser.parse(&"1+2", None).unwrap();
    let new = parser.parse_with_edits(&"1+25", &old, &[Edit::insert(3, 1)]).unwrap();
    check(&new, expect![["(sum (number) (number))"]]);
    assert_eq!(new.text_len(), TextSize::new(4));
}

#[test]
fn cancellation_flag_aborts_the_parse() {
    let mut parser = Parser::new(Arc::new(sum_grammar()));
    let flag = Arc::new(AtomicBool::new(true));
    parser.set_cancellation_flag(Some(flag.clone()));
    assert_eq!(parser.parse(&"1+2", None).unwrap_err(), ParseError::Cancelled);

    flag.store(false, Ordering::Relaxed);
    assert!(parser.parse(&"1+2", None).is_ok());
}

#[test]
fn deadline_aborts_the_parse() {
    let mut parser = Parser::new(Arc::new(sum_grammar()));
    parser.set_deadline(Some(Instant::now()));
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert_eq!(parser.parse(&"1+2+3", None).unwrap_err(), ParseError::Cancelled);
}

#[test]
fn identical_reparse_shares_the_root() {
    let parser = Parser::new(Arc::new(sum_grammar()));
    let old = parser.parse(&"1+2+3", None).unwrap();
    let new = parser.parse(&"1+2+3", Some(&old)).unwrap();
    assert_eq!(old.changed_ranges(&new), []);
}
