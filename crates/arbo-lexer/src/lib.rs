//! Tokenizer driven by a grammar's lexical tables.
//!
//! The lexer is stateless between tokens: the parser hands it a position, a
//! point, and the set of terminals valid in the current parse state, and it
//! returns the next token. External scanners run first when an external
//! symbol is valid; keyword reclassification relabels word-shaped tokens
//! afterwards. Unrecognized input becomes one-character error tokens, never
//! a failure.

mod buffer;

use arbo_grammar::{ExternalToken, Grammar, LexPattern, ScanCursor, Symbol, SymbolSet};
use arbo_text::{Point, TextRange, TextSize};

pub use buffer::SourceBuffer;

/// A lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: Symbol,
    pub range: TextRange,
    pub start_point: Point,
    /// Unrecognized input (the symbol is `Symbol::ERROR`).
    pub is_error: bool,
    /// Produced by the grammar's external scanner.
    pub is_external: bool,
    /// Relabeled from the word token by keyword reclassification.
    pub is_keyword: bool,
}

impl Token {
    pub fn len(&self) -> TextSize {
        self.range.len()
    }
}

/// One lexing call: borrows the shared source buffer and the grammar.
pub struct Lexer<'s, 'a> {
    src: &'s mut SourceBuffer<'a>,
    grammar: &'s Grammar,
    start: usize,
    position: usize,
    marked_end: Option<usize>,
}

impl<'s, 'a> Lexer<'s, 'a> {
    pub fn new(src: &'s mut SourceBuffer<'a>, grammar: &'s Grammar) -> Self {
        Self { src, grammar, start: 0, position: 0, marked_end: None }
    }

    /// Lexes the next token at `offset`, or `None` at end of input.
    pub fn next_token(
        &mut self,
        offset: TextSize,
        point: Point,
        valid: &SymbolSet,
    ) -> Option<Token> {
        self.start = usize::from(offset);
        self.position = self.start;
        self.marked_end = None;

        if let Some(token) = self.scan_external(point, valid) {
            return Some(token);
        }

        if self.src.is_at_end(self.start) {
            return None;
        }

        let grammar = self.grammar;
        let mut best: Option<(usize, usize)> = None; // (rule index, len)
        for (index, rule) in grammar.lex_rules().iter().enumerate() {
            if !valid.contains(rule.symbol) {
                continue;
            }
            if let Some(len) = self.match_pattern(&rule.pattern)
                && best.is_none_or(|(_, best_len)| len > best_len)
            {
                best = Some((index, len));
            }
        }

        let token = match best {
            Some((index, len)) => {
                let mut symbol = grammar.lex_rules()[index].symbol;
                let mut is_keyword = false;
                if grammar.word_symbol() == Some(symbol)
                    && let Some(keyword) = self.reclassify(len, valid)
                {
                    symbol = keyword;
                    is_keyword = true;
                }
                Token {
                    symbol,
                    range: range_at(self.start, len),
                    start_point: point,
                    is_error: false,
                    is_external: false,
                    is_keyword,
                }
            }
            None => {
                // Unrecognized input: emit a one-character error token and
                // keep going.
                let (_, len) = self.src.char_at(self.start).expect("not at end");
                Token {
                    symbol: Symbol::ERROR,
                    range: range_at(self.start, len),
                    start_point: point,
                    is_error: true,
                    is_external: false,
                    is_keyword: false,
                }
            }
        };
        Some(token)
    }

    /// Advances a point over the text of a produced token.
    pub fn advance_point(&mut self, point: &mut Point, range: TextRange) {
        let mut offset = usize::from(range.start());
        let end = usize::from(range.end());
        while offset < end {
            match self.src.char_at(offset) {
                Some((ch, len)) => {
                    point.advance(ch);
                    offset += len;
                }
                None => break,
            }
        }
    }

    /// The token's text, if it is valid UTF-8.
    fn text(&mut self, start: usize, len: usize) -> Option<&str> {
        std::str::from_utf8(self.src.bytes(start, start + len)).ok()
    }

    fn reclassify(&mut self, len: usize, valid: &SymbolSet) -> Option<Symbol> {
        let grammar = self.grammar;
        let keyword = {
            let text = self.text(self.start, len)?;
            grammar.keyword_for(text)?
        };
        valid.contains(keyword).then_some(keyword)
    }

    fn scan_external(&mut self, point: Point, valid: &SymbolSet) -> Option<Token> {
        let grammar = self.grammar;
        if !grammar.externals().intersects(valid) {
            return None;
        }
        let scanner = grammar.external_scanner()?;
        let scanned = scanner.scan(self, valid);
        match scanned {
            Some(ExternalToken { symbol }) if valid.contains(symbol) => {
                let end = self.marked_end.unwrap_or(self.position);
                if end <= self.start {
                    // Zero-width externals would stall the parser.
                    self.position = self.start;
                    return None;
                }
                Some(Token {
                    symbol,
                    range: range_at(self.start, end - self.start),
                    start_point: point,
                    is_error: false,
                    is_external: true,
                    is_keyword: false,
                })
            }
            _ => {
                self.position = self.start;
                self.marked_end = None;
                None
            }
        }
    }

    /// Matches one pattern at the token start, returning its byte length.
    fn match_pattern(&mut self, pattern: &LexPattern) -> Option<usize> {
        match pattern {
            LexPattern::Literal(text) => {
                let bytes = self.src.bytes(self.start, self.start + text.len());
                (bytes == text.as_bytes()).then(|| text.len())
            }
            LexPattern::CharClass(ranges) => {
                let len = self.match_ranges(self.start, ranges);
                (len > 0).then_some(len)
            }
            LexPattern::Word { first, rest } => {
                let (ch, first_len) = self.src.char_at(self.start)?;
                if !LexPattern::in_ranges(first, ch) {
                    return None;
                }
                Some(first_len + self.match_ranges(self.start + first_len, rest))
            }
            LexPattern::Delimited { open, close } => {
                let (ch, open_len) = self.src.char_at(self.start)?;
                if ch != *open {
                    return None;
                }
                let mut offset = self.start + open_len;
                loop {
                    let (ch, len) = self.src.char_at(offset)?;
                    offset += len;
                    if ch == *close {
                        return Some(offset - self.start);
                    }
                }
            }
        }
    }

    /// The length of the longest run of characters within `ranges`.
    fn match_ranges(&mut self, start: usize, ranges: &[(char, char)]) -> usize {
        let mut offset = start;
        while let Some((ch, len)) = self.src.char_at(offset) {
            if !LexPattern::in_ranges(ranges, ch) {
                break;
            }
            offset += len;
        }
        offset - start
    }
}

fn range_at(start: usize, len: usize) -> TextRange {
    TextRange::at(TextSize::new(start as u32), TextSize::new(len as u32))
}

impl ScanCursor for Lexer<'_, '_> {
    fn lookahead(&mut self) -> Option<char> {
        self.src.char_at(self.position).map(|(ch, _)| ch)
    }

    fn advance(&mut self) {
        if let Some((_, len)) = self.src.char_at(self.position) {
            self.position += len;
        }
    }

    fn mark_end(&mut self) {
        self.marked_end = Some(self.position);
    }

    fn offset(&self) -> TextSize {
        TextSize::new(self.position as u32)
    }
}

#[cfg(test)]
mod tests {
    use arbo_grammar::{ExternalScanner, GrammarBuilder, LexPattern};

    use super::*;

    fn word_pattern() -> LexPattern {
        LexPattern::Word {
            first: Box::new([('a', 'z'), ('A', 'Z'), ('_', '_')]),
            rest: Box::new([('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')]),
        }
    }

    fn test_grammar() -> (Grammar, Symbol, Symbol, Symbol, Symbol) {
        let mut b = GrammarBuilder::new("lex-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let ident = b.token("identifier", word_pattern());
        let eq = b.literal("==");
        let assign = b.literal("=");
        let kw_if = b.keyword("if");
        b.word(ident);
        let expr = b.named("expr");
        b.root(expr);

        let s0 = b.state();
        b.shift(s0, number, s0);
        b.shift(s0, ident, s0);
        b.shift(s0, eq, s0);
        b.shift(s0, assign, s0);
        b.shift(s0, kw_if, s0);

        let grammar = b.build().unwrap();
        (grammar, number, ident, eq, kw_if)
    }

    fn lex_all(grammar: &Grammar, text: &str) -> Vec<Token> {
        let input: &str = text;
        let mut src = SourceBuffer::new(&input);
        let valid = grammar.valid_terminals(arbo_grammar::StateId::START).clone();
        let mut tokens = Vec::new();
        let mut offset = TextSize::new(0);
        let mut point = Point::ZERO;
        loop {
            let mut lexer = Lexer::new(&mut src, grammar);
            match lexer.next_token(offset, point, &valid) {
                Some(token) => {
                    lexer.advance_point(&mut point, token.range);
                    offset = token.range.end();
                    tokens.push(token);
                }
                None => break,
            }
        }
        tokens
    }

    #[test]
    fn longest_match_wins() {
        let (grammar, _, _, eq, _) = test_grammar();
        let tokens = lex_all(&grammar, "==");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, eq);
    }

    #[test]
    fn keywords_reclassify_word_tokens() {
        let (grammar, _, ident, _, kw_if) = test_grammar();
        let tokens = lex_all(&grammar, "if");
        assert_eq!(tokens[0].symbol, kw_if);
        assert!(tokens[0].is_keyword);

        let tokens = lex_all(&grammar, "iffy");
        assert_eq!(tokens[0].symbol, ident);
        assert!(!tokens[0].is_keyword);
    }

    #[test]
    fn unrecognized_input_becomes_error_tokens() {
        let (grammar, number, ..) = test_grammar();
        let tokens = lex_all(&grammar, "1@2");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].symbol, number);
        assert!(tokens[1].is_error);
        assert_eq!(tokens[1].range, TextRange::new(1.into(), 2.into()));
        assert_eq!(tokens[2].symbol, number);
    }

    /// Scans a double-quoted string, declining on a missing close quote.
    struct StringScanner {
        string: Symbol,
    }

    impl ExternalScanner for StringScanner {
        fn scan(&self, cursor: &mut dyn ScanCursor, valid: &SymbolSet) -> Option<ExternalToken> {
            if !valid.contains(self.string) || cursor.lookahead() != Some('"') {
                return None;
            }
            cursor.advance();
            loop {
                match cursor.lookahead() {
                    Some('"') => {
                        cursor.advance();
                        cursor.mark_end();
                        return Some(ExternalToken { symbol: self.string });
                    }
                    Some(_) => cursor.advance(),
                    None => return None,
                }
            }
        }
    }

    fn string_grammar() -> (Grammar, Symbol, Symbol) {
        let mut b = GrammarBuilder::new("string-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let string = b.external("string");
        b.scanner(Box::new(StringScanner { string }));
        let expr = b.named("expr");
        b.root(expr);

        let s0 = b.state();
        b.shift(s0, number, s0);
        b.shift(s0, string, s0);

        let grammar = b.build().unwrap();
        (grammar, number, string)
    }

    #[test]
    fn external_scanner_runs_before_the_table_rules() {
        let (grammar, number, string) = string_grammar();
        let tokens = lex_all(&grammar, "\"ab\"7");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].symbol, string);
        assert!(tokens[0].is_external);
        assert_eq!(tokens[0].range, TextRange::new(0.into(), 4.into()));
        assert_eq!(tokens[1].symbol, number);
    }

    #[test]
    fn a_declining_external_scanner_rewinds_to_the_token_start() {
        let (grammar, number, _) = string_grammar();

        // No opening quote: the scanner declines without consuming.
        let tokens = lex_all(&grammar, "7");
        assert_eq!(tokens[0].symbol, number);
        assert!(!tokens[0].is_external);

        // Unterminated string: the scanner consumes to the end of input
        // before declining; the table rules restart at the quote and emit
        // an error token for it.
        let tokens = lex_all(&grammar, "\"7");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[0].is_error);
        assert_eq!(tokens[0].range, TextRange::new(0.into(), 1.into()));
        assert_eq!(tokens[1].symbol, number);
    }

    #[test]
    fn zero_width_external_tokens_are_discarded() {
        struct Eager {
            string: Symbol,
        }
        impl ExternalScanner for Eager {
            fn scan(&self, _: &mut dyn ScanCursor, _: &SymbolSet) -> Option<ExternalToken> {
                Some(ExternalToken { symbol: self.string })
            }
        }

        let mut b = GrammarBuilder::new("eager-test");
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        let string = b.external("string");
        b.scanner(Box::new(Eager { string }));
        let expr = b.named("expr");
        b.root(expr);
        let s0 = b.state();
        b.shift(s0, number, s0);
        b.shift(s0, string, s0);
        let grammar = b.build().unwrap();

        let tokens = lex_all(&grammar, "7");
        assert_eq!(tokens[0].symbol, number);
        assert!(!tokens[0].is_external);
    }

    #[test]
    fn points_track_newlines() {
        let (grammar, ..) = test_grammar();
        let mut b = GrammarBuilder::new("ws");
        let ws =
            b.token("whitespace", LexPattern::CharClass(Box::new([(' ', ' '), ('\n', '\n')])));
        let number = b.token("number", LexPattern::CharClass(Box::new([('0', '9')])));
        b.extra(ws);
        let expr = b.named("expr");
        b.root(expr);
        let s0 = b.state();
        b.shift(s0, number, s0);
        let grammar_ws = b.build().unwrap();
        let _ = grammar;

        let tokens = lex_all(&grammar_ws, "1\n2");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].start_point, Point::new(1, 0));
    }
}
