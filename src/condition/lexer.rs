//! Lexer for filter rule text.
//!
//! Produces one token per `next_token` call. The first error is returned as a
//! `TokenKind::Error` token and every later call yields `Eof`.

use crate::condition::token::{Token, TokenKind};

const LINE_COMMENT: char = '#';

pub struct Lexer<'src> {
    source: &'src str,
    /// Current byte offset in `source`.
    pos: usize,
    paren_depth: i32,
    bracket_depth: i32,
    brace_depth: i32,
    done: bool,
}

impl<'src> Lexer<'src> {
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            paren_depth: 0,
            bracket_depth: 0,
            brace_depth: 0,
            done: false,
        }
    }

    pub fn next_token(&mut self) -> Token {
        if self.done {
            return Token::new(TokenKind::Eof, self.pos, "");
        }

        self.skip_whitespace();
        let start = self.pos;

        let Some(c) = self.peek() else {
            return self.finish(start);
        };

        if c == LINE_COMMENT {
            return self.scan_comment(start);
        }

        let kind = match c {
            '0'..='9' => return self.scan_number(start),
            '.' if self.peek_nth(1).is_some_and(|n| n.is_ascii_digit()) => {
                return self.scan_number(start);
            }
            '\'' | '"' => return self.scan_string(start, c),
            '`' => return self.scan_raw_string(start),
            c if is_alpha(c) => return self.scan_word(start),
            '(' => {
                self.paren_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.paren_depth -= 1;
                if self.paren_depth < 0 {
                    return self.error(start, "unexpected right parenthesis ')'".to_string());
                }
                TokenKind::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.bracket_depth -= 1;
                if self.bracket_depth < 0 {
                    return self.error(start, "unexpected right bracket ']'".to_string());
                }
                TokenKind::RBracket
            }
            '{' => {
                self.brace_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.brace_depth -= 1;
                if self.brace_depth < 0 {
                    return self.error(start, "unexpected right brace '}'".to_string());
                }
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Mul,
            '/' => TokenKind::Div,
            '%' => TokenKind::Mod,
            '^' => TokenKind::Pow,
            '=' => TokenKind::Eq,
            '<' | '>' => {
                self.advance();
                let eq = self.eat('=');
                let kind = match (c, eq) {
                    ('<', false) => TokenKind::Lt,
                    ('<', true) => TokenKind::Lte,
                    (_, false) => TokenKind::Gt,
                    (_, true) => TokenKind::Gte,
                };
                return self.emit(kind, start);
            }
            '!' | '|' | '&' => {
                self.advance();
                let (want, kind) = match c {
                    '!' => ('=', TokenKind::Neq),
                    '|' => ('|', TokenKind::Or),
                    _ => ('&', TokenKind::And),
                };
                if self.eat(want) {
                    return self.emit(kind, start);
                }
                let next = self
                    .peek()
                    .map_or_else(|| "end of input".to_string(), |n| format!("{n:?}"));
                return self.error(start, format!("unexpected character {next} after '{c}'"));
            }
            other => return self.error(start, format!("unexpected character: {other:?}")),
        };

        self.advance();
        self.emit(kind, start)
    }

    fn finish(&mut self, start: usize) -> Token {
        let msg = if self.paren_depth != 0 {
            "unclosed left parenthesis"
        } else if self.bracket_depth != 0 {
            "unclosed left bracket"
        } else if self.brace_depth != 0 {
            "unclosed left brace"
        } else {
            self.done = true;
            return Token::new(TokenKind::Eof, start, "");
        };
        self.error(start, msg.to_string())
    }

    fn scan_comment(&mut self, start: usize) -> Token {
        self.advance();
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.advance();
        }
        let body = self.source[start + LINE_COMMENT.len_utf8()..self.pos].to_string();
        self.emit(TokenKind::Comment(body), start)
    }

    fn scan_word(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(is_alphanumeric) {
            self.advance();
        }
        let word = &self.source[start..self.pos];
        let kind = TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()));
        self.emit(kind, start)
    }

    /// Scans `0x` hex, decimal, fractional and exponent forms. A number glued
    /// to letters is retried as a duration such as `5m` or `3m47s`.
    fn scan_number(&mut self, start: usize) -> Token {
        let mut hex = false;
        if self.eat('0') && (self.eat('x') || self.eat('X')) {
            hex = true;
        }
        let digits: fn(char) -> bool = if hex {
            |c| c.is_ascii_hexdigit()
        } else {
            |c| c.is_ascii_digit()
        };

        self.eat_while(digits);
        if self.eat('.') {
            self.eat_while(digits);
        }
        if !hex && (self.eat('e') || self.eat('E')) {
            let _ = self.eat('+') || self.eat('-');
            self.eat_while(|c| c.is_ascii_digit());
        }

        if !self.peek().is_some_and(is_alphanumeric) {
            let text = self.source[start..self.pos].to_string();
            return self.emit(TokenKind::Number(text), start);
        }

        if self.scan_duration_units() {
            let text = self.source[start..self.pos].to_string();
            return self.emit(TokenKind::Duration(text), start);
        }

        self.eat_while(is_alphanumeric);
        let bad = self.source[start..self.pos].to_string();
        self.error(start, format!("bad number or duration: {bad:?}"))
    }

    fn scan_duration_units(&mut self) -> bool {
        const UNITS: &str = "nusmhdwy";
        if !self.eat_any(UNITS) {
            return false;
        }
        self.eat('s');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.eat_while(|c| c.is_ascii_digit());
            // `y` may only lead a compound duration
            if !self.eat_any("nusmhdw") {
                return false;
            }
            self.eat('s');
        }
        !self.peek().is_some_and(is_alphanumeric)
    }

    fn scan_string(&mut self, start: usize, quote: char) -> Token {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self.error(start, "unterminated quoted string".to_string());
                }
                Some('\\') => {
                    self.advance();
                    match self.scan_escape(quote) {
                        Ok(c) => value.push(c),
                        Err(msg) => return self.error(start, msg),
                    }
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        self.emit(TokenKind::String(value), start)
    }

    fn scan_escape(&mut self, quote: char) -> Result<char, String> {
        let Some(c) = self.peek() else {
            return Err("escape sequence not terminated".to_string());
        };
        self.advance();

        let simple = match c {
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            'f' => Some('\u{0c}'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\u{0b}'),
            '\\' => Some('\\'),
            c if c == quote => Some(c),
            _ => None,
        };
        if let Some(decoded) = simple {
            return Ok(decoded);
        }

        let (mut remaining, base, max, mut digit) = match c {
            '0'..='7' => (3, 8, 255, Some(c)),
            'x' | 'X' => (2, 16, 255, None),
            'u' => (4, 16, u32::from(char::MAX), None),
            'U' => (8, 16, u32::from(char::MAX), None),
            other => return Err(format!("unknown escape sequence {other:?}")),
        };

        let mut value: u32 = 0;
        while remaining > 0 {
            let ch = match digit.take() {
                Some(ch) => ch,
                None => {
                    let Some(ch) = self.peek() else {
                        return Err("escape sequence not terminated".to_string());
                    };
                    self.advance();
                    ch
                }
            };
            let d = ch.to_digit(16).filter(|d| *d < base);
            let Some(d) = d else {
                return Err(format!("illegal character {ch:?} in escape sequence"));
            };
            value = value * base + d;
            remaining -= 1;
        }

        if value > max {
            return Err("escape sequence is an invalid Unicode code point".to_string());
        }
        if max == 255 {
            return Ok(char::from(u8::try_from(value).unwrap_or(u8::MAX)));
        }
        char::from_u32(value)
            .ok_or_else(|| "escape sequence is an invalid Unicode code point".to_string())
    }

    fn scan_raw_string(&mut self, start: usize) -> Token {
        self.advance();
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '`' {
                let body = self.source[body_start..self.pos].to_string();
                self.advance();
                return self.emit(TokenKind::RawString(body), start);
            }
            self.advance();
        }
        self.error(start, "unterminated raw string".to_string())
    }

    fn emit(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, start, &self.source[start..self.pos])
    }

    fn error(&mut self, pos: usize, msg: String) -> Token {
        self.done = true;
        Token::new(TokenKind::Error(msg), pos, &self.source[pos..self.pos])
    }

    fn skip_whitespace(&mut self) {
        self.eat_while(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_any(&mut self, set: &str) -> bool {
        match self.peek() {
            Some(c) if set.contains(c) => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
    }
}

fn is_alpha(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_alphanumeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

/// Whether `word` lexes back as a single bare identifier.
#[must_use]
pub fn is_bare_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next().is_some_and(is_alpha)
        && chars.all(is_alphanumeric)
        && TokenKind::keyword(word).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            let stop = matches!(token.kind, TokenKind::Error(_));
            out.push(token.kind);
            if stop {
                break;
            }
        }
        out
    }

    fn lex_error(source: &str) -> String {
        match lex(source).pop() {
            Some(TokenKind::Error(msg)) => msg,
            other => panic!("expected error for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_condition() {
        assert_eq!(
            lex("{ measurement = 'cpu' and host != \"a\" }"),
            vec![
                TokenKind::LBrace,
                TokenKind::Ident("measurement".to_string()),
                TokenKind::Eq,
                TokenKind::String("cpu".to_string()),
                TokenKind::And,
                TokenKind::Ident("host".to_string()),
                TokenKind::Neq,
                TokenKind::String("a".to_string()),
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("< <= > >= && || = !="),
            vec![
                TokenKind::Lt,
                TokenKind::Lte,
                TokenKind::Gt,
                TokenKind::Gte,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Eq,
                TokenKind::Neq,
            ]
        );
    }

    #[test]
    fn test_keywords_any_case() {
        assert_eq!(
            lex("AND Or NOTIN in RE True fAlse nil NULL limit"),
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::NotIn,
                TokenKind::In,
                TokenKind::Re,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Nil,
                TokenKind::Nil,
                TokenKind::Reserved("limit".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("42 0x1F 3.14 .5 1e10 2.5E-3 010"),
            vec![
                TokenKind::Number("42".to_string()),
                TokenKind::Number("0x1F".to_string()),
                TokenKind::Number("3.14".to_string()),
                TokenKind::Number(".5".to_string()),
                TokenKind::Number("1e10".to_string()),
                TokenKind::Number("2.5E-3".to_string()),
                TokenKind::Number("010".to_string()),
            ]
        );
    }

    #[test]
    fn test_durations() {
        assert_eq!(
            lex("5m 3m47s 100ms"),
            vec![
                TokenKind::Duration("5m".to_string()),
                TokenKind::Duration("3m47s".to_string()),
                TokenKind::Duration("100ms".to_string()),
            ]
        );
        assert!(lex_error("12abc").contains("bad number"));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            lex(r"'a\tb\n\\ \' \x41 \101 é \U0001F600'"),
            vec![TokenKind::String(
                "a\tb\n\\ ' A A \u{e9} \u{1F600}".to_string()
            )]
        );
    }

    #[test]
    fn test_bad_escapes() {
        assert!(lex_error(r"'\q'").contains("unknown escape sequence"));
        assert!(lex_error(r"'\xZZ'").contains("illegal character"));
        assert!(lex_error(r"'\777'").contains("invalid Unicode code point"));
        assert!(lex_error(r"'\uD800'").contains("invalid Unicode code point"));
        assert!(lex_error(r"'\U00110000'").contains("invalid Unicode code point"));
    }

    #[test]
    fn test_raw_string_is_verbatim() {
        assert_eq!(
            lex(r"`a\d+'`"),
            vec![TokenKind::RawString(r"a\d+'".to_string())]
        );
        assert_eq!(lex_error("`abc"), "unterminated raw string");
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(lex_error("'abc"), "unterminated quoted string");
        assert_eq!(lex_error("'ab\nc'"), "unterminated quoted string");
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            lex("{a=1} # drop noisy hosts\n;{b=2}"),
            vec![
                TokenKind::LBrace,
                TokenKind::Ident("a".to_string()),
                TokenKind::Eq,
                TokenKind::Number("1".to_string()),
                TokenKind::RBrace,
                TokenKind::Comment(" drop noisy hosts".to_string()),
                TokenKind::Semicolon,
                TokenKind::LBrace,
                TokenKind::Ident("b".to_string()),
                TokenKind::Eq,
                TokenKind::Number("2".to_string()),
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_depth_errors() {
        assert_eq!(lex_error("{ (a = 1 }"), "unclosed left parenthesis");
        assert_eq!(lex_error("{ a in [1 }"), "unclosed left bracket");
        assert_eq!(lex_error("{ a = 1"), "unclosed left brace");
        assert_eq!(lex_error("a = 1)"), "unexpected right parenthesis ')'");
    }

    #[test]
    fn test_single_bang_pipe_amp() {
        assert!(lex_error("a ! b").contains("after '!'"));
        assert!(lex_error("a | b").contains("after '|'"));
        assert!(lex_error("a & b").contains("after '&'"));
    }

    #[test]
    fn test_unknown_character_halts() {
        let mut lexer = Lexer::new("a @ b");
        assert_eq!(lexer.next_token().kind, TokenKind::Ident("a".to_string()));
        let err = lexer.next_token();
        assert!(matches!(err.kind, TokenKind::Error(_)));
        assert_eq!(err.pos, 2);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_token_positions_and_text() {
        let mut lexer = Lexer::new("host  <= 'x'");
        let host = lexer.next_token();
        let op = lexer.next_token();
        let lit = lexer.next_token();
        assert_eq!((host.pos, host.text.as_str()), (0, "host"));
        assert_eq!((op.pos, op.text.as_str()), (6, "<="));
        assert_eq!((lit.pos, lit.text.as_str()), (9, "'x'"));
    }

    #[test]
    fn test_bare_identifier() {
        assert!(is_bare_identifier("host_name1"));
        assert!(!is_bare_identifier("host name"));
        assert!(!is_bare_identifier("1host"));
        assert!(!is_bare_identifier("and"));
        assert!(!is_bare_identifier(""));
    }
}
