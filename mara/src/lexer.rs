//! Lexer for mara source text.
//!
//! The lexer is an [`Iterator`] over [`Token`]s that ends with a single
//! [`TokenKind::Eof`]. Newlines are statement terminators except while
//! inside `(...)` or `[...]`, which lets argument lists and literals span
//! lines. Inside `{...}` they terminate statements again.
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

fn is_symbol_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-'
            | '*'
            | '/'
            | '%'
            | '<'
            | '>'
            | '='
            | '!'
            | '^'
            | '~'
            | '&'
            | '|'
            | '?'
            | '@'
            | '$'
            | '.'
            | ':'
    )
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct Lexer<'src> {
    source: &'src str,
    pos: Pos,
    /// Open brackets, innermost last.
    brackets: Vec<char>,
    /// Kind of the previously emitted token, for signed literals.
    last: Option<TokenKind>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: Pos::origin(),
            brackets: Vec::new(),
            last: None,
            finished: false,
        }
    }

    /// Lex the whole input, `Eof` included.
    pub fn tokenize(source: &'src str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos.offset += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += c.len_utf8();
        }
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn newline_is_term(&self) -> bool {
        !matches!(self.brackets.last(), Some('(') | Some('['))
    }

    /// Skip blanks and comments. Returns `false` at end of input.
    fn skip_trivia(&mut self) -> bool {
        loop {
            match self.peek() {
                None => return false,
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('\n') if !self.newline_is_term() => {
                    self.bump();
                }
                Some('#') => self.bump_while(|c| c != '\n'),
                Some(_) => return true,
            }
        }
    }

    fn number(&mut self, start: Pos) -> TokenKind {
        if self.peek() == Some('-') {
            self.bump();
        }
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.bump();
            self.bump();
            self.bump_while(|c| c.is_ascii_hexdigit() || c == '_');
            return TokenKind::Int(self.text_from(start).to_string());
        }

        self.bump_while(|c| c.is_ascii_digit() || c == '_');
        let mut real = false;
        if self.peek() == Some('.')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            real = true;
            self.bump();
            self.bump_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.rest().chars().skip(1);
            let exponent = match lookahead.next() {
                Some('+') | Some('-') => {
                    lookahead.next().is_some_and(|c| c.is_ascii_digit())
                }
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent {
                real = true;
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                self.bump_while(|c| c.is_ascii_digit());
            }
        }

        let text = self.text_from(start).to_string();
        if real {
            TokenKind::Real(text)
        } else {
            TokenKind::Int(text)
        }
    }

    fn identifier(&mut self, start: Pos) -> TokenKind {
        self.bump_while(is_ident_char);
        let text = self.text_from(start);
        if let Some(keyword) = TokenKind::keyword(text) {
            return keyword;
        }
        let first = text.chars().find(|&c| c != '_');
        match first {
            Some(c) if c.is_ascii_uppercase() => {
                TokenKind::TypeId(text.to_string())
            }
            _ => TokenKind::ValueId(text.to_string()),
        }
    }

    fn text_from(&self, start: Pos) -> &'src str {
        &self.source[start.offset..self.pos.offset]
    }

    fn open(&mut self, bracket: char, kind: TokenKind) -> TokenKind {
        self.brackets.push(bracket);
        kind
    }

    fn close(&mut self, kind: TokenKind) -> TokenKind {
        self.brackets.pop();
        kind
    }

    fn signed_literal_ahead(&self) -> bool {
        self.peek() == Some('-')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
            && !self.last.as_ref().is_some_and(TokenKind::ends_operand)
    }

    fn lex_token(&mut self) -> Token {
        if !self.skip_trivia() {
            self.finished = true;
            return Token::new(TokenKind::Eof, Span::point(self.pos), "");
        }

        let start = self.pos;
        let kind = if self.signed_literal_ahead() {
            self.number(start)
        } else {
            let Some(c) = self.bump() else {
                self.finished = true;
                return Token::new(TokenKind::Eof, Span::point(start), "");
            };
            match c {
                '\n' | ';' => TokenKind::Term,
                ',' => TokenKind::Comma,
                '(' => self.open('(', TokenKind::LParen),
                '[' => self.open('[', TokenKind::LBracket),
                '{' => self.open('{', TokenKind::LBrace),
                ')' => self.close(TokenKind::RParen),
                ']' => self.close(TokenKind::RBracket),
                '}' => self.close(TokenKind::RBrace),
                c if c.is_ascii_digit() => {
                    self.pos = start;
                    self.number(start)
                }
                c if c == '_' || c.is_ascii_alphabetic() => {
                    self.identifier(start)
                }
                c if is_symbol_char(c) => {
                    self.bump_while(is_symbol_char);
                    match self.text_from(start) {
                        "=" => TokenKind::Assign,
                        op => TokenKind::SymbolId(op.to_string()),
                    }
                }
                other => TokenKind::Error(format!(
                    "unrecognized character `{}`",
                    other.escape_default()
                )),
            }
        };

        let lexeme = self.text_from(start);
        Token::new(kind, Span::new(start, self.pos), lexeme)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.lex_token();
        self.last = Some(token.kind.clone());
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    fn int(s: &str) -> TokenKind {
        TokenKind::Int(s.to_string())
    }

    fn sym(s: &str) -> TokenKind {
        TokenKind::SymbolId(s.to_string())
    }

    fn vid(s: &str) -> TokenKind {
        TokenKind::ValueId(s.to_string())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            kinds("5 + 2 * 8"),
            vec![int("5"), sym("+"), int("2"), sym("*"), int("8"), TokenKind::Eof]
        );
    }

    #[test]
    fn newline_terminates_outside_parens_only() {
        assert_eq!(
            kinds("f(1,\n2)\nx"),
            vec![
                vid("f"),
                TokenKind::LParen,
                int("1"),
                TokenKind::Comma,
                int("2"),
                TokenKind::RParen,
                TokenKind::Term,
                vid("x"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newline_inside_braces_terminates() {
        let tokens = kinds("{\n1\n}");
        assert_eq!(
            tokens,
            vec![
                TokenKind::LBrace,
                TokenKind::Term,
                int("1"),
                TokenKind::Term,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn minus_sign_depends_on_previous_token() {
        assert_eq!(
            kinds("foo(-1)"),
            vec![
                vid("foo"),
                TokenKind::LParen,
                int("-1"),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("x -1"),
            vec![vid("x"), sym("-"), int("1"), TokenKind::Eof]
        );
    }

    #[test]
    fn literal_forms() {
        assert_eq!(
            kinds("0xff 1_000 2.5 1e3 true"),
            vec![
                int("0xff"),
                int("1_000"),
                TokenKind::Real("2.5".to_string()),
                TokenKind::Real("1e3".to_string()),
                TokenKind::True,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn identifiers_and_keywords() {
        assert_eq!(
            kinds("val _x Int = y"),
            vec![
                TokenKind::Val,
                vid("_x"),
                TokenKind::TypeId("Int".to_string()),
                TokenKind::Assign,
                vid("y"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 # one\n2"),
            vec![int("1"), TokenKind::Term, int("2"), TokenKind::Eof]
        );
    }

    #[test]
    fn unknown_character_is_an_error_token() {
        let tokens = Lexer::tokenize("1 \u{7f}");
        assert!(matches!(tokens[1].kind, TokenKind::Error(_)));
        assert_eq!(tokens[1].span.start.column, 3);
    }

    #[test]
    fn spans_track_lines() {
        let tokens = Lexer::tokenize("a\n  b");
        assert_eq!(tokens[2].span.start, Pos::new(4, 2, 3));
        assert_eq!(tokens[2].lexeme, "b");
    }
}
