// ABOUTME: Scanner turning source text into a token stream, including string-template splicing

use crate::error::LexError;
use crate::token::{keyword_kind, Literal, Token, TokenKind};

/// Scans `source` into a token vector terminated by `Endmarker`, or the
/// list of errors found along the way.
pub fn scan(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    Lexer::new(source).scan()
}

/// Single left-to-right pass with one byte of lookahead (two for `>>>`).
/// `start` marks the first byte of the token in flight, `current` the next
/// unconsumed byte.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    tokens: Vec<Token>,
    errors: Vec<LexError>,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer::with_line(source, 1)
    }

    /// Entry point for recursively lexing `${…}` template contents on a
    /// known line.
    fn with_line(source: &'a str, line: usize) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line,
        }
    }

    pub fn scan(self) -> Result<Vec<Token>, Vec<LexError>> {
        let (mut tokens, errors, line) = self.run();
        if !errors.is_empty() {
            return Err(errors);
        }
        tokens.push(Token::new(TokenKind::Endmarker, "", line));
        Ok(tokens)
    }

    /// Scans to the end of input without appending `Endmarker`, so template
    /// contents can be spliced into an enclosing scan.
    fn run(mut self) -> (Vec<Token>, Vec<LexError>, usize) {
        while !self.at_end() {
            self.start = self.current;
            self.scan_token();
        }
        (self.tokens, self.errors, self.line)
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            b'(' => self.add_token(TokenKind::LeftParen),
            b')' => self.add_token(TokenKind::RightParen),
            b'[' => self.add_token(TokenKind::LeftSquare),
            b']' => self.add_token(TokenKind::RightSquare),
            b'{' => self.add_token(TokenKind::LeftBrace),
            b'}' => self.add_token(TokenKind::RightBrace),
            b',' => self.add_token(TokenKind::Comma),
            b':' => self.add_token(TokenKind::Colon),
            b';' => self.add_token(TokenKind::Semicolon),
            b'\n' => self.line += 1,
            b'^' => self.add_token(TokenKind::BitXor),
            b'~' => self.add_token(TokenKind::BitNot),
            b'.' => {
                let kind = if self.match_byte(b'.') {
                    TokenKind::Range
                } else {
                    TokenKind::Dot
                };
                self.add_token(kind);
            }
            b'!' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Not
                };
                self.add_token(kind);
            }
            b'&' => {
                let kind = if self.match_byte(b'&') {
                    TokenKind::And
                } else {
                    TokenKind::BitAnd
                };
                self.add_token(kind);
            }
            b'|' => {
                let kind = if self.match_byte(b'|') {
                    TokenKind::Or
                } else {
                    TokenKind::BitOr
                };
                self.add_token(kind);
            }
            b'=' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind);
            }
            b'<' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::LessEqual);
                } else if self.match_byte(b'<') {
                    self.add_token(TokenKind::ShiftL);
                } else {
                    self.add_token(TokenKind::Less);
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::GreaterEqual);
                } else if self.match_byte(b'>') {
                    let kind = if self.match_byte(b'>') {
                        TokenKind::ShiftRa
                    } else {
                        TokenKind::ShiftR
                    };
                    self.add_token(kind);
                } else {
                    self.add_token(TokenKind::Greater);
                }
            }
            b'+' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                };
                self.add_token(kind);
            }
            b'-' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::MinusEqual);
                } else if self.match_byte(b'>') {
                    self.add_token(TokenKind::Arrow);
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            b'%' => {
                let kind = if self.match_byte(b'=') {
                    TokenKind::ModEqual
                } else {
                    TokenKind::Mod
                };
                self.add_token(kind);
            }
            b'*' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::StarEqual);
                } else if self.match_byte(b'*') {
                    self.add_token(TokenKind::Power);
                } else {
                    self.add_token(TokenKind::Star);
                }
            }
            b'/' => {
                if self.peek() == b'/' || self.peek() == b'*' {
                    self.comment();
                } else if self.match_byte(b'=') {
                    self.add_token(TokenKind::SlashEqual);
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            b'"' => self.string(),
            b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c' => {}
            _ => {
                if c.is_ascii_digit() {
                    self.number();
                } else if is_alpha(c) {
                    self.identifier();
                } else {
                    self.error(format!("Unexpected character [{}]", c as char));
                }
            }
        }
    }

    fn comment(&mut self) {
        if self.match_byte(b'/') {
            while !self.at_end() && self.peek() != b'\n' {
                self.advance();
            }
            return;
        }
        if self.match_byte(b'*') {
            // Block comments do not nest but may span lines.
            while !(self.at_end() || (self.peek() == b'*' && self.peek_next() == b'/')) {
                if self.peek() == b'\n' {
                    self.line += 1;
                }
                self.advance();
            }
            if !self.at_end() {
                self.advance();
                self.advance();
            }
        }
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = &self.source[self.start..self.current];
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.add_literal_token(TokenKind::Floating, Literal::Float(value)),
                Err(_) => self.error("Invalid float literal."),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.add_literal_token(TokenKind::Integer, Literal::Int(value)),
                Err(_) => self.error("Invalid integer literal."),
            }
        }
    }

    fn identifier(&mut self) {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }
        let text = &self.source[self.start..self.current];
        let kind = keyword_kind(text).unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn string(&mut self) {
        self.add_token(TokenKind::StrStart);

        // Find the closing quote; an escaped quote does not terminate.
        let mut i = self.current;
        while i < self.bytes.len() {
            if self.bytes[i] == b'"' && self.bytes[i - 1] != b'\\' {
                break;
            }
            i += 1;
        }
        if i == self.bytes.len() {
            self.error("Unterminated string.");
            self.current = i;
            return;
        }

        let source = self.source;
        self.split_templates(&source[self.current..i]);

        self.start = i;
        self.current = i + 1;
        self.add_token(TokenKind::StrEnd);
    }

    /// Splits a string body into literal parts and `${…}` templates.
    /// Template contents are recursively lexed and spliced in; a `\${…}`
    /// stays literal text (backslash included); a `${` with no matching
    /// brace-free `}` stays literal text.
    fn split_templates(&mut self, body: &'a str) {
        let bytes = body.as_bytes();
        let mut literal_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let escaped = i > 0 && bytes[i - 1] == b'\\';
            if bytes[i] == b'$' && !escaped && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                let mut j = i + 2;
                while j < bytes.len() && bytes[j] != b'{' && bytes[j] != b'}' {
                    j += 1;
                }
                if j < bytes.len() && bytes[j] == b'}' {
                    self.emit_string_part(&body[literal_start..i]);
                    let inner = &body[i + 2..j];
                    if inner.contains('$') || inner.contains('"') {
                        self.error("string-expression error.");
                    } else {
                        self.splice_template(inner);
                    }
                    i = j + 1;
                    literal_start = i;
                    continue;
                }
            }
            i += 1;
        }
        self.emit_string_part(&body[literal_start..]);
    }

    fn emit_string_part(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.tokens.push(Token::with_literal(
            TokenKind::Str,
            text,
            Literal::Str(text.to_string()),
            self.line,
        ));
    }

    fn splice_template(&mut self, inner: &str) {
        let (tokens, errors, _) = Lexer::with_line(inner, self.line).run();
        self.errors.extend(errors);
        self.tokens.extend(tokens);
    }

    fn at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.bytes[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> u8 {
        if self.at_end() {
            return 0;
        }
        self.bytes[self.current]
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() {
            return 0;
        }
        self.bytes[self.current + 1]
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == expected {
            self.current += 1;
            return true;
        }
        false
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = &self.source[self.start..self.current];
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn add_literal_token(&mut self, kind: TokenKind, literal: Literal) {
        let lexeme = &self.source[self.start..self.current];
        self.tokens
            .push(Token::with_literal(kind, lexeme, literal, self.line));
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(LexError::new(self.line, message));
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanumeric(c: u8) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source)
            .expect("scan failed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_single_character_tokens() {
        assert_eq!(
            kinds("( ) [ ] { } , . : ; ^ ~"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftSquare,
                TokenKind::RightSquare,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::BitXor,
                TokenKind::BitNot,
                TokenKind::Endmarker,
            ]
        );
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(
            kinds("== != <= >= << >> >>> ** && || += -= *= /= %= .. ->"),
            vec![
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::ShiftL,
                TokenKind::ShiftR,
                TokenKind::ShiftRa,
                TokenKind::Power,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::SlashEqual,
                TokenKind::ModEqual,
                TokenKind::Range,
                TokenKind::Arrow,
                TokenKind::Endmarker,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("var foo while whale _bar"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::While,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Endmarker,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        let tokens = scan("12 3.5 7..9").expect("scan failed");
        assert_eq!(tokens[0].literal, Some(Literal::Int(12)));
        assert_eq!(tokens[1].literal, Some(Literal::Float(3.5)));
        // `7..9` is a range between two integers, not two floats
        assert_eq!(tokens[2].literal, Some(Literal::Int(7)));
        assert_eq!(tokens[3].kind, TokenKind::Range);
        assert_eq!(tokens[4].literal, Some(Literal::Int(9)));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // trailing\n2 /* block\nspanning */ 3"),
            vec![
                TokenKind::Integer,
                TokenKind::Integer,
                TokenKind::Integer,
                TokenKind::Endmarker,
            ]
        );
    }

    #[test]
    fn test_block_comment_counts_lines() {
        let tokens = scan("/* a\nb\nc */ x").expect("scan failed");
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn test_line_numbers() {
        let tokens = scan("1\n2\n\n3").expect("scan failed");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn test_plain_string() {
        let tokens = scan("\"hello\"").expect("scan failed");
        assert_eq!(tokens[0].kind, TokenKind::StrStart);
        assert_eq!(tokens[1].literal, Some(Literal::Str("hello".to_string())));
        assert_eq!(tokens[2].kind, TokenKind::StrEnd);
    }

    #[test]
    fn test_empty_string_has_no_parts() {
        assert_eq!(
            kinds("\"\""),
            vec![TokenKind::StrStart, TokenKind::StrEnd, TokenKind::Endmarker]
        );
    }

    #[test]
    fn test_template_splices_expression_tokens() {
        assert_eq!(
            kinds("\"x=${1 + 2}\""),
            vec![
                TokenKind::StrStart,
                TokenKind::Str,
                TokenKind::Integer,
                TokenKind::Plus,
                TokenKind::Integer,
                TokenKind::StrEnd,
                TokenKind::Endmarker,
            ]
        );
    }

    #[test]
    fn test_template_tokens_carry_current_line() {
        let tokens = scan("\n\"${a}\"").expect("scan failed");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_escaped_template_stays_literal() {
        let tokens = scan(r#""\${x}""#).expect("scan failed");
        assert_eq!(tokens[1].literal, Some(Literal::Str(r"\${x}".to_string())));
        assert_eq!(tokens[2].kind, TokenKind::StrEnd);
    }

    #[test]
    fn test_unclosed_template_stays_literal() {
        let tokens = scan("\"a ${x\"").expect("scan failed");
        assert_eq!(tokens[1].literal, Some(Literal::Str("a ${x".to_string())));
    }

    #[test]
    fn test_bad_template_content_is_an_error() {
        let errors = scan("\"${a$b}\"").expect_err("scan should fail");
        assert_eq!(errors[0].message, "string-expression error.");
    }

    #[test]
    fn test_unterminated_string() {
        let errors = scan("\"abc").expect_err("scan should fail");
        assert_eq!(errors[0].message, "Unterminated string.");
    }

    #[test]
    fn test_unexpected_character() {
        let errors = scan("@").expect_err("scan should fail");
        assert_eq!(errors[0].message, "Unexpected character [@]");
        assert_eq!(errors[0].line, 1);
    }

    #[test]
    fn test_lexemes_round_trip() {
        let source = "var a = 1; while (a < 10) { a += 1; }";
        let tokens = scan(source).expect("scan failed");
        let rebuilt: Vec<&str> = tokens
            .iter()
            .filter(|token| token.kind != TokenKind::Endmarker)
            .map(|token| token.lexeme.as_str())
            .collect();
        let flattened: String = source.split_whitespace().collect();
        assert_eq!(rebuilt.concat(), flattened);
    }
}
