// ABOUTME: Error types for the four pipeline stages, with their report formats

use crate::token::{Token, TokenKind};
use thiserror::Error;

/// Scan-time failure. The scanner keeps going after one of these so a
/// single pass can report several, but the overall scan fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Line: {line}, {message}")]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

impl LexError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        LexError {
            line,
            message: message.into(),
        }
    }
}

/// A rejected token sequence. Also used as the unwind value back to the
/// statement boundary where the parser synchronizes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line} error at {place}: {message}")]
pub struct ParseError {
    pub line: usize,
    /// `'<lexeme>'` of the offending token, or `end` at end of input.
    pub place: String,
    pub message: String,
}

impl ParseError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        let place = if token.kind == TokenKind::Endmarker {
            "end".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        ParseError {
            line: token.line,
            place,
            message: message.into(),
        }
    }
}

/// Static semantic mistake found by the resolution pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Line [{line}]: {message}")]
pub struct ResolveError {
    pub line: usize,
    pub message: String,
}

impl ResolveError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        ResolveError {
            line,
            message: message.into(),
        }
    }
}

/// Evaluation failure. Carries the token whose line is reported; caught
/// only at the top of `interpret`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Line [{}]: {message}", .token.line)]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError {
            token: token.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_error_format() {
        let error = LexError::new(4, "Unterminated string.");
        assert_eq!(error.to_string(), "Line: 4, Unterminated string.");
    }

    #[test]
    fn test_parse_error_format() {
        let token = Token::new(TokenKind::Semicolon, ";", 2);
        let error = ParseError::new(&token, "Expected expression");
        assert_eq!(error.to_string(), "line 2 error at ';': Expected expression");
    }

    #[test]
    fn test_parse_error_at_end() {
        let token = Token::new(TokenKind::Endmarker, "", 7);
        let error = ParseError::new(&token, "Expected ';' after expression");
        assert_eq!(
            error.to_string(),
            "line 7 error at end: Expected ';' after expression"
        );
    }

    #[test]
    fn test_runtime_error_format() {
        let token = Token::new(TokenKind::Slash, "/", 9);
        let error = RuntimeError::new(&token, "Division by 0");
        assert_eq!(error.to_string(), "Line [9]: Division by 0");
    }
}
