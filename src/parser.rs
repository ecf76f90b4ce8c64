// ABOUTME: Recursive-descent parser turning the token stream into statements

use crate::ast::{next_expr_id, Expr, FunctionDecl, Stmt, SuperclassRef, WhenBranch};
use crate::error::ParseError;
use crate::token::{Literal, Token, TokenKind};
use crate::value::Value;
use std::rc::Rc;

type ParseResult<T> = Result<T, ParseError>;

/// Parses a token vector into a statement list, or every error found. On
/// an error the parser synchronizes to the next statement boundary and
/// keeps collecting.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, Vec<ParseError>> {
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<Vec<Stmt>, Vec<ParseError>> {
        let mut statements = Vec::new();
        while !self.at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(self.errors)
        }
    }

    // ===== Declarations =====

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_kind(TokenKind::Var) {
            self.var_declaration()
        } else if self.match_kind(TokenKind::Let) {
            self.let_declaration()
        } else if self.match_kind(TokenKind::Fun) {
            self.function("function").map(Stmt::Function)
        } else if self.match_kind(TokenKind::Class) {
            self.class_declaration()
        } else if self.match_kind(TokenKind::Enum) {
            let keyword = self.previous().clone();
            Err(self.error(&keyword, "'enum' declarations are not supported yet."))
        } else {
            self.statement()
        };
        match result {
            Ok(statement) => Some(statement),
            Err(_) => {
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected variable name.")?;
        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after var declaration")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn let_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected let name.")?;
        self.consume(
            TokenKind::Equal,
            format!("'{}' must be initialized.", name.lexeme),
        )?;
        let initializer = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after let declaration")?;
        Ok(Stmt::Let { name, initializer })
    }

    fn function(&mut self, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenKind::Identifier, format!("Expected {kind} name."))?;
        self.consume(
            TokenKind::LeftParen,
            format!("Expected '(' after {kind} name."),
        )?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= 255 {
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenKind::Identifier, "Expected parameter name.")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters.")?;
        self.consume(
            TokenKind::LeftBrace,
            format!("Expected '{{' before {kind} body."),
        )?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected class name.")?;
        let superclass = if self.match_kind(TokenKind::Colon) {
            let super_name = self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            Some(SuperclassRef {
                id: next_expr_id(),
                name: super_name,
            })
        } else {
            None
        };
        self.consume(TokenKind::LeftBrace, "Expected '{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            self.consume(
                TokenKind::Fun,
                "Expected the 'fun' keyword in the class body.",
            )?;
            methods.push(self.function("method")?);
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after class body.")?;
        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    // ===== Statements =====

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::When) {
            return self.when_statement();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.match_kind(TokenKind::Break) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Semicolon, "Expected ';' after break statement.")?;
            return Ok(Stmt::Break { keyword });
        }
        if self.match_kind(TokenKind::Continue) {
            let keyword = self.previous().clone();
            self.consume(
                TokenKind::Semicolon,
                "Expected ';' after continue statement.",
            )?;
            return Ok(Stmt::Continue { keyword });
        }
        if self.match_kind(TokenKind::Import) {
            let keyword = self.previous().clone();
            return Err(self.error(&keyword, "'import' statements are not supported yet."));
        }
        self.expression_statement()
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after if")?;
        let condition = self.or()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let then_branch = Box::new(self.statement()?);
        // An elif chain nests in the else slot of its predecessor.
        let else_branch = if self.match_kind(TokenKind::Elif) {
            Some(Box::new(self.if_statement()?))
        } else if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after while")?;
        let condition = self.or()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after for")?;
        let variable = self.consume(TokenKind::Identifier, "Expected loop variable name.")?;
        self.consume(TokenKind::In, "Expected 'in' after variable")?;
        let iterable = self.range()?;
        self.consume(TokenKind::RightParen, "Expected ')' after iterable")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            variable,
            iterable,
            body,
        })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.or()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after return statement.")?;
        Ok(Stmt::Return { keyword, value })
    }

    /// `when (subject) { c1, c2 -> body; ...; else -> body }`. The subject
    /// is parsed once and injected into each condition: a membership
    /// condition gets it as the missing left operand, anything else
    /// desugars to `subject == condition`.
    fn when_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after when")?;
        let subject = self.or()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after ')'")?;

        let mut branches = Vec::new();
        loop {
            let mut conditions = Vec::new();
            loop {
                conditions.push(self.when_condition(&subject)?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::Arrow, "Expected '->' after cond")?;
            let body = self.statement()?;
            branches.push(WhenBranch { conditions, body });
            if self.check(TokenKind::Else) || self.at_end() {
                break;
            }
        }
        self.consume(TokenKind::Else, "Expected 'else' as the last branch")?;
        self.consume(TokenKind::Arrow, "Expected '->' after 'else'")?;
        let else_branch = Box::new(self.statement()?);
        self.consume(TokenKind::RightBrace, "Expected '}' at end of when")?;
        Ok(Stmt::When {
            branches,
            else_branch,
        })
    }

    fn when_condition(&mut self, subject: &Expr) -> ParseResult<Expr> {
        if self.check(TokenKind::In) || self.check(TokenKind::Is) {
            let op = self.advance();
            let right = self.range()?;
            return Ok(Expr::Binary {
                left: Box::new(subject.clone()),
                op,
                right: Box::new(right),
            });
        }
        if self.check(TokenKind::Not)
            && matches!(
                self.peek_next_kind(),
                Some(TokenKind::In | TokenKind::Is)
            )
        {
            let op = self.negated_membership_operator();
            let right = self.range()?;
            return Ok(Expr::Binary {
                left: Box::new(subject.clone()),
                op,
                right: Box::new(right),
            });
        }
        let value = self.or()?;
        let equals = Token::new(TokenKind::EqualEqual, "==", self.previous().line);
        Ok(Expr::Binary {
            left: Box::new(subject.clone()),
            op: equals,
            right: Box::new(value),
        })
    }

    /// Rewrites the two-token sequences `not in` / `not is` into the
    /// synthetic `NotIn` / `NotIs` operator tokens. The caller has already
    /// checked that both tokens are present.
    fn negated_membership_operator(&mut self) -> Token {
        let not_token = self.advance();
        let keyword = self.advance();
        if keyword.kind == TokenKind::In {
            Token::new(TokenKind::NotIn, "not in", not_token.line)
        } else {
            Token::new(TokenKind::NotIs, "not is", not_token.line)
        }
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after block")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expression = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::Expression(expression))
    }

    // ===== Expressions, lowest to highest precedence =====

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;
        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;
            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    id: next_expr_id(),
                    name,
                    value: Box::new(value),
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                _ => Err(self.error(&equals, "Invalid assignment target.")),
            };
        }
        if self.match_kind(TokenKind::PlusEqual) {
            return self.compound_assignment(expr, TokenKind::Plus, "+");
        }
        if self.match_kind(TokenKind::MinusEqual) {
            return self.compound_assignment(expr, TokenKind::Minus, "-");
        }
        if self.match_kind(TokenKind::StarEqual) {
            return self.compound_assignment(expr, TokenKind::Star, "*");
        }
        if self.match_kind(TokenKind::SlashEqual) {
            return self.compound_assignment(expr, TokenKind::Slash, "/");
        }
        if self.match_kind(TokenKind::ModEqual) {
            return self.compound_assignment(expr, TokenKind::Mod, "%");
        }
        Ok(expr)
    }

    /// Desugars `name <op>= value` into `name = name <op> value`. Only a
    /// plain variable is a valid target for the compound forms.
    fn compound_assignment(
        &mut self,
        target: Expr,
        op_kind: TokenKind,
        op_lexeme: &str,
    ) -> ParseResult<Expr> {
        let equals = self.previous().clone();
        let value = self.assignment()?;
        if let Expr::Variable { name, .. } = &target {
            let name = name.clone();
            let op = Token::new(op_kind, op_lexeme, equals.line);
            let combined = Expr::Binary {
                left: Box::new(target),
                op,
                right: Box::new(value),
            };
            return Ok(Expr::Assign {
                id: next_expr_id(),
                name,
                value: Box::new(combined),
            });
        }
        Err(self.error(&equals, "Invalid assignment target."))
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;
        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_loop(
            &[TokenKind::NotEqual, TokenKind::EqualEqual],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_loop(
            &[
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            ],
            Self::in_is,
        )
    }

    fn in_is(&mut self) -> ParseResult<Expr> {
        let expr = self.range()?;
        if self.check(TokenKind::Not)
            && matches!(
                self.peek_next_kind(),
                Some(TokenKind::In | TokenKind::Is)
            )
        {
            let op = self.negated_membership_operator();
            let right = self.range()?;
            return Ok(Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        if self.match_kind(TokenKind::In) || self.match_kind(TokenKind::Is) {
            let op = self.previous().clone();
            let right = self.range()?;
            return Ok(Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    /// `a..b` is non-associative: at most one per chain.
    fn range(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bit_or()?;
        if self.match_kind(TokenKind::Range) {
            let op = self.previous().clone();
            let right = self.bit_or()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_loop(&[TokenKind::BitOr], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_loop(&[TokenKind::BitXor], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_loop(&[TokenKind::BitAnd], Self::shift)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary_loop(
            &[TokenKind::ShiftL, TokenKind::ShiftR, TokenKind::ShiftRa],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_loop(&[TokenKind::Minus, TokenKind::Plus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_loop(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Mod],
            Self::unary,
        )
    }

    fn binary_loop(
        &mut self,
        kinds: &[TokenKind],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;
        while self.match_kinds(kinds) {
            let op = self.previous().clone();
            let right = next(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_kinds(&[TokenKind::Minus, TokenKind::Not, TokenKind::BitNot]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                op,
                right: Box::new(right),
            });
        }
        self.power()
    }

    /// `**` is right-associative: the right operand re-enters `unary`.
    fn power(&mut self) -> ParseResult<Expr> {
        let mut expr = self.call()?;
        while self.match_kind(TokenKind::Power) {
            let op = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::Dot) {
                let name =
                    self.consume(TokenKind::Identifier, "Expect property name after '.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= 255 {
                    // Soft error: recorded, but parsing continues.
                    let token = self.peek().clone();
                    self.error(&token, "Can't have more than 255 arguments");
                }
                args.push(self.or()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_kinds(&[TokenKind::Integer, TokenKind::Floating]) {
            let value = match self.previous().literal.clone() {
                Some(Literal::Int(value)) => Value::Int(value),
                Some(Literal::Float(value)) => Value::Float(value),
                _ => Value::Nil,
            };
            return Ok(Expr::Literal(value));
        }
        if self.match_kind(TokenKind::Identifier) {
            return Ok(Expr::Variable {
                id: next_expr_id(),
                name: self.previous().clone(),
            });
        }
        if self.match_kind(TokenKind::StrStart) {
            let mut parts = Vec::new();
            loop {
                if self.match_kind(TokenKind::Str) {
                    let text = match self.previous().literal.clone() {
                        Some(Literal::Str(text)) => text,
                        _ => String::new(),
                    };
                    parts.push(Expr::Literal(Value::Str(text)));
                } else if self.match_kind(TokenKind::StrEnd) {
                    break;
                } else {
                    parts.push(self.or()?);
                }
            }
            return Ok(Expr::StrTemplate(parts));
        }
        if self.match_kinds(&[TokenKind::True, TokenKind::False]) {
            let value = self.previous().kind == TokenKind::True;
            return Ok(Expr::Literal(Value::Bool(value)));
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.or()?;
            self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }
        if self.match_kind(TokenKind::Nil) {
            return Ok(Expr::Literal(Value::Nil));
        }
        if self.match_kind(TokenKind::This) {
            return Ok(Expr::This {
                id: next_expr_id(),
                keyword: self.previous().clone(),
            });
        }
        if self.match_kind(TokenKind::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super {
                id: next_expr_id(),
                keyword,
                method,
            });
        }
        let token = self.peek().clone();
        Err(self.error(&token, "Expected expression"))
    }

    // ===== Error handling and recovery =====

    fn error(&mut self, token: &Token, message: impl Into<String>) -> ParseError {
        let error = ParseError::new(token, message);
        self.errors.push(error.clone());
        error
    }

    /// Discards tokens until past a `;` or positioned at a
    /// statement-introducing keyword.
    fn synchronize(&mut self) {
        self.advance();
        while !self.at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::If
                | TokenKind::Fun
                | TokenKind::Let
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::Enum
                | TokenKind::Break
                | TokenKind::Class
                | TokenKind::While
                | TokenKind::Import
                | TokenKind::Return
                | TokenKind::Continue => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ===== Cursor helpers =====

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.current + 1).map(|token| token.kind)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Endmarker
    }

    fn advance(&mut self) -> Token {
        if !self.at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.at_end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.match_kind(kind) {
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: impl Into<String>) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let token = self.peek().clone();
        Err(self.error(&token, message))
    }
}
