// ABOUTME: Expression and statement sums produced by the parser

use crate::token::Token;
use crate::value::Value;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Stable identity of an expression node, used to key the resolution
/// side-table. Ids come from a process-wide counter so nodes from
/// successive parses (REPL lines) never collide.
pub type ExprId = u32;

static NEXT_EXPR_ID: AtomicU32 = AtomicU32::new(0);

pub fn next_expr_id() -> ExprId {
    NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Only the node shapes the resolver binds to a scope depth carry an id.
/// Cloning a node keeps its id, so the side-table stays write-idempotent
/// when the parser duplicates a node (the `when` subject).
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Unary {
        op: Token,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Grouping(Box<Expr>),
    /// String template: each part is stringified and concatenated.
    StrTemplate(Vec<Expr>),
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    This {
        id: ExprId,
        keyword: Token,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

#[derive(Debug)]
pub enum Stmt {
    Expression(Expr),
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Let {
        name: Token,
        initializer: Expr,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    /// Parsed and resolved, but iteration has no evaluator yet.
    For {
        variable: Token,
        iterable: Expr,
        body: Box<Stmt>,
    },
    When {
        branches: Vec<WhenBranch>,
        else_branch: Box<Stmt>,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Class {
        name: Token,
        superclass: Option<SuperclassRef>,
        methods: Vec<Rc<FunctionDecl>>,
    },
    Break {
        keyword: Token,
    },
    Continue {
        keyword: Token,
    },
}

/// One `when` branch: the branch fires if any condition is truthy.
#[derive(Debug)]
pub struct WhenBranch {
    pub conditions: Vec<Expr>,
    pub body: Stmt,
}

/// The superclass name in a class declaration, resolved like a variable use.
#[derive(Debug)]
pub struct SuperclassRef {
    pub id: ExprId,
    pub name: Token,
}

/// Shared between the statement tree and runtime function values.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}
