// ABOUTME: Lexical resolution pass binding variable uses to scope depths

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::ResolveError;
use crate::eval::Interpreter;
use crate::token::Token;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    None,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Walks the statement tree once, mirroring the evaluator's shape, and
/// records each local variable use's distance to its binding scope through
/// the interpreter's narrow `resolve` interface. Names not found in any
/// scope are left for dynamic lookup in the globals.
///
/// Each scope maps a name to whether its initializer has finished
/// resolving, which catches reads of a declaration from its own
/// initializer.
pub struct Resolver<'a> {
    interpreter: &'a mut Interpreter,
    scopes: Vec<HashMap<String, bool>>,
    current_block: BlockType,
    current_function: FunctionType,
    current_class: ClassType,
    errors: Vec<ResolveError>,
}

impl<'a> Resolver<'a> {
    pub fn new(interpreter: &'a mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_block: BlockType::None,
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    pub fn resolve(mut self, statements: &[Stmt]) -> Result<(), Vec<ResolveError>> {
        self.resolve_statements(statements);
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Expression(expression) => self.resolve_expression(expression),
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }
                self.define(name);
            }
            Stmt::Let { name, initializer } => {
                self.declare(name);
                self.resolve_expression(initializer);
                self.define(name);
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                let enclosing = self.current_block;
                self.current_block = BlockType::Loop;
                self.resolve_expression(condition);
                self.resolve_statement(body);
                self.current_block = enclosing;
            }
            Stmt::For {
                variable,
                iterable,
                body,
            } => {
                self.declare(variable);
                self.resolve_expression(iterable);
                self.resolve_statement(body);
            }
            Stmt::When {
                branches,
                else_branch,
            } => {
                for branch in branches {
                    for condition in &branch.conditions {
                        self.resolve_expression(condition);
                    }
                    self.resolve_statement(&branch.body);
                }
                self.resolve_statement(else_branch);
            }
            Stmt::Function(declaration) => {
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionType::Function);
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword.line, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword.line, "Can't return a value from an initializer.");
                    }
                    self.resolve_expression(value);
                }
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if superclass.name.lexeme == name.lexeme {
                        self.error(superclass.name.line, "A class can't inherit from itself.");
                    }
                    self.current_class = ClassType::Subclass;
                    self.resolve_variable(superclass.id, &superclass.name);
                }

                if superclass.is_some() {
                    self.begin_scope();
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert("super".to_string(), true);
                    }
                }

                self.begin_scope();
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert("this".to_string(), true);
                }

                for method in methods {
                    let declaration = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };
                    self.resolve_function(method, declaration);
                }

                self.end_scope();
                if superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing;
            }
            Stmt::Break { keyword } => {
                if self.current_block != BlockType::Loop {
                    self.error(keyword.line, "'break' can only be used in loops.");
                }
            }
            Stmt::Continue { keyword } => {
                if self.current_block != BlockType::Loop {
                    self.error(keyword.line, "'continue' can only be used in loops.");
                }
            }
        }
    }

    fn resolve_expression(&mut self, expression: &Expr) {
        match expression {
            Expr::Literal(_) => {}
            Expr::Variable { id, name } => self.resolve_variable(*id, name),
            Expr::Assign { id, name, value } => {
                self.resolve_expression(value);
                self.resolve_local(*id, name);
            }
            Expr::Unary { right, .. } => self.resolve_expression(right),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }
            Expr::Grouping(inner) => self.resolve_expression(inner),
            Expr::StrTemplate(parts) => {
                for part in parts {
                    self.resolve_expression(part);
                }
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expression(callee);
                for arg in args {
                    self.resolve_expression(arg);
                }
            }
            Expr::Get { object, .. } => self.resolve_expression(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
            }
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword.line, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(*id, keyword);
            }
            Expr::Super { id, keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.error(keyword.line, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.error(
                        keyword.line,
                        "Can't use 'super' in a class with no superclass.",
                    );
                }
                self.resolve_local(*id, keyword);
            }
        }
    }

    /// A variable use: reject reading a declaration from its own
    /// initializer, then bind to the nearest enclosing scope.
    fn resolve_variable(&mut self, id: ExprId, name: &Token) {
        if let Some(scope) = self.scopes.last() {
            if scope.get(&name.lexeme) == Some(&false) {
                self.error(
                    name.line,
                    "Can't read local variable in its own initializer.",
                );
            }
        }
        self.resolve_local(id, name);
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, depth);
                return;
            }
        }
    }

    /// The body resolves directly in the parameter scope; the evaluator
    /// matches this by executing the body in the argument environment.
    /// A function body is never loop context: break and continue signals
    /// stop at call boundaries.
    fn resolve_function(&mut self, declaration: &FunctionDecl, kind: FunctionType) {
        let enclosing = self.current_function;
        let enclosing_block = self.current_block;
        self.current_function = kind;
        self.current_block = BlockType::None;

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_statements(&declaration.body);
        self.end_scope();

        self.current_function = enclosing;
        self.current_block = enclosing_block;
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.errors.push(ResolveError::new(
                name.line,
                "Already a variable with this name in this scope.",
            ));
            return;
        }
        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn error(&mut self, line: usize, message: &str) {
        self.errors.push(ResolveError::new(line, message));
    }
}
