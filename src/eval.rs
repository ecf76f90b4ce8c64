// ABOUTME: Evaluator executing statements and expressions against the environment chain

use crate::ast::{Expr, ExprId, Stmt};
use crate::builtins;
use crate::env::Environment;
use crate::error::RuntimeError;
use crate::token::{Token, TokenKind};
use crate::value::{Class, Function, Instance, NativeFn, NativeKind, Value};
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

/// Non-local control transfer raised by a statement and propagated to the
/// nearest matching frame: `while` consumes `Break`/`Continue`, a function
/// call consumes `Return`. Never crosses a call boundary.
#[derive(Debug)]
pub enum Signal {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Tree walker over the statement and expression sums. Holds the globals
/// (seeded with the native callables), the current environment, and the
/// resolution side-table written by the resolver.
pub struct Interpreter {
    globals: Rc<Environment>,
    env: Rc<Environment>,
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Program output (`print`) goes through the given sink, so embedders
    /// and tests can capture it.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let globals = Environment::new();
        builtins::register(&globals);
        Interpreter {
            env: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out,
        }
    }

    /// Records a variable use's scope distance. Called by the resolver;
    /// write-idempotent by node id.
    pub fn resolve(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Executes statements in order, stopping at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    // ===== Statements =====

    fn execute(&mut self, statement: &Stmt) -> Result<Signal, RuntimeError> {
        match statement {
            Stmt::Expression(expression) => {
                self.evaluate(expression)?;
                Ok(Signal::Normal)
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Nil,
                };
                self.env.define(&name.lexeme, value);
                Ok(Signal::Normal)
            }
            Stmt::Let { name, initializer } => {
                let value = self.evaluate(initializer)?;
                self.env.define(&name.lexeme, value);
                Ok(Signal::Normal)
            }
            Stmt::Block(statements) => {
                let env = Environment::with_parent(Rc::clone(&self.env));
                self.execute_block(statements, env)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.evaluate(condition)?;
                if is_truth(&condition) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Signal::Normal)
                }
            }
            Stmt::While { condition, body } => {
                loop {
                    let condition = self.evaluate(condition)?;
                    if !is_truth(&condition) {
                        break;
                    }
                    match self.execute(body)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::Normal => {}
                        signal @ Signal::Return(_) => return Ok(signal),
                    }
                }
                Ok(Signal::Normal)
            }
            // TODO: define the iteration protocol before executing for loops
            Stmt::For { .. } => Ok(Signal::Normal),
            Stmt::When {
                branches,
                else_branch,
            } => {
                for branch in branches {
                    for condition in &branch.conditions {
                        let value = self.evaluate(condition)?;
                        if is_truth(&value) {
                            return self.execute(&branch.body);
                        }
                    }
                }
                self.execute(else_branch)
            }
            Stmt::Function(declaration) => {
                let function = Function {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(&self.env),
                    is_initializer: false,
                };
                self.env
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));
                Ok(Signal::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Nil,
                };
                Ok(Signal::Return(value))
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let superclass_value = match superclass {
                    Some(superclass) => {
                        let value = self.look_up_variable(&superclass.name, superclass.id)?;
                        match value {
                            Value::Class(class) => Some(class),
                            _ => {
                                return Err(RuntimeError::new(
                                    &superclass.name,
                                    "Superclass must be a class.",
                                ));
                            }
                        }
                    }
                    None => None,
                };

                // The name is bound first so methods can close over it; the
                // finished class is assigned into that binding below.
                self.env.define(&name.lexeme, Value::Nil);

                let enclosing = Rc::clone(&self.env);
                if let Some(superclass) = &superclass_value {
                    self.env = Environment::with_parent(Rc::clone(&self.env));
                    self.env.define("super", Value::Class(Rc::clone(superclass)));
                }

                let mut method_map = HashMap::new();
                for method in methods {
                    let function = Function {
                        declaration: Rc::clone(method),
                        closure: Rc::clone(&self.env),
                        is_initializer: method.name.lexeme == "init",
                    };
                    method_map.insert(method.name.lexeme.clone(), Rc::new(function));
                }
                let class = Class {
                    name: name.lexeme.clone(),
                    superclass: superclass_value,
                    methods: method_map,
                };

                self.env = enclosing;
                self.env.assign(name, Value::Class(Rc::new(class)))?;
                Ok(Signal::Normal)
            }
            Stmt::Break { .. } => Ok(Signal::Break),
            Stmt::Continue { .. } => Ok(Signal::Continue),
        }
    }

    /// Runs statements in the given environment, restoring the previous one
    /// on every exit path. A non-normal signal stops the block and
    /// propagates.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Rc<Environment>,
    ) -> Result<Signal, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, env);
        let result = self.run_block(statements);
        self.env = previous;
        result
    }

    fn run_block(&mut self, statements: &[Stmt]) -> Result<Signal, RuntimeError> {
        for statement in statements {
            match self.execute(statement)? {
                Signal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    // ===== Expressions =====

    fn evaluate(&mut self, expression: &Expr) -> Result<Value, RuntimeError> {
        match expression {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable { id, name } => self.look_up_variable(name, *id),
            Expr::This { id, keyword } => self.look_up_variable(keyword, *id),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                match self.locals.get(id) {
                    Some(&distance) => self.env.assign_at(distance, name, value.clone()),
                    None => self.globals.assign(name, value.clone())?,
                }
                Ok(value)
            }
            Expr::Unary { op, right } => {
                let right = self.evaluate(right)?;
                self.unary_op(op, right)
            }
            Expr::Binary { left, op, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary_op(op, left, right)
            }
            Expr::Logical { left, op, right } => {
                let left = self.evaluate(left)?;
                if op.kind == TokenKind::Or {
                    if is_truth(&left) {
                        return Ok(left);
                    }
                } else if !is_truth(&left) {
                    return Ok(left);
                }
                self.evaluate(right)
            }
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::StrTemplate(parts) => {
                let mut result = String::new();
                for part in parts {
                    let value = self.evaluate(part)?;
                    result.push_str(&value.to_string());
                }
                Ok(Value::Str(result))
            }
            Expr::Call {
                callee,
                paren,
                args,
            } => {
                let callee = self.evaluate(callee)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate(arg)?);
                }
                self.call_value(callee, arguments, paren)
            }
            Expr::Get { object, name } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => instance.get(name),
                    _ => Err(RuntimeError::new(name, "Only instances have properties.")),
                }
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;
                let Value::Instance(instance) = object else {
                    return Err(RuntimeError::new(name, "Only instances have fields."));
                };
                let value = self.evaluate(value)?;
                instance.set(name, value.clone());
                Ok(value)
            }
            Expr::Super {
                id,
                keyword,
                method,
            } => {
                let Some(&distance) = self.locals.get(id) else {
                    return Err(RuntimeError::new(keyword, "Undefined variable 'super'"));
                };
                let superclass = match self.env.get_at(distance, "super") {
                    Some(Value::Class(class)) => class,
                    _ => return Err(RuntimeError::new(keyword, "Undefined variable 'super'")),
                };
                let Some(instance) = self.env.get_at(distance - 1, "this") else {
                    return Err(RuntimeError::new(keyword, "Undefined variable 'this'"));
                };
                let Some(found) = superclass.find_method(&method.lexeme) else {
                    return Err(RuntimeError::new(
                        method,
                        format!("Undefined property '{}'.", method.lexeme),
                    ));
                };
                Ok(Value::Function(Rc::new(found.bind(instance))))
            }
        }
    }

    fn look_up_variable(&self, name: &Token, id: ExprId) -> Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => self.env.get_at(distance, &name.lexeme).ok_or_else(|| {
                RuntimeError::new(name, format!("Undefined variable '{}'", name.lexeme))
            }),
            None => self.globals.get(name),
        }
    }

    // ===== Operators =====

    fn unary_op(&mut self, op: &Token, right: Value) -> Result<Value, RuntimeError> {
        match op.kind {
            TokenKind::Not => Ok(Value::Bool(!is_truth(&right))),
            TokenKind::Minus => {
                check_number_op(op, &right)?;
                match right {
                    Value::Float(value) => Ok(Value::Float(-value)),
                    _ => Ok(Value::Int(as_int(&right).wrapping_neg())),
                }
            }
            TokenKind::BitNot => {
                check_number_op(op, &right)?;
                if is_float(&right) {
                    return Err(RuntimeError::new(
                        op,
                        "Wrong type argument to bit-complement",
                    ));
                }
                Ok(Value::Int(!as_int(&right)))
            }
            _ => Err(RuntimeError::new(
                op,
                format!("Unsupported operator '{}'.", op.lexeme),
            )),
        }
    }

    fn binary_op(&mut self, op: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
        match op.kind {
            TokenKind::Minus => {
                check_number_ops(op, &left, &right)?;
                if is_float(&left) || is_float(&right) {
                    Ok(Value::Float(as_float(&left) - as_float(&right)))
                } else {
                    Ok(Value::Int(as_int(&left).wrapping_sub(as_int(&right))))
                }
            }
            TokenKind::Star => {
                check_number_ops(op, &left, &right)?;
                if is_float(&left) || is_float(&right) {
                    Ok(Value::Float(as_float(&left) * as_float(&right)))
                } else {
                    Ok(Value::Int(as_int(&left).wrapping_mul(as_int(&right))))
                }
            }
            TokenKind::Slash => {
                check_number_ops(op, &left, &right)?;
                if is_float(&left) || is_float(&right) {
                    let divisor = as_float(&right);
                    if divisor == 0.0 {
                        return Err(RuntimeError::new(op, "Division by 0"));
                    }
                    Ok(Value::Float(as_float(&left) / divisor))
                } else {
                    let divisor = as_int(&right);
                    if divisor == 0 {
                        return Err(RuntimeError::new(op, "Division by 0"));
                    }
                    Ok(Value::Int(as_int(&left).wrapping_div(divisor)))
                }
            }
            TokenKind::Mod => {
                check_number_ops(op, &left, &right)?;
                if is_float(&left) || is_float(&right) {
                    let divisor = as_float(&right);
                    if divisor == 0.0 {
                        return Err(RuntimeError::new(op, "Remainder by 0 is undefined"));
                    }
                    Ok(Value::Float(as_float(&left) % divisor))
                } else {
                    let divisor = as_int(&right);
                    if divisor == 0 {
                        return Err(RuntimeError::new(op, "Remainder by 0 is undefined"));
                    }
                    Ok(Value::Int(as_int(&left).wrapping_rem(divisor)))
                }
            }
            // Exponentiation always computes in floating point.
            TokenKind::Power => {
                check_number_ops(op, &left, &right)?;
                Ok(Value::Float(as_float(&left).powf(as_float(&right))))
            }
            TokenKind::Plus => {
                if is_num(&left) && is_num(&right) {
                    if is_float(&left) || is_float(&right) {
                        Ok(Value::Float(as_float(&left) + as_float(&right)))
                    } else {
                        Ok(Value::Int(as_int(&left).wrapping_add(as_int(&right))))
                    }
                } else {
                    // Anything else concatenates by display form.
                    Ok(Value::Str(format!("{left}{right}")))
                }
            }
            TokenKind::BitOr
            | TokenKind::BitXor
            | TokenKind::BitAnd
            | TokenKind::ShiftL
            | TokenKind::ShiftR
            | TokenKind::ShiftRa => {
                check_number_ops(op, &left, &right)?;
                if is_float(&left) || is_float(&right) {
                    return Err(RuntimeError::new(op, "Wrong type argument to bit operation"));
                }
                let (l, r) = (as_int(&left), as_int(&right));
                let value = match op.kind {
                    TokenKind::BitOr => l | r,
                    TokenKind::BitXor => l ^ r,
                    TokenKind::BitAnd => l & r,
                    TokenKind::ShiftL => l.wrapping_shl(r as u32),
                    // >> and >>> share arithmetic right-shift behavior
                    _ => l.wrapping_shr(r as u32),
                };
                Ok(Value::Int(value))
            }
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => {
                check_number_ops(op, &left, &right)?;
                let result = if is_float(&left) || is_float(&right) {
                    let (l, r) = (as_float(&left), as_float(&right));
                    match op.kind {
                        TokenKind::Greater => l > r,
                        TokenKind::GreaterEqual => l >= r,
                        TokenKind::Less => l < r,
                        _ => l <= r,
                    }
                } else {
                    let (l, r) = (as_int(&left), as_int(&right));
                    match op.kind {
                        TokenKind::Greater => l > r,
                        TokenKind::GreaterEqual => l >= r,
                        TokenKind::Less => l < r,
                        _ => l <= r,
                    }
                };
                Ok(Value::Bool(result))
            }
            TokenKind::NotEqual => Ok(Value::Bool(!is_equal(&left, &right))),
            TokenKind::EqualEqual => Ok(Value::Bool(is_equal(&left, &right))),
            // TODO: define membership and type-identity semantics for these
            TokenKind::In | TokenKind::Is | TokenKind::NotIn | TokenKind::NotIs => {
                Ok(Value::Bool(false))
            }
            _ => Err(RuntimeError::new(
                op,
                format!("Unsupported operator '{}'.", op.lexeme),
            )),
        }
    }

    // ===== Calls =====

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => {
                self.check_arity(function.arity(), args.len(), paren)?;
                self.call_function(&function, args)
            }
            Value::Native(native) => {
                self.check_arity(native.arity, args.len(), paren)?;
                self.call_native(native, &args, paren)
            }
            Value::Class(class) => {
                self.check_arity(class.arity(), args.len(), paren)?;
                self.instantiate(class, args)
            }
            _ => Err(RuntimeError::new(
                paren,
                "Can only call functions and classes.",
            )),
        }
    }

    fn check_arity(
        &self,
        arity: usize,
        supplied: usize,
        paren: &Token,
    ) -> Result<(), RuntimeError> {
        if supplied != arity {
            return Err(RuntimeError::new(
                paren,
                format!("Expected {arity} arguments but got {supplied}."),
            ));
        }
        Ok(())
    }

    /// Binds arguments in a fresh child of the function's closure and runs
    /// the body there. An initializer always returns the constructed
    /// instance, even through a bare `return;`.
    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let env = Environment::with_parent(Rc::clone(&function.closure));
        for (param, value) in function.declaration.params.iter().zip(args) {
            env.define(&param.lexeme, value);
        }
        let signal = self.execute_block(&function.declaration.body, env)?;
        if function.is_initializer {
            return function.closure.get_at(0, "this").ok_or_else(|| {
                RuntimeError::new(&function.declaration.name, "Undefined variable 'this'")
            });
        }
        match signal {
            Signal::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    fn call_native(
        &mut self,
        native: NativeFn,
        args: &[Value],
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        match native.kind {
            NativeKind::Print => {
                writeln!(self.out, "{}", args[0]).map_err(|error| {
                    RuntimeError::new(paren, format!("Could not write output: {error}"))
                })?;
                Ok(Value::Nil)
            }
            NativeKind::Clock => Ok(Value::Float(builtins::clock_seconds())),
        }
    }

    fn instantiate(&mut self, class: Rc<Class>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let instance = Instance::new(Rc::clone(&class));
        if let Some(init) = class.find_method("init") {
            let bound = init.bind(Value::Instance(Rc::clone(&instance)));
            self.call_function(&bound, args)?;
        }
        Ok(Value::Instance(instance))
    }
}

// ===== Value predicates =====

/// Truthiness is total over values: `nil` is false, booleans are
/// themselves, integer zero is false, and everything else (including
/// `0.0`) is true.
pub fn is_truth(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(value) => *value,
        Value::Int(value) => *value != 0,
        _ => true,
    }
}

/// `nil` equals only `nil`; numerics compare by promoted value; strings by
/// content; booleans by value; anything else is unequal.
pub fn is_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Nil, _) | (_, Value::Nil) => false,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ if is_num(a) && is_num(b) => as_float(a) == as_float(b),
        _ => false,
    }
}

fn is_num(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

fn is_float(value: &Value) -> bool {
    matches!(value, Value::Float(_))
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Int(value) => *value,
        _ => 0,
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Float(value) => *value,
        Value::Int(value) => *value as f64,
        _ => 0.0,
    }
}

fn check_number_op(op: &Token, value: &Value) -> Result<(), RuntimeError> {
    if is_num(value) {
        return Ok(());
    }
    Err(RuntimeError::new(op, "Operand must be a number."))
}

fn check_number_ops(op: &Token, left: &Value, right: &Value) -> Result<(), RuntimeError> {
    if is_num(left) && is_num(right) {
        return Ok(());
    }
    Err(RuntimeError::new(op, "Operands must be numbers."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_is_total() {
        assert!(!is_truth(&Value::Nil));
        assert!(!is_truth(&Value::Bool(false)));
        assert!(is_truth(&Value::Bool(true)));
        assert!(!is_truth(&Value::Int(0)));
        assert!(is_truth(&Value::Int(-1)));
        // Floats are always truthy, even 0.0
        assert!(is_truth(&Value::Float(0.0)));
        assert!(is_truth(&Value::Str(String::new())));
    }

    #[test]
    fn test_nil_equals_only_nil() {
        assert!(is_equal(&Value::Nil, &Value::Nil));
        assert!(!is_equal(&Value::Nil, &Value::Bool(false)));
        assert!(!is_equal(&Value::Int(0), &Value::Nil));
    }

    #[test]
    fn test_numeric_equality_promotes() {
        assert!(is_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(!is_equal(&Value::Int(1), &Value::Float(1.5)));
    }

    #[test]
    fn test_mixed_kinds_are_unequal() {
        assert!(!is_equal(&Value::Int(1), &Value::Str("1".to_string())));
        assert!(!is_equal(&Value::Bool(true), &Value::Int(1)));
    }

    #[test]
    fn test_string_equality_by_content() {
        assert!(is_equal(
            &Value::Str("abc".to_string()),
            &Value::Str("abc".to_string())
        ));
        assert!(!is_equal(
            &Value::Str("abc".to_string()),
            &Value::Str("abd".to_string())
        ));
    }
}
