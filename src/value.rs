// ABOUTME: Runtime value variants and the function/class/instance objects behind them

use crate::ast::FunctionDecl;
use crate::env::Environment;
use crate::error::RuntimeError;
use crate::token::Token;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// The runtime value sum. Two distinct numeric variants: `Int` is 64-bit
/// signed, `Float` is IEEE-754 double; arithmetic promotes to `Float` when
/// either side is one.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Function(Rc<Function>),
    Native(NativeFn),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

/// A user function together with the environment captured at its point of
/// declaration.
#[derive(Debug)]
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Rc<Environment>,
    pub is_initializer: bool,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Produces a fresh function whose closure binds `this` to the given
    /// instance, one environment above the declaration closure.
    pub fn bind(&self, instance: Value) -> Function {
        let env = Environment::with_parent(Rc::clone(&self.closure));
        env.define("this", instance);
        Function {
            declaration: Rc::clone(&self.declaration),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<String, Rc<Function>>,
}

impl Class {
    /// Walks the superclass chain for a method.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }

    /// A class called as a constructor takes its `init` arity, or none.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Rc<Instance> {
        Rc::new(Instance {
            class,
            fields: RefCell::new(HashMap::new()),
        })
    }

    /// Fields shadow methods; a method found on the class chain comes back
    /// bound to this instance.
    pub fn get(self: &Rc<Self>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }
        if let Some(method) = self.class.find_method(&name.lexeme) {
            let bound = method.bind(Value::Instance(Rc::clone(self)));
            return Ok(Value::Function(Rc::new(bound)));
        }
        Err(RuntimeError::new(
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// Fields spring into existence on first assignment.
    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}

/// A host-provided callable, dispatched by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFn {
    pub name: &'static str,
    pub arity: usize,
    pub kind: NativeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Print,
    Clock,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::Function(function) => {
                write!(f, "<function {}>", function.declaration.name.lexeme)
            }
            Value::Native(native) => write!(f, "<native-function {}>", native.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) => write!(f, "<Instance {}>", instance.class.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn class(name: &str, superclass: Option<Rc<Class>>) -> Rc<Class> {
        Rc::new(Class {
            name: name.to_string(),
            superclass,
            methods: HashMap::new(),
        })
    }

    #[test]
    fn test_primitive_display_forms() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(8.0).to_string(), "8");
        assert_eq!(Value::Str("raw text".to_string()).to_string(), "raw text");
    }

    #[test]
    fn test_object_display_forms() {
        let native = Value::Native(NativeFn {
            name: "clock",
            arity: 0,
            kind: NativeKind::Clock,
        });
        assert_eq!(native.to_string(), "<native-function clock>");

        let base = class("Shape", None);
        assert_eq!(Value::Class(Rc::clone(&base)).to_string(), "<class Shape>");
        let instance = Instance::new(base);
        assert_eq!(Value::Instance(instance).to_string(), "<Instance Shape>");
    }

    #[test]
    fn test_find_method_walks_superclass_chain() {
        let decl = Rc::new(FunctionDecl {
            name: Token::new(TokenKind::Identifier, "area", 1),
            params: vec![],
            body: vec![],
        });
        let method = Rc::new(Function {
            declaration: decl,
            closure: Environment::new(),
            is_initializer: false,
        });

        let mut methods = HashMap::new();
        methods.insert("area".to_string(), method);
        let base = Rc::new(Class {
            name: "Shape".to_string(),
            superclass: None,
            methods,
        });
        let derived = class("Circle", Some(base));

        assert!(derived.find_method("area").is_some());
        assert!(derived.find_method("perimeter").is_none());
    }

    #[test]
    fn test_class_arity_without_init_is_zero() {
        assert_eq!(class("Empty", None).arity(), 0);
    }

    #[test]
    fn test_instance_fields_shadow_methods() {
        let decl = Rc::new(FunctionDecl {
            name: Token::new(TokenKind::Identifier, "x", 1),
            params: vec![],
            body: vec![],
        });
        let method = Rc::new(Function {
            declaration: decl,
            closure: Environment::new(),
            is_initializer: false,
        });
        let mut methods = HashMap::new();
        methods.insert("x".to_string(), method);
        let instance = Instance::new(Rc::new(Class {
            name: "Point".to_string(),
            superclass: None,
            methods,
        }));

        let name = Token::new(TokenKind::Identifier, "x", 1);
        assert!(matches!(
            instance.get(&name),
            Ok(Value::Function(_))
        ));

        instance.set(&name, Value::Int(3));
        assert!(matches!(instance.get(&name), Ok(Value::Int(3))));
    }

    #[test]
    fn test_missing_property_is_an_error() {
        let instance = Instance::new(class("Point", None));
        let name = Token::new(TokenKind::Identifier, "y", 4);
        let error = instance.get(&name).expect_err("should be missing");
        assert_eq!(error.message, "Undefined property 'y'.");
    }
}
