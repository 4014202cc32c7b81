//! Runtime value representation.
//!
//! [`Value`] is what traced code passes around: scalars and containers by
//! value, and everything with identity (functions, classes, instances,
//! modules, generators) behind an `Rc`. Values are live; a recorded call
//! stores a detached [`Payload`](crate::payload::Payload) instead.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::module::Module;
use crate::object::{BoundMethod, Class, Function, Instance, NativeFunction};
use crate::runtime::Generator;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    BoundMethod(Rc<BoundMethod>),
    Module(Rc<Module>),
    Generator(Rc<Generator>),
}

impl Value {
    /// Short type name used in fault messages and opaque payloads.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Native(_) => "builtin_function_or_method",
            Value::Class(_) => "type",
            Value::Instance(inst) => inst.class().name(),
            Value::BoundMethod(_) => "method",
            Value::Module(_) => "module",
            Value::Generator(_) => "generator",
        }
    }

    /// Returns `true` for values the runtime can call.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Native(_) | Value::Class(_) | Value::BoundMethod(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Rc<Class>> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Rc<Instance>> {
        match self {
            Value::Instance(i) => Some(i),
            _ => None,
        }
    }
}

/// Scalars and containers compare structurally; identity-bearing values
/// compare by pointer.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Dict(map) => f.debug_map().entries(map).finish(),
            Value::Function(func) => write!(f, "<function {}>", func.funcname()),
            Value::Native(native) => write!(f, "<built-in function {}>", native.name()),
            Value::Class(class) => write!(f, "<class '{}.{}'>", class.module(), class.qualname()),
            Value::Instance(inst) => write!(f, "<{} object>", inst.class().qualname()),
            Value::BoundMethod(m) => write!(f, "<bound method {}>", m.function().qualname()),
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Generator(g) => write!(f, "<generator {}>", g.function().qualname()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Rc<Function>> for Value {
    fn from(f: Rc<Function>) -> Self {
        Value::Function(f)
    }
}

impl From<Rc<Class>> for Value {
    fn from(c: Rc<Class>) -> Self {
        Value::Class(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_compare_structurally() {
        assert_eq!(Value::Int(3), Value::from(3));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(
            Value::List(vec![Value::None, Value::Bool(true)]),
            Value::List(vec![Value::None, Value::Bool(true)])
        );
    }

    #[test]
    fn classes_compare_by_identity() {
        let a = Class::new("m", "A", Vec::new()).unwrap();
        let b = Class::new("m", "A", Vec::new()).unwrap();
        assert_eq!(Value::Class(a.clone()), Value::Class(a.clone()));
        assert_ne!(Value::Class(a), Value::Class(b));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::None.type_name(), "NoneType");
        assert_eq!(Value::Dict(IndexMap::new()).type_name(), "dict");
        let class = Class::new("m", "Point", Vec::new()).unwrap();
        let inst = Value::Instance(Instance::new(class));
        assert_eq!(inst.type_name(), "Point");
        assert!(!inst.is_callable());
    }
}
