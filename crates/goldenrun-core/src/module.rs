//! Modules: named global namespaces with a source location.
//!
//! A [`Module`] owns the globals that functions defined in it see at call
//! time. Its filename is stamped on the code units it creates, which is
//! what the code filter later inspects.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::code::CodeUnit;
use crate::error::{CoreError, Fault};
use crate::frame::Frame;
use crate::object::{Class, Function, GeneratorStep};
use crate::runtime::Runtime;
use crate::value::Value;

/// A module namespace.
pub struct Module {
    name: String,
    filename: Option<PathBuf>,
    globals: RefCell<IndexMap<String, Value>>,
}

impl Module {
    pub fn new(name: impl Into<String>, filename: Option<PathBuf>) -> Rc<Self> {
        Rc::new(Module {
            name: name.into(),
            filename,
            globals: RefCell::new(IndexMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.globals.borrow_mut().insert(name.into(), value);
    }

    /// Copy of every global value, in definition order.
    pub fn values(&self) -> Vec<Value> {
        self.globals.borrow().values().cloned().collect()
    }

    /// Every class bound at module level.
    pub fn classes(&self) -> Vec<Rc<Class>> {
        self.globals
            .borrow()
            .values()
            .filter_map(|v| v.as_class().cloned())
            .collect()
    }

    /// A code unit located in this module's source file.
    pub fn code(&self, name: impl Into<String>) -> CodeUnit {
        CodeUnit::new(name, self.filename.clone())
    }

    /// Defines a plain function in this module.
    ///
    /// Top-level qualnames (no dot) are also bound as globals; nested ones
    /// (methods, closures) are left for the caller to place.
    pub fn def<F>(&self, qualname: &str, code: CodeUnit, body: F) -> Rc<Function>
    where
        F: Fn(&mut Runtime, &Rc<Frame>) -> Result<Value, Fault> + 'static,
    {
        let function = Function::new(self.name.clone(), qualname, code, body);
        self.bind_top_level(qualname, Value::Function(function.clone()));
        function
    }

    /// Defines a generator function in this module. Binding follows
    /// [`Module::def`].
    pub fn def_generator<F>(&self, qualname: &str, code: CodeUnit, body: F) -> Rc<Function>
    where
        F: Fn(&mut Runtime, &Rc<Frame>, usize) -> Result<GeneratorStep, Fault> + 'static,
    {
        let function = Function::generator(self.name.clone(), qualname, code, body);
        self.bind_top_level(qualname, Value::Function(function.clone()));
        function
    }

    /// Defines a class in this module. Binding follows [`Module::def`].
    pub fn def_class(&self, qualname: &str, bases: Vec<Rc<Class>>) -> Result<Rc<Class>, CoreError> {
        let class = Class::new(self.name.clone(), qualname, bases)?;
        self.bind_top_level(qualname, Value::Class(class.clone()));
        Ok(class)
    }

    fn bind_top_level(&self, qualname: &str, value: Value) {
        if !qualname.contains('.') {
            self.set(qualname, value);
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("globals", &self.globals.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
