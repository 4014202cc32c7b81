//! Callables, classes and instances.
//!
//! A [`Function`] pairs a [`CodeUnit`] with the Rust closure that executes it,
//! plus the module/qualname identity it was defined under. Decorators are
//! modelled as wrapper functions whose [`wrapped`](Function::wrapped) link
//! points at the function they forward to, so the chain can be peeled back
//! to the function that owns a given code unit.
//!
//! A [`Class`] stores its attributes in declaration order and linearizes its
//! bases with C3, the same order attribute lookup walks.
//!
//! [`getattr_static`] looks attributes up without running any property
//! getter: it is the side-effect-free lookup the identity resolver relies on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::code::CodeUnit;
use crate::error::{CoreError, Fault};
use crate::frame::Frame;
use crate::runtime::{Args, Runtime};
use crate::value::Value;

/// Executes a plain function body against its frame.
pub type Body = Rc<dyn Fn(&mut Runtime, &Rc<Frame>) -> Result<Value, Fault>>;

/// Executes one resumption of a generator body. The `usize` is the number of
/// times the generator has been resumed before.
pub type GeneratorBody = Rc<dyn Fn(&mut Runtime, &Rc<Frame>, usize) -> Result<GeneratorStep, Fault>>;

/// Host implementation of a builtin.
pub type NativeBody = Rc<dyn Fn(&mut Runtime, Args) -> Result<Value, Fault>>;

/// Outcome of one generator resumption.
#[derive(Debug, Clone)]
pub enum GeneratorStep {
    /// Suspend, handing a value to the resumer.
    Yield(Value),
    /// Finish with a final value.
    Return(Value),
}

#[derive(Clone)]
pub enum FunctionBody {
    Plain(Body),
    Generator(GeneratorBody),
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// A user-defined function.
pub struct Function {
    module: String,
    qualname: String,
    code: Rc<CodeUnit>,
    body: FunctionBody,
    wrapped: Option<Rc<Function>>,
}

impl Function {
    /// Defines a plain function.
    pub fn new<F>(
        module: impl Into<String>,
        qualname: impl Into<String>,
        code: CodeUnit,
        body: F,
    ) -> Rc<Self>
    where
        F: Fn(&mut Runtime, &Rc<Frame>) -> Result<Value, Fault> + 'static,
    {
        Rc::new(Function {
            module: module.into(),
            qualname: qualname.into(),
            code: Rc::new(code),
            body: FunctionBody::Plain(Rc::new(body)),
            wrapped: None,
        })
    }

    /// Defines a generator function. Calling it creates a suspended
    /// generator; the body runs on each [`Runtime::next`].
    pub fn generator<F>(
        module: impl Into<String>,
        qualname: impl Into<String>,
        code: CodeUnit,
        body: F,
    ) -> Rc<Self>
    where
        F: Fn(&mut Runtime, &Rc<Frame>, usize) -> Result<GeneratorStep, Fault> + 'static,
    {
        Rc::new(Function {
            module: module.into(),
            qualname: qualname.into(),
            code: Rc::new(code),
            body: FunctionBody::Generator(Rc::new(body)),
            wrapped: None,
        })
    }

    /// Wraps `inner` the way a decorator does: the wrapper copies the inner
    /// function's module and qualname, links back to it, and forwards every
    /// argument it receives.
    ///
    /// `code` should declare collector parameters (`with_varargs` /
    /// `with_varkw`) so that any call shape can be forwarded.
    pub fn wraps(inner: &Rc<Function>, code: CodeUnit) -> Rc<Self> {
        let target = Value::Function(inner.clone());
        Self::wraps_with(inner, code, move |rt, frame| {
            rt.call(&target, frame.forwarded_args())
        })
    }

    /// Like [`Function::wraps`] with a custom wrapper body.
    pub fn wraps_with<F>(inner: &Rc<Function>, code: CodeUnit, body: F) -> Rc<Self>
    where
        F: Fn(&mut Runtime, &Rc<Frame>) -> Result<Value, Fault> + 'static,
    {
        Rc::new(Function {
            module: inner.module.clone(),
            qualname: inner.qualname.clone(),
            code: Rc::new(code),
            body: FunctionBody::Plain(Rc::new(body)),
            wrapped: Some(inner.clone()),
        })
    }

    /// Name of the defining module.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Dotted path from the module to this function (e.g. `Outer.method`).
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// `module.qualname`.
    pub fn funcname(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }

    pub fn code(&self) -> &CodeUnit {
        &self.code
    }

    pub fn code_rc(&self) -> &Rc<CodeUnit> {
        &self.code
    }

    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    /// The function this one forwards to, if it is a wrapper.
    pub fn wrapped(&self) -> Option<&Rc<Function>> {
        self.wrapped.as_ref()
    }

    pub fn is_generator(&self) -> bool {
        matches!(self.body, FunctionBody::Generator(_))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .field("code", &self.code.id())
            .field("wrapped", &self.wrapped.as_ref().map(|w| w.code.id()))
            .finish()
    }
}

/// A builtin implemented by the host. Calls to it produce native events,
/// never frames.
pub struct NativeFunction {
    name: String,
    func: NativeBody,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Rc<Self>
    where
        F: Fn(&mut Runtime, Args) -> Result<Value, Fault> + 'static,
    {
        Rc::new(NativeFunction {
            name: name.into(),
            func: Rc::new(func),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn func(&self) -> &NativeBody {
        &self.func
    }
}

/// A function bound to a receiver (instance or class).
#[derive(Debug)]
pub struct BoundMethod {
    receiver: Value,
    function: Rc<Function>,
}

impl BoundMethod {
    pub fn new(receiver: Value, function: Rc<Function>) -> Rc<Self> {
        Rc::new(BoundMethod { receiver, function })
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

/// Read-only view over a property's accessor functions.
#[derive(Debug, Clone, Default)]
pub struct Property {
    pub fget: Option<Rc<Function>>,
    pub fset: Option<Rc<Function>>,
    pub fdel: Option<Rc<Function>>,
}

impl Property {
    /// A getter-only property.
    pub fn getter(fget: Rc<Function>) -> Self {
        Property {
            fget: Some(fget),
            fset: None,
            fdel: None,
        }
    }

    /// `true` when the property has a getter and nothing else.
    pub fn is_plain(&self) -> bool {
        self.fget.is_some() && self.fset.is_none() && self.fdel.is_none()
    }
}

/// A class attribute as stored, before any descriptor binding.
#[derive(Debug, Clone)]
pub enum Attr {
    /// Plain value; functions stored here become instance methods.
    Value(Value),
    ClassMethod(Rc<Function>),
    StaticMethod(Rc<Function>),
    Property(Property),
}

/// A class with single or multiple inheritance.
pub struct Class {
    module: String,
    qualname: String,
    bases: Vec<Rc<Class>>,
    /// C3 linearization of the bases (this class excluded).
    mro_tail: Vec<Rc<Class>>,
    attrs: RefCell<IndexMap<String, Attr>>,
}

impl Class {
    /// Creates a class, computing its method resolution order.
    ///
    /// Returns [`CoreError::InconsistentMro`] when the bases cannot be
    /// linearized.
    pub fn new(
        module: impl Into<String>,
        qualname: impl Into<String>,
        bases: Vec<Rc<Class>>,
    ) -> Result<Rc<Self>, CoreError> {
        let qualname = qualname.into();
        let mut sequences: Vec<Vec<Rc<Class>>> = bases.iter().map(|b| b.mro()).collect();
        sequences.push(bases.clone());
        let mro_tail = c3_merge(sequences).ok_or_else(|| CoreError::InconsistentMro {
            class: qualname.clone(),
        })?;

        Ok(Rc::new(Class {
            module: module.into(),
            qualname,
            bases,
            mro_tail,
            attrs: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Last component of the qualname.
    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }

    pub fn bases(&self) -> &[Rc<Class>] {
        &self.bases
    }

    /// This class followed by its linearized ancestors.
    pub fn mro(self: &Rc<Self>) -> Vec<Rc<Class>> {
        let mut mro = Vec::with_capacity(self.mro_tail.len() + 1);
        mro.push(self.clone());
        mro.extend(self.mro_tail.iter().cloned());
        mro
    }

    pub fn set_attr(&self, name: impl Into<String>, attr: Attr) {
        self.attrs.borrow_mut().insert(name.into(), attr);
    }

    /// Adds an instance method under the function's code name.
    pub fn add_method(&self, function: Rc<Function>) {
        let name = function.code().name().to_string();
        self.set_attr(name, Attr::Value(Value::Function(function)));
    }

    pub fn add_classmethod(&self, function: Rc<Function>) {
        let name = function.code().name().to_string();
        self.set_attr(name, Attr::ClassMethod(function));
    }

    pub fn add_staticmethod(&self, function: Rc<Function>) {
        let name = function.code().name().to_string();
        self.set_attr(name, Attr::StaticMethod(function));
    }

    /// Attribute defined directly on this class.
    pub fn own_attr(&self, name: &str) -> Option<Attr> {
        self.attrs.borrow().get(name).cloned()
    }

    /// Attribute lookup along the MRO, without descriptor binding.
    pub fn lookup(self: &Rc<Self>, name: &str) -> Option<Attr> {
        if let Some(attr) = self.own_attr(name) {
            return Some(attr);
        }
        self.mro_tail.iter().find_map(|class| class.own_attr(name))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .field("bases", &self.bases.iter().map(|b| b.qualname()).collect::<Vec<_>>())
            .finish()
    }
}

/// C3 merge: repeatedly take the first head that appears in no tail.
fn c3_merge(mut sequences: Vec<Vec<Rc<Class>>>) -> Option<Vec<Rc<Class>>> {
    let mut result: Vec<Rc<Class>> = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }

        let head = sequences
            .iter()
            .map(|seq| &seq[0])
            .find(|candidate| {
                !sequences
                    .iter()
                    .any(|seq| seq[1..].iter().any(|c| Rc::ptr_eq(c, candidate)))
            })
            .cloned()?;

        for seq in sequences.iter_mut() {
            if Rc::ptr_eq(&seq[0], &head) {
                seq.remove(0);
            }
        }
        result.push(head);
    }
}

/// An instance of a class with mutable fields.
pub struct Instance {
    class: Rc<Class>,
    fields: RefCell<IndexMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Rc<Self> {
        Rc::new(Instance {
            class,
            fields: RefCell::new(IndexMap::new()),
        })
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.fields.borrow_mut().insert(name.into(), value);
    }

    /// Copy of the fields in assignment order.
    pub fn fields(&self) -> IndexMap<String, Value> {
        self.fields.borrow().clone()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.qualname())
            .field("fields", &self.fields.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Looks `name` up on `obj` without invoking descriptors.
///
/// Instances check their own fields first, then their class's MRO; classes
/// walk their MRO; modules read their globals. Any other value has no
/// statically visible attributes.
pub fn getattr_static(obj: &Value, name: &str) -> Option<Attr> {
    match obj {
        Value::Instance(inst) => inst
            .get(name)
            .map(Attr::Value)
            .or_else(|| inst.class().lookup(name)),
        Value::Class(class) => class.lookup(name),
        Value::Module(module) => module.get(name).map(Attr::Value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, bases: Vec<Rc<Class>>) -> Rc<Class> {
        Class::new("shapes", name, bases).unwrap()
    }

    fn qualnames(mro: &[Rc<Class>]) -> Vec<&str> {
        mro.iter().map(|c| c.qualname()).collect()
    }

    #[test]
    fn diamond_mro_is_c3() {
        let o = class("O", vec![]);
        let a = class("A", vec![o.clone()]);
        let b = class("B", vec![o.clone()]);
        let c = class("C", vec![a, b]);
        assert_eq!(qualnames(&c.mro()), vec!["C", "A", "B", "O"]);
    }

    #[test]
    fn inconsistent_bases_are_rejected() {
        let x = class("X", vec![]);
        let y = class("Y", vec![x.clone()]);
        let err = Class::new("shapes", "Z", vec![x, y]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InconsistentMro {
                class: "Z".into()
            }
        );
    }

    #[test]
    fn lookup_prefers_nearest_class() {
        let base = class("Base", vec![]);
        let derived = class("Derived", vec![base.clone()]);
        base.set_attr("kind", Attr::Value(Value::from("base")));
        base.set_attr("only_base", Attr::Value(Value::Int(1)));
        derived.set_attr("kind", Attr::Value(Value::from("derived")));

        match derived.lookup("kind") {
            Some(Attr::Value(v)) => assert_eq!(v, Value::from("derived")),
            other => panic!("unexpected lookup result: {:?}", other),
        }
        assert!(derived.lookup("only_base").is_some());
        assert!(derived.lookup("missing").is_none());
    }

    #[test]
    fn getattr_static_reads_instance_fields_first() {
        let point = class("Point", vec![]);
        point.set_attr("x", Attr::Value(Value::Int(0)));
        let inst = Instance::new(point);
        inst.set("x", Value::Int(5));

        match getattr_static(&Value::Instance(inst), "x") {
            Some(Attr::Value(v)) => assert_eq!(v, Value::Int(5)),
            other => panic!("unexpected lookup result: {:?}", other),
        }
        assert!(getattr_static(&Value::Int(3), "x").is_none());
    }

    #[test]
    fn wrapper_copies_identity_and_links_inner() {
        let inner = Function::new(
            "app",
            "handler",
            CodeUnit::new("handler", None).with_params(["x"]),
            |_, _| Ok(Value::None),
        );
        let wrapper = Function::wraps(
            &inner,
            CodeUnit::new("wrapper", None)
                .with_varargs("args")
                .with_varkw("kwargs"),
        );
        assert_eq!(wrapper.qualname(), "handler");
        assert_eq!(wrapper.module(), "app");
        assert_eq!(wrapper.wrapped().unwrap().code().id(), inner.code().id());
        assert_ne!(wrapper.code().id(), inner.code().id());
    }

    #[test]
    fn plain_property_detection() {
        let getter = Function::new("m", "C.area", CodeUnit::new("area", None), |_, _| {
            Ok(Value::None)
        });
        let plain = Property::getter(getter.clone());
        assert!(plain.is_plain());
        let with_setter = Property {
            fset: Some(getter),
            ..plain.clone()
        };
        assert!(!with_setter.is_plain());
    }
}
