//! The runtime: module table, call stack, and the call-event adapter.
//!
//! [`Runtime`] executes [`Function`] bodies and reports each invocation to
//! an installed [`CallHook`] as a pair of [`CallEvent`]s:
//!
//! - `Call` fires after the frame is created and its parameters are bound,
//!   before the body runs.
//! - `Return` fires after the body finishes, with the returned (or yielded)
//!   value, or with no value when the body raised. The frame's
//!   [`last_instruction`](Frame::last_instruction) tells the three apart.
//!
//! Calls into host builtins produce `NativeCall` / `NativeReturn` against
//! the caller's frame instead. Generators allocate their frame when called
//! and emit a fresh `Call`/`Return` pair against that same frame on every
//! resumption.
//!
//! Only one hook is installed at a time; [`Runtime::set_profile`] returns
//! the previous one so a scoped session can restore it.

use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::code::CodeUnit;
use crate::error::{CoreError, Fault};
use crate::frame::{Frame, Instruction};
use crate::id::FrameId;
use crate::module::Module;
use crate::object::{
    getattr_static, Attr, BoundMethod, Function, FunctionBody, GeneratorStep, Instance, Property,
};
use crate::value::Value;

/// Maximum call depth before a `RecursionError` fault is raised.
pub const MAX_CALL_DEPTH: usize = 1000;

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Positional and keyword arguments for one call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: IndexMap<String, Value>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Args {
            positional,
            keywords: IndexMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a keyword argument.
    pub fn kw(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.insert(name.into(), value);
        self
    }

    fn with_receiver(mut self, receiver: Value) -> Self {
        self.positional.insert(0, receiver);
        self
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Args::new(positional)
    }
}

/// Binds `args` to the parameters declared by `code`.
fn bind(code: &CodeUnit, args: Args) -> Result<IndexMap<String, Value>, Fault> {
    let Args {
        positional,
        keywords,
    } = args;
    let mut locals = IndexMap::new();
    let mut extra = Vec::new();

    for (index, value) in positional.into_iter().enumerate() {
        match code.params().get(index) {
            Some(name) => {
                locals.insert(name.clone(), value);
            }
            None => extra.push(value),
        }
    }
    if !extra.is_empty() && code.varargs().is_none() {
        return Err(Fault::Type(format!(
            "{}() takes {} positional arguments but {} were given",
            code.name(),
            code.argcount(),
            code.argcount() + extra.len()
        )));
    }

    let mut extra_keywords = IndexMap::new();
    for (name, value) in keywords {
        if code.declared_params().any(|p| p == name) {
            if locals.contains_key(&name) {
                return Err(Fault::Type(format!(
                    "{}() got multiple values for argument '{}'",
                    code.name(),
                    name
                )));
            }
            locals.insert(name, value);
        } else if code.varkw().is_some() {
            extra_keywords.insert(name, value);
        } else {
            return Err(Fault::Type(format!(
                "{}() got an unexpected keyword argument '{}'",
                code.name(),
                name
            )));
        }
    }

    let missing: Vec<&str> = code
        .declared_params()
        .filter(|p| !locals.contains_key(*p))
        .collect();
    if !missing.is_empty() {
        return Err(Fault::Type(format!(
            "{}() missing required arguments: {}",
            code.name(),
            missing.join(", ")
        )));
    }

    if let Some(name) = code.varargs() {
        locals.insert(name.to_string(), Value::List(extra));
    }
    if let Some(name) = code.varkw() {
        locals.insert(name.to_string(), Value::Dict(extra_keywords));
    }
    Ok(locals)
}

// ---------------------------------------------------------------------------
// Call-event adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Call,
    Return,
    NativeCall,
    NativeReturn,
}

/// One call or return notification.
#[derive(Debug)]
pub struct CallEvent<'a> {
    kind: EventKind,
    frame: &'a Rc<Frame>,
    arg: Option<&'a Value>,
}

impl<'a> CallEvent<'a> {
    pub fn new(kind: EventKind, frame: &'a Rc<Frame>, arg: Option<&'a Value>) -> Self {
        CallEvent { kind, frame, arg }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// For `Call`/`Return`, the invoked frame. For native events, the
    /// caller's frame.
    pub fn frame(&self) -> &'a Rc<Frame> {
        self.frame
    }

    pub fn code(&self) -> &'a CodeUnit {
        self.frame.code()
    }

    /// On `Return`, the returned or yielded value (`None` when the frame
    /// raised). On native events, the builtin being called.
    pub fn arg(&self) -> Option<&'a Value> {
        self.arg
    }
}

/// Observer installed with [`Runtime::set_profile`].
pub trait CallHook {
    fn on_event(&self, event: &CallEvent<'_>);
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// A suspended generator: its function, its persistent frame, and how far
/// it has run.
pub struct Generator {
    function: Rc<Function>,
    frame: Rc<Frame>,
    resumed: Cell<usize>,
    running: Cell<bool>,
    finished: Cell<bool>,
}

impl Generator {
    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }

    pub fn frame(&self) -> &Rc<Frame> {
        &self.frame
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("function", &self.function.qualname())
            .field("resumed", &self.resumed.get())
            .field("finished", &self.finished.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Single-threaded interpreter state.
#[derive(Default)]
pub struct Runtime {
    modules: IndexMap<String, Rc<Module>>,
    library_roots: Vec<PathBuf>,
    stack: Vec<Rc<Frame>>,
    profile: Option<Rc<dyn CallHook>>,
    next_frame_id: u64,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a directory holding installed (standard or third-party)
    /// library code.
    pub fn with_library_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.library_roots.push(root.into());
        self
    }

    pub fn library_roots(&self) -> &[PathBuf] {
        &self.library_roots
    }

    pub fn add_library_root(&mut self, root: impl AsRef<Path>) {
        self.library_roots.push(root.as_ref().to_path_buf());
    }

    /// Registers (or replaces) a module under its name.
    pub fn add_module(&mut self, module: Rc<Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Rc<Module>> {
        self.modules.values()
    }

    /// Resolves `qualname` inside `module` by static attribute lookup.
    ///
    /// Class and static methods resolve to their underlying function, and a
    /// property to its getter. Nothing is executed.
    pub fn get_name_in_module(&self, module: &str, qualname: &str) -> Result<Value, CoreError> {
        let root = self.module(module).ok_or_else(|| CoreError::ModuleNotFound {
            module: module.to_string(),
        })?;

        let mut current = Value::Module(root);
        let mut walked: Vec<&str> = Vec::new();
        for part in qualname.split('.') {
            walked.push(part);
            current = match getattr_static(&current, part) {
                Some(Attr::Value(value)) => value,
                Some(Attr::ClassMethod(f)) | Some(Attr::StaticMethod(f)) => Value::Function(f),
                Some(Attr::Property(Property { fget: Some(f), .. })) => Value::Function(f),
                Some(Attr::Property(_)) | None => {
                    return Err(CoreError::AttributeNotFound {
                        module: module.to_string(),
                        path: walked.join("."),
                    })
                }
            };
        }
        Ok(current)
    }

    /// Installs `hook`, returning whichever hook it replaced.
    pub fn set_profile(&mut self, hook: Option<Rc<dyn CallHook>>) -> Option<Rc<dyn CallHook>> {
        std::mem::replace(&mut self.profile, hook)
    }

    pub fn profile(&self) -> Option<Rc<dyn CallHook>> {
        self.profile.clone()
    }

    pub fn current_frame(&self) -> Option<Rc<Frame>> {
        self.stack.last().cloned()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Calls `callee`.
    ///
    /// Faults raised by the callee are returned exactly as raised.
    pub fn call(&mut self, callee: &Value, args: Args) -> Result<Value, Fault> {
        match callee {
            Value::Function(function) => self.invoke(function, args),
            Value::BoundMethod(method) => {
                let args = args.with_receiver(method.receiver().clone());
                self.invoke(method.function(), args)
            }
            Value::Class(class) => {
                let instance = Value::Instance(Instance::new(class.clone()));
                if let Some(Attr::Value(Value::Function(init))) = class.lookup("__init__") {
                    self.invoke(&init, args.with_receiver(instance.clone()))?;
                }
                Ok(instance)
            }
            Value::Native(native) => {
                let caller = self.current_frame();
                if let Some(frame) = &caller {
                    self.dispatch(EventKind::NativeCall, frame, Some(callee));
                }
                let func = native.func().clone();
                let result = func(self, args);
                if let Some(frame) = &caller {
                    self.dispatch(EventKind::NativeReturn, frame, Some(callee));
                }
                result
            }
            other => Err(Fault::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Attribute access with descriptor binding, as traced code sees it.
    ///
    /// Unlike [`getattr_static`], this runs property getters.
    pub fn getattr(&mut self, obj: &Value, name: &str) -> Result<Value, Fault> {
        let missing = || Fault::Attribute {
            type_name: obj.type_name().to_string(),
            name: name.to_string(),
        };
        match obj {
            Value::Instance(inst) => {
                if let Some(value) = inst.get(name) {
                    return Ok(value);
                }
                match inst.class().lookup(name) {
                    Some(Attr::Value(Value::Function(f))) => {
                        Ok(Value::BoundMethod(BoundMethod::new(obj.clone(), f)))
                    }
                    Some(Attr::Value(value)) => Ok(value),
                    Some(Attr::ClassMethod(f)) => Ok(Value::BoundMethod(BoundMethod::new(
                        Value::Class(inst.class().clone()),
                        f,
                    ))),
                    Some(Attr::StaticMethod(f)) => Ok(Value::Function(f)),
                    Some(Attr::Property(Property { fget: Some(fget), .. })) => {
                        self.invoke(&fget, Args::new(vec![obj.clone()]))
                    }
                    Some(Attr::Property(_)) | None => Err(missing()),
                }
            }
            Value::Class(class) => match class.lookup(name) {
                Some(Attr::Value(value)) => Ok(value),
                Some(Attr::ClassMethod(f)) => {
                    Ok(Value::BoundMethod(BoundMethod::new(obj.clone(), f)))
                }
                Some(Attr::StaticMethod(f)) => Ok(Value::Function(f)),
                Some(Attr::Property(_)) | None => Err(missing()),
            },
            Value::Module(module) => module.get(name).ok_or_else(missing),
            _ => Err(missing()),
        }
    }

    /// `obj.name(*args)`.
    pub fn call_method(&mut self, obj: &Value, name: &str, args: Args) -> Result<Value, Fault> {
        let method = self.getattr(obj, name)?;
        self.call(&method, args)
    }

    /// Resumes a generator. Returns `Ok(None)` once it is exhausted.
    pub fn next(&mut self, generator: &Value) -> Result<Option<Value>, Fault> {
        let generator = match generator {
            Value::Generator(g) => g.clone(),
            other => {
                return Err(Fault::Type(format!(
                    "'{}' object is not an iterator",
                    other.type_name()
                )))
            }
        };
        if generator.finished.get() {
            return Ok(None);
        }
        if generator.running.get() {
            return Err(Fault::raised("ValueError", "generator already executing"));
        }
        let body = match generator.function.body() {
            FunctionBody::Generator(body) => body.clone(),
            FunctionBody::Plain(_) => {
                return Err(Fault::Type(format!(
                    "{}() is not a generator function",
                    generator.function.qualname()
                )))
            }
        };
        self.check_depth()?;

        let frame = generator.frame.clone();
        frame.set_back(self.current_frame());
        frame.set_last_instruction(Instruction::Start);
        self.stack.push(frame.clone());
        generator.running.set(true);
        self.dispatch(EventKind::Call, &frame, None);

        let resumed = generator.resumed.get();
        let outcome = body(self, &frame, resumed);
        generator.running.set(false);
        generator.resumed.set(resumed + 1);

        let result = match outcome {
            Ok(GeneratorStep::Yield(value)) => {
                frame.set_last_instruction(Instruction::YieldValue);
                self.dispatch(EventKind::Return, &frame, Some(&value));
                Ok(Some(value))
            }
            Ok(GeneratorStep::Return(value)) => {
                generator.finished.set(true);
                frame.set_last_instruction(Instruction::ReturnValue);
                self.dispatch(EventKind::Return, &frame, Some(&value));
                Ok(None)
            }
            Err(fault) => {
                generator.finished.set(true);
                frame.set_last_instruction(Instruction::Raise);
                self.dispatch(EventKind::Return, &frame, None);
                Err(fault)
            }
        };

        self.stack.pop();
        // A suspended frame must not keep its resumer alive.
        frame.set_back(None);
        result
    }

    /// Drains a generator into a vector.
    pub fn collect(&mut self, generator: &Value) -> Result<Vec<Value>, Fault> {
        let mut items = Vec::new();
        while let Some(item) = self.next(generator)? {
            items.push(item);
        }
        Ok(items)
    }

    fn invoke(&mut self, function: &Rc<Function>, args: Args) -> Result<Value, Fault> {
        let globals = self
            .module(function.module())
            .ok_or_else(|| Fault::Import(function.module().to_string()))?;
        let locals = bind(function.code(), args)?;

        let body = match function.body() {
            FunctionBody::Plain(body) => body.clone(),
            FunctionBody::Generator(_) => {
                let frame = Rc::new(Frame::new(
                    self.alloc_frame_id(),
                    function.code_rc().clone(),
                    globals,
                    locals,
                    None,
                ));
                return Ok(Value::Generator(Rc::new(Generator {
                    function: function.clone(),
                    frame,
                    resumed: Cell::new(0),
                    running: Cell::new(false),
                    finished: Cell::new(false),
                })));
            }
        };

        self.check_depth()?;
        let frame = Rc::new(Frame::new(
            self.alloc_frame_id(),
            function.code_rc().clone(),
            globals,
            locals,
            self.current_frame(),
        ));
        self.stack.push(frame.clone());
        self.dispatch(EventKind::Call, &frame, None);

        let result = body(self, &frame);
        match &result {
            Ok(_) => frame.set_last_instruction(Instruction::ReturnValue),
            Err(_) => frame.set_last_instruction(Instruction::Raise),
        }
        self.dispatch(EventKind::Return, &frame, result.as_ref().ok());
        self.stack.pop();
        result
    }

    fn dispatch(&self, kind: EventKind, frame: &Rc<Frame>, arg: Option<&Value>) {
        if let Some(hook) = self.profile.clone() {
            hook.on_event(&CallEvent::new(kind, frame, arg));
        }
    }

    fn check_depth(&self) -> Result<(), Fault> {
        if self.stack.len() >= MAX_CALL_DEPTH {
            return Err(Fault::raised(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        Ok(())
    }

    fn alloc_frame_id(&mut self) -> FrameId {
        self.next_frame_id += 1;
        FrameId(self.next_frame_id)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("library_roots", &self.library_roots)
            .field("depth", &self.stack.len())
            .field("profiled", &self.profile.is_some())
            .finish()
    }
}
