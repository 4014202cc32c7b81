//! Execution frames: one per active invocation.
//!
//! A [`Frame`] records the code being executed, the defining module's
//! globals, the local bindings (parameters are bound before the call event
//! fires), a link to the caller, and the last instruction executed. The last
//! instruction is what lets an observer tell a normal return from a
//! generator suspension or an exception unwinding the frame.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::code::CodeUnit;
use crate::id::FrameId;
use crate::module::Module;
use crate::runtime::Args;
use crate::value::Value;

/// The last instruction a frame executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// The frame has been entered and has not left yet.
    Start,
    ReturnValue,
    YieldValue,
    /// The frame is unwinding because of a fault.
    Raise,
}

/// How a frame left, as seen at its return event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Normal,
    Suspend,
    Exceptional,
}

impl ExitKind {
    pub fn classify(last: Instruction) -> Self {
        match last {
            Instruction::ReturnValue => ExitKind::Normal,
            Instruction::YieldValue => ExitKind::Suspend,
            Instruction::Start | Instruction::Raise => ExitKind::Exceptional,
        }
    }
}

/// State of one active invocation.
pub struct Frame {
    id: FrameId,
    code: Rc<CodeUnit>,
    globals: Rc<Module>,
    locals: RefCell<IndexMap<String, Value>>,
    back: RefCell<Option<Rc<Frame>>>,
    last_instruction: Cell<Instruction>,
}

impl Frame {
    pub(crate) fn new(
        id: FrameId,
        code: Rc<CodeUnit>,
        globals: Rc<Module>,
        locals: IndexMap<String, Value>,
        back: Option<Rc<Frame>>,
    ) -> Self {
        Frame {
            id,
            code,
            globals,
            locals: RefCell::new(locals),
            back: RefCell::new(back),
            last_instruction: Cell::new(Instruction::Start),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn code(&self) -> &CodeUnit {
        &self.code
    }

    /// The defining module's namespace.
    pub fn globals(&self) -> &Rc<Module> {
        &self.globals
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.borrow().get(name).cloned()
    }

    /// Binds a local variable. Function bodies use this to expose
    /// intermediate values (closures, objects) to callees further down.
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.locals.borrow_mut().insert(name.into(), value);
    }

    /// Copy of all local values, in binding order.
    pub fn local_values(&self) -> Vec<Value> {
        self.locals.borrow().values().cloned().collect()
    }

    /// The calling frame. A suspended generator has none.
    pub fn back(&self) -> Option<Rc<Frame>> {
        self.back.borrow().clone()
    }

    pub(crate) fn set_back(&self, back: Option<Rc<Frame>>) {
        *self.back.borrow_mut() = back;
    }

    pub fn last_instruction(&self) -> Instruction {
        self.last_instruction.get()
    }

    pub(crate) fn set_last_instruction(&self, instruction: Instruction) {
        self.last_instruction.set(instruction);
    }

    pub fn exit_kind(&self) -> ExitKind {
        ExitKind::classify(self.last_instruction())
    }

    /// This frame followed by each caller, innermost first.
    pub fn chain(self: &Rc<Self>) -> FrameChain {
        FrameChain {
            next: Some(self.clone()),
        }
    }

    /// Rebuilds the argument list this frame was entered with, so a wrapper
    /// can forward it unchanged.
    pub fn forwarded_args(&self) -> Args {
        let locals = self.locals.borrow();
        let mut positional: Vec<Value> = self
            .code
            .params()
            .iter()
            .filter_map(|p| locals.get(p).cloned())
            .collect();
        if let Some(Value::List(extra)) = self.code.varargs().and_then(|n| locals.get(n)) {
            positional.extend(extra.iter().cloned());
        }

        let mut keywords: IndexMap<String, Value> = self
            .code
            .kwonly()
            .iter()
            .filter_map(|k| locals.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        if let Some(Value::Dict(extra)) = self.code.varkw().and_then(|n| locals.get(n)) {
            keywords.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Args {
            positional,
            keywords,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("code", &self.code.name())
            .field("module", &self.globals.name())
            .field("last_instruction", &self.last_instruction.get())
            .finish()
    }
}

/// Iterator over a frame and its callers.
pub struct FrameChain {
    next: Option<Rc<Frame>>,
}

impl Iterator for FrameChain {
    type Item = Rc<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.back();
        Some(current)
    }
}
