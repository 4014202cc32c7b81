//! Individual resolution strategies.
//!
//! Each strategy is a pure function from the executing code unit and its
//! frame to the function that owns the code, if it can find one. None of
//! them runs traced code: attribute lookups go through
//! [`getattr_static`], which never invokes a property getter.

use std::rc::Rc;

use goldenrun_core::{getattr_static, Attr, CodeUnit, Frame, Function, Value};

/// Signature shared by every strategy.
pub type Strategy = fn(&CodeUnit, &Rc<Frame>) -> Option<Rc<Function>>;

/// Follows `value`'s wrapper chain looking for the function whose code is
/// `code`. Bound methods are looked through to their function.
pub fn has_code(value: &Value, code: &CodeUnit) -> Option<Rc<Function>> {
    let mut current = match value {
        Value::Function(f) => Some(f.clone()),
        Value::BoundMethod(m) => Some(m.function().clone()),
        _ => None,
    };
    while let Some(func) = current {
        if func.code().id() == code.id() {
            return Some(func);
        }
        current = func.wrapped().cloned();
    }
    None
}

/// Looks `code`'s name up statically on `obj` (instance or class, walking
/// the MRO) and checks whether what is found owns `code`.
///
/// Class and static methods are unwrapped to their function; a property
/// is unwrapped to its getter only when it has no setter or deleter.
pub fn func_in_mro(obj: &Value, code: &CodeUnit) -> Option<Rc<Function>> {
    let candidate = match getattr_static(obj, code.name())? {
        Attr::ClassMethod(f) | Attr::StaticMethod(f) => Value::Function(f),
        Attr::Property(prop) if prop.is_plain() => Value::Function(prop.fget?),
        Attr::Property(_) => return None,
        Attr::Value(v) => v,
    };
    has_code(&candidate, code)
}

/// The code's name in its defining module's globals, unwrapping decorators.
pub fn exact_name(code: &CodeUnit, frame: &Rc<Frame>) -> Option<Rc<Function>> {
    let candidate = frame.globals().get(code.name())?;
    has_code(&candidate, code)
}

/// The first bound argument as a receiver: an instance for methods, a
/// class for class methods.
pub fn receiver_mro(code: &CodeUnit, frame: &Rc<Frame>) -> Option<Rc<Function>> {
    if code.argcount() == 0 {
        return None;
    }
    let receiver = frame.local(code.first_param()?)?;
    func_in_mro(&receiver, code)
}

/// Every class bound in the defining module's globals. Catches static
/// methods, which have no receiver.
pub fn module_class_scan(code: &CodeUnit, frame: &Rc<Frame>) -> Option<Rc<Function>> {
    frame
        .globals()
        .classes()
        .into_iter()
        .find_map(|class| func_in_mro(&Value::Class(class), code))
}

/// Callable locals of this frame and every caller. Catches closures
/// defined inside other functions.
pub fn caller_locals_scan(code: &CodeUnit, frame: &Rc<Frame>) -> Option<Rc<Function>> {
    frame.chain().find_map(|f| {
        f.local_values()
            .iter()
            .filter(|v| v.is_callable())
            .find_map(|v| has_code(v, code))
    })
}
