//! The set of functions marked for capture.
//!
//! Marking is done at configuration time, by identity, and never touches the
//! function objects themselves.

use indexmap::{IndexMap, IndexSet};

use goldenrun_core::{CallableIdentity, Function, Runtime, Value};

use crate::error::TraceError;

#[derive(Debug, Clone, Default)]
pub struct CaptureRegistry {
    /// module -> marked qualnames
    marked: IndexMap<String, IndexSet<String>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `module`.`qualname`. Returns `false` if it was already marked.
    pub fn mark(&mut self, module: impl Into<String>, qualname: impl Into<String>) -> bool {
        self.marked
            .entry(module.into())
            .or_default()
            .insert(qualname.into())
    }

    pub fn mark_function(&mut self, function: &Function) -> bool {
        self.mark(function.module(), function.qualname())
    }

    /// Looks up `<module>:<qualname>` in `rt` and marks the function found.
    ///
    /// Lookup failures are returned to the caller, never ignored.
    pub fn mark_path(&mut self, rt: &Runtime, path: &str) -> Result<CallableIdentity, TraceError> {
        let (module, qualname) = path
            .split_once(':')
            .filter(|(m, q)| !m.is_empty() && !q.is_empty())
            .ok_or_else(|| TraceError::InvalidPath(path.to_string()))?;

        match rt.get_name_in_module(module, qualname)? {
            Value::Function(function) => {
                self.mark_function(&function);
                Ok(CallableIdentity::of(&function, true))
            }
            other => Err(TraceError::NotCallable {
                path: path.to_string(),
                type_name: other.type_name().to_string(),
            }),
        }
    }

    pub fn is_marked(&self, module: &str, qualname: &str) -> bool {
        self.marked
            .get(module)
            .is_some_and(|names| names.contains(qualname))
    }

    /// The identity `function` resolves to, with its marker state.
    pub fn identity_of(&self, function: &Function) -> CallableIdentity {
        CallableIdentity::of(function, self.is_marked(function.module(), function.qualname()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.marked
            .iter()
            .flat_map(|(m, names)| names.iter().map(move |q| (m.as_str(), q.as_str())))
    }

    pub fn len(&self) -> usize {
        self.marked.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use goldenrun_core::{CoreError, Module};

    use super::*;

    fn runtime() -> Runtime {
        let module = Module::new("app.models", Some(PathBuf::from("/proj/app/models.py")));
        module.def("save", module.code("save"), |_, _| Ok(Value::None));
        module.set("VERSION", Value::Int(3));
        let mut rt = Runtime::new();
        rt.add_module(module);
        rt
    }

    #[test]
    fn mark_path_marks_the_function() {
        let rt = runtime();
        let mut registry = CaptureRegistry::new();
        let identity = registry.mark_path(&rt, "app.models:save").unwrap();

        assert_eq!(identity, CallableIdentity::new("app.models", "save", true));
        assert!(registry.is_marked("app.models", "save"));
        assert!(!registry.is_marked("app.models", "load"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_failures_surface() {
        let rt = runtime();
        let mut registry = CaptureRegistry::new();

        assert!(matches!(
            registry.mark_path(&rt, "app.models:load"),
            Err(TraceError::Lookup(CoreError::AttributeNotFound { .. }))
        ));
        assert!(matches!(
            registry.mark_path(&rt, "nope:save"),
            Err(TraceError::Lookup(CoreError::ModuleNotFound { .. }))
        ));
        assert!(matches!(
            registry.mark_path(&rt, "app.models.save"),
            Err(TraceError::InvalidPath(_))
        ));
        assert!(matches!(
            registry.mark_path(&rt, "app.models:VERSION"),
            Err(TraceError::NotCallable { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut registry = CaptureRegistry::new();
        assert!(registry.mark("m", "f"));
        assert!(!registry.mark("m", "f"));
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![("m", "f")]);
    }
}
