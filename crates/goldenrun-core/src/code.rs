//! Code units: the immutable identity of a compiled function body.
//!
//! A [`CodeUnit`] carries the body's name, its source location and its
//! parameter layout. It is shared (via `Rc`) by the [`Function`] that owns it,
//! by every wrapper that forwards to that function, and by every
//! [`Frame`](crate::frame::Frame) executing it.
//!
//! [`Function`]: crate::object::Function

use std::path::{Path, PathBuf};

use crate::id::CodeId;

/// Immutable description of a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    id: CodeId,
    name: String,
    filename: Option<PathBuf>,
    params: Vec<String>,
    kwonly: Vec<String>,
    varargs: Option<String>,
    varkw: Option<String>,
}

impl CodeUnit {
    /// Creates a code unit with no parameters and a fresh [`CodeId`].
    ///
    /// `filename` is `None` for synthetic code (builtins, generated code).
    pub fn new(name: impl Into<String>, filename: Option<PathBuf>) -> Self {
        CodeUnit {
            id: CodeId::next(),
            name: name.into(),
            filename,
            params: Vec::new(),
            kwonly: Vec::new(),
            varargs: None,
            varkw: None,
        }
    }

    /// Sets the positional parameter names, in declaration order.
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the keyword-only parameter names.
    pub fn with_kwonly<I, S>(mut self, kwonly: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kwonly = kwonly.into_iter().map(Into::into).collect();
        self
    }

    /// Collects surplus positional arguments into a list bound to `name`.
    pub fn with_varargs(mut self, name: impl Into<String>) -> Self {
        self.varargs = Some(name.into());
        self
    }

    /// Collects surplus keyword arguments into a dict bound to `name`.
    pub fn with_varkw(mut self, name: impl Into<String>) -> Self {
        self.varkw = Some(name.into());
        self
    }

    pub fn id(&self) -> CodeId {
        self.id
    }

    /// The declared name of the body (the last component of its qualname).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Returns `true` if the code has a real source location.
    ///
    /// Synthetic code has no filename or a bracketed pseudo-name such as
    /// `<string>`.
    pub fn has_source(&self) -> bool {
        match &self.filename {
            None => false,
            Some(path) => {
                let text = path.to_string_lossy();
                !text.is_empty() && !text.starts_with('<')
            }
        }
    }

    /// Number of positional parameters.
    pub fn argcount(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn kwonly(&self) -> &[String] {
        &self.kwonly
    }

    pub fn varargs(&self) -> Option<&str> {
        self.varargs.as_deref()
    }

    pub fn varkw(&self) -> Option<&str> {
        self.varkw.as_deref()
    }

    /// Positional then keyword-only parameter names. Collector parameters
    /// (`varargs`, `varkw`) are not included.
    pub fn declared_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .chain(self.kwonly.iter())
            .map(String::as_str)
    }

    /// The first positional parameter, if any. For methods this is the
    /// receiver (`self` or `cls`).
    pub fn first_param(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }
}
