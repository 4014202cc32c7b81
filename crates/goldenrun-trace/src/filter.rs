//! Code filters: which code units the tracer looks at at all.
//!
//! [`DefaultCodeFilter`] rejects code without a real source file and code
//! that lives under one of the runtime's library roots. With an allow-list
//! of module names it instead accepts only files whose stem or path segments
//! (relative to a library root, when under one) match an entry.

use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;

use goldenrun_core::{CodeId, CodeUnit};

/// Environment variable holding a comma-separated module allow-list.
pub const TRACE_MODULES_VAR: &str = "GOLDENRUN_TRACE_MODULES";

/// Verdicts [`DefaultCodeFilter`] remembers before evicting the oldest.
pub const VERDICT_CACHE_CAPACITY: usize = 8192;

/// Decides whether calls into `code` should be observed.
pub trait CodeFilter {
    fn should_trace(&self, code: &CodeUnit) -> bool;
}

impl<F> CodeFilter for F
where
    F: Fn(&CodeUnit) -> bool,
{
    fn should_trace(&self, code: &CodeUnit) -> bool {
        self(code)
    }
}

/// Excludes library code, or includes only an explicit module allow-list.
#[derive(Debug)]
pub struct DefaultCodeFilter {
    library_roots: Vec<PathBuf>,
    trace_modules: Option<Vec<String>>,
    /// Insertion-ordered, so index 0 is the oldest verdict.
    cache: RefCell<IndexMap<CodeId, bool>>,
    capacity: usize,
}

impl Default for DefaultCodeFilter {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

impl DefaultCodeFilter {
    pub fn new<I, P>(library_roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        DefaultCodeFilter {
            library_roots: library_roots
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .collect(),
            trace_modules: None,
            cache: RefCell::new(IndexMap::new()),
            capacity: VERDICT_CACHE_CAPACITY,
        }
    }

    /// Bounds the verdict cache at `capacity` entries (at least one).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        let cache = self.cache.get_mut();
        while cache.len() > self.capacity {
            cache.shift_remove_index(0);
        }
        self
    }

    /// Number of verdicts currently cached.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Like [`new`](Self::new), reading the allow-list from
    /// `GOLDENRUN_TRACE_MODULES` when it is set.
    pub fn from_env<I, P>(library_roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let filter = Self::new(library_roots);
        match std::env::var(TRACE_MODULES_VAR) {
            Ok(list) => filter.with_trace_modules(parse_module_list(&list)),
            Err(_) => filter,
        }
    }

    /// Switches to allow-list mode.
    pub fn with_trace_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trace_modules = Some(modules.into_iter().map(Into::into).collect());
        self.cache.borrow_mut().clear();
        self
    }

    pub fn trace_modules(&self) -> Option<&[String]> {
        self.trace_modules.as_deref()
    }

    fn evaluate(&self, code: &CodeUnit) -> bool {
        let Some(filename) = code.filename().filter(|_| code.has_source()) else {
            return false;
        };
        let filename = normalize(filename);

        match &self.trace_modules {
            Some(modules) => {
                let relative = self
                    .library_roots
                    .iter()
                    .find_map(|root| filename.strip_prefix(root).ok())
                    .unwrap_or(&filename);
                let stem = relative.file_stem().and_then(|s| s.to_str());
                modules.iter().any(|m| {
                    stem == Some(m.as_str())
                        || relative.components().any(|c| c.as_os_str() == m.as_str())
                })
            }
            None => !self
                .library_roots
                .iter()
                .any(|root| filename.starts_with(root)),
        }
    }
}

impl CodeFilter for DefaultCodeFilter {
    fn should_trace(&self, code: &CodeUnit) -> bool {
        if let Some(hit) = self.cache.borrow().get(&code.id()) {
            return *hit;
        }
        let verdict = self.evaluate(code);
        let mut cache = self.cache.borrow_mut();
        if cache.len() >= self.capacity {
            cache.shift_remove_index(0);
        }
        cache.insert(code.id(), verdict);
        verdict
    }
}

/// Splits a comma-separated module list, dropping blanks.
pub fn parse_module_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn code_at(path: &str) -> CodeUnit {
        CodeUnit::new("f", Some(PathBuf::from(path)))
    }

    #[test]
    fn library_code_is_excluded_by_default() {
        let filter = DefaultCodeFilter::new(["/usr/lib/py"]);
        assert!(!filter.should_trace(&code_at("/usr/lib/py/json/decoder.py")));
        assert!(filter.should_trace(&code_at("/home/me/proj/app.py")));
    }

    #[test]
    fn code_without_source_is_excluded() {
        let filter = DefaultCodeFilter::new(Vec::<PathBuf>::new());
        assert!(!filter.should_trace(&CodeUnit::new("f", None)));
        assert!(!filter.should_trace(&code_at("<string>")));
    }

    #[test]
    fn allow_list_matches_stem_or_segment() {
        let filter = DefaultCodeFilter::new(["/usr/lib/py"]).with_trace_modules(["app", "requests"]);
        assert!(filter.should_trace(&code_at("/home/me/proj/app.py")));
        assert!(filter.should_trace(&code_at("/usr/lib/py/requests/api.py")));
        assert!(!filter.should_trace(&code_at("/usr/lib/py/json/decoder.py")));
        assert!(!filter.should_trace(&code_at("/home/me/proj/other.py")));
    }

    #[test]
    fn dot_segments_cannot_escape_library_roots() {
        let filter = DefaultCodeFilter::new(["/usr/lib/py"]);
        assert!(!filter.should_trace(&code_at("/usr/lib/py/./json/../os.py")));
        assert!(filter.should_trace(&code_at("/usr/lib/py/../../../home/app.py")));
    }

    #[test]
    fn verdict_cache_stays_bounded() {
        let filter = DefaultCodeFilter::new(["/usr/lib/py"]).with_cache_capacity(2);
        let lib = code_at("/usr/lib/py/os.py");
        let units: Vec<CodeUnit> = (0..5)
            .map(|i| code_at(&format!("/proj/app{i}.py")))
            .collect();

        assert!(!filter.should_trace(&lib));
        for unit in &units {
            assert!(filter.should_trace(unit));
            assert!(filter.cached() <= 2);
        }
        // Evicted verdicts are recomputed, not lost.
        assert!(!filter.should_trace(&lib));
        assert!(filter.should_trace(&units[0]));
        assert_eq!(filter.cached(), 2);
    }

    #[test]
    fn default_capacity_holds_many_code_units() {
        let filter = DefaultCodeFilter::default();
        for i in 0..VERDICT_CACHE_CAPACITY + 100 {
            filter.should_trace(&code_at(&format!("/proj/m{i}.py")));
        }
        assert_eq!(filter.cached(), VERDICT_CACHE_CAPACITY);
    }

    #[test]
    fn closures_are_filters() {
        let only_main = |code: &CodeUnit| code.name() == "main";
        assert!(only_main.should_trace(&CodeUnit::new("main", None)));
        assert!(!only_main.should_trace(&CodeUnit::new("helper", None)));
    }

    proptest! {
        #[test]
        fn anything_under_a_library_root_is_rejected(
            segments in prop::collection::vec("[a-z_]{1,8}", 1..5),
        ) {
            let filter = DefaultCodeFilter::new(["/opt/lib"]);
            let path = format!("/opt/lib/{}.py", segments.join("/"));
            prop_assert!(!filter.should_trace(&code_at(&path)));
        }

        #[test]
        fn allow_list_accepts_listed_stem_anywhere(
            dirs in prop::collection::vec("[a-z]{1,6}", 0..4),
            stem in "[a-z]{1,8}",
        ) {
            let filter = DefaultCodeFilter::new(["/opt/lib"]).with_trace_modules([stem.clone()]);
            let mut path = PathBuf::from("/opt/lib");
            for d in &dirs {
                path.push(d);
            }
            path.push(format!("{stem}.py"));
            prop_assert!(filter.should_trace(&CodeUnit::new("f", Some(path))));
        }
    }

    #[test]
    fn module_list_parsing() {
        assert_eq!(parse_module_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_module_list("").is_empty());
    }
}
