//! Function identity resolution.
//!
//! The runtime reports which code unit is executing, not which named
//! function owns it. [`Resolver`] answers that question by trying an
//! ordered chain of [`strategies`] and caching the outcome per code unit,
//! including failure: a code unit that no strategy resolves stays
//! unresolved for the resolver's lifetime.

pub mod strategies;

use std::collections::HashMap;
use std::rc::Rc;

use goldenrun_core::{CodeId, Frame, Function};

pub use strategies::Strategy;

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub cache_hits: u64,
    /// Times the strategy chain actually ran.
    pub searches: u64,
    /// Searches that found nothing.
    pub unresolved: u64,
}

/// The default chain, in the order it is tried.
pub fn default_strategies() -> Vec<(&'static str, Strategy)> {
    vec![
        ("exact_name", strategies::exact_name as Strategy),
        ("receiver_mro", strategies::receiver_mro),
        ("module_class_scan", strategies::module_class_scan),
        ("caller_locals_scan", strategies::caller_locals_scan),
    ]
}

/// Caching resolver over a strategy chain.
pub struct Resolver {
    strategies: Vec<(&'static str, Strategy)>,
    cache: HashMap<CodeId, Option<Rc<Function>>>,
    stats: ResolverStats,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::with_strategies(default_strategies())
    }

    pub fn with_strategies(strategies: Vec<(&'static str, Strategy)>) -> Self {
        Resolver {
            strategies,
            cache: HashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    /// The function owning `frame`'s code, if any strategy finds it.
    pub fn resolve(&mut self, frame: &Rc<Frame>) -> Option<Rc<Function>> {
        let code = frame.code();
        if let Some(cached) = self.cache.get(&code.id()) {
            self.stats.cache_hits += 1;
            return cached.clone();
        }

        self.stats.searches += 1;
        let found = self.strategies.iter().find_map(|(name, strategy)| {
            let found = strategy(code, frame)?;
            tracing::trace!(code = code.name(), strategy = *name, "resolved function");
            Some(found)
        });
        if found.is_none() {
            self.stats.unresolved += 1;
            tracing::debug!(code = code.name(), id = %code.id(), "could not resolve function");
        }
        self.cache.insert(code.id(), found.clone());
        found
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
