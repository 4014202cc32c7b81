//! Stable ID newtypes for runtime entities.
//!
//! Both IDs are distinct newtype wrappers over `u64`, so a `FrameId` cannot
//! be used where a `CodeId` is expected. Code IDs are allocated from a
//! process-wide counter because code units are created before (and outlive)
//! any particular [`Runtime`](crate::runtime::Runtime).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_CODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a compiled function body. Shared by every invocation of the
/// body and by every wrapper that forwards to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeId(pub u64);

impl CodeId {
    /// Allocates a fresh, never-reused code ID.
    pub fn next() -> Self {
        CodeId(NEXT_CODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of one active invocation. Unique within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
