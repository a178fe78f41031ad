//! Session invariants.
//!
//! A scenario test pins one event order. The checks here state what must
//! hold after *every* event, whatever the backend sent and however the
//! socket split it, so property tests and fuzz targets can run them after
//! each step.
//!
//! A [`SessionSnapshot`] captures the observable state of a `Session` plus
//! the [`RecordingHost`](crate::RecordingHost) it drove; each [`Invariant`]
//! inspects one snapshot.
//!
//! ```ignore
//! let invariants = InvariantRegistry::standard();
//! invariants.assert_all(&SessionSnapshot::capture(&session, &host), "after logon");
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{AliasGroupIffRoom, HostAccepted, ReadOffsetInBounds, TornDownCleanly};
pub use snapshot::SessionSnapshot;

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed
    pub invariant: &'static str,
    /// What the snapshot showed
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of a session snapshot.
pub trait Invariant: Send + Sync {
    /// Short name used in reports.
    fn name(&self) -> &'static str;

    /// Check `state`.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// A set of invariants run together.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// No invariants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias groups, read offset, teardown and host acceptance.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(AliasGroupIffRoom);
        registry.add(ReadOffsetInBounds);
        registry.add(TornDownCleanly);
        registry.add(HostAccepted);
        registry
    }

    /// Register `invariant`.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every check and collect all violations.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|invariant| invariant.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and panic with all violations, labelled with `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };
        let report: Vec<_> = violations.iter().map(ToString::to_string).collect();
        panic!("{} invariant(s) broken {context}:\n  {}", report.len(), report.join("\n  "));
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
