//! Span helpers for scan runs and per-file work.
//!
//! # Design
//! - One `scan` span per process run carries the run identifier and build SHA.
//! - Each file gets its own `file` span so every message about it is attributable
//!   without string prefixes.

use std::path::Path;

use tracing::Span;
use tracing::span::EnteredSpan;
use uuid::Uuid;

use crate::init::build_sha;

/// Guard that keeps the run-level span entered for the lifetime of the guard.
pub struct RunContextGuard {
    run_id: Uuid,
    span: Span,
    _entered: EnteredSpan,
}

impl RunContextGuard {
    /// Enter a fresh `scan` span with a random run identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    /// Enter a `scan` span for a caller-chosen run identifier.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        let span = tracing::info_span!("scan", run_id = %run_id, build_sha = %build_sha());
        let entered = span.clone().entered();
        Self {
            run_id,
            span,
            _entered: entered,
        }
    }

    /// Identifier attached to every record emitted during this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Handle to the run span, for instrumenting work spawned onto other tasks.
    #[must_use]
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Default for RunContextGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Span for all work on one input file.
#[must_use]
pub fn file_span(path: &Path) -> Span {
    tracing::info_span!("file", path = %path.display())
}
