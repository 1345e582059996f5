//! Unified error type for the refactoring engine.
//!
//! Subsystem errors (plan rules, staging conflicts, name synthesis) bridge
//! into [`RefactorError`] via `From` so operation entry points return one
//! type. A call site whose argument shape cannot be recovered is *not* an
//! error: it becomes a skipped-reference entry in the outcome report and
//! the refactoring proceeds.

use std::fmt;

use thiserror::Error;

use crate::names::NameError;
use crate::rewrite::{Conflict, ModuleId, Span};
use crate::signature::PlanRule;

// ============================================================================
// Error categories
// ============================================================================

/// Coarse classification for hosts that dispatch on failure class rather
/// than variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is malformed (bad plan, bad identifier).
    InvalidRequest,
    /// The target could not be resolved against the index.
    Resolution,
    /// Staging or applying edits failed.
    Apply,
    /// Name synthesis ran out of candidates.
    Naming,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::InvalidRequest => "invalid request",
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Apply => "apply",
            ErrorCategory::Naming => "naming",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// The single error type operation entry points return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefactorError {
    /// No declaration at the selection position.
    #[error("no declaration found at offset {offset} in {module}")]
    TargetNotFound { module: ModuleId, offset: u64 },

    /// The selected declaration is the wrong kind for the operation.
    #[error("'{name}' is not {expected}")]
    WrongTargetKind { name: String, expected: &'static str },

    /// The signature plan violates a signature rule.
    #[error("invalid signature plan: {rule}")]
    InvalidSignaturePlan { rule: PlanRule },

    /// A requested or synthesized name is not a legal identifier.
    #[error("invalid identifier '{name}'")]
    InvalidIdentifier { name: String },

    /// Two staged edits touch the same text.
    #[error("conflicting edits {first} and {second} in {module}")]
    EditConflict {
        module: ModuleId,
        first: Span,
        second: Span,
    },

    /// A staged edit does not fit the module snapshot.
    #[error("edit {span} does not fit {module} ({module_len} bytes)")]
    EditOutOfBounds {
        module: ModuleId,
        span: Span,
        module_len: u64,
    },

    /// The module text changed after the snapshot was taken.
    #[error("{module} changed since the snapshot was taken")]
    SnapshotMismatch { module: ModuleId },

    /// The text an edit expected to replace is not what the snapshot holds.
    #[error("edit {span} in {module} does not match the expected text")]
    EditVerificationFailed { module: ModuleId, span: Span },

    /// Name synthesis exhausted its candidate budget.
    #[error("no free name derived from '{base}' within {attempts} attempts")]
    NamingCollisionExhausted { base: String, attempts: usize },

    /// The request names a module the snapshot does not contain.
    #[error("{module} is not in the snapshot")]
    ModuleMissing { module: ModuleId },
}

impl RefactorError {
    /// Create a target-not-found error.
    pub fn target_not_found(module: ModuleId, offset: u64) -> Self {
        RefactorError::TargetNotFound { module, offset }
    }

    /// Create a wrong-target-kind error.
    pub fn wrong_target_kind(name: impl Into<String>, expected: &'static str) -> Self {
        RefactorError::WrongTargetKind {
            name: name.into(),
            expected,
        }
    }

    /// The coarse category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RefactorError::TargetNotFound { .. }
            | RefactorError::WrongTargetKind { .. }
            | RefactorError::ModuleMissing { .. } => ErrorCategory::Resolution,
            RefactorError::InvalidSignaturePlan { .. }
            | RefactorError::InvalidIdentifier { .. } => ErrorCategory::InvalidRequest,
            RefactorError::EditConflict { .. }
            | RefactorError::EditOutOfBounds { .. }
            | RefactorError::SnapshotMismatch { .. }
            | RefactorError::EditVerificationFailed { .. } => ErrorCategory::Apply,
            RefactorError::NamingCollisionExhausted { .. } => ErrorCategory::Naming,
        }
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<PlanRule> for RefactorError {
    fn from(rule: PlanRule) -> Self {
        RefactorError::InvalidSignaturePlan { rule }
    }
}

impl From<Conflict> for RefactorError {
    fn from(conflict: Conflict) -> Self {
        match conflict {
            Conflict::OverlappingEdits {
                module,
                first,
                second,
            } => RefactorError::EditConflict {
                module,
                first,
                second,
            },
            Conflict::SpanOutOfBounds {
                module,
                span,
                module_len,
            } => RefactorError::EditOutOfBounds {
                module,
                span,
                module_len,
            },
            Conflict::SnapshotChanged { module, .. } => RefactorError::SnapshotMismatch { module },
            Conflict::TextMismatch { module, span, .. } => {
                RefactorError::EditVerificationFailed { module, span }
            }
            Conflict::ModuleMissing { module } => RefactorError::ModuleMissing { module },
        }
    }
}

impl From<NameError> for RefactorError {
    fn from(err: NameError) -> Self {
        match err {
            NameError::InvalidIdentifier { name } => RefactorError::InvalidIdentifier { name },
            NameError::CollisionExhausted { base, attempts } => {
                RefactorError::NamingCollisionExhausted { base, attempts }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
