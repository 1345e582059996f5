//! Outcome and report types handed back to the host.
//!
//! Everything here is plain serializable data: the host renders or persists
//! it however it likes. The engine never prints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::decls::DeclarationId;
use crate::rewrite::{AppliedEdit, ModuleId, Span};

// ============================================================================
// Skipped references
// ============================================================================

/// A call site the refactoring left untouched, and why.
///
/// Skips are per-site and deliberate: one unrecoverable argument shape must
/// not abandon the rest of the refactoring, but it must not disappear
/// either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReference {
    /// Module containing the skipped occurrence.
    pub module: ModuleId,
    /// The occurrence's span.
    pub span: Span,
    /// 1-indexed line of the occurrence.
    pub line: u32,
    /// 1-indexed column of the occurrence.
    pub col: u32,
    /// Why the site could not be rewritten.
    pub reason: String,
}

impl SkippedReference {
    pub fn new(
        module: ModuleId,
        span: Span,
        line: u32,
        col: u32,
        reason: impl Into<String>,
    ) -> Self {
        SkippedReference {
            module,
            span,
            line,
            col,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Aggregate counts over an applied refactoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefactorSummary {
    /// Modules whose text changed.
    pub modules_changed: usize,
    /// Edits applied across all modules.
    pub edits_applied: usize,
    /// Replacement bytes written.
    pub bytes_added: u64,
    /// Original bytes replaced.
    pub bytes_removed: u64,
}

impl RefactorSummary {
    /// Tally a materialized edit list.
    pub fn tally(edits: &[AppliedEdit]) -> Self {
        let modules: BTreeSet<ModuleId> = edits.iter().map(|e| e.module).collect();
        RefactorSummary {
            modules_changed: modules.len(),
            edits_applied: edits.len(),
            bytes_added: edits.iter().map(|e| e.new_text.len() as u64).sum(),
            bytes_removed: edits.iter().map(|e| e.old_text.len() as u64).sum(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// The result of a completed refactoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorOutcome {
    /// Rewritten text for every module the refactoring touched. Untouched
    /// modules are absent.
    pub modules: BTreeMap<ModuleId, String>,
    /// Every applied edit, in module then offset order.
    pub edits: Vec<AppliedEdit>,
    /// Aggregate counts.
    pub summary: RefactorSummary,
    /// Call sites that were skipped rather than rewritten.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedReference>,
}

impl RefactorOutcome {
    /// Assemble an outcome from applied module texts, the materialized edit
    /// list, and any skip reports.
    pub fn new(
        modules: BTreeMap<ModuleId, String>,
        edits: Vec<AppliedEdit>,
        skipped: Vec<SkippedReference>,
    ) -> Self {
        let summary = RefactorSummary::tally(&edits);
        RefactorOutcome {
            modules,
            edits,
            summary,
            skipped,
        }
    }

    /// The rewritten text of one module, if it changed.
    pub fn module_text(&self, module: ModuleId) -> Option<&str> {
        self.modules.get(&module).map(String::as_str)
    }
}

// ============================================================================
// Preview plans
// ============================================================================

/// One declaration a planned refactoring would rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSite {
    /// The declaration being rewritten.
    pub declaration: DeclarationId,
    /// Its name.
    pub name: String,
    /// What it is ("procedure", "property accessor", "field", ...).
    pub role: String,
    /// How many of its references the plan rewrites.
    pub references: usize,
}

/// A refactoring planned but not applied.
///
/// Carries everything the apply path would have staged, so a host can show
/// the impact and ask for confirmation first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorPlan {
    /// Declarations the plan rewrites.
    pub sites: Vec<PlannedSite>,
    /// Pending edits, materialized against the snapshot.
    pub edits: Vec<AppliedEdit>,
    /// Call sites the plan would skip.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedReference>,
}

// ============================================================================
// Tests
// ============================================================================
