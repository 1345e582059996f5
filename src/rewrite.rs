//! Edit buffer: staged text edits with conflict detection and atomic apply.
//!
//! This module implements the rewriting half of the engine:
//! - Edits addressed by byte span into a module-text snapshot
//! - Conflict rejection at registration time (overlaps, ambiguous ordering)
//! - Snapshot and per-edit content verification before any mutation
//! - Atomic apply semantics per invocation (all-or-nothing)
//! - Edit materialization for host-facing reports

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::text::offset_to_line_col;

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given text, returning hex-encoded string.
    pub fn compute(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let result = hasher.finalize();
        ContentHash(hex::encode(result))
    }

    /// Create from an existing hex string without validation.
    ///
    /// # Warning
    /// Does not check that the input is valid hex of SHA-256 length. Use only
    /// when the input is known to be valid (trusted source or tests).
    pub fn from_hex_unchecked(hex: &str) -> Self {
        ContentHash(hex.to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Core Types
// ============================================================================

/// Stable identifier for one source module within a project snapshot.
///
/// A module is the unit of text the host hands over (a standard module or a
/// class module). Identity is assigned by the host's parser; this crate only
/// compares and maps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// Create a new module ID.
    pub fn new(id: u32) -> Self {
        ModuleId(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module_{}", self.0)
    }
}

/// Byte offsets into module text (snapshot-scoped).
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: u64,
    /// End byte offset (exclusive).
    pub end: u64,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: u64, end: u64) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// Zero-width span at the given offset.
    pub fn at(offset: u64) -> Self {
        Span {
            start: offset,
            end: offset,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Two spans overlap if they share any byte positions.
    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this span contains another span entirely.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check if this span contains the given offset (half-open).
    pub fn contains_offset(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Project Text Snapshot
// ============================================================================

/// The module texts a refactoring is planned against.
///
/// The host owns the real text store; this is the point-in-time copy it hands
/// over. All spans in the declaration table and in staged edits index into
/// these texts and become invalid the moment any of them changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectText {
    modules: BTreeMap<ModuleId, String>,
}

impl ProjectText {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        ProjectText::default()
    }

    /// Add a module's text (builder style).
    pub fn with_module(mut self, module: ModuleId, text: impl Into<String>) -> Self {
        self.modules.insert(module, text.into());
        self
    }

    /// Add or replace a module's text.
    pub fn insert(&mut self, module: ModuleId, text: impl Into<String>) {
        self.modules.insert(module, text.into());
    }

    /// Get a module's text.
    pub fn get(&self, module: ModuleId) -> Option<&str> {
        self.modules.get(&module).map(String::as_str)
    }

    /// Iterate modules in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &str)> {
        self.modules.iter().map(|(id, text)| (*id, text.as_str()))
    }

    /// Number of modules in the snapshot.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

// ============================================================================
// Edits
// ============================================================================

/// A single text change addressed into one module's snapshot text.
///
/// An empty span inserts at `span.start`; empty replacement text deletes the
/// span; otherwise the span's bytes are replaced. Edits are immutable values
/// once staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// The module this edit applies to.
    pub module: ModuleId,
    /// The byte range being replaced (into the snapshot, not prior edits).
    pub span: Span,
    /// The replacement text (empty for deletions).
    pub text: String,
    /// Expected hash of the bytes currently at `span`, checked before apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ContentHash>,
}

impl Edit {
    /// Create an insertion at the given offset.
    pub fn insert(module: ModuleId, at: u64, text: impl Into<String>) -> Self {
        Edit {
            module,
            span: Span::at(at),
            text: text.into(),
            expected: None,
        }
    }

    /// Create a deletion of the given span.
    ///
    /// # Panics
    /// Panics if the span is empty; deleting nothing is a planning bug.
    pub fn delete(module: ModuleId, span: Span) -> Self {
        assert!(
            !span.is_empty(),
            "Delete span must be non-empty, got {}",
            span
        );
        Edit {
            module,
            span,
            text: String::new(),
            expected: None,
        }
    }

    /// Create a replacement of the given span.
    pub fn replace(module: ModuleId, span: Span, text: impl Into<String>) -> Self {
        Edit {
            module,
            span,
            text: text.into(),
            expected: None,
        }
    }

    /// Record the text this edit expects to find at its span.
    ///
    /// Apply verifies the hash of the bytes at `span` against this before
    /// mutating anything, which catches edits planned from stale offsets.
    pub fn expecting(mut self, original: &str) -> Self {
        self.expected = Some(ContentHash::compute(original));
        self
    }
}

// ============================================================================
// Conflict Detection
// ============================================================================

/// A detected condition that prevents staging or applying edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conflict {
    /// Two edits in the same module collide (overlapping spans, identical
    /// start offsets, or an insertion point inside another edit's range).
    OverlappingEdits {
        module: ModuleId,
        first: Span,
        second: Span,
    },

    /// Edit span extends past the end of the module text, or its offsets do
    /// not fall on UTF-8 character boundaries.
    SpanOutOfBounds {
        module: ModuleId,
        span: Span,
        module_len: u64,
    },

    /// Module text no longer matches the snapshot the session was opened on.
    SnapshotChanged {
        module: ModuleId,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Text at an edit's span does not match what the edit recorded.
    TextMismatch {
        module: ModuleId,
        span: Span,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Module not present in the snapshot.
    ModuleMissing { module: ModuleId },
}

// Collision is wider than span overlap: equal starts make the descending
// apply order ambiguous, and an insertion point strictly inside another
// edit's range would be swallowed by that edit's replacement.
fn edits_collide(a: &Edit, b: &Edit) -> bool {
    if a.span.overlaps(&b.span) {
        return true;
    }
    if a.span.start == b.span.start {
        return true;
    }
    if a.span.is_empty() && b.span.contains_offset(a.span.start) {
        return true;
    }
    if b.span.is_empty() && a.span.contains_offset(b.span.start) {
        return true;
    }
    false
}

// ============================================================================
// Rewrite Session
// ============================================================================

/// One refactoring's edit buffer over a project snapshot.
///
/// Created over the snapshot, fed edits during planning, consumed by
/// [`RewriteSession::apply`]. Staging rejects colliding edits immediately so
/// planning bugs surface at the point that introduces them, not at apply.
/// State is single-threaded and discarded after apply or abort.
#[derive(Debug, Clone)]
pub struct RewriteSession {
    base_hashes: BTreeMap<ModuleId, ContentHash>,
    module_lens: BTreeMap<ModuleId, u64>,
    edits: BTreeMap<ModuleId, Vec<Edit>>,
}

/// Result of applying a session's edits.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    /// All edits applied. Carries the rewritten module texts and the
    /// materialized per-edit record, in module then offset order.
    Success {
        modules: BTreeMap<ModuleId, String>,
        edits: Vec<AppliedEdit>,
    },

    /// Verification failed; no module text was produced.
    Failed { conflicts: Vec<Conflict> },
}

/// A single edit as it appears in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEdit {
    /// The module the edit applied to.
    pub module: ModuleId,
    /// Byte range replaced, relative to the snapshot.
    pub span: Span,
    /// Text that was at the span.
    pub old_text: String,
    /// Text now at the span.
    pub new_text: String,
    /// 1-indexed line of the span start (for display).
    pub line: u32,
    /// 1-indexed column of the span start (for display).
    pub col: u32,
}

impl RewriteSession {
    /// Open a session over the given snapshot, capturing per-module hashes.
    pub fn new(text: &ProjectText) -> Self {
        let mut base_hashes = BTreeMap::new();
        let mut module_lens = BTreeMap::new();
        for (module, content) in text.iter() {
            base_hashes.insert(module, ContentHash::compute(content));
            module_lens.insert(module, content.len() as u64);
        }
        RewriteSession {
            base_hashes,
            module_lens,
            edits: BTreeMap::new(),
        }
    }

    /// Stage an edit, rejecting it if it collides with one already staged.
    pub fn stage(&mut self, edit: Edit) -> Result<(), Conflict> {
        let module_len = match self.module_lens.get(&edit.module) {
            Some(len) => *len,
            None => {
                return Err(Conflict::ModuleMissing {
                    module: edit.module,
                })
            }
        };

        if edit.span.end > module_len {
            return Err(Conflict::SpanOutOfBounds {
                module: edit.module,
                span: edit.span,
                module_len,
            });
        }

        let staged = self.edits.entry(edit.module).or_default();
        for existing in staged.iter() {
            if edits_collide(existing, &edit) {
                return Err(Conflict::OverlappingEdits {
                    module: edit.module,
                    first: existing.span,
                    second: edit.span,
                });
            }
        }

        staged.push(edit);
        Ok(())
    }

    /// Check if any edits are staged.
    ///
    /// An empty session applied successfully is a valid no-op, but operations
    /// treat "nothing to change" as a planning error before they get here.
    pub fn has_edits(&self) -> bool {
        self.edits.values().any(|v| !v.is_empty())
    }

    /// Total number of staged edits.
    pub fn edit_count(&self) -> usize {
        self.edits.values().map(Vec::len).sum()
    }

    /// Number of modules with at least one staged edit.
    pub fn touched_modules(&self) -> usize {
        self.edits.values().filter(|v| !v.is_empty()).count()
    }

    /// Verify the session against the given text without mutating anything.
    ///
    /// Returns every detected conflict: snapshot drift, per-edit text
    /// mismatches, offsets off character boundaries.
    #[must_use]
    pub fn validate(&self, text: &ProjectText) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for (module, edits) in &self.edits {
            if edits.is_empty() {
                continue;
            }
            let content = match text.get(*module) {
                Some(c) => c,
                None => {
                    conflicts.push(Conflict::ModuleMissing { module: *module });
                    continue;
                }
            };

            if let Some(base) = self.base_hashes.get(module) {
                let actual = ContentHash::compute(content);
                if &actual != base {
                    conflicts.push(Conflict::SnapshotChanged {
                        module: *module,
                        expected: base.clone(),
                        actual,
                    });
                    continue;
                }
            }

            for edit in edits {
                let start = edit.span.start as usize;
                let end = edit.span.end as usize;
                if end > content.len()
                    || !content.is_char_boundary(start)
                    || !content.is_char_boundary(end)
                {
                    conflicts.push(Conflict::SpanOutOfBounds {
                        module: *module,
                        span: edit.span,
                        module_len: content.len() as u64,
                    });
                    continue;
                }
                if let Some(expected) = &edit.expected {
                    let actual = ContentHash::compute(&content[start..end]);
                    if &actual != expected {
                        conflicts.push(Conflict::TextMismatch {
                            module: *module,
                            span: edit.span,
                            expected: expected.clone(),
                            actual,
                        });
                    }
                }
            }
        }

        conflicts
    }

    /// Materialize the staged edits against the snapshot, without applying.
    ///
    /// Edits are reported in module then span-start order. Modules absent
    /// from `text` contribute nothing; `validate` reports those.
    pub fn materialize(&self, text: &ProjectText) -> Vec<AppliedEdit> {
        let mut out = Vec::new();
        for (module, edits) in &self.edits {
            let content = match text.get(*module) {
                Some(c) => c,
                None => continue,
            };
            let mut ordered: Vec<&Edit> = edits.iter().collect();
            ordered.sort_by_key(|e| e.span.start);
            for edit in ordered {
                let start = edit.span.start as usize;
                let end = (edit.span.end as usize).min(content.len());
                let old_text = if start <= end && content.is_char_boundary(start) && content.is_char_boundary(end) {
                    content[start..end].to_string()
                } else {
                    String::new()
                };
                let (line, col) = offset_to_line_col(content, edit.span.start);
                out.push(AppliedEdit {
                    module: *module,
                    span: edit.span,
                    old_text,
                    new_text: edit.text.clone(),
                    line,
                    col,
                });
            }
        }
        out
    }

    /// Apply the staged edits atomically.
    ///
    /// Either every edit applies and the rewritten texts are returned, or
    /// nothing does. Edits are applied per module in descending start-offset
    /// order so earlier spans stay valid while later ones are rewritten.
    #[must_use]
    pub fn apply(self, text: &ProjectText) -> ApplyResult {
        let conflicts = self.validate(text);
        if !conflicts.is_empty() {
            tracing::warn!(
                conflicts = conflicts.len(),
                "rewrite apply aborted by verification"
            );
            return ApplyResult::Failed { conflicts };
        }

        let applied = self.materialize(text);

        let mut modules = BTreeMap::new();
        for (module, mut edits) in self.edits {
            if edits.is_empty() {
                continue;
            }
            // Module presence was checked by validate.
            let mut content = match text.get(module) {
                Some(c) => c.to_string(),
                None => continue,
            };

            edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));
            for edit in &edits {
                let start = edit.span.start as usize;
                let end = edit.span.end as usize;
                content.replace_range(start..end, &edit.text);
            }

            tracing::debug!(%module, edits = edits.len(), "module rewritten");
            modules.insert(module, content);
        }

        ApplyResult::Success {
            modules,
            edits: applied,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn module_a() -> (ModuleId, &'static str) {
        (
            ModuleId::new(1),
            "Public Sub Foo(a, b)\n    Debug.Print a\nEnd Sub\n",
        )
    }

    fn snapshot() -> ProjectText {
        let (id, text) = module_a();
        ProjectText::new().with_module(id, text)
    }

    mod content_hash_tests {
        use super::*;

        #[test]
        fn compute_produces_hex() {
            let hash = ContentHash::compute("hello");
            // SHA-256 produces 64 hex characters
            assert_eq!(hash.0.len(), 64);
            assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn same_text_same_hash() {
            assert_eq!(ContentHash::compute("Dim x"), ContentHash::compute("Dim x"));
            assert_ne!(ContentHash::compute("Dim x"), ContentHash::compute("Dim y"));
        }

        #[test]
        fn display_is_inner_hex() {
            let hash = ContentHash::from_hex_unchecked("abc123");
            assert_eq!(format!("{}", hash), "abc123");
        }
    }

    mod span_tests {
        use super::*;

        #[test]
        fn creation_and_len() {
            let span = Span::new(10, 20);
            assert_eq!(span.len(), 10);
            assert!(!span.is_empty());
            assert!(Span::at(10).is_empty());
        }

        #[test]
        fn overlap_detection() {
            let span1 = Span::new(10, 20);
            let span2 = Span::new(15, 25);
            let span3 = Span::new(20, 30);

            assert!(span1.overlaps(&span2));
            assert!(span2.overlaps(&span1));

            // Adjacent spans don't overlap
            assert!(!span1.overlaps(&span3));
            assert!(!span3.overlaps(&span1));
        }

        #[test]
        fn contains_and_offsets() {
            let outer = Span::new(10, 30);
            assert!(outer.contains(&Span::new(15, 25)));
            assert!(!outer.contains(&Span::new(20, 40)));
            assert!(outer.contains_offset(10));
            assert!(outer.contains_offset(29));
            assert!(!outer.contains_offset(30));
        }
    }

    mod stage_tests {
        use super::*;

        #[test]
        fn overlapping_edits_rejected() {
            let (id, _) = module_a();
            let mut session = RewriteSession::new(&snapshot());
            session
                .stage(Edit::replace(id, Span::new(15, 16), "x"))
                .unwrap();

            let err = session
                .stage(Edit::replace(id, Span::new(15, 18), "y"))
                .unwrap_err();
            assert!(matches!(err, Conflict::OverlappingEdits { .. }));
        }

        #[test]
        fn equal_start_rejected() {
            let (id, _) = module_a();
            let mut session = RewriteSession::new(&snapshot());
            session.stage(Edit::insert(id, 15, "x")).unwrap();

            // Same start makes descending apply order ambiguous.
            let err = session
                .stage(Edit::replace(id, Span::new(15, 16), "y"))
                .unwrap_err();
            assert!(matches!(err, Conflict::OverlappingEdits { .. }));
        }

        #[test]
        fn insert_inside_replaced_range_rejected() {
            let (id, _) = module_a();
            let mut session = RewriteSession::new(&snapshot());
            session
                .stage(Edit::replace(id, Span::new(10, 20), "y"))
                .unwrap();

            let err = session.stage(Edit::insert(id, 15, "x")).unwrap_err();
            assert!(matches!(err, Conflict::OverlappingEdits { .. }));
        }

        #[test]
        fn adjacent_edits_accepted() {
            let (id, _) = module_a();
            let mut session = RewriteSession::new(&snapshot());
            session
                .stage(Edit::replace(id, Span::new(10, 15), "x"))
                .unwrap();
            session
                .stage(Edit::replace(id, Span::new(15, 18), "y"))
                .unwrap();
            assert_eq!(session.edit_count(), 2);
        }

        #[test]
        fn out_of_bounds_rejected() {
            let (id, text) = module_a();
            let mut session = RewriteSession::new(&snapshot());
            let end = text.len() as u64;

            let err = session
                .stage(Edit::replace(id, Span::new(end, end + 4), "x"))
                .unwrap_err();
            assert!(matches!(err, Conflict::SpanOutOfBounds { .. }));
        }

        #[test]
        fn unknown_module_rejected() {
            let mut session = RewriteSession::new(&snapshot());
            let err = session
                .stage(Edit::insert(ModuleId::new(99), 0, "x"))
                .unwrap_err();
            assert!(matches!(err, Conflict::ModuleMissing { .. }));
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn single_replace() {
            let (id, text) = module_a();
            let snap = snapshot();
            let mut session = RewriteSession::new(&snap);

            // Rename parameter "a" in the signature.
            let at = text.find("(a,").unwrap() as u64 + 1;
            session
                .stage(Edit::replace(id, Span::new(at, at + 1), "first").expecting("a"))
                .unwrap();

            match session.apply(&snap) {
                ApplyResult::Success { modules, edits } => {
                    assert!(modules[&id].starts_with("Public Sub Foo(first, b)"));
                    assert_eq!(edits.len(), 1);
                    assert_eq!(edits[0].old_text, "a");
                    assert_eq!(edits[0].new_text, "first");
                }
                ApplyResult::Failed { conflicts } => panic!("unexpected conflicts: {:?}", conflicts),
            }
        }

        #[test]
        fn multiple_edits_apply_in_reverse_offset_order() {
            let id = ModuleId::new(7);
            let snap = ProjectText::new().with_module(id, "Dim alpha As Long\nDim beta As Long\n");
            let mut session = RewriteSession::new(&snap);

            session
                .stage(Edit::replace(id, Span::new(4, 9), "first"))
                .unwrap();
            let beta_at = "Dim alpha As Long\nDim ".len() as u64;
            session
                .stage(Edit::replace(id, Span::new(beta_at, beta_at + 4), "second"))
                .unwrap();

            match session.apply(&snap) {
                ApplyResult::Success { modules, .. } => {
                    assert_eq!(modules[&id], "Dim first As Long\nDim second As Long\n");
                }
                ApplyResult::Failed { conflicts } => panic!("unexpected conflicts: {:?}", conflicts),
            }
        }

        #[test]
        fn snapshot_drift_fails_apply() {
            let (id, _) = module_a();
            let snap = snapshot();
            let mut session = RewriteSession::new(&snap);
            session.stage(Edit::insert(id, 0, "' header\n")).unwrap();

            let mut drifted = snap.clone();
            drifted.insert(id, "Public Sub Foo()\nEnd Sub\n");

            match session.apply(&drifted) {
                ApplyResult::Failed { conflicts } => {
                    assert!(conflicts
                        .iter()
                        .any(|c| matches!(c, Conflict::SnapshotChanged { .. })));
                }
                ApplyResult::Success { .. } => panic!("apply should have failed"),
            }
        }

        #[test]
        fn wrong_expected_text_fails_apply() {
            let (id, _) = module_a();
            let snap = snapshot();
            let mut session = RewriteSession::new(&snap);

            let mut edit = Edit::replace(id, Span::new(15, 16), "x");
            edit.expected = Some(ContentHash::from_hex_unchecked("deadbeef"));
            session.stage(edit).unwrap();

            match session.apply(&snap) {
                ApplyResult::Failed { conflicts } => {
                    assert!(conflicts
                        .iter()
                        .any(|c| matches!(c, Conflict::TextMismatch { .. })));
                }
                ApplyResult::Success { .. } => panic!("apply should have failed"),
            }
        }

        #[test]
        fn failed_apply_produces_no_text() {
            let good = ModuleId::new(1);
            let bad = ModuleId::new(2);
            let snap = ProjectText::new()
                .with_module(good, "Dim a\n")
                .with_module(bad, "Dim b\n");
            let mut session = RewriteSession::new(&snap);

            session
                .stage(Edit::replace(good, Span::new(4, 5), "x"))
                .unwrap();
            let mut stale = Edit::replace(bad, Span::new(4, 5), "y");
            stale.expected = Some(ContentHash::from_hex_unchecked("00"));
            session.stage(stale).unwrap();

            // One bad edit poisons the whole apply, including the good module.
            match session.apply(&snap) {
                ApplyResult::Failed { conflicts } => assert_eq!(conflicts.len(), 1),
                ApplyResult::Success { .. } => panic!("apply should have failed"),
            }
        }

        #[test]
        fn reapplying_same_plan_is_rejected_by_hash() {
            let (id, _) = module_a();
            let snap = snapshot();
            let mut first = RewriteSession::new(&snap);
            first.stage(Edit::insert(id, 0, "' v2\n")).unwrap();
            let second = first.clone();

            let modules = match first.apply(&snap) {
                ApplyResult::Success { modules, .. } => modules,
                ApplyResult::Failed { conflicts } => panic!("unexpected conflicts: {:?}", conflicts),
            };

            let mut after = snap.clone();
            after.insert(id, modules[&id].clone());
            match second.apply(&after) {
                ApplyResult::Failed { conflicts } => {
                    assert!(conflicts
                        .iter()
                        .any(|c| matches!(c, Conflict::SnapshotChanged { .. })));
                }
                ApplyResult::Success { .. } => panic!("second apply should have failed"),
            }
        }
    }

    mod materialize_tests {
        use super::*;

        #[test]
        fn reports_line_and_col() {
            let id = ModuleId::new(3);
            let snap = ProjectText::new().with_module(id, "Dim a\nDim b\n");
            let mut session = RewriteSession::new(&snap);
            session
                .stage(Edit::replace(id, Span::new(10, 11), "c"))
                .unwrap();

            let edits = session.materialize(&snap);
            assert_eq!(edits.len(), 1);
            assert_eq!(edits[0].old_text, "b");
            assert_eq!(edits[0].line, 2);
            assert_eq!(edits[0].col, 5);
        }

        #[test]
        fn edits_ordered_by_offset() {
            let id = ModuleId::new(3);
            let snap = ProjectText::new().with_module(id, "Dim a\nDim b\n");
            let mut session = RewriteSession::new(&snap);
            session
                .stage(Edit::replace(id, Span::new(10, 11), "y"))
                .unwrap();
            session
                .stage(Edit::replace(id, Span::new(4, 5), "x"))
                .unwrap();

            let edits = session.materialize(&snap);
            assert_eq!(edits[0].span.start, 4);
            assert_eq!(edits[1].span.start, 10);
        }
    }
}
