//! Refactoring operations and the engine that hosts invoke.
//!
//! [`RefactoringEngine`] is the crate's front door: it owns a
//! [`StrategyRegistry`] describing which operations apply to which
//! declaration kinds, resolves the host's selection to a target, and
//! delegates to the operation modules. Every operation has an applying
//! entry point returning a [`RefactorOutcome`] and a `preview_*` variant
//! that plans the same edits without touching any text.

pub mod encapsulate;
pub mod reorder;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decls::{Declaration, DeclarationIndex, DeclarationKind, ProcedureKind, TargetResolution};
use crate::error::RefactorError;
use crate::output::{RefactorOutcome, RefactorPlan};
use crate::rewrite::{ModuleId, ProjectText};

pub use encapsulate::{EncapsulateFieldsRequest, FieldSelection};
pub use reorder::ReorderParamsRequest;

/// Operation name for parameter removal/reordering.
pub const REORDER_PARAMETERS: &str = "reorder_parameters";
/// Operation name for field encapsulation.
pub const ENCAPSULATE_FIELDS: &str = "encapsulate_fields";

// ============================================================================
// Selections
// ============================================================================

/// A host selection: a position inside a module's text snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub module: ModuleId,
    pub offset: u64,
}

impl Selection {
    pub fn new(module: ModuleId, offset: u64) -> Self {
        Selection { module, offset }
    }
}

// ============================================================================
// Strategy registry
// ============================================================================

/// An operation and the declaration kinds it can target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    operation: String,
    applicable: Vec<DeclarationKind>,
}

impl StrategyDescriptor {
    pub fn new(operation: impl Into<String>, applicable: impl Into<Vec<DeclarationKind>>) -> Self {
        StrategyDescriptor {
            operation: operation.into(),
            applicable: applicable.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Whether this operation can target a declaration of the given kind.
    pub fn applicable_to(&self, kind: &DeclarationKind) -> bool {
        self.applicable.contains(kind)
    }
}

/// The set of operations one engine instance supports.
///
/// Instance-scoped on purpose: hosts embed several engines with different
/// capabilities (a lightweight inspector, a full refactoring UI) without
/// sharing mutable global state. Registering an operation name again
/// overrides the earlier descriptor.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<StrategyDescriptor>,
}

impl StrategyRegistry {
    /// A registry with no operations.
    pub fn empty() -> Self {
        StrategyRegistry::default()
    }

    /// The built-in operation set.
    pub fn builtin() -> Self {
        let mut registry = StrategyRegistry::empty();
        registry.register(StrategyDescriptor::new(
            REORDER_PARAMETERS,
            vec![
                DeclarationKind::Procedure(ProcedureKind::Sub),
                DeclarationKind::Procedure(ProcedureKind::Function),
                DeclarationKind::Procedure(ProcedureKind::PropertyGet),
                DeclarationKind::Procedure(ProcedureKind::PropertyLet),
                DeclarationKind::Procedure(ProcedureKind::PropertySet),
            ],
        ));
        registry.register(StrategyDescriptor::new(
            ENCAPSULATE_FIELDS,
            vec![DeclarationKind::Variable],
        ));
        registry
    }

    pub fn register(&mut self, descriptor: StrategyDescriptor) {
        self.strategies.push(descriptor);
    }

    /// The effective descriptor for an operation, if registered.
    pub fn descriptor(&self, operation: &str) -> Option<&StrategyDescriptor> {
        self.strategies
            .iter()
            .rev()
            .find(|s| s.operation == operation)
    }

    /// Whether `operation` is registered and applies to `kind`.
    pub fn applicable(&self, operation: &str, kind: &DeclarationKind) -> bool {
        self.descriptor(operation)
            .is_some_and(|s| s.applicable_to(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.strategies.iter()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Entry point for all refactorings.
#[derive(Debug, Clone)]
pub struct RefactoringEngine {
    registry: StrategyRegistry,
}

impl Default for RefactoringEngine {
    fn default() -> Self {
        RefactoringEngine::new()
    }
}

impl RefactoringEngine {
    /// An engine with the built-in operation set.
    pub fn new() -> Self {
        RefactoringEngine {
            registry: StrategyRegistry::builtin(),
        }
    }

    /// An engine over a caller-assembled registry.
    pub fn with_registry(registry: StrategyRegistry) -> Self {
        RefactoringEngine { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    /// Remove and/or reorder the parameters of the selected procedure,
    /// rewriting its signature, every bound signature (property triad,
    /// event handlers, interface implementers), and every call site.
    pub fn reorder_parameters(
        &self,
        index: &DeclarationIndex,
        text: &ProjectText,
        request: &ReorderParamsRequest,
    ) -> Result<RefactorOutcome, RefactorError> {
        let target = self.reorder_target(index, request)?;
        reorder::execute(index, text, target, &request.new_order)
    }

    /// Plan a parameter reorder without applying it.
    pub fn preview_reorder_parameters(
        &self,
        index: &DeclarationIndex,
        text: &ProjectText,
        request: &ReorderParamsRequest,
    ) -> Result<RefactorPlan, RefactorError> {
        let target = self.reorder_target(index, request)?;
        reorder::preview(index, text, target, &request.new_order)
    }

    /// Encapsulate the selected fields behind property accessors,
    /// optionally aggregating them into a single record type.
    pub fn encapsulate_fields(
        &self,
        index: &DeclarationIndex,
        text: &ProjectText,
        request: &EncapsulateFieldsRequest,
    ) -> Result<RefactorOutcome, RefactorError> {
        let fields = self.encapsulation_targets(index, request)?;
        encapsulate::execute(index, text, request, &fields)
    }

    /// Plan a field encapsulation without applying it.
    pub fn preview_encapsulate_fields(
        &self,
        index: &DeclarationIndex,
        text: &ProjectText,
        request: &EncapsulateFieldsRequest,
    ) -> Result<RefactorPlan, RefactorError> {
        let fields = self.encapsulation_targets(index, request)?;
        encapsulate::preview(index, text, request, &fields)
    }

    fn reorder_target<'a>(
        &self,
        index: &'a DeclarationIndex,
        request: &ReorderParamsRequest,
    ) -> Result<&'a Declaration, RefactorError> {
        let target = resolve_selection(index, &request.target)?;
        if !self.registry.applicable(REORDER_PARAMETERS, &target.kind) {
            return Err(RefactorError::wrong_target_kind(&target.name, "a procedure"));
        }
        Ok(target)
    }

    fn encapsulation_targets<'a>(
        &self,
        index: &'a DeclarationIndex,
        request: &EncapsulateFieldsRequest,
    ) -> Result<Vec<&'a Declaration>, RefactorError> {
        let mut fields = Vec::with_capacity(request.fields.len());
        for selection in &request.fields {
            let field = encapsulate::resolve_field(index, request.module, &selection.name)?;
            if !self.registry.applicable(ENCAPSULATE_FIELDS, &field.kind) {
                return Err(RefactorError::wrong_target_kind(
                    &field.name,
                    "a module-level field",
                ));
            }
            fields.push(field);
        }
        Ok(fields)
    }
}

/// Resolve a selection to its refactoring target.
///
/// A selection landing on an `Interface_Member` implementer redirects to
/// the interface member itself, since only the member's signature governs
/// every implementation. Hosts that want to confirm the redirect first call
/// [`DeclarationIndex::resolve_refactoring_target`] themselves.
fn resolve_selection<'a>(
    index: &'a DeclarationIndex,
    selection: &Selection,
) -> Result<&'a Declaration, RefactorError> {
    let id = match index.resolve_refactoring_target(selection.module, selection.offset) {
        TargetResolution::Direct(id) => id,
        TargetResolution::ImplementsInterfaceMember {
            selected,
            interface_member,
        } => {
            debug!(%selected, %interface_member, "selection redirected to interface member");
            interface_member
        }
        TargetResolution::NotFound => {
            return Err(RefactorError::target_not_found(
                selection.module,
                selection.offset,
            ));
        }
    };
    index
        .declaration(id)
        .ok_or_else(|| RefactorError::target_not_found(selection.module, selection.offset))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    mod registry_tests {
        use super::*;

        #[test]
        fn builtin_operations_cover_their_kinds() {
            let registry = StrategyRegistry::builtin();
            assert!(registry.applicable(
                REORDER_PARAMETERS,
                &DeclarationKind::Procedure(ProcedureKind::PropertyLet)
            ));
            assert!(!registry.applicable(REORDER_PARAMETERS, &DeclarationKind::Variable));
            assert!(registry.applicable(ENCAPSULATE_FIELDS, &DeclarationKind::Variable));
            assert!(!registry.applicable(
                ENCAPSULATE_FIELDS,
                &DeclarationKind::Procedure(ProcedureKind::Sub)
            ));
        }

        #[test]
        fn hosts_can_register_and_override() {
            let mut registry = StrategyRegistry::builtin();
            registry.register(StrategyDescriptor::new(
                "extract_interface",
                vec![DeclarationKind::Procedure(ProcedureKind::Sub)],
            ));
            assert!(registry.applicable(
                "extract_interface",
                &DeclarationKind::Procedure(ProcedureKind::Sub)
            ));

            // Re-registration narrows the built-in.
            registry.register(StrategyDescriptor::new(
                REORDER_PARAMETERS,
                vec![DeclarationKind::Procedure(ProcedureKind::Sub)],
            ));
            assert!(!registry.applicable(
                REORDER_PARAMETERS,
                &DeclarationKind::Procedure(ProcedureKind::Function)
            ));
        }

        #[test]
        fn empty_registry_applies_to_nothing() {
            let registry = StrategyRegistry::empty();
            assert!(!registry.applicable(REORDER_PARAMETERS, &DeclarationKind::Variable));
            assert_eq!(registry.iter().count(), 0);
        }
    }

    mod target_tests {
        use super::*;

        #[test]
        fn selection_on_nothing_is_target_not_found() {
            let f = fixture::project(&[("Mod1", "Public Sub Foo(a As Long)\nEnd Sub\n")]);
            let engine = RefactoringEngine::new();
            let request = ReorderParamsRequest {
                target: Selection::new(f.module("Mod1"), 9_999),
                new_order: vec![0],
            };
            let err = engine
                .reorder_parameters(&f.index, &f.text, &request)
                .unwrap_err();
            assert!(matches!(err, RefactorError::TargetNotFound { .. }));
        }

        #[test]
        fn selection_on_a_field_is_the_wrong_kind() {
            let f = fixture::project(&[(
                "Mod1",
                "Private total As Long\n\nPublic Sub Foo(a As Long)\nEnd Sub\n",
            )]);
            let module = f.module("Mod1");
            let engine = RefactoringEngine::new();
            let request = ReorderParamsRequest {
                target: Selection::new(module, f.offset_of(module, "total")),
                new_order: vec![0],
            };
            let err = engine
                .reorder_parameters(&f.index, &f.text, &request)
                .unwrap_err();
            assert!(matches!(
                err,
                RefactorError::WrongTargetKind { expected: "a procedure", .. }
            ));
        }
    }
}
