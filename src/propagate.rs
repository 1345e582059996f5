//! Expansion of a signature change to every declaration bound to it.
//!
//! A parameter change never touches just one procedure. The language binds
//! signatures together through three conventions:
//!
//! - a property's `Get`/`Let`/`Set` accessors share one public signature,
//!   the `Let`/`Set` value parameter excepted;
//! - a field declared `WithEvents f As C` binds procedures named
//!   `f_Member` to the members of component `C`;
//! - a module implementing component `C` carries members named `C_Member`
//!   whose signatures mirror the interface.
//!
//! [`SignaturePropagator::expand`] resolves a target procedure to the full
//! set of [`SignatureSite`]s the plan must be replayed against. Each site
//! says what it is; callers match the variants instead of probing the
//! declarations again.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decls::{
    Declaration, DeclarationId, DeclarationIndex, DeclarationKind, ProcedureKind,
};

/// One declaration whose signature a plan rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSite {
    /// A standalone procedure.
    Plain {
        procedure: DeclarationId,
        parameters: Vec<DeclarationId>,
    },
    /// One accessor of a property triad. `Let`/`Set` accessors pin their
    /// trailing value parameter.
    PropertyAccessor {
        procedure: DeclarationId,
        parameters: Vec<DeclarationId>,
        preserve_value_param: bool,
    },
    /// A `field_Member` event-handler procedure.
    EventHandler {
        procedure: DeclarationId,
        parameters: Vec<DeclarationId>,
    },
    /// A `Component_Member` interface implementer. An implementer of a
    /// property member is itself a `Let`/`Set` accessor and pins its value
    /// parameter too.
    InterfaceImpl {
        procedure: DeclarationId,
        parameters: Vec<DeclarationId>,
        preserve_value_param: bool,
    },
}

impl SignatureSite {
    /// The procedure declaration this site rewrites.
    pub fn procedure(&self) -> DeclarationId {
        match self {
            SignatureSite::Plain { procedure, .. }
            | SignatureSite::PropertyAccessor { procedure, .. }
            | SignatureSite::EventHandler { procedure, .. }
            | SignatureSite::InterfaceImpl { procedure, .. } => *procedure,
        }
    }

    /// The site's parameters, in declaration order.
    pub fn parameters(&self) -> &[DeclarationId] {
        match self {
            SignatureSite::Plain { parameters, .. }
            | SignatureSite::PropertyAccessor { parameters, .. }
            | SignatureSite::EventHandler { parameters, .. }
            | SignatureSite::InterfaceImpl { parameters, .. } => parameters,
        }
    }

    /// Whether the trailing value parameter stays out of the plan.
    pub fn preserves_value_param(&self) -> bool {
        match self {
            SignatureSite::PropertyAccessor {
                preserve_value_param,
                ..
            }
            | SignatureSite::InterfaceImpl {
                preserve_value_param,
                ..
            } => *preserve_value_param,
            SignatureSite::Plain { .. } | SignatureSite::EventHandler { .. } => false,
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            SignatureSite::Plain { .. } => "procedure",
            SignatureSite::PropertyAccessor { .. } => "property accessor",
            SignatureSite::EventHandler { .. } => "event handler",
            SignatureSite::InterfaceImpl { .. } => "interface implementer",
        }
    }
}

/// Expands a target procedure into every signature bound to it.
pub struct SignaturePropagator<'a> {
    index: &'a DeclarationIndex,
}

impl<'a> SignaturePropagator<'a> {
    pub fn new(index: &'a DeclarationIndex) -> Self {
        SignaturePropagator { index }
    }

    /// All signatures the change must be replayed against, target included,
    /// deduplicated and in a stable order: the target's triad (or the
    /// target alone), then event handlers, then interface implementers.
    pub fn expand(&self, target: &Declaration) -> Vec<SignatureSite> {
        let mut sites = Vec::new();
        let mut seen = BTreeSet::new();

        if !target.kind.is_procedure() {
            return sites;
        }

        if target
            .kind
            .procedure_kind()
            .is_some_and(|kind| kind.is_property_accessor())
        {
            for accessor in self.index.siblings_by_name_and_scope(
                &target.name,
                target.module_id,
                &[
                    DeclarationKind::Procedure(ProcedureKind::PropertyGet),
                    DeclarationKind::Procedure(ProcedureKind::PropertyLet),
                    DeclarationKind::Procedure(ProcedureKind::PropertySet),
                ],
            ) {
                self.push(
                    &mut sites,
                    &mut seen,
                    SignatureSite::PropertyAccessor {
                        procedure: accessor.declaration_id,
                        parameters: self.parameter_ids(accessor.declaration_id),
                        preserve_value_param: pins_value(accessor),
                    },
                );
            }
        } else {
            self.push(
                &mut sites,
                &mut seen,
                SignatureSite::Plain {
                    procedure: target.declaration_id,
                    parameters: self.parameter_ids(target.declaration_id),
                },
            );
        }

        if let Some(component) = self.index.module_name(target.module_id) {
            for field in self.index.with_events_fields_of_type(component) {
                let handler_name = format!("{}_{}", field.name, target.name);
                for handler in self.index.procedures_named(&handler_name) {
                    if handler.module_id != field.module_id || handler.parent_id.is_some() {
                        continue;
                    }
                    self.push(
                        &mut sites,
                        &mut seen,
                        SignatureSite::EventHandler {
                            procedure: handler.declaration_id,
                            parameters: self.parameter_ids(handler.declaration_id),
                        },
                    );
                }
            }

            let implementer_name = format!("{}_{}", component, target.name);
            for implementer in self.index.procedures_named(&implementer_name) {
                if implementer.module_id == target.module_id || implementer.parent_id.is_some() {
                    continue;
                }
                self.push(
                    &mut sites,
                    &mut seen,
                    SignatureSite::InterfaceImpl {
                        procedure: implementer.declaration_id,
                        parameters: self.parameter_ids(implementer.declaration_id),
                        preserve_value_param: pins_value(implementer),
                    },
                );
            }
        }

        debug!(
            target = %target.declaration_id,
            sites = sites.len(),
            "expanded signature change"
        );
        sites
    }

    fn parameter_ids(&self, procedure: DeclarationId) -> Vec<DeclarationId> {
        self.index
            .parameters_of(procedure)
            .iter()
            .map(|parameter| parameter.declaration_id)
            .collect()
    }

    fn push(
        &self,
        sites: &mut Vec<SignatureSite>,
        seen: &mut BTreeSet<DeclarationId>,
        site: SignatureSite,
    ) {
        if seen.insert(site.procedure()) {
            sites.push(site);
        }
    }
}

fn pins_value(declaration: &Declaration) -> bool {
    matches!(
        declaration.kind.procedure_kind(),
        Some(ProcedureKind::PropertyLet | ProcedureKind::PropertySet)
    )
}

// ============================================================================
// Tests
// ============================================================================
