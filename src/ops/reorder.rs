//! Remove / Reorder Parameters.
//!
//! One request names a target procedure and the original parameter indices
//! in their new order; omitted indices are removed. Planning expands the
//! target into every signature bound to it (property triad, `WithEvents`
//! handlers, interface implementers), validates the plan once per
//! signature, and stages slot-level declaration edits plus call-site
//! argument rewrites. Nothing is applied until every edit staged cleanly.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Selection;
use crate::arglist::{scan_arguments, ArgScanError};
use crate::decls::{Declaration, DeclarationIndex, Reference};
use crate::error::RefactorError;
use crate::output::{PlannedSite, RefactorOutcome, RefactorPlan, SkippedReference};
use crate::propagate::SignaturePropagator;
use crate::rewrite::{ApplyResult, Conflict, Edit, ProjectText, RewriteSession};
use crate::signature::{
    describe_parameters, plan_declaration_edits, rewrite_call_arguments, split_value_parameter,
    ParameterDescriptor, SignaturePlan,
};
use crate::text::{extract_span, line_bounds, offset_to_line_col};

/// Request to remove and/or reorder a procedure's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderParamsRequest {
    /// Where the host's cursor sits; resolved to the target procedure.
    pub target: Selection,
    /// Original parameter indices in their target order. An index left out
    /// removes that parameter.
    pub new_order: Vec<usize>,
}

impl ReorderParamsRequest {
    pub fn new(target: Selection, new_order: Vec<usize>) -> Self {
        ReorderParamsRequest { target, new_order }
    }
}

/// Everything planning staged, before apply or preview.
struct Planned {
    session: RewriteSession,
    sites: Vec<PlannedSite>,
    skipped: Vec<SkippedReference>,
}

pub(crate) fn execute(
    index: &DeclarationIndex,
    text: &ProjectText,
    target: &Declaration,
    new_order: &[usize],
) -> Result<RefactorOutcome, RefactorError> {
    let planned = plan(index, text, target, new_order)?;
    match planned.session.apply(text) {
        ApplyResult::Success { modules, edits } => {
            debug!(
                target = %target.declaration_id,
                edits = edits.len(),
                skipped = planned.skipped.len(),
                "parameter reorder applied"
            );
            Ok(RefactorOutcome::new(modules, edits, planned.skipped))
        }
        ApplyResult::Failed { conflicts } => Err(conflicts
            .into_iter()
            .next()
            .unwrap_or(Conflict::ModuleMissing {
                module: target.module_id,
            })
            .into()),
    }
}

pub(crate) fn preview(
    index: &DeclarationIndex,
    text: &ProjectText,
    target: &Declaration,
    new_order: &[usize],
) -> Result<RefactorPlan, RefactorError> {
    let planned = plan(index, text, target, new_order)?;
    let edits = planned.session.materialize(text);
    Ok(RefactorPlan {
        sites: planned.sites,
        edits,
        skipped: planned.skipped,
    })
}

fn plan(
    index: &DeclarationIndex,
    text: &ProjectText,
    target: &Declaration,
    new_order: &[usize],
) -> Result<Planned, RefactorError> {
    let plan = SignaturePlan::new(new_order.to_vec());
    let sites = SignaturePropagator::new(index).expand(target);

    let mut session = RewriteSession::new(text);
    let mut skipped = Vec::new();
    let mut summaries = Vec::new();

    for site in &sites {
        let Some(procedure) = index.declaration(site.procedure()) else {
            continue;
        };
        let module_text = text
            .get(procedure.module_id)
            .ok_or(RefactorError::ModuleMissing {
                module: procedure.module_id,
            })?;

        let parameters: Vec<&Declaration> = site
            .parameters()
            .iter()
            .filter_map(|id| index.declaration(*id))
            .collect();
        let descriptors = describe_parameters(module_text, &parameters).ok_or(
            RefactorError::SnapshotMismatch {
                module: procedure.module_id,
            },
        )?;
        let (plannable, pinned) = split_value_parameter(site.preserves_value_param(), descriptors);
        plan.validate(&plannable)?;

        for edit in plan_declaration_edits(procedure.module_id, &plan, &plannable, pinned.as_ref())
        {
            session.stage(edit)?;
        }

        let mut rewritten = 0usize;
        let header = line_bounds(module_text, procedure.span.start);
        for reference in index.references_of(procedure.declaration_id) {
            if reference.module_id == procedure.module_id && header.contains(&reference.span) {
                // The name occurrence on the header is the declaration
                // itself; its parameter list is rewritten at slot level.
                // Occurrences further down the body are call sites.
                continue;
            }
            match rewrite_reference(text, &plan, &plannable, reference) {
                Ok(Some(edit)) => {
                    session.stage(edit)?;
                    rewritten += 1;
                }
                Ok(None) => {}
                Err(reason) => {
                    let (line, col) = text
                        .get(reference.module_id)
                        .map(|s| offset_to_line_col(s, reference.span.start))
                        .unwrap_or((0, 0));
                    warn!(
                        module = %reference.module_id,
                        span = %reference.span,
                        reason,
                        "skipping call site"
                    );
                    skipped.push(SkippedReference::new(
                        reference.module_id,
                        reference.span,
                        line,
                        col,
                        reason,
                    ));
                }
            }
        }

        summaries.push(PlannedSite {
            declaration: procedure.declaration_id,
            name: procedure.name.clone(),
            role: site.describe().to_string(),
            references: rewritten,
        });
    }

    debug!(
        sites = summaries.len(),
        edits = session.edit_count(),
        "parameter reorder planned"
    );
    Ok(Planned {
        session,
        sites: summaries,
        skipped,
    })
}

/// Rewrite one call site's argument list, if it has one.
///
/// `Ok(None)` means there is nothing to change at this reference: the name
/// is used without an argument list, or the rewritten list is identical.
/// `Err` carries the reason the argument shape could not be recovered.
fn rewrite_reference(
    text: &ProjectText,
    plan: &SignaturePlan,
    plannable: &[ParameterDescriptor],
    reference: &Reference,
) -> Result<Option<Edit>, String> {
    let source = text
        .get(reference.module_id)
        .ok_or_else(|| "module text unavailable".to_string())?;
    let context = extract_span(source, &reference.context_span)
        .ok_or_else(|| "statement context unavailable".to_string())?;

    let list = match scan_arguments(context, reference.context_span.start, reference.span) {
        Ok(Some(list)) => list,
        Ok(None) => return Ok(None),
        Err(ArgScanError::Unterminated { .. }) => {
            return Err("unterminated argument list".to_string())
        }
    };

    let new_text = rewrite_call_arguments(plan, plannable, &list).map_err(|e| e.to_string())?;
    let old_text = extract_span(source, &list.list_span).unwrap_or_default();
    if old_text == new_text {
        return Ok(None);
    }
    Ok(Some(
        Edit::replace(reference.module_id, list.list_span, new_text).expecting(old_text),
    ))
}

// ============================================================================
// Tests
// ============================================================================
