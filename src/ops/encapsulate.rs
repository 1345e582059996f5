//! Encapsulate Field.
//!
//! Replaces exposed module-level fields with property accessors. Without
//! aggregation each field is re-declared `Private` under a synthesized
//! backing name; with aggregation all selected fields move into one record
//! type with a single `Private` instance, and accessors address
//! `instance.Member`. A field whose type is a record contributes accessors
//! per record member instead of one accessor for the whole value.
//!
//! Synthesized names are conflict-resolved case-insensitively against the
//! module scope (minus the fields being replaced) and against every name
//! the same plan already introduced.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decls::{Declaration, DeclarationIndex, DeclarationKind, Reference};
use crate::error::RefactorError;
use crate::names::{pascal_case, same_identifier, validate_identifier, NameAllocator};
use crate::output::{PlannedSite, RefactorOutcome, RefactorPlan};
use crate::rewrite::{ApplyResult, Conflict, Edit, ModuleId, ProjectText, RewriteSession, Span};
use crate::signature::PlanRule;
use crate::text::{extract_span, line_bounds};

const DEFAULT_RECORD_TYPE: &str = "This_Type";
const DEFAULT_RECORD_INSTANCE: &str = "this";
const FALLBACK_TYPE: &str = "Variant";

// ============================================================================
// Requests
// ============================================================================

/// One field to encapsulate, with optional overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// The field's name in the target module.
    pub name: String,
    /// Accessor name (record member name when aggregating). Defaults to
    /// PascalCase of the field name, conflict-resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    /// For a record-typed field, which members get accessors. Empty or
    /// absent means all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udt_members: Option<Vec<String>>,
}

impl FieldSelection {
    pub fn named(name: impl Into<String>) -> Self {
        FieldSelection {
            name: name.into(),
            property_name: None,
            udt_members: None,
        }
    }

    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.property_name = Some(name.into());
        self
    }

    pub fn with_udt_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.udt_members = Some(members.into_iter().map(Into::into).collect());
        self
    }
}

/// Request to encapsulate fields of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapsulateFieldsRequest {
    pub module: ModuleId,
    pub fields: Vec<FieldSelection>,
    /// Move the selected fields into one record type behind one instance.
    #[serde(default)]
    pub aggregate: bool,
}

impl EncapsulateFieldsRequest {
    pub fn new(module: ModuleId, fields: Vec<FieldSelection>) -> Self {
        EncapsulateFieldsRequest {
            module,
            fields,
            aggregate: false,
        }
    }

    pub fn aggregated(mut self) -> Self {
        self.aggregate = true;
        self
    }
}

/// Look up a selected field by name.
pub(crate) fn resolve_field<'a>(
    index: &'a DeclarationIndex,
    module: ModuleId,
    name: &str,
) -> Result<&'a Declaration, RefactorError> {
    index
        .siblings_by_name_and_scope(name, module, &[DeclarationKind::Variable])
        .into_iter()
        .next()
        .ok_or_else(|| RefactorError::wrong_target_kind(name, "a module-level field"))
}

// ============================================================================
// Planning
// ============================================================================

/// One accessor pair (get + let/set) over one storage slot.
struct AccessorPlan {
    property: String,
    type_text: String,
    storage: String,
    object_type: bool,
}

/// Accessors for one selected record member.
struct MemberPlan<'a> {
    member: &'a Declaration,
    property: String,
    storage: String,
}

/// Everything decided about one selected field.
struct FieldPlan<'a> {
    field: &'a Declaration,
    decl_line: Span,
    type_text: String,
    /// Whole-field accessor name; under aggregation also the record member
    /// name. Absent for a record-typed field expanded per member without
    /// aggregation.
    property: Option<String>,
    /// Storage path for the whole field: the backing name, or
    /// `instance.Member` when aggregating.
    storage: String,
    /// Synthesized backing field name when not aggregating.
    backing: Option<String>,
    members: Vec<MemberPlan<'a>>,
}

struct RecordPlan {
    type_name: String,
    instance: String,
}

struct EncapsulationPlan<'a> {
    record: Option<RecordPlan>,
    fields: Vec<FieldPlan<'a>>,
}

struct Planned {
    session: RewriteSession,
    sites: Vec<PlannedSite>,
}

pub(crate) fn execute(
    index: &DeclarationIndex,
    text: &ProjectText,
    request: &EncapsulateFieldsRequest,
    fields: &[&Declaration],
) -> Result<RefactorOutcome, RefactorError> {
    let planned = plan(index, text, request, fields)?;
    match planned.session.apply(text) {
        ApplyResult::Success { modules, edits } => {
            debug!(
                module = %request.module,
                fields = fields.len(),
                edits = edits.len(),
                "field encapsulation applied"
            );
            Ok(RefactorOutcome::new(modules, edits, Vec::new()))
        }
        ApplyResult::Failed { conflicts } => Err(conflicts
            .into_iter()
            .next()
            .unwrap_or(Conflict::ModuleMissing {
                module: request.module,
            })
            .into()),
    }
}

pub(crate) fn preview(
    index: &DeclarationIndex,
    text: &ProjectText,
    request: &EncapsulateFieldsRequest,
    fields: &[&Declaration],
) -> Result<RefactorPlan, RefactorError> {
    let planned = plan(index, text, request, fields)?;
    let edits = planned.session.materialize(text);
    Ok(RefactorPlan {
        sites: planned.sites,
        edits,
        skipped: Vec::new(),
    })
}

fn plan(
    index: &DeclarationIndex,
    text: &ProjectText,
    request: &EncapsulateFieldsRequest,
    fields: &[&Declaration],
) -> Result<Planned, RefactorError> {
    if fields.is_empty() {
        return Err(PlanRule::EmptySelection.into());
    }
    for (position, field) in fields.iter().enumerate() {
        if fields[..position]
            .iter()
            .any(|earlier| earlier.declaration_id == field.declaration_id)
        {
            return Err(PlanRule::DuplicateIndex { index: position }.into());
        }
    }

    let module_text = text
        .get(request.module)
        .ok_or(RefactorError::ModuleMissing {
            module: request.module,
        })?;

    // Resolve record members up front so the allocation bound is exact.
    let mut inputs = Vec::with_capacity(fields.len());
    for (field, selection) in fields.iter().zip(&request.fields) {
        let members = selected_members(index, field, selection)?;
        inputs.push((*field, selection, members));
    }

    let plan = allocate_names(index, request, &inputs, module_text)?;

    let mut session = RewriteSession::new(text);
    let mut sites = Vec::new();

    // The record block goes before the first procedure; in a module with
    // none it rides along with the accessor insert at end of text, since
    // two inserts cannot share an anchor.
    let mut trailing = String::new();
    if let Some(record) = &plan.record {
        let block = record_block(record, &plan.fields);
        match first_procedure_start(index, request.module) {
            Some(at) => {
                session.stage(Edit::insert(request.module, at, format!("{block}\n")))?;
            }
            None => trailing = format!("\n{block}"),
        }
    }

    for field_plan in &plan.fields {
        stage_declaration_line(&mut session, request.module, module_text, field_plan)?;

        let mut rewritten = 0usize;
        for reference in index.references_of(field_plan.field.declaration_id) {
            if reference.module_id == request.module
                && field_plan.decl_line.contains(&reference.span)
            {
                continue;
            }
            let Some(source) = text.get(reference.module_id) else {
                continue;
            };
            if let Some(edit) = reference_edit(source, field_plan, reference) {
                session.stage(edit)?;
                rewritten += 1;
            }
        }

        sites.push(PlannedSite {
            declaration: field_plan.field.declaration_id,
            name: field_plan.field.name.clone(),
            role: "encapsulated field".to_string(),
            references: rewritten,
        });
    }

    trailing.push_str(&accessor_block(&plan));
    session.stage(Edit::insert(
        request.module,
        module_text.len() as u64,
        trailing,
    ))?;

    debug!(
        fields = plan.fields.len(),
        aggregate = plan.record.is_some(),
        edits = session.edit_count(),
        "field encapsulation planned"
    );
    Ok(Planned { session, sites })
}

/// Record members the selection covers: all of the field type's members,
/// or the requested subset, validated against the type.
fn selected_members<'a>(
    index: &'a DeclarationIndex,
    field: &Declaration,
    selection: &FieldSelection,
) -> Result<Vec<&'a Declaration>, RefactorError> {
    let udt = field
        .type_name
        .as_deref()
        .and_then(|type_name| index.udt_named(type_name));

    match (udt, &selection.udt_members) {
        (Some(udt), Some(wanted)) if !wanted.is_empty() => {
            let all = index.udt_members_of(udt.declaration_id);
            let mut picked = Vec::with_capacity(wanted.len());
            for name in wanted {
                let member = all
                    .iter()
                    .find(|member| same_identifier(&member.name, name))
                    .copied()
                    .ok_or_else(|| PlanRule::UnknownUdtMember {
                        udt: udt.name.clone(),
                        member: name.clone(),
                    })?;
                picked.push(member);
            }
            Ok(picked)
        }
        (Some(udt), _) => Ok(index.udt_members_of(udt.declaration_id)),
        (None, Some(wanted)) if !wanted.is_empty() => Err(PlanRule::UnknownUdtMember {
            udt: field
                .type_name
                .clone()
                .unwrap_or_else(|| field.name.clone()),
            member: wanted[0].clone(),
        }
        .into()),
        (None, _) => Ok(Vec::new()),
    }
}

fn allocate_names<'a>(
    index: &DeclarationIndex,
    request: &EncapsulateFieldsRequest,
    inputs: &[(&'a Declaration, &FieldSelection, Vec<&'a Declaration>)],
    module_text: &str,
) -> Result<EncapsulationPlan<'a>, RefactorError> {
    // The selected fields vanish with the plan, so their names do not
    // occupy the scope the synthesized names are checked against.
    let replaced: BTreeSet<String> = inputs
        .iter()
        .map(|(field, _, _)| field.name.to_ascii_lowercase())
        .collect();
    let in_scope = |name: &str| {
        !replaced.contains(&name.to_ascii_lowercase()) && index.contains_name(request.module, name)
    };

    // The suffix bound counts every name the plan itself introduces:
    // member properties, whole-field properties (explicit ones are
    // reserved and still collide), and backing names outside aggregation.
    let mut planned_names = if request.aggregate { 2 } else { 0 };
    for (_, selection, members) in inputs {
        planned_names += members.len();
        if selection.property_name.is_some() || members.is_empty() || request.aggregate {
            planned_names += 1;
        }
        if !request.aggregate {
            planned_names += 1;
        }
    }
    let bound = index.declaration_count() + planned_names;

    let mut allocator = NameAllocator::new();
    for (_, selection, _) in inputs {
        if let Some(explicit) = &selection.property_name {
            validate_identifier(explicit)?;
            allocator.reserve(explicit);
        }
    }

    let record = if request.aggregate {
        let type_name = allocator.resolve(DEFAULT_RECORD_TYPE, &in_scope, bound)?;
        let instance = allocator.resolve(DEFAULT_RECORD_INSTANCE, &in_scope, bound)?;
        Some(RecordPlan {
            type_name,
            instance,
        })
    } else {
        None
    };

    let mut field_plans = Vec::with_capacity(inputs.len());
    for (field, selection, members) in inputs {
        let type_text = field
            .type_name
            .clone()
            .unwrap_or_else(|| FALLBACK_TYPE.to_string());

        let property = if members.is_empty() || request.aggregate {
            Some(match &selection.property_name {
                Some(explicit) => explicit.clone(),
                None => allocator.resolve(&pascal_case(&field.name), &in_scope, bound)?,
            })
        } else {
            None
        };
        let backing = if request.aggregate {
            None
        } else {
            Some(allocator.resolve(&field.name, &in_scope, bound)?)
        };

        let storage = match (&record, &property) {
            (Some(record), Some(property)) => format!("{}.{}", record.instance, property),
            _ => backing.clone().unwrap_or_default(),
        };

        let mut member_plans = Vec::with_capacity(members.len());
        for member in members {
            let member_property =
                allocator.resolve(&pascal_case(&member.name), &in_scope, bound)?;
            member_plans.push(MemberPlan {
                member,
                property: member_property,
                storage: format!("{}.{}", storage, member.name),
            });
        }

        field_plans.push(FieldPlan {
            field,
            decl_line: line_bounds(module_text, field.span.start),
            type_text,
            property,
            storage,
            backing,
            members: member_plans,
        });
    }

    Ok(EncapsulationPlan {
        record,
        fields: field_plans,
    })
}

fn first_procedure_start(index: &DeclarationIndex, module: ModuleId) -> Option<u64> {
    index
        .declarations()
        .filter(|d| d.module_id == module && d.kind.is_procedure() && d.parent_id.is_none())
        .map(|d| d.span.start)
        .min()
}

fn record_block(record: &RecordPlan, fields: &[FieldPlan<'_>]) -> String {
    let mut block = format!("Private Type {}\n", record.type_name);
    for field_plan in fields {
        if let Some(property) = &field_plan.property {
            block.push_str(&format!("    {} As {}\n", property, field_plan.type_text));
        }
    }
    block.push_str(&format!(
        "End Type\n\nPrivate {} As {}\n",
        record.instance, record.type_name
    ));
    block
}

/// Replace the field's declaration line with the backing declaration, or
/// remove it entirely when the field moves into the record.
fn stage_declaration_line(
    session: &mut RewriteSession,
    module: ModuleId,
    module_text: &str,
    field_plan: &FieldPlan<'_>,
) -> Result<(), Conflict> {
    let old = extract_span(module_text, &field_plan.decl_line).unwrap_or_default();
    match &field_plan.backing {
        Some(backing) => {
            let with_events = if field_plan.field.is_with_events {
                "WithEvents "
            } else {
                ""
            };
            let array = if field_plan.field.is_array { "()" } else { "" };
            let replacement = format!(
                "Private {}{}{} As {}\n",
                with_events, backing, array, field_plan.type_text
            );
            if replacement == old {
                Ok(())
            } else {
                session.stage(
                    Edit::replace(module, field_plan.decl_line, replacement).expecting(old),
                )
            }
        }
        None => session.stage(Edit::delete(module, field_plan.decl_line).expecting(old)),
    }
}

/// The edit for one field occurrence, or `None` when the occurrence can
/// stay as written (the accessor name matches it case-insensitively).
fn reference_edit(
    source: &str,
    field_plan: &FieldPlan<'_>,
    reference: &Reference,
) -> Option<Edit> {
    let occurrence = extract_span(source, &reference.span)?;

    if field_plan.members.is_empty() {
        let property = field_plan.property.as_ref()?;
        if same_identifier(occurrence, property) {
            return None;
        }
        return Some(
            Edit::replace(reference.module_id, reference.span, property.clone())
                .expecting(occurrence),
        );
    }

    // Record-typed field with member accessors: a `field.Member` path turns
    // into the member property call; any other use addresses the storage.
    let bytes = source.as_bytes();
    let dot = reference.span.end as usize;
    if bytes.get(dot) == Some(&b'.') {
        let member_text = identifier_at(source, dot + 1);
        if !member_text.is_empty() {
            if let Some(member_plan) = field_plan
                .members
                .iter()
                .find(|m| same_identifier(&m.member.name, member_text))
            {
                if same_identifier(member_text, &member_plan.property) {
                    let dotted = Span::new(reference.span.start, reference.span.end + 1);
                    let old = extract_span(source, &dotted)?;
                    return Some(
                        Edit::delete(reference.module_id, dotted).expecting(old),
                    );
                }
                let path = Span::new(
                    reference.span.start,
                    reference.span.end + 1 + member_text.len() as u64,
                );
                let old = extract_span(source, &path)?;
                return Some(
                    Edit::replace(reference.module_id, path, member_plan.property.clone())
                        .expecting(old),
                );
            }
        }
    }

    if same_identifier(occurrence, &field_plan.storage) {
        return None;
    }
    Some(
        Edit::replace(reference.module_id, reference.span, field_plan.storage.clone())
            .expecting(occurrence),
    )
}

fn identifier_at(source: &str, at: usize) -> &str {
    let bytes = source.as_bytes();
    if at >= bytes.len() || !bytes[at].is_ascii_alphabetic() {
        return "";
    }
    let mut end = at;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    &source[at..end]
}

fn accessor_block(plan: &EncapsulationPlan<'_>) -> String {
    let mut accessors = Vec::new();
    for field_plan in &plan.fields {
        if field_plan.members.is_empty() {
            if let Some(property) = &field_plan.property {
                accessors.push(AccessorPlan {
                    property: property.clone(),
                    type_text: field_plan.type_text.clone(),
                    storage: field_plan.storage.clone(),
                    object_type: field_plan.field.is_object_type,
                });
            }
        } else {
            for member_plan in &field_plan.members {
                accessors.push(AccessorPlan {
                    property: member_plan.property.clone(),
                    type_text: member_plan
                        .member
                        .type_name
                        .clone()
                        .unwrap_or_else(|| FALLBACK_TYPE.to_string()),
                    storage: member_plan.storage.clone(),
                    object_type: member_plan.member.is_object_type,
                });
            }
        }
    }

    let mut block = String::new();
    for accessor in &accessors {
        block.push('\n');
        block.push_str(&accessor_text(accessor));
        block.push('\n');
    }
    block
}

fn accessor_text(accessor: &AccessorPlan) -> String {
    let AccessorPlan {
        property,
        type_text,
        storage,
        object_type,
    } = accessor;
    if *object_type {
        format!(
            "Public Property Get {property}() As {type_text}\n    Set {property} = {storage}\nEnd Property\n\nPublic Property Set {property}(ByVal value As {type_text})\n    Set {storage} = value\nEnd Property"
        )
    } else {
        format!(
            "Public Property Get {property}() As {type_text}\n    {property} = {storage}\nEnd Property\n\nPublic Property Let {property}(ByVal value As {type_text})\n    {storage} = value\nEnd Property"
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
