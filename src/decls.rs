//! Declaration model: normalized declaration and reference tables with indexes.
//!
//! This module provides the program data model the engine plans against:
//! - [`Declaration`]: named program entities (variables, parameters,
//!   procedures, property accessors, record types and their members)
//! - [`Reference`]: identifier occurrences resolving to one declaration
//! - [`DeclarationIndex`]: in-memory storage with postings lists for the
//!   queries the refactorings need, deterministic iteration order
//!
//! Tables are produced by the host's parser and are read-only here; the
//! engine never mutates a declaration, only plans text edits from it.
//!
//! Identifier comparison is case-insensitive throughout, matching the
//! source language's rules (see [`crate::names::same_identifier`]).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::names::same_identifier;
use crate::rewrite::{ModuleId, Span};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a declaration within a project snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct DeclarationId(pub u32);

impl DeclarationId {
    /// Create a new declaration ID.
    pub fn new(id: u32) -> Self {
        DeclarationId(id)
    }
}

impl std::fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "decl_{}", self.0)
    }
}

/// Unique identifier for a reference within a project snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ReferenceId(pub u32);

impl ReferenceId {
    /// Create a new reference ID.
    pub fn new(id: u32) -> Self {
        ReferenceId(id)
    }
}

impl std::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref_{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Kind of procedure declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ProcedureKind {
    #[default]
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

impl ProcedureKind {
    /// Whether this is one of the property accessor kinds.
    pub fn is_property_accessor(&self) -> bool {
        matches!(
            self,
            ProcedureKind::PropertyGet | ProcedureKind::PropertyLet | ProcedureKind::PropertySet
        )
    }

    /// The declaring keyword as it appears in source.
    pub fn keyword(&self) -> &'static str {
        match self {
            ProcedureKind::Sub => "Sub",
            ProcedureKind::Function => "Function",
            ProcedureKind::PropertyGet => "Property Get",
            ProcedureKind::PropertyLet => "Property Let",
            ProcedureKind::PropertySet => "Property Set",
        }
    }

    /// The matching block terminator.
    pub fn end_keyword(&self) -> &'static str {
        match self {
            ProcedureKind::Sub => "End Sub",
            ProcedureKind::Function => "End Function",
            ProcedureKind::PropertyGet | ProcedureKind::PropertyLet | ProcedureKind::PropertySet => {
                "End Property"
            }
        }
    }
}

/// Kind of declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DeclarationKind {
    /// Module-level or local variable (a field when module-level).
    #[default]
    Variable,
    /// Procedure parameter.
    Parameter,
    /// Procedure of any [`ProcedureKind`].
    Procedure(ProcedureKind),
    /// User-defined record type.
    UserDefinedType,
    /// Member of a user-defined record type.
    UdtMember,
}

impl DeclarationKind {
    /// Whether this declaration is a procedure.
    pub fn is_procedure(&self) -> bool {
        matches!(self, DeclarationKind::Procedure(_))
    }

    /// The procedure kind, if this is a procedure.
    pub fn procedure_kind(&self) -> Option<ProcedureKind> {
        match self {
            DeclarationKind::Procedure(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Access level as written in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Accessibility {
    /// No explicit access keyword (`Dim` for variables).
    #[default]
    Implicit,
    Private,
    Public,
    Friend,
    Global,
}

impl Accessibility {
    /// The keyword as it appears in a variable declaration.
    pub fn keyword(&self) -> &'static str {
        match self {
            Accessibility::Implicit => "Dim",
            Accessibility::Private => "Private",
            Accessibility::Public => "Public",
            Accessibility::Friend => "Friend",
            Accessibility::Global => "Global",
        }
    }
}

// ============================================================================
// Declaration Table
// ============================================================================

/// A named program entity with a fixed source position.
///
/// `span` covers the declaration's full extent: for a procedure, the header
/// through its `End` line; for a parameter, its text inside the parameter
/// list; for a variable or record member, its declaration item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Unique identifier for this declaration.
    pub declaration_id: DeclarationId,
    /// Kind of declaration.
    pub kind: DeclarationKind,
    /// Identifier name as written at the declaration.
    pub name: String,
    /// Module the declaration lives in.
    pub module_id: ModuleId,
    /// Enclosing declaration: the procedure for parameters and locals, the
    /// record type for its members, `None` at module scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DeclarationId>,
    /// Declared type text (`Long`, `String`, a record or class name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Access level for module-scope declarations.
    pub accessibility: Accessibility,
    /// Full extent of the declaration text.
    pub span: Span,
    /// 1-indexed first line of the declaration.
    pub start_line: u32,
    /// 1-indexed last line of the declaration.
    pub end_line: u32,
    /// Parameter declared `Optional`.
    pub is_optional: bool,
    /// Parameter declared `ParamArray`.
    pub is_param_array: bool,
    /// Field declared `WithEvents`.
    pub is_with_events: bool,
    /// Declared with array bounds.
    pub is_array: bool,
    /// Declared type is an object type (assignment requires `Set`).
    pub is_object_type: bool,
    /// Default value text for optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Declaration {
    /// Create a new declaration.
    ///
    /// Flags default to off and line numbers to the span's first line being
    /// unknown (0); use the `with_*`/`as_*` builders to fill them in.
    pub fn new(
        declaration_id: DeclarationId,
        kind: DeclarationKind,
        name: impl Into<String>,
        module_id: ModuleId,
        span: Span,
    ) -> Self {
        Declaration {
            declaration_id,
            kind,
            name: name.into(),
            module_id,
            parent_id: None,
            type_name: None,
            accessibility: Accessibility::default(),
            span,
            start_line: 0,
            end_line: 0,
            is_optional: false,
            is_param_array: false,
            is_with_events: false,
            is_array: false,
            is_object_type: false,
            default_value: None,
        }
    }

    /// Set the enclosing declaration.
    pub fn with_parent(mut self, parent_id: DeclarationId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the declared type text.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Set the access level.
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Set the 1-indexed line range.
    pub fn with_lines(mut self, start_line: u32, end_line: u32) -> Self {
        self.start_line = start_line;
        self.end_line = end_line;
        self
    }

    /// Set the default value text (optional parameters).
    pub fn with_default_value(mut self, text: impl Into<String>) -> Self {
        self.default_value = Some(text.into());
        self
    }

    /// Mark as an `Optional` parameter.
    pub fn as_optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Mark as a `ParamArray` parameter.
    pub fn as_param_array(mut self) -> Self {
        self.is_param_array = true;
        self
    }

    /// Mark as a `WithEvents` field.
    pub fn as_with_events(mut self) -> Self {
        self.is_with_events = true;
        self
    }

    /// Mark as an array declaration.
    pub fn as_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Mark the declared type as an object type.
    pub fn as_object_type(mut self) -> Self {
        self.is_object_type = true;
        self
    }

    /// The procedure kind, if this declares a procedure.
    pub fn procedure_kind(&self) -> Option<ProcedureKind> {
        self.kind.procedure_kind()
    }
}

/// An identifier occurrence resolving to exactly one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique identifier for this reference.
    pub reference_id: ReferenceId,
    /// The declaration this occurrence resolves to.
    pub declaration_id: DeclarationId,
    /// Module containing the occurrence.
    pub module_id: ModuleId,
    /// Byte span of the identifier occurrence itself.
    pub span: Span,
    /// Span of the smallest enclosing call/statement, used to scope argument
    /// scanning. Always contains `span`.
    pub context_span: Span,
    /// Procedure whose body contains the occurrence, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing_procedure_id: Option<DeclarationId>,
}

impl Reference {
    /// Create a new reference.
    ///
    /// # Panics
    /// Panics if `context_span` does not contain `span`.
    pub fn new(
        reference_id: ReferenceId,
        declaration_id: DeclarationId,
        module_id: ModuleId,
        span: Span,
        context_span: Span,
    ) -> Self {
        assert!(
            context_span.contains(&span),
            "Reference context {} must contain occurrence {}",
            context_span,
            span
        );
        Reference {
            reference_id,
            declaration_id,
            module_id,
            span,
            context_span,
            enclosing_procedure_id: None,
        }
    }

    /// Set the enclosing procedure.
    pub fn with_enclosing_procedure(mut self, procedure_id: DeclarationId) -> Self {
        self.enclosing_procedure_id = Some(procedure_id);
        self
    }
}

// ============================================================================
// Target Resolution
// ============================================================================

/// Outcome of resolving a user selection to a refactoring target.
///
/// A selection landing on an `Interface_Member`-named implementer is
/// reported with the interface member it implements, so the caller can
/// redirect the refactoring to the member whose signature governs every
/// implementation. "No target" is an explicit variant, not a side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    /// The selection resolves to this declaration directly.
    Direct(DeclarationId),
    /// The selection landed on an implementation of an interface member.
    ImplementsInterfaceMember {
        /// The implementer the selection resolved to.
        selected: DeclarationId,
        /// The interface member governing its signature.
        interface_member: DeclarationId,
    },
    /// The selection resolves to no declaration.
    NotFound,
}

// ============================================================================
// Declaration Index
// ============================================================================

fn fold_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// In-memory declaration and reference storage for one project snapshot.
///
/// Primary tables are `BTreeMap` for deterministic iteration; postings lists
/// accelerate the name and containment queries. All name lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct DeclarationIndex {
    declarations: BTreeMap<DeclarationId, Declaration>,
    references: BTreeMap<ReferenceId, Reference>,
    module_names: BTreeMap<ModuleId, String>,

    // Postings lists (folded name -> ids, container -> contained)
    decls_by_name: HashMap<String, Vec<DeclarationId>>,
    decls_by_module: HashMap<ModuleId, Vec<DeclarationId>>,
    refs_by_decl: HashMap<DeclarationId, Vec<ReferenceId>>,
    params_by_procedure: HashMap<DeclarationId, Vec<DeclarationId>>,
    members_by_udt: HashMap<DeclarationId, Vec<DeclarationId>>,

    next_declaration_id: u32,
    next_reference_id: u32,
}

impl DeclarationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        DeclarationIndex::default()
    }

    /// Allocate the next declaration ID.
    pub fn next_declaration_id(&mut self) -> DeclarationId {
        let id = DeclarationId::new(self.next_declaration_id);
        self.next_declaration_id += 1;
        id
    }

    /// Allocate the next reference ID.
    pub fn next_reference_id(&mut self) -> ReferenceId {
        let id = ReferenceId::new(self.next_reference_id);
        self.next_reference_id += 1;
        id
    }

    /// Register a module and its component name.
    pub fn register_module(&mut self, module_id: ModuleId, name: impl Into<String>) {
        self.module_names.insert(module_id, name.into());
    }

    /// Insert a declaration, maintaining the postings lists.
    pub fn insert_declaration(&mut self, declaration: Declaration) {
        let id = declaration.declaration_id;
        self.decls_by_name
            .entry(fold_name(&declaration.name))
            .or_default()
            .push(id);
        self.decls_by_module
            .entry(declaration.module_id)
            .or_default()
            .push(id);
        if let Some(parent) = declaration.parent_id {
            match declaration.kind {
                DeclarationKind::Parameter => {
                    self.params_by_procedure.entry(parent).or_default().push(id);
                }
                DeclarationKind::UdtMember => {
                    self.members_by_udt.entry(parent).or_default().push(id);
                }
                _ => {}
            }
        }
        self.declarations.insert(id, declaration);
    }

    /// Insert a reference, maintaining the postings lists.
    pub fn insert_reference(&mut self, reference: Reference) {
        self.refs_by_decl
            .entry(reference.declaration_id)
            .or_default()
            .push(reference.reference_id);
        self.references.insert(reference.reference_id, reference);
    }

    /// Look up a declaration by ID.
    pub fn declaration(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(&id)
    }

    /// Look up a reference by ID.
    pub fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        self.references.get(&id)
    }

    /// The component name registered for a module.
    pub fn module_name(&self, module_id: ModuleId) -> Option<&str> {
        self.module_names.get(&module_id).map(String::as_str)
    }

    /// Find a module by component name (case-insensitive).
    pub fn module_named(&self, name: &str) -> Option<ModuleId> {
        self.module_names
            .iter()
            .find(|(_, n)| same_identifier(n, name))
            .map(|(id, _)| *id)
    }

    /// Total number of declarations in the index.
    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Iterate all declarations in ID order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    /// The innermost declaration whose extent contains the given position.
    ///
    /// Innermost means the declaration with the smallest extent; ties break
    /// toward the higher declaration ID for determinism (a contained
    /// declaration is always inserted after its container by the parser).
    pub fn find_target(&self, module_id: ModuleId, offset: u64) -> Option<&Declaration> {
        self.decls_by_module
            .get(&module_id)?
            .iter()
            .filter_map(|id| self.declarations.get(id))
            .filter(|d| d.span.contains_offset(offset))
            .min_by(|a, b| {
                a.span
                    .len()
                    .cmp(&b.span.len())
                    .then(b.declaration_id.cmp(&a.declaration_id))
            })
    }

    /// All references resolving to a declaration, in source order.
    pub fn references_of(&self, declaration_id: DeclarationId) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self
            .refs_by_decl
            .get(&declaration_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.references.get(id))
            .collect();
        refs.sort_by_key(|r| (r.module_id, r.span.start, r.reference_id));
        refs
    }

    /// Module-scope declarations sharing a name (case-insensitive) in one
    /// module, filtered to the given kinds. This is the property triad
    /// lookup: a getter's letter/setter siblings share name and scope.
    pub fn siblings_by_name_and_scope(
        &self,
        name: &str,
        module_id: ModuleId,
        kinds: &[DeclarationKind],
    ) -> Vec<&Declaration> {
        let mut decls: Vec<&Declaration> = self
            .decls_by_name
            .get(&fold_name(name))
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .filter(|d| {
                d.module_id == module_id && d.parent_id.is_none() && kinds.contains(&d.kind)
            })
            .collect();
        decls.sort_by_key(|d| d.span.start);
        decls
    }

    /// A procedure's parameters, in declaration order.
    pub fn parameters_of(&self, procedure_id: DeclarationId) -> Vec<&Declaration> {
        let mut params: Vec<&Declaration> = self
            .params_by_procedure
            .get(&procedure_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .collect();
        params.sort_by_key(|d| d.span.start);
        params
    }

    /// Fields declared `WithEvents` whose type is the given component.
    pub fn with_events_fields_of_type(&self, component_name: &str) -> Vec<&Declaration> {
        self.declarations
            .values()
            .filter(|d| {
                d.kind == DeclarationKind::Variable
                    && d.is_with_events
                    && d.type_name
                        .as_deref()
                        .is_some_and(|t| same_identifier(t, component_name))
            })
            .collect()
    }

    /// Procedures with the given name (case-insensitive), across modules.
    pub fn procedures_named(&self, name: &str) -> Vec<&Declaration> {
        let mut decls: Vec<&Declaration> = self
            .decls_by_name
            .get(&fold_name(name))
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .filter(|d| d.kind.is_procedure())
            .collect();
        decls.sort_by_key(|d| (d.module_id, d.span.start));
        decls
    }

    /// The record type declaration with the given name, if any.
    pub fn udt_named(&self, name: &str) -> Option<&Declaration> {
        self.decls_by_name
            .get(&fold_name(name))
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .find(|d| d.kind == DeclarationKind::UserDefinedType)
    }

    /// A record type's members, in declaration order.
    pub fn udt_members_of(&self, udt_id: DeclarationId) -> Vec<&Declaration> {
        let mut members: Vec<&Declaration> = self
            .members_by_udt
            .get(&udt_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .collect();
        members.sort_by_key(|d| d.span.start);
        members
    }

    /// Whether any module-scope declaration in the module already uses this
    /// identifier (case-insensitive). Drives synthesized-name conflict
    /// resolution; parameters, locals, and record members do not occupy the
    /// module scope.
    pub fn contains_name(&self, module_id: ModuleId, name: &str) -> bool {
        self.decls_by_name
            .get(&fold_name(name))
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .any(|d| d.module_id == module_id && d.parent_id.is_none())
    }

    /// Resolve a selection position to a refactoring target.
    ///
    /// When the selection lands on a procedure named `Component_Member` and
    /// module `Component` declares a procedure `Member`, the result names
    /// both so the caller can redirect to the interface member.
    pub fn resolve_refactoring_target(&self, module_id: ModuleId, offset: u64) -> TargetResolution {
        let Some(target) = self.find_target(module_id, offset) else {
            return TargetResolution::NotFound;
        };

        if target.kind.is_procedure() {
            if let Some(member) = self.interface_member_for(&target.name) {
                if member.declaration_id != target.declaration_id {
                    return TargetResolution::ImplementsInterfaceMember {
                        selected: target.declaration_id,
                        interface_member: member.declaration_id,
                    };
                }
            }
        }

        TargetResolution::Direct(target.declaration_id)
    }

    // Matches `name` against the `Component_Member` implementer convention:
    // some registered module's name as prefix, an underscore, then a
    // procedure declared in that module.
    fn interface_member_for(&self, name: &str) -> Option<&Declaration> {
        for (module_id, module_name) in &self.module_names {
            let prefix_len = module_name.len();
            if name.len() <= prefix_len + 1 || !name.is_char_boundary(prefix_len) {
                continue;
            }
            if !same_identifier(&name[..prefix_len], module_name)
                || name.as_bytes()[prefix_len] != b'_'
            {
                continue;
            }
            let member_name = &name[prefix_len + 1..];
            let member = self
                .procedures_named(member_name)
                .into_iter()
                .find(|d| d.module_id == *module_id && d.parent_id.is_none());
            if member.is_some() {
                return member;
            }
        }
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: u32, name: &str, module: u32, span: Span) -> Declaration {
        Declaration::new(
            DeclarationId::new(id),
            DeclarationKind::Procedure(ProcedureKind::Sub),
            name,
            ModuleId::new(module),
            span,
        )
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn find_target_returns_innermost() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(sub(0, "Foo", 1, Span::new(0, 100)));
            index.insert_declaration(
                Declaration::new(
                    DeclarationId::new(1),
                    DeclarationKind::Parameter,
                    "a",
                    ModuleId::new(1),
                    Span::new(15, 25),
                )
                .with_parent(DeclarationId::new(0)),
            );

            let hit = index.find_target(ModuleId::new(1), 20).unwrap();
            assert_eq!(hit.declaration_id, DeclarationId::new(1));

            let hit = index.find_target(ModuleId::new(1), 50).unwrap();
            assert_eq!(hit.declaration_id, DeclarationId::new(0));

            assert!(index.find_target(ModuleId::new(1), 200).is_none());
            assert!(index.find_target(ModuleId::new(9), 20).is_none());
        }

        #[test]
        fn name_lookups_are_case_insensitive() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(sub(0, "DoWork", 1, Span::new(0, 40)));

            assert_eq!(index.procedures_named("dowork").len(), 1);
            assert_eq!(index.procedures_named("DOWORK").len(), 1);
            assert!(index.contains_name(ModuleId::new(1), "doWORK"));
            assert!(!index.contains_name(ModuleId::new(2), "DoWork"));
        }

        #[test]
        fn references_sorted_by_source_position() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(sub(0, "Foo", 1, Span::new(0, 10)));
            let decl = DeclarationId::new(0);
            index.insert_reference(Reference::new(
                ReferenceId::new(0),
                decl,
                ModuleId::new(2),
                Span::new(50, 53),
                Span::new(50, 60),
            ));
            index.insert_reference(Reference::new(
                ReferenceId::new(1),
                decl,
                ModuleId::new(2),
                Span::new(10, 13),
                Span::new(10, 20),
            ));

            let refs = index.references_of(decl);
            assert_eq!(refs.len(), 2);
            assert_eq!(refs[0].span.start, 10);
            assert_eq!(refs[1].span.start, 50);
        }

        #[test]
        fn parameters_in_declaration_order() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(sub(0, "Foo", 1, Span::new(0, 100)));
            let proc_id = DeclarationId::new(0);
            for (i, (name, start)) in [("b", 30u64), ("a", 15u64)].iter().enumerate() {
                index.insert_declaration(
                    Declaration::new(
                        DeclarationId::new(i as u32 + 1),
                        DeclarationKind::Parameter,
                        *name,
                        ModuleId::new(1),
                        Span::new(*start, start + 10),
                    )
                    .with_parent(proc_id),
                );
            }

            let params = index.parameters_of(proc_id);
            assert_eq!(params[0].name, "a");
            assert_eq!(params[1].name, "b");
        }
    }

    mod triad_tests {
        use super::*;

        #[test]
        fn siblings_finds_letter_and_setter() {
            let mut index = DeclarationIndex::new();
            let module = ModuleId::new(1);
            for (id, kind, start) in [
                (0, ProcedureKind::PropertyGet, 0u64),
                (1, ProcedureKind::PropertyLet, 50u64),
                (2, ProcedureKind::PropertySet, 100u64),
            ] {
                index.insert_declaration(Declaration::new(
                    DeclarationId::new(id),
                    DeclarationKind::Procedure(kind),
                    "Value",
                    module,
                    Span::new(start, start + 40),
                ));
            }
            // Same name in another module must not match.
            index.insert_declaration(Declaration::new(
                DeclarationId::new(3),
                DeclarationKind::Procedure(ProcedureKind::PropertyLet),
                "Value",
                ModuleId::new(2),
                Span::new(0, 40),
            ));

            let siblings = index.siblings_by_name_and_scope(
                "value",
                module,
                &[
                    DeclarationKind::Procedure(ProcedureKind::PropertyLet),
                    DeclarationKind::Procedure(ProcedureKind::PropertySet),
                ],
            );
            assert_eq!(siblings.len(), 2);
            assert_eq!(
                siblings[0].kind,
                DeclarationKind::Procedure(ProcedureKind::PropertyLet)
            );
            assert_eq!(
                siblings[1].kind,
                DeclarationKind::Procedure(ProcedureKind::PropertySet)
            );
        }
    }

    mod resolution_tests {
        use super::*;

        #[test]
        fn direct_target() {
            let mut index = DeclarationIndex::new();
            index.register_module(ModuleId::new(1), "Module1");
            index.insert_declaration(sub(0, "DoWork", 1, Span::new(0, 40)));

            assert_eq!(
                index.resolve_refactoring_target(ModuleId::new(1), 5),
                TargetResolution::Direct(DeclarationId::new(0))
            );
        }

        #[test]
        fn implementer_redirects_to_interface_member() {
            let mut index = DeclarationIndex::new();
            index.register_module(ModuleId::new(1), "IClass1");
            index.register_module(ModuleId::new(2), "Class1");
            index.insert_declaration(sub(0, "DoSomething", 1, Span::new(0, 40)));
            index.insert_declaration(sub(1, "IClass1_DoSomething", 2, Span::new(0, 60)));

            assert_eq!(
                index.resolve_refactoring_target(ModuleId::new(2), 5),
                TargetResolution::ImplementsInterfaceMember {
                    selected: DeclarationId::new(1),
                    interface_member: DeclarationId::new(0),
                }
            );
        }

        #[test]
        fn no_target_is_explicit() {
            let index = DeclarationIndex::new();
            assert_eq!(
                index.resolve_refactoring_target(ModuleId::new(1), 0),
                TargetResolution::NotFound
            );
        }
    }

    mod semantic_queries {
        use super::*;

        #[test]
        fn with_events_fields_match_component_type() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(
                Declaration::new(
                    DeclarationId::new(0),
                    DeclarationKind::Variable,
                    "emitter",
                    ModuleId::new(1),
                    Span::new(0, 30),
                )
                .with_type_name("Class1")
                .as_with_events(),
            );
            index.insert_declaration(
                Declaration::new(
                    DeclarationId::new(1),
                    DeclarationKind::Variable,
                    "plain",
                    ModuleId::new(1),
                    Span::new(40, 60),
                )
                .with_type_name("Class1"),
            );

            let fields = index.with_events_fields_of_type("class1");
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].name, "emitter");
        }

        #[test]
        fn udt_members_in_order() {
            let mut index = DeclarationIndex::new();
            index.insert_declaration(Declaration::new(
                DeclarationId::new(0),
                DeclarationKind::UserDefinedType,
                "TBar",
                ModuleId::new(1),
                Span::new(0, 80),
            ));
            let udt = DeclarationId::new(0);
            for (id, name, start) in [(1, "First", 20u64), (2, "Second", 45u64)] {
                index.insert_declaration(
                    Declaration::new(
                        DeclarationId::new(id),
                        DeclarationKind::UdtMember,
                        name,
                        ModuleId::new(1),
                        Span::new(start, start + 20),
                    )
                    .with_parent(udt),
                );
            }

            assert_eq!(index.udt_named("tbar").unwrap().declaration_id, udt);
            let members = index.udt_members_of(udt);
            assert_eq!(members.len(), 2);
            assert_eq!(members[0].name, "First");
            assert_eq!(members[1].name, "Second");
        }
    }
}
