//! Test support: builds declaration tables from annotated source.
//!
//! The engine consumes a parsed program; the real parser lives in the host.
//! This module is a deliberately small stand-in that scans line-oriented
//! Basic-style source well enough to exercise the refactorings end to end:
//! module-level procedures, properties, record types, fields, and
//! case-insensitive identifier references with statement-line contexts.
//!
//! It is a fixture, not a parser. Constructs it understands:
//!
//! ```text
//! [Public|Private|Friend] Sub|Function Name(params) [As Type] ... End Sub|Function
//! [Public|Private] Property Get|Let|Set Name(params) [As Type] ... End Property
//! [Public|Private] Event Name(params)
//! [Public|Private] Type Name ... End Type
//! Public|Private|Dim|Global [WithEvents] name[()] As [New] Type
//! ```
//!
//! Everything is module level and single line except procedure and type
//! bodies. Comments and string-literal contents are ignored when scanning
//! references. Sources are expected to be ASCII.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::decls::{
    Accessibility, Declaration, DeclarationId, DeclarationIndex, DeclarationKind, ProcedureKind,
    Reference,
};
use crate::rewrite::{ModuleId, ProjectText, Span};
use crate::text::line_bounds;

static PROC_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(Public|Private|Friend)\s+)?(?:Static\s+)?(Sub|Function|Property\s+Get|Property\s+Let|Property\s+Set)\s+([A-Za-z][A-Za-z0-9_]*)\s*\(",
    )
    .unwrap()
});
static EVENT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(Public|Private)\s+)?Event\s+([A-Za-z][A-Za-z0-9_]*)\s*\(").unwrap()
});
static END_PROC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*End\s+(Sub|Function|Property)\b").unwrap());
static TYPE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(Public|Private)\s+)?Type\s+([A-Za-z][A-Za-z0-9_]*)\s*$").unwrap()
});
static END_TYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*End\s+Type\b").unwrap());
static UDT_MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Za-z][A-Za-z0-9_]*)\s*(\(\s*\))?\s+As\s+([A-Za-z][A-Za-z0-9_]*)")
        .unwrap()
});
static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(Public|Private|Dim|Global)\s+(WithEvents\s+)?([A-Za-z][A-Za-z0-9_]*)\s*(\(\s*\))?\s+As\s+(?:New\s+)?([A-Za-z][A-Za-z0-9_]*)",
    )
    .unwrap()
});
static RETURN_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\)\s*As\s+([A-Za-z][A-Za-z0-9_]*)\s*$").unwrap());
static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)").unwrap());
static PARAM_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAs\s+([A-Za-z][A-Za-z0-9_]*)").unwrap());
static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9_]*\b").unwrap());

/// Built-in type names that carry object (`Set`) assignment semantics.
const OBJECT_TYPES: [&str; 5] = ["Object", "Collection", "Dictionary", "Worksheet", "Range"];

/// A scanned project: the declaration table, the text snapshot, and the
/// modules in registration order.
pub struct Fixture {
    pub index: DeclarationIndex,
    pub text: ProjectText,
    pub modules: Vec<ModuleId>,
}

impl Fixture {
    /// The module registered under `name`.
    ///
    /// # Panics
    /// Panics when no module has that name.
    pub fn module(&self, name: &str) -> ModuleId {
        self.index
            .module_named(name)
            .unwrap_or_else(|| panic!("no module named '{}'", name))
    }

    /// The first declaration with the given name and kind.
    ///
    /// # Panics
    /// Panics when none matches.
    pub fn decl(&self, name: &str, kind: DeclarationKind) -> &Declaration {
        self.index
            .declarations()
            .find(|d| d.kind == kind && d.name.eq_ignore_ascii_case(name))
            .unwrap_or_else(|| panic!("no {:?} declaration named '{}'", kind, name))
    }

    /// Absolute offset of the first occurrence of `needle` in a module.
    ///
    /// # Panics
    /// Panics when the module or the needle is missing.
    pub fn offset_of(&self, module: ModuleId, needle: &str) -> u64 {
        let source = self
            .text
            .get(module)
            .unwrap_or_else(|| panic!("module {} has no text", module));
        source
            .find(needle)
            .unwrap_or_else(|| panic!("'{}' not found in {}", needle, module)) as u64
    }
}

/// Scan `(component_name, source)` pairs into a fixture project.
pub fn project(modules: &[(&str, &str)]) -> Fixture {
    let mut index = DeclarationIndex::new();
    let mut text = ProjectText::new();
    let mut ids = Vec::new();

    for (i, (name, source)) in modules.iter().enumerate() {
        let module = ModuleId::new(i as u32);
        index.register_module(module, *name);
        text.insert(module, *source);
        ids.push(module);
    }

    let object_types: BTreeSet<String> = OBJECT_TYPES
        .iter()
        .map(|t| t.to_ascii_lowercase())
        .chain(modules.iter().map(|(name, _)| name.to_ascii_lowercase()))
        .collect();

    for (i, (_, source)) in modules.iter().enumerate() {
        scan_declarations(&mut index, ModuleId::new(i as u32), source, &object_types);
    }
    for (i, (_, source)) in modules.iter().enumerate() {
        scan_references(&mut index, ModuleId::new(i as u32), source);
    }

    Fixture {
        index,
        text,
        modules: ids,
    }
}

// ============================================================================
// Declaration scanning
// ============================================================================

struct OpenBlock {
    id: DeclarationId,
    kind: DeclarationKind,
    name: String,
    accessibility: Accessibility,
    type_name: Option<String>,
    is_object_type: bool,
    start: u64,
    start_line: u32,
}

fn scan_declarations(
    index: &mut DeclarationIndex,
    module: ModuleId,
    source: &str,
    object_types: &BTreeSet<String>,
) {
    let mut open_proc: Option<OpenBlock> = None;
    let mut open_type: Option<OpenBlock> = None;
    let mut offset = 0u64;
    let mut last_end = 0u64;

    for (line_idx, raw) in source.split_inclusive('\n').enumerate() {
        let line_no = line_idx as u32 + 1;
        let line = raw.trim_end_matches(['\n', '\r']);
        let line_end = offset + line.len() as u64;
        last_end = line_end;
        let code = mask_noncode(line);

        if END_PROC.is_match(&code) {
            if let Some(block) = open_proc.take() {
                close_block(index, module, block, line_end, line_no);
            }
        } else if END_TYPE.is_match(&code) {
            if let Some(block) = open_type.take() {
                close_block(index, module, block, line_end, line_no);
            }
        } else if let Some(block) = &open_type {
            if let Some(caps) = UDT_MEMBER.captures(&code) {
                let name = caps.get(1).expect("member name group");
                let member_id = index.next_declaration_id();
                let type_name = caps.get(3).expect("member type group").as_str();
                let mut member = Declaration::new(
                    member_id,
                    DeclarationKind::UdtMember,
                    name.as_str(),
                    module,
                    Span::new(offset + name.start() as u64, offset + name.end() as u64),
                )
                .with_parent(block.id)
                .with_type_name(type_name)
                .with_lines(line_no, line_no);
                if caps.get(2).is_some() {
                    member = member.as_array();
                }
                if object_types.contains(&type_name.to_ascii_lowercase()) {
                    member = member.as_object_type();
                }
                index.insert_declaration(member);
            }
        } else if let Some(caps) = PROC_HEADER.captures(&code) {
            let kind = procedure_kind(caps.get(2).expect("kind group").as_str());
            let name = caps.get(3).expect("name group");
            let id = index.next_declaration_id();
            scan_parameters(
                index,
                module,
                id,
                line,
                offset,
                Span::new(offset + name.start() as u64, offset + name.end() as u64),
            );
            let type_name = RETURN_TYPE
                .captures(&code)
                .map(|c| c.get(1).expect("return type group").as_str().to_string());
            let is_object = type_name
                .as_deref()
                .is_some_and(|t| object_types.contains(&t.to_ascii_lowercase()));
            open_proc = Some(OpenBlock {
                id,
                kind: DeclarationKind::Procedure(kind),
                name: name.as_str().to_string(),
                accessibility: accessibility(caps.get(1).map(|m| m.as_str())),
                type_name,
                is_object_type: is_object,
                start: offset,
                start_line: line_no,
            });
        } else if let Some(caps) = EVENT_HEADER.captures(&code) {
            // Events are single-line declarations; model them as subs so
            // handler propagation can find their member name.
            let name = caps.get(2).expect("event name group");
            let id = index.next_declaration_id();
            scan_parameters(
                index,
                module,
                id,
                line,
                offset,
                Span::new(offset + name.start() as u64, offset + name.end() as u64),
            );
            index.insert_declaration(
                Declaration::new(
                    id,
                    DeclarationKind::Procedure(ProcedureKind::Sub),
                    name.as_str(),
                    module,
                    Span::new(offset, line_end),
                )
                .with_accessibility(accessibility(caps.get(1).map(|m| m.as_str())))
                .with_lines(line_no, line_no),
            );
        } else if let Some(caps) = TYPE_HEADER.captures(&code) {
            let name = caps.get(2).expect("type name group");
            let id = index.next_declaration_id();
            open_type = Some(OpenBlock {
                id,
                kind: DeclarationKind::UserDefinedType,
                name: name.as_str().to_string(),
                accessibility: accessibility(caps.get(1).map(|m| m.as_str())),
                type_name: None,
                is_object_type: false,
                start: offset,
                start_line: line_no,
            });
        } else if open_proc.is_none() {
            if let Some(caps) = FIELD.captures(&code) {
                let name = caps.get(3).expect("field name group");
                let type_name = caps.get(5).expect("field type group").as_str();
                let id = index.next_declaration_id();
                let mut field = Declaration::new(
                    id,
                    DeclarationKind::Variable,
                    name.as_str(),
                    module,
                    Span::new(offset + name.start() as u64, offset + name.end() as u64),
                )
                .with_accessibility(accessibility(caps.get(1).map(|m| m.as_str())))
                .with_type_name(type_name)
                .with_lines(line_no, line_no);
                if caps.get(2).is_some() {
                    field = field.as_with_events();
                }
                if caps.get(4).is_some() {
                    field = field.as_array();
                }
                if object_types.contains(&type_name.to_ascii_lowercase()) {
                    field = field.as_object_type();
                }
                index.insert_declaration(field);
            }
        }

        offset += raw.len() as u64;
    }

    // Unterminated blocks close at end of source.
    let final_line = source.lines().count() as u32;
    if let Some(block) = open_proc.take() {
        close_block(index, module, block, last_end, final_line.max(1));
    }
    if let Some(block) = open_type.take() {
        close_block(index, module, block, last_end, final_line.max(1));
    }
}

fn close_block(
    index: &mut DeclarationIndex,
    module: ModuleId,
    block: OpenBlock,
    end: u64,
    end_line: u32,
) {
    let mut decl = Declaration::new(
        block.id,
        block.kind,
        block.name,
        module,
        Span::new(block.start, end),
    )
    .with_accessibility(block.accessibility)
    .with_lines(block.start_line, end_line);
    if let Some(type_name) = block.type_name {
        decl = decl.with_type_name(type_name);
    }
    if block.is_object_type {
        decl = decl.as_object_type();
    }
    index.insert_declaration(decl);
}

fn scan_parameters(
    index: &mut DeclarationIndex,
    module: ModuleId,
    procedure: DeclarationId,
    line: &str,
    line_start: u64,
    name_span: Span,
) {
    let Ok(Some(list)) = crate::arglist::scan_arguments(line, line_start, name_span) else {
        return;
    };
    for argument in &list.arguments {
        if argument.text.is_empty() {
            continue;
        }
        let mut rest = argument.text.as_str();
        let mut is_optional = false;
        let mut is_param_array = false;
        loop {
            if let Some(after) = strip_keyword(rest, "Optional") {
                is_optional = true;
                rest = after;
            } else if let Some(after) = strip_keyword(rest, "ParamArray") {
                is_param_array = true;
                rest = after;
            } else if let Some(after) =
                strip_keyword(rest, "ByVal").or_else(|| strip_keyword(rest, "ByRef"))
            {
                rest = after;
            } else {
                break;
            }
        }
        let Some(name) = PARAM_NAME.captures(rest).and_then(|c| c.get(1)) else {
            continue;
        };

        let (head, default) = match argument.text.split_once('=') {
            Some((head, default)) => (head, Some(default.trim().to_string())),
            None => (argument.text.as_str(), None),
        };
        let type_name = PARAM_TYPE
            .captures(head)
            .map(|c| c.get(1).expect("param type group").as_str().to_string());

        let id = index.next_declaration_id();
        let mut param = Declaration::new(
            id,
            DeclarationKind::Parameter,
            name.as_str(),
            module,
            argument.span,
        )
        .with_parent(procedure);
        if is_optional {
            param = param.as_optional();
        }
        if is_param_array {
            param = param.as_param_array();
        }
        if let Some(type_name) = type_name {
            param = param.with_type_name(type_name);
        }
        if let Some(default) = default {
            param = param.with_default_value(default);
        }
        index.insert_declaration(param);
    }
}

fn procedure_kind(keyword: &str) -> ProcedureKind {
    let folded = keyword.to_ascii_lowercase();
    if folded.starts_with("sub") {
        ProcedureKind::Sub
    } else if folded.starts_with("function") {
        ProcedureKind::Function
    } else if folded.ends_with("get") {
        ProcedureKind::PropertyGet
    } else if folded.ends_with("let") {
        ProcedureKind::PropertyLet
    } else {
        ProcedureKind::PropertySet
    }
}

fn accessibility(keyword: Option<&str>) -> Accessibility {
    match keyword.map(|k| k.to_ascii_lowercase()).as_deref() {
        Some("public") => Accessibility::Public,
        Some("private") => Accessibility::Private,
        Some("friend") => Accessibility::Friend,
        Some("global") => Accessibility::Global,
        _ => Accessibility::Implicit,
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    if text.len() > keyword.len()
        && text[..keyword.len()].eq_ignore_ascii_case(keyword)
        && text.as_bytes()[keyword.len()].is_ascii_whitespace()
    {
        Some(text[keyword.len()..].trim_start())
    } else {
        None
    }
}

// ============================================================================
// Reference scanning
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum AssignTarget {
    No,
    Let,
    Set,
}

fn scan_references(index: &mut DeclarationIndex, module: ModuleId, source: &str) {
    let mut offset = 0u64;
    for raw in source.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\n', '\r']);
        let code = mask_noncode(line);
        let context = Span::new(offset, offset + line.len() as u64);

        let matches: Vec<(usize, usize)> = IDENT
            .find_iter(&code)
            .map(|m| (m.start(), m.end()))
            .collect();

        for (i, &(start, end)) in matches.iter().enumerate() {
            let name = &code[start..end];
            let span = Span::new(offset + start as u64, offset + end as u64);
            let enclosing = enclosing_procedure(index, module, span.start);

            let dotted_receiver = if start > 0 && code.as_bytes()[start - 1] == b'.' {
                match i.checked_sub(1).map(|p| matches[p]) {
                    Some((rs, re)) if re == start - 1 => Some(&code[rs..re]),
                    _ => None,
                }
            } else {
                None
            };
            if start > 0 && code.as_bytes()[start - 1] == b'.' && dotted_receiver.is_none() {
                continue;
            }

            let chain_start = match i.checked_sub(1) {
                Some(p) if dotted_receiver.is_some() => matches[p].0,
                _ => start,
            };
            let assign = assignment_target(&code, chain_start, end);

            let resolved = match dotted_receiver {
                Some(receiver) => {
                    resolve_dotted(index, module, enclosing, receiver, name, assign)
                }
                None => resolve_bare(index, module, enclosing, name, assign),
            };
            let Some(declaration_id) = resolved else {
                continue;
            };

            // An occurrence on its own declaration's header is the
            // declaration, not a reference to it. Occurrences later in a
            // procedure's body (recursive calls, return-value assignments)
            // are references like any other.
            let owner = index
                .declaration(declaration_id)
                .expect("resolved declaration exists");
            if owner.module_id == module {
                let declaration_site = if owner.kind.is_procedure() {
                    line_bounds(source, owner.span.start).contains_offset(span.start)
                } else {
                    owner.span.contains_offset(span.start)
                };
                if declaration_site {
                    continue;
                }
            }

            let id = index.next_reference_id();
            let mut reference = Reference::new(id, declaration_id, module, span, context);
            if let Some(enclosing) = enclosing {
                reference = reference.with_enclosing_procedure(enclosing);
            }
            index.insert_reference(reference);
        }

        offset += raw.len() as u64;
    }
}

fn enclosing_procedure(
    index: &DeclarationIndex,
    module: ModuleId,
    at: u64,
) -> Option<DeclarationId> {
    index
        .declarations()
        .filter(|d| {
            d.module_id == module && d.kind.is_procedure() && d.span.contains_offset(at)
        })
        .min_by_key(|d| d.span.len())
        .map(|d| d.declaration_id)
}

fn resolve_bare(
    index: &DeclarationIndex,
    module: ModuleId,
    enclosing: Option<DeclarationId>,
    name: &str,
    assign: AssignTarget,
) -> Option<DeclarationId> {
    // Parameters of the enclosing procedure shadow module scope.
    if let Some(enclosing) = enclosing {
        if let Some(param) = index
            .parameters_of(enclosing)
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Some(param.declaration_id);
        }
    }

    let module_level = |d: &&Declaration| {
        d.parent_id.is_none()
            && !matches!(
                d.kind,
                DeclarationKind::Parameter | DeclarationKind::UdtMember
            )
    };

    let same_module: Vec<&Declaration> = index
        .declarations()
        .filter(|d| d.module_id == module && d.name.eq_ignore_ascii_case(name))
        .filter(module_level)
        .collect();
    if !same_module.is_empty() {
        return Some(pick_candidate(&same_module, enclosing, assign));
    }

    let elsewhere: Vec<&Declaration> = index
        .declarations()
        .filter(|d| d.module_id != module && d.name.eq_ignore_ascii_case(name))
        .filter(module_level)
        .collect();
    if !elsewhere.is_empty() {
        return Some(pick_candidate(&elsewhere, enclosing, assign));
    }

    None
}

fn resolve_dotted(
    index: &DeclarationIndex,
    module: ModuleId,
    enclosing: Option<DeclarationId>,
    receiver: &str,
    name: &str,
    assign: AssignTarget,
) -> Option<DeclarationId> {
    // The receiver is either a typed variable or a module qualifier.
    let receiver_type = resolve_bare(index, module, enclosing, receiver, AssignTarget::No)
        .and_then(|id| index.declaration(id))
        .and_then(|d| d.type_name.clone())
        .unwrap_or_else(|| receiver.to_string());

    if let Some(udt) = index.udt_named(&receiver_type) {
        return index
            .udt_members_of(udt.declaration_id)
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .map(|m| m.declaration_id);
    }

    let class = index.module_named(&receiver_type)?;
    let members: Vec<&Declaration> = index
        .declarations()
        .filter(|d| {
            d.module_id == class && d.parent_id.is_none() && d.name.eq_ignore_ascii_case(name)
        })
        .filter(|d| !matches!(d.kind, DeclarationKind::Parameter | DeclarationKind::UdtMember))
        .collect();
    if members.is_empty() {
        None
    } else {
        Some(pick_candidate(&members, None, assign))
    }
}

/// Choose between same-named candidates, which in practice means a property
/// triad: an assignment target resolves to the letter (or setter), anything
/// else to the getter. A candidate that is the enclosing procedure itself
/// wins outright so return-value assignments bind to their own accessor.
fn pick_candidate(
    candidates: &[&Declaration],
    enclosing: Option<DeclarationId>,
    assign: AssignTarget,
) -> DeclarationId {
    if let Some(enclosing) = enclosing {
        if let Some(own) = candidates
            .iter()
            .find(|d| d.declaration_id == enclosing)
        {
            return own.declaration_id;
        }
    }
    if candidates.len() == 1 {
        return candidates[0].declaration_id;
    }

    let preference: [ProcedureKind; 3] = match assign {
        AssignTarget::Set => [
            ProcedureKind::PropertySet,
            ProcedureKind::PropertyLet,
            ProcedureKind::PropertyGet,
        ],
        AssignTarget::Let => [
            ProcedureKind::PropertyLet,
            ProcedureKind::PropertySet,
            ProcedureKind::PropertyGet,
        ],
        AssignTarget::No => [
            ProcedureKind::PropertyGet,
            ProcedureKind::PropertyLet,
            ProcedureKind::PropertySet,
        ],
    };
    for kind in preference {
        if let Some(found) = candidates
            .iter()
            .find(|d| d.kind == DeclarationKind::Procedure(kind))
        {
            return found.declaration_id;
        }
    }
    candidates[0].declaration_id
}

/// Whether the identifier chain starting at `chain_start` is the target of
/// an assignment statement, and of which flavor.
fn assignment_target(code: &str, chain_start: usize, name_end: usize) -> AssignTarget {
    let prefix = code[..chain_start].trim();
    let flavor = if prefix.is_empty() {
        AssignTarget::Let
    } else if prefix.eq_ignore_ascii_case("set") {
        AssignTarget::Set
    } else {
        return AssignTarget::No;
    };

    let mut rest = code[name_end..].trim_start();
    if rest.starts_with('(') {
        let mut depth = 0usize;
        let mut close = None;
        for (i, b) in rest.bytes().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match close {
            Some(i) => rest = rest[i + 1..].trim_start(),
            None => return AssignTarget::No,
        }
    }
    if rest.starts_with('=') {
        flavor
    } else {
        AssignTarget::No
    }
}

/// Blank out comment text and string-literal contents, preserving byte
/// offsets, so identifier scanning only sees code.
fn mask_noncode(line: &str) -> String {
    let bytes = line.as_bytes();
    let mut out = vec![b' '; bytes.len()];
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'"' {
                if bytes.get(i + 1) == Some(&b'"') {
                    i += 2;
                    continue;
                }
                in_string = false;
                out[i] = b'"';
            }
        } else {
            match b {
                b'"' => {
                    in_string = true;
                    out[i] = b'"';
                }
                b'\'' => break,
                _ => out[i] = b,
            }
        }
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| " ".repeat(bytes.len()))
}

// ============================================================================
// Tests
// ============================================================================
