//! Signature plans: which parameters survive a refactoring, and in what
//! order.
//!
//! A [`SignaturePlan`] lists original parameter indices in their target
//! order; an index absent from the plan means the parameter is removed.
//! Plans are validated against the language's signature rules before any
//! edit is produced, and the same plan is then replayed against every
//! affected signature (the target, its property siblings, event handlers,
//! interface implementers).
//!
//! Two rewriters consume a validated plan:
//!
//! - [`plan_declaration_edits`] rewrites a parameter list in a declaration,
//!   slot by slot, so separators and line wrapping between slots survive.
//! - [`rewrite_call_arguments`] re-emits a scanned call-site argument list
//!   in target order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arglist::ArgumentList;
use crate::decls::Declaration;
use crate::rewrite::{Edit, ModuleId, Span};
use crate::text::extract_span;

/// Recognizes `name:=value` argument syntax.
static NAMED_ARGUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*\s*:=").unwrap());

// ============================================================================
// Plan rules
// ============================================================================

/// A signature-plan rule violation. Checked before any edit is staged; a
/// violation aborts the whole refactoring with zero edits.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRule {
    /// The plan reproduces the current signature exactly.
    #[error("plan does not change the signature")]
    NoChange,

    /// A plan entry names a parameter index the signature does not have.
    #[error("parameter index {index} out of range ({parameter_count} parameters)")]
    IndexOutOfRange {
        index: usize,
        parameter_count: usize,
    },

    /// The same parameter index appears twice in the plan.
    #[error("parameter index {index} appears more than once")]
    DuplicateIndex { index: usize },

    /// The planned order puts an `Optional` parameter before a required one.
    #[error("optional parameter '{parameter}' would precede a required parameter")]
    OptionalBeforeRequired { parameter: String },

    /// The planned order moves a `ParamArray` off the final slot.
    #[error("param-array parameter '{parameter}' must stay last")]
    ParamArrayNotLast { parameter: String },

    /// An encapsulation request selected no fields.
    #[error("no fields selected")]
    EmptySelection,

    /// An encapsulation request named a record member its type does not have.
    #[error("record type '{udt}' has no member '{member}'")]
    UnknownUdtMember { udt: String, member: String },
}

// ============================================================================
// Parameter descriptors
// ============================================================================

/// One parameter of a signature, with its original position and source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Zero-based position in the original signature.
    pub original_index: usize,
    /// Parameter name.
    pub name: String,
    /// Full declaration text as written (`Optional ByVal b As String = "x"`).
    pub text: String,
    /// Declared type, when the source names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// `Optional` parameter.
    pub is_optional: bool,
    /// `ParamArray` parameter.
    pub is_param_array: bool,
    /// Default value text for optionals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Span of the declaration text in the module snapshot.
    pub span: Span,
}

/// A parameter paired with the slot it moves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedParameter<'a> {
    /// Zero-based slot in the new signature.
    pub target_index: usize,
    pub descriptor: &'a ParameterDescriptor,
}

/// Build descriptors for a signature's parameters, in declaration order.
///
/// Returns `None` when a parameter span does not resolve against the module
/// text, which means the index and the snapshot disagree.
pub fn describe_parameters(
    module_text: &str,
    parameters: &[&Declaration],
) -> Option<Vec<ParameterDescriptor>> {
    parameters
        .iter()
        .enumerate()
        .map(|(index, decl)| {
            let text = extract_span(module_text, &decl.span)?;
            Some(ParameterDescriptor {
                original_index: index,
                name: decl.name.clone(),
                text: text.to_string(),
                type_name: decl.type_name.clone(),
                is_optional: decl.is_optional,
                is_param_array: decl.is_param_array,
                default_value: decl.default_value.clone(),
                span: decl.span,
            })
        })
        .collect()
}

/// Split off the trailing value parameter of a `Property Let`/`Set`-shaped
/// signature. The value parameter keeps its slot through any reordering;
/// only the leading parameters are plannable.
pub fn split_value_parameter(
    pin_value: bool,
    mut descriptors: Vec<ParameterDescriptor>,
) -> (Vec<ParameterDescriptor>, Option<ParameterDescriptor>) {
    if pin_value {
        let pinned = descriptors.pop();
        (descriptors, pinned)
    } else {
        (descriptors, None)
    }
}

// ============================================================================
// Signature plans
// ============================================================================

/// Original parameter indices in their target order; omitted indices are
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePlan {
    new_order: Vec<usize>,
}

impl SignaturePlan {
    pub fn new(new_order: Vec<usize>) -> Self {
        SignaturePlan { new_order }
    }

    /// Plan that removes the given original indices and keeps the rest in
    /// their current order.
    pub fn removing(parameter_count: usize, removed: &[usize]) -> Self {
        let new_order = (0..parameter_count)
            .filter(|index| !removed.contains(index))
            .collect();
        SignaturePlan { new_order }
    }

    /// Kept original indices, in target order.
    pub fn retained(&self) -> &[usize] {
        &self.new_order
    }

    /// Original indices the plan drops.
    pub fn removed_indices(&self, parameter_count: usize) -> Vec<usize> {
        (0..parameter_count)
            .filter(|index| !self.new_order.contains(index))
            .collect()
    }

    /// Whether the plan keeps every parameter in its current slot.
    pub fn is_identity(&self, parameter_count: usize) -> bool {
        self.new_order.len() == parameter_count
            && self.new_order.iter().enumerate().all(|(slot, &k)| slot == k)
    }

    /// Check the plan against the plannable parameters of a signature.
    pub fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), PlanRule> {
        let count = parameters.len();
        let mut seen = vec![false; count];
        for &index in &self.new_order {
            if index >= count {
                return Err(PlanRule::IndexOutOfRange {
                    index,
                    parameter_count: count,
                });
            }
            if seen[index] {
                return Err(PlanRule::DuplicateIndex { index });
            }
            seen[index] = true;
        }

        if self.is_identity(count) {
            return Err(PlanRule::NoChange);
        }

        let last_slot = self.new_order.len().saturating_sub(1);
        for (slot, &index) in self.new_order.iter().enumerate() {
            if parameters[index].is_param_array && slot != last_slot {
                return Err(PlanRule::ParamArrayNotLast {
                    parameter: parameters[index].name.clone(),
                });
            }
        }

        let mut optional_seen = false;
        for &index in &self.new_order {
            let descriptor = &parameters[index];
            if descriptor.is_optional {
                optional_seen = true;
            } else if optional_seen && !descriptor.is_param_array {
                return Err(PlanRule::OptionalBeforeRequired {
                    parameter: descriptor.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Pair each kept parameter with its target slot.
    pub fn planned<'a>(&self, parameters: &'a [ParameterDescriptor]) -> Vec<PlannedParameter<'a>> {
        self.new_order
            .iter()
            .enumerate()
            .map(|(target_index, &original)| PlannedParameter {
                target_index,
                descriptor: &parameters[original],
            })
            .collect()
    }
}

// ============================================================================
// Declaration rewriting
// ============================================================================

/// Edits that rewrite one declaration's parameter list to match the plan.
///
/// Each surviving slot whose occupant changes is replaced in place, so the
/// separators and any line wrapping between slots stay as written. Trailing
/// removed slots fall to a single deletion. `pinned` is the value parameter
/// of a `Property Let`/`Set`, which never moves.
///
/// The plan must already be validated; slots are addressed by the
/// descriptors' parser spans against the same snapshot the descriptors were
/// built from.
pub fn plan_declaration_edits(
    module: ModuleId,
    plan: &SignaturePlan,
    plannable: &[ParameterDescriptor],
    pinned: Option<&ParameterDescriptor>,
) -> Vec<Edit> {
    let kept = plan.retained();
    let mut edits = Vec::new();

    for (slot, &original) in kept.iter().enumerate() {
        if original == slot {
            continue;
        }
        let slot_descriptor = &plannable[slot];
        let incoming = &plannable[original];
        edits.push(
            Edit::replace(module, slot_descriptor.span, incoming.text.clone())
                .expecting(&slot_descriptor.text),
        );
    }

    if kept.len() < plannable.len() {
        let last = &plannable[plannable.len() - 1];
        let (start, end) = if kept.is_empty() {
            let end = match pinned {
                Some(value_param) => value_param.span.start,
                None => last.span.end,
            };
            (plannable[0].span.start, end)
        } else {
            (plannable[kept.len() - 1].span.end, last.span.end)
        };
        edits.push(Edit::delete(module, Span::new(start, end)));
    }

    edits
}

// ============================================================================
// Call-site rewriting
// ============================================================================

/// A call whose argument shape the rewriter cannot restructure. The caller
/// records the site as skipped instead of failing the refactoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallShape {
    /// More positional arguments than the signature has parameters.
    #[error("call passes {found} arguments but the signature takes {expected}")]
    TooManyArguments { expected: usize, found: usize },

    /// The call uses `name:=value` arguments, which this rewriter does not
    /// reorder.
    #[error("call uses named arguments")]
    NamedArguments,
}

/// Re-emit a scanned argument list in the plan's target order.
///
/// Unpassed trailing optionals that move before a passed argument become
/// empty placeholder slots; trailing empty slots are trimmed. Arguments
/// bound to a trailing param-array keep their original relative order, and
/// are dropped when the plan removes the param-array. Returns the new list
/// text, which may equal the current text when the call happens to need no
/// change.
pub fn rewrite_call_arguments(
    plan: &SignaturePlan,
    plannable: &[ParameterDescriptor],
    list: &ArgumentList,
) -> Result<String, CallShape> {
    if list
        .arguments
        .iter()
        .any(|argument| NAMED_ARGUMENT.is_match(&argument.text))
    {
        return Err(CallShape::NamedArguments);
    }

    let param_array_index = plannable
        .last()
        .filter(|descriptor| descriptor.is_param_array)
        .map(|descriptor| descriptor.original_index);

    if param_array_index.is_none() && list.arguments.len() > plannable.len() {
        return Err(CallShape::TooManyArguments {
            expected: plannable.len(),
            found: list.arguments.len(),
        });
    }

    let mut slots: Vec<&str> = Vec::new();
    for &original in plan.retained() {
        if Some(original) == param_array_index {
            continue;
        }
        let text = list
            .arguments
            .get(original)
            .map(|argument| argument.text.as_str())
            .unwrap_or_default();
        slots.push(text);
    }

    if let Some(pa) = param_array_index {
        if plan.retained().contains(&pa) {
            for argument in list.arguments.iter().skip(pa) {
                slots.push(&argument.text);
            }
        }
    }

    while slots.last().is_some_and(|text| text.is_empty()) {
        slots.pop();
    }

    Ok(slots.join(", "))
}

// ============================================================================
// Tests
// ============================================================================
