//! Identifier rules and synthesized-name conflict resolution.
//!
//! The source language compares identifiers case-insensitively, so every
//! collision test here folds case. Synthesized names (backing fields,
//! record types, record instances, accessors) start from a candidate and
//! append `_1`, `_2`, ... until nothing in scope and nothing already
//! introduced by the same plan collides.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Identifiers start with a letter and continue with letters, digits, or
/// underscores.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// Maximum identifier length the language accepts.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Errors from identifier validation and name allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The candidate is not a legal identifier.
    #[error("'{name}' is not a valid identifier")]
    InvalidIdentifier { name: String },

    /// No free name was found within the attempt bound.
    #[error("no conflict-free name for base '{base}' within {attempts} attempts")]
    CollisionExhausted { base: String, attempts: usize },
}

/// Case-insensitive identifier equality.
pub fn same_identifier(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Check identifier legality without constructing an error.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Validate a candidate identifier.
pub fn validate_identifier(name: &str) -> Result<(), NameError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(NameError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Uppercase the leading letter, the convention for accessor names derived
/// from field names (`myBar` becomes `MyBar`).
pub fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// Name Allocation
// ============================================================================

/// Allocates conflict-free names for one refactoring plan.
///
/// The allocator remembers every name it has handed out (or that the plan
/// reserved), so two synthesized names within one plan can never collide
/// with each other even when the surrounding scope accepts both.
#[derive(Debug, Clone, Default)]
pub struct NameAllocator {
    introduced: Vec<String>,
}

impl NameAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        NameAllocator::default()
    }

    /// Names handed out or reserved so far, in allocation order.
    pub fn introduced(&self) -> &[String] {
        &self.introduced
    }

    /// Record a name the plan uses without allocating it (a name the caller
    /// chose explicitly). Subsequent allocations avoid it.
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.introduced.push(name.into());
    }

    /// Resolve `base` to a name that is free both per the caller's scope
    /// test and among the names this allocator already produced.
    ///
    /// Tries `base`, then `base_1`, `base_2`, ... `max_attempts` bounds the
    /// search; callers size it from the project declaration count plus the
    /// plan's own name count, which suffixing can never exceed.
    pub fn resolve(
        &mut self,
        base: &str,
        in_scope: impl Fn(&str) -> bool,
        max_attempts: usize,
    ) -> Result<String, NameError> {
        validate_identifier(base)?;

        let mut candidate = base.to_string();
        let mut suffix = 0usize;
        let mut attempts = 0usize;
        while self.is_introduced(&candidate) || in_scope(&candidate) {
            attempts += 1;
            if attempts > max_attempts {
                return Err(NameError::CollisionExhausted {
                    base: base.to_string(),
                    attempts,
                });
            }
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }

        self.introduced.push(candidate.clone());
        Ok(candidate)
    }

    fn is_introduced(&self, name: &str) -> bool {
        self.introduced.iter().any(|n| same_identifier(n, name))
    }
}

// ============================================================================
// Tests
// ============================================================================
