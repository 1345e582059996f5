//! Structural refactoring engine for legacy Basic-style macro projects.
//!
//! This crate plans and applies source-to-source refactorings over a
//! previously parsed program (VBA-like dialect: `Sub`/`Function`,
//! `Property Get|Let|Set` triples, `Private Type` records, `WithEvents`
//! fields, `Interface_Member` implementers):
//! - Declaration and reference model with scope-aware queries
//! - Edit buffer with conflict detection and atomic per-module apply
//! - Signature-change propagation across accessor triples, event
//!   handlers, and interface implementations
//! - Remove/Reorder Parameters and Encapsulate Field refactorings
//! - Report types describing applied edits and skipped call sites
//!
//! Parsing, prompting, and text persistence live in the host; this crate
//! consumes declaration tables and module text snapshots and returns
//! rewritten text.

pub mod arglist;
pub mod decls;
pub mod error;
pub mod fixture;
pub mod names;
pub mod ops;
pub mod output;
pub mod propagate;
pub mod rewrite;
pub mod signature;
pub mod text;
