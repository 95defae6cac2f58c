//! Declarative property schema.
//!
//! - [`rules`] - value validators
//! - [`transform`] - value → API literal transforms
//! - [`field`] - field descriptors and layered mappings
//! - [`tables`] - code tables and shared mapping fragments
//! - [`catalog`] - the operation catalog

pub mod catalog;
pub mod field;
pub mod rules;
pub mod tables;
pub mod transform;

pub use catalog::{OperationKind, OperationSpec, SectionCheck, MAIN};
pub use field::{FieldSpec, Mapping, Target};
pub use rules::{Rule, Verdict};
pub use transform::Transform;
