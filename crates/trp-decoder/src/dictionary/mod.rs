//! Metric dictionaries: id → declaration and enum lookup tables

pub mod declarations;
pub mod lookups;

pub use declarations::{Declaration, DeclarationKind, DeclarationParser, DeclarationSet};
pub use lookups::{LookupParser, LookupTables};
