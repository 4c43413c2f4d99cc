//! Query engine: filter expressions and the typed query builder.
//!
//! Filters are plain data ([`Expr`]) evaluated against stored documents, so
//! the same expression works for typed queries and for filters received
//! through [`crate::boundary`].

mod builder;
mod expr;

pub use builder::Query;
pub(crate) use builder::{lock_predicate, pick_random, scan_matching};
pub use expr::{field, literal, CompareOp, Expr};
