//! This module defines the logical plan model and the predicate
//! pushdown rewrite over it.
pub mod builder;
pub mod error;
pub mod explain;
pub mod id;
pub mod op;
pub mod rule;

#[cfg(test)]
pub(crate) mod tests;
