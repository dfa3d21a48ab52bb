use sieve_expr::Symbol;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Predicate references marker symbol '{0}'")]
    MarkerSymbolReferenced(Symbol),
    #[error("Plan depth exceeds limit {0}")]
    PlanTooDeep(usize),
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    ExprError(#[from] sieve_expr::error::Error),
    #[error(transparent)]
    CatalogError(#[from] sieve_catalog::error::Error),
}
