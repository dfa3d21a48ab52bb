use crate::domain::TupleDomain;
use sieve_expr::{Expr, FuncCall};
use smol_str::SmolStr;

/// Predicate handed to the connector of a scanned table.
/// All symbols are renamed to source column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorPredicate {
    pub tuple_domain: TupleDomain,
    /// Full predicate inherited by the scan.
    pub expr: Expr,
    /// Proposed group-by columns when aggregation is pushed down.
    pub group_by: Option<Vec<SmolStr>>,
    /// Proposed aggregate functions when aggregation is pushed down.
    pub aggregates: Option<Vec<FuncCall>>,
    /// Filter the connector must apply before pre-aggregation.
    pub pre_aggr_filter: Expr,
}

impl Default for ConnectorPredicate {
    fn default() -> Self {
        ConnectorPredicate {
            tuple_domain: TupleDomain::all(),
            expr: Expr::const_bool(true),
            group_by: None,
            aggregates: None,
            pre_aggr_filter: Expr::const_bool(true),
        }
    }
}

impl ConnectorPredicate {
    #[inline]
    pub fn new(tuple_domain: TupleDomain, expr: Expr) -> Self {
        ConnectorPredicate {
            tuple_domain,
            expr,
            ..Default::default()
        }
    }

    #[inline]
    pub fn has_aggr_pushdown(&self) -> bool {
        self.group_by.is_some() || self.aggregates.is_some()
    }
}
