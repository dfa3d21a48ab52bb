//! Negotiation of aggregation pushdown with connectors.
//!
//! An aggregation collects its group-by symbols and aggregate calls
//! into a bundle, which travels down through filters, projections and
//! sorts until it reaches a scan. Each projection on the way resolves
//! the bundle into symbols of its source. At the scan, the bundle is
//! checked for eligibility, renamed to source columns and proposed to
//! the connector together with the scan predicate.
//!
//! The connector accepting a proposal pre-aggregates rows per group, so
//! the aggregation above still runs and combines partial results:
//! min, max and sum are re-applied on partial values, count becomes sum
//! of partial counts.
use crate::id::NodeId;
use crate::op::Aggr;
use indexmap::{IndexMap, IndexSet};
use sieve_catalog::{ConnectorPredicate, Metadata, TableHandle};
use sieve_datatype::DataType;
use sieve_expr::{
    combine_conjuncts, extract_conjuncts, is_deterministic, Expr, FuncCall, FuncKind, Symbol, Types,
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Per aggregation whose counts are computed by connector, the sum of
/// partial counts mapped to the original count call, in source column
/// names.
pub type AggrRewrites = HashMap<NodeId, HashMap<FuncCall, FuncCall>>;

/// Reason why a bundle can not be pushed down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggrIneligible {
    UnsupportedFunction(SmolStr),
    ArgumentNotColumn(Symbol),
    ArgumentType(Symbol),
    SharedColumn(Symbol),
    GroupByColumn(Symbol),
    GroupByExpression(Symbol),
    MissingColumn(Symbol),
    NonDeterministicFilter,
}

impl fmt::Display for AggrIneligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggrIneligible::UnsupportedFunction(name) => write!(f, "unsupported function {}", name),
            AggrIneligible::ArgumentNotColumn(s) => write!(f, "argument of {} is not a column", s),
            AggrIneligible::ArgumentType(s) => write!(f, "unsupported argument type of {}", s),
            AggrIneligible::SharedColumn(s) => write!(f, "column {} shared by aggregates", s),
            AggrIneligible::GroupByColumn(s) => write!(f, "aggregated column {} in group by", s),
            AggrIneligible::GroupByExpression(s) => write!(f, "group by {} is an expression", s),
            AggrIneligible::MissingColumn(s) => write!(f, "no column for symbol {}", s),
            AggrIneligible::NonDeterministicFilter => f.write_str("non-deterministic filter"),
        }
    }
}

/// One aggregate call of the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggrItem {
    /// Output symbol of the aggregation.
    pub output: Symbol,
    /// Call as written in the aggregation.
    pub call: FuncCall,
    /// Symbol whose value slot receives the pre-aggregated value at
    /// current level. None if the argument is a constant expression.
    pub carrier: Option<Symbol>,
    /// Call with arguments resolved to symbols of current level.
    pub resolved: FuncCall,
}

/// Aggregation travelling down to a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggrBundle {
    pub aggr_id: NodeId,
    pub group_by: Vec<Symbol>,
    pub aggrs: Vec<AggrItem>,
}

impl AggrBundle {
    /// Create the bundle of an aggregation. Every aggregate must take
    /// a single column.
    pub fn new(aggr_id: NodeId, aggr: &Aggr) -> Result<Self, AggrIneligible> {
        let mut aggrs = Vec::with_capacity(aggr.aggrs.len());
        for (output, call) in &aggr.aggrs {
            if !call.distinct && !is_supported(call) {
                return Err(AggrIneligible::UnsupportedFunction(call.name.clone()));
            }
            let carrier = match call.args.as_slice() {
                [Expr::Col(s)] => s.clone(),
                _ => return Err(AggrIneligible::ArgumentNotColumn(output.clone())),
            };
            aggrs.push(AggrItem {
                output: output.clone(),
                call: call.clone(),
                carrier: Some(carrier),
                resolved: call.clone(),
            });
        }
        Ok(AggrBundle {
            aggr_id,
            group_by: aggr.group_by.clone(),
            aggrs,
        })
    }

    /// Resolve the bundle through a projection.
    ///
    /// Returns the bundle over symbols of projection source, and the
    /// assignments the projection must take if pushdown is accepted.
    /// A carrier computed from an expression then reads the slot of
    /// the first symbol of that expression.
    pub fn through_project(
        self,
        assignments: &IndexMap<Symbol, Expr>,
        types: &Types,
    ) -> Result<(Self, Vec<(Symbol, Expr)>), AggrIneligible> {
        let mut group_by = Vec::with_capacity(self.group_by.len());
        for g in &self.group_by {
            match assignments.get(g) {
                Some(Expr::Col(s)) => group_by.push(s.clone()),
                Some(_) => return Err(AggrIneligible::GroupByExpression(g.clone())),
                None => return Err(AggrIneligible::MissingColumn(g.clone())),
            }
        }
        let mapping: HashMap<Symbol, Expr> = assignments
            .iter()
            .map(|(s, e)| (s.clone(), e.clone()))
            .collect();
        let mut substitutions = vec![];
        let mut aggrs = Vec::with_capacity(self.aggrs.len());
        for item in self.aggrs {
            let mut args = Vec::with_capacity(item.resolved.args.len());
            for arg in &item.resolved.args {
                if let Some(s) = arg
                    .unique_symbols()
                    .into_iter()
                    .find(|s| !assignments.contains_key(s))
                {
                    return Err(AggrIneligible::MissingColumn(s));
                }
                args.push(arg.replace_symbols(&mapping));
            }
            let resolved = FuncCall {
                args,
                ..item.resolved
            };
            let carrier = match &item.carrier {
                None => None,
                Some(c) => match assignments.get(c) {
                    None => return Err(AggrIneligible::MissingColumn(c.clone())),
                    Some(Expr::Col(s)) => Some(s.clone()),
                    Some(e) => match e.unique_symbols().into_iter().next() {
                        None => None,
                        Some(slot) => {
                            substitutions.push((c.clone(), slot_value(c, &slot, types)?));
                            Some(slot)
                        }
                    },
                },
            };
            aggrs.push(AggrItem {
                carrier,
                resolved,
                ..item
            });
        }
        Ok((
            AggrBundle {
                aggr_id: self.aggr_id,
                group_by,
                aggrs,
            },
            substitutions,
        ))
    }

    fn classify(&self, types: &Types) -> Result<Classified, AggrIneligible> {
        let ty_of = |s: &Symbol| types.get(s).unwrap_or(DataType::Unknown);
        let mut group_set: IndexSet<Symbol> = self.group_by.iter().cloned().collect();
        let mut aggregates = vec![];
        let mut count_outputs = vec![];
        let mut bases = vec![];
        for item in &self.aggrs {
            if item.call.distinct {
                // distinct column is pushed as group by column
                match item.resolved.args.as_slice() {
                    [Expr::Col(s)] => {
                        group_set.insert(s.clone());
                    }
                    _ => return Err(AggrIneligible::ArgumentNotColumn(item.output.clone())),
                }
                continue;
            }
            let syms: IndexSet<Symbol> = item
                .resolved
                .args
                .iter()
                .flat_map(|a| a.unique_symbols())
                .collect();
            match FuncKind::from_name(item.call.name()) {
                Some(FuncKind::Min) | Some(FuncKind::Max) => {
                    if syms.len() != 1 {
                        return Err(AggrIneligible::ArgumentNotColumn(item.output.clone()));
                    }
                    if let Some(s) = syms.iter().find(|s| {
                        let ty = ty_of(s);
                        !(ty.is_int() || ty.is_float() || ty.is_string())
                    }) {
                        return Err(AggrIneligible::ArgumentType(s.clone()));
                    }
                }
                Some(FuncKind::Sum) => {
                    if syms.is_empty() || syms.len() > 2 {
                        return Err(AggrIneligible::ArgumentNotColumn(item.output.clone()));
                    }
                    if let Some(s) = syms.iter().find(|s| !ty_of(s).is_int()) {
                        return Err(AggrIneligible::ArgumentType(s.clone()));
                    }
                }
                Some(FuncKind::Count) => match item.resolved.args.as_slice() {
                    [Expr::Col(s)] if ty_of(s).is_int() => count_outputs.push(item.output.clone()),
                    [Expr::Col(s)] => return Err(AggrIneligible::ArgumentType(s.clone())),
                    _ => return Err(AggrIneligible::ArgumentNotColumn(item.output.clone())),
                },
                _ => return Err(AggrIneligible::UnsupportedFunction(item.call.name.clone())),
            }
            bases.push(syms);
            aggregates.push(item.resolved.clone());
        }
        let mut seen = HashSet::new();
        for s in bases.iter().flatten() {
            if group_set.contains(s) {
                return Err(AggrIneligible::GroupByColumn(s.clone()));
            }
            if !seen.insert(s) {
                return Err(AggrIneligible::SharedColumn(s.clone()));
            }
        }
        Ok(Classified {
            group_set,
            aggregates,
            count_outputs,
        })
    }
}

#[inline]
fn is_supported(call: &FuncCall) -> bool {
    matches!(
        FuncKind::from_name(call.name()),
        Some(FuncKind::Min) | Some(FuncKind::Max) | Some(FuncKind::Sum) | Some(FuncKind::Count)
    )
}

// Value assigned to the carrier once its slot holds pre-aggregated value.
fn slot_value(carrier: &Symbol, slot: &Symbol, types: &Types) -> Result<Expr, AggrIneligible> {
    let carrier_ty = types.get(carrier).unwrap_or(DataType::Unknown);
    let slot_ty = types.get(slot).unwrap_or(DataType::Unknown);
    if carrier_ty == slot_ty {
        Ok(slot.to_expr())
    } else if carrier_ty == DataType::Double && slot_ty.is_int() {
        Ok(Expr::cast(slot.to_expr(), DataType::Double))
    } else {
        Err(AggrIneligible::ArgumentType(carrier.clone()))
    }
}

struct Classified {
    /// Group by symbols plus distinct columns.
    group_set: IndexSet<Symbol>,
    /// Non-distinct aggregate calls.
    aggregates: Vec<FuncCall>,
    /// Outputs of count, which become sum of partial counts.
    count_outputs: Vec<Symbol>,
}

/// Result of an accepted aggregation pushdown, reported from the scan
/// back to the aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggrOutcome {
    pub aggr_id: NodeId,
    pub count_outputs: Vec<Symbol>,
}

#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Predicate handed to the connector, including the group by,
    /// aggregates and pre-aggregation filter.
    pub descriptor: ConnectorPredicate,
    /// Filter kept above the scan, only referencing group columns.
    pub post_filter: Expr,
    pub outcome: AggrOutcome,
    /// Sum of partial counts mapped to original count call, in
    /// source column names.
    pub count_rewrites: HashMap<FuncCall, FuncCall>,
}

/// Propose the bundle to the connector of the table.
///
/// `columns` maps scan symbols to source column names, `base` is the
/// predicate descriptor built from the scan predicate, and `residual`
/// the part of scan predicate not expressed by column domains.
/// `reused` holds the count rewrites an earlier run recorded for the
/// same aggregation: a sum found there is proposed as the count it
/// replaced, because the connector still produces partial counts.
/// Returns None if the bundle is ineligible or rejected, in which
/// case the plan must be kept as is.
#[allow(clippy::too_many_arguments)]
pub fn negotiate(
    metadata: &dyn Metadata,
    table: &TableHandle,
    bundle: &AggrBundle,
    columns: &HashMap<Symbol, SmolStr>,
    types: &Types,
    base: &ConnectorPredicate,
    residual: &Expr,
    reused: Option<&HashMap<FuncCall, FuncCall>>,
) -> Option<Negotiated> {
    match propose(metadata, table, bundle, columns, types, base, residual, reused) {
        Ok(res) => res,
        Err(reason) => {
            log::debug!(
                "aggregation {} not pushed to table {}: {}",
                bundle.aggr_id,
                table,
                reason
            );
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn propose(
    metadata: &dyn Metadata,
    table: &TableHandle,
    bundle: &AggrBundle,
    columns: &HashMap<Symbol, SmolStr>,
    types: &Types,
    base: &ConnectorPredicate,
    residual: &Expr,
    reused: Option<&HashMap<FuncCall, FuncCall>>,
) -> Result<Option<Negotiated>, AggrIneligible> {
    let classified = bundle.classify(types)?;
    let column_exprs: HashMap<Symbol, Expr> = columns
        .iter()
        .map(|(s, c)| (s.clone(), Expr::Col(Symbol::new(c))))
        .collect();
    let rename = |e: &Expr| -> Result<Expr, AggrIneligible> {
        match e.unique_symbols().into_iter().find(|s| !columns.contains_key(s)) {
            Some(s) => Err(AggrIneligible::MissingColumn(s)),
            None => Ok(e.replace_symbols(&column_exprs)),
        }
    };
    let mut group_by = Vec::with_capacity(classified.group_set.len());
    for s in &classified.group_set {
        let col = columns
            .get(s)
            .ok_or_else(|| AggrIneligible::MissingColumn(s.clone()))?;
        group_by.push(col.clone());
    }
    let mut aggregates = Vec::with_capacity(classified.aggregates.len());
    let mut count_rewrites = HashMap::new();
    for call in &classified.aggregates {
        let args = call.args.iter().map(&rename).collect::<Result<Vec<_>, _>>()?;
        let renamed = FuncCall {
            args,
            ..call.clone()
        };
        if let Some(count) = reused.and_then(|r| r.get(&renamed)) {
            // already a sum of partial counts, never sum it twice
            count_rewrites.insert(renamed, count.clone());
            aggregates.push(count.clone());
            continue;
        }
        if FuncKind::from_name(call.name()) == Some(FuncKind::Count) {
            count_rewrites.insert(FuncCall::new("sum", renamed.args.clone()), renamed.clone());
        }
        aggregates.push(renamed);
    }
    let mut pre_filter = vec![];
    let mut post_filter = vec![];
    for c in extract_conjuncts(residual) {
        if c.is_true() {
            continue;
        }
        if !is_deterministic(&c) {
            return Err(AggrIneligible::NonDeterministicFilter);
        }
        if c.in_scope(|s| classified.group_set.contains(s)) {
            post_filter.push(c)
        } else {
            pre_filter.push(rename(&c)?)
        }
    }
    let descriptor = ConnectorPredicate {
        group_by: Some(group_by),
        aggregates: Some(aggregates),
        pre_aggr_filter: combine_conjuncts(pre_filter),
        ..base.clone()
    };
    let accepted = match metadata.propose_aggr_pushdown(table, &descriptor) {
        Ok(accepted) => accepted,
        Err(e) => {
            log::warn!("failed to propose aggregation pushdown to table {}: {}", table, e);
            false
        }
    };
    if !accepted {
        log::debug!("table {} rejects aggregation {}", table, bundle.aggr_id);
        return Ok(None);
    }
    log::debug!("table {} accepts aggregation {}", table, bundle.aggr_id);
    Ok(Some(Negotiated {
        descriptor,
        post_filter: combine_conjuncts(post_filter),
        outcome: AggrOutcome {
            aggr_id: bundle.aggr_id,
            count_outputs: classified.count_outputs,
        },
        count_rewrites,
    }))
}
