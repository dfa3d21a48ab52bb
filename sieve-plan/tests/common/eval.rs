//! Row-level evaluation of plans over in-memory table rows.
//!
//! Expressions are evaluated by binding symbols to constants and
//! folding. A scan with a connector predicate behaves like a connector
//! honoring it: rows failing the predicate are dropped, and with an
//! accepted aggregation the rows are pre-aggregated per group, each
//! aggregate written into the slot of its argument column.
use sieve_catalog::{ConnectorPredicate, Metadata, TableID};
use sieve_datatype::Const;
use sieve_expr::fold::simplify;
use sieve_expr::{Expr, FuncCall, Symbol};
use sieve_plan::id::NodeId;
use sieve_plan::op::{Aggr, Join, JoinKind, Op, PlanRef};
use smol_str::SmolStr;
use std::collections::HashMap;

pub type Row = HashMap<Symbol, Const>;

/// Rows of one table, keyed by column name.
pub type TableRows = Vec<HashMap<SmolStr, Const>>;

pub struct Evaluator<'a> {
    pub metadata: &'a dyn Metadata,
    pub tables: &'a HashMap<TableID, TableRows>,
    /// Predicates taken by connectors, empty for the plan before rewrite.
    pub scan_predicates: &'a HashMap<NodeId, ConnectorPredicate>,
}

impl Evaluator<'_> {
    /// Evaluate the plan, returning rows of its outputs in a canonical
    /// order so that results compare as multisets.
    pub fn rows(&self, root: &PlanRef) -> Vec<Vec<Const>> {
        let outputs = root.outputs();
        let mut rows: Vec<Vec<Const>> = self
            .eval(root)
            .into_iter()
            .map(|row| outputs.iter().map(|s| row[s].clone()).collect())
            .collect();
        rows.sort_by_cached_key(|r| format!("{:?}", r));
        rows
    }

    fn eval(&self, node: &PlanRef) -> Vec<Row> {
        match &node.op {
            Op::Scan(scan) => {
                let columns: Vec<(Symbol, SmolStr)> = scan
                    .assignments
                    .iter()
                    .map(|(s, h)| (s.clone(), self.metadata.column_name(&scan.table, h).unwrap()))
                    .collect();
                let mut rows: Vec<Row> = self.tables[&scan.table.id]
                    .iter()
                    .map(|r| r.iter().map(|(c, v)| (Symbol::new(c), v.clone())).collect())
                    .collect();
                if let Some(pred) = self.scan_predicates.get(&node.id) {
                    rows.retain(|r| holds(&pred.expr, r));
                    if pred.has_aggr_pushdown() {
                        rows = pre_aggregate(pred, rows);
                    }
                }
                rows.into_iter()
                    .map(|r| {
                        columns
                            .iter()
                            .map(|(s, c)| (s.clone(), r.get(&Symbol::new(c)).cloned().unwrap_or(Const::Null)))
                            .collect()
                    })
                    .collect()
            }
            Op::Filt(filt) => {
                let mut rows = self.eval(&filt.source);
                rows.retain(|r| holds(&filt.pred, r));
                rows
            }
            Op::Proj(proj) => self
                .eval(&proj.source)
                .iter()
                .map(|r| {
                    proj.assignments
                        .iter()
                        .map(|(s, e)| (s.clone(), value(e, r)))
                        .collect()
                })
                .collect(),
            Op::Join(join) => self.eval_join(join),
            Op::Aggr(aggr) => self.eval_aggr(aggr),
            Op::Values(values) => values
                .rows
                .iter()
                .map(|r| {
                    values
                        .outputs
                        .iter()
                        .zip(r)
                        .map(|(s, e)| (s.clone(), value(e, &Row::new())))
                        .collect()
                })
                .collect(),
            Op::Sort(sort) => self.eval(&sort.source),
            Op::Union(union) => {
                let mut rows = vec![];
                for (i, source) in union.sources.iter().enumerate() {
                    let mapping = union.source_symbol_map(i);
                    for r in self.eval(source) {
                        rows.push(mapping.iter().map(|(out, e)| (out.clone(), value(e, &r))).collect());
                    }
                }
                rows
            }
            _ => panic!("evaluation of {:?} not supported", node.kind()),
        }
    }

    fn eval_join(&self, join: &Join) -> Vec<Row> {
        let left = self.eval(&join.left);
        let right = self.eval(&join.right);
        let null_row = |node: &PlanRef| -> Row { node.outputs().into_iter().map(|s| (s, Const::Null)).collect() };
        let matches = |l: &Row, r: &Row| {
            join.criteria
                .iter()
                .all(|c| l[&c.left] != Const::Null && l[&c.left] == r[&c.right])
        };
        let mut rows = vec![];
        let mut right_matched = vec![false; right.len()];
        for l in &left {
            let mut matched = false;
            for (i, r) in right.iter().enumerate() {
                if matches(l, r) {
                    matched = true;
                    right_matched[i] = true;
                    rows.push(l.iter().chain(r).map(|(s, v)| (s.clone(), v.clone())).collect());
                }
            }
            if !matched && matches!(join.kind, JoinKind::Left | JoinKind::Full) {
                rows.push(l.clone().into_iter().chain(null_row(&join.right)).collect());
            }
        }
        if matches!(join.kind, JoinKind::Right | JoinKind::Full) {
            for (r, _) in right.iter().zip(&right_matched).filter(|(_, m)| !**m) {
                rows.push(null_row(&join.left).into_iter().chain(r.clone()).collect());
            }
        }
        rows
    }

    fn eval_aggr(&self, aggr: &Aggr) -> Vec<Row> {
        let groups = group_rows(&aggr.group_by, self.eval(&aggr.source));
        groups
            .into_iter()
            .map(|(key, rows)| {
                let mut out: Row = aggr.group_by.iter().cloned().zip(key).collect();
                for (sym, call) in &aggr.aggrs {
                    out.insert(sym.clone(), aggregate(call, &rows));
                }
                out
            })
            .collect()
    }
}

/// Group rows by the keys. Empty keys always form one group, even on
/// empty input.
fn group_rows(keys: &[Symbol], rows: Vec<Row>) -> Vec<(Vec<Const>, Vec<Row>)> {
    let mut groups: Vec<(Vec<Const>, Vec<Row>)> = vec![];
    if keys.is_empty() {
        groups.push((vec![], vec![]));
    }
    for r in rows {
        let key: Vec<Const> = keys.iter().map(|k| r[k].clone()).collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(r),
            None => groups.push((key, vec![r])),
        }
    }
    groups
}

fn pre_aggregate(pred: &ConnectorPredicate, rows: Vec<Row>) -> Vec<Row> {
    let keys: Vec<Symbol> = pred
        .group_by
        .iter()
        .flatten()
        .map(Symbol::new)
        .collect();
    group_rows(&keys, rows)
        .into_iter()
        .map(|(key, rows)| {
            let mut out: Row = keys.iter().cloned().zip(key).collect();
            for call in pred.aggregates.iter().flatten() {
                let slot = call.args[0].collect_symbols()[0].clone();
                out.insert(slot, aggregate(call, &rows));
            }
            out
        })
        .collect()
}

fn aggregate(call: &FuncCall, rows: &[Row]) -> Const {
    assert!(!call.distinct, "distinct aggregate not supported");
    let values: Vec<i64> = rows
        .iter()
        .filter_map(|r| match value(&call.args[0], r) {
            Const::I64(v) => Some(v),
            Const::Null => None,
            other => panic!("non-integer aggregate input {:?}", other),
        })
        .collect();
    let res = match call.name.as_str() {
        "count" => Some(values.len() as i64),
        "sum" => values.iter().copied().reduce(|a, b| a + b),
        "min" => values.iter().copied().min(),
        "max" => values.iter().copied().max(),
        name => panic!("aggregate {} not supported", name),
    };
    res.map_or(Const::Null, Const::I64)
}

fn value(e: &Expr, row: &Row) -> Const {
    let bound: HashMap<Symbol, Expr> = row.iter().map(|(s, v)| (s.clone(), Expr::Const(v.clone()))).collect();
    match simplify(&e.replace_symbols(&bound)) {
        Expr::Const(c) => c,
        other => panic!("{} is not evaluated to constant", other),
    }
}

fn holds(pred: &Expr, row: &Row) -> bool {
    value(pred, row) == Const::Bool(true)
}
