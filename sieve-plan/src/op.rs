//! This module defines the relational operators of the logical plan.
//!
//! Plan nodes are immutable and shared through `Arc`. A rewrite builds
//! new nodes only along the changed path, unchanged subtrees are shared
//! between the old and new plan. Whether a subtree changed is decided
//! by pointer identity.
use crate::error::{Error, Result};
use crate::id::NodeId;
use indexmap::IndexMap;
use sieve_catalog::{ColumnHandle, TableHandle};
use sieve_datatype::{DataType, ValidF64};
use sieve_expr::controlflow::ControlFlow;
use sieve_expr::{Expr, FuncCall, Symbol};
use smallvec::{smallvec, SmallVec};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type PlanRef = Arc<PlanNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Scan,
    Filt,
    Proj,
    Join,
    SemiJoin,
    Aggr,
    Union,
    Exchange,
    Unnest,
    Sort,
    Sample,
    MarkDistinct,
    Values,
    Limit,
    Output,
}

impl OpKind {
    #[inline]
    pub fn to_lower(&self) -> &'static str {
        match self {
            OpKind::Scan => "scan",
            OpKind::Filt => "filter",
            OpKind::Proj => "project",
            OpKind::Join => "join",
            OpKind::SemiJoin => "semijoin",
            OpKind::Aggr => "aggregation",
            OpKind::Union => "union",
            OpKind::Exchange => "exchange",
            OpKind::Unnest => "unnest",
            OpKind::Sort => "sort",
            OpKind::Sample => "sample",
            OpKind::MarkDistinct => "markdistinct",
            OpKind::Values => "values",
            OpKind::Limit => "limit",
            OpKind::Output => "output",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_lower())
    }
}

/// Single node of the plan tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub id: NodeId,
    pub op: Op,
}

/// Op stands for logical operator.
/// This is the general enum containing all nodes of logical plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Table scan, the only leaf reading data.
    Scan(Scan),
    /// Filter node.
    Filt(Filt),
    /// Projection node.
    Proj(Proj),
    /// Join node with equality clauses.
    Join(Join),
    /// Semi join producing a boolean match symbol.
    SemiJoin(SemiJoin),
    /// Aggregation node.
    Aggr(Aggr),
    /// Union all of multiple sources.
    Union(Union),
    /// Exchange of data between distributed stages.
    Exchange(Exchange),
    /// Unnest array or map columns.
    Unnest(Unnest),
    /// Sort node.
    Sort(Sort),
    /// Sample node.
    Sample(Sample),
    /// Mark rows with distinct values on given symbols.
    MarkDistinct(MarkDistinct),
    /// Inline rows. No row means empty data set.
    Values(Values),
    /// Limit node.
    Limit(Limit),
    /// Final output of the plan with column names.
    Output(Output),
}

impl Op {
    #[inline]
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Scan(_) => OpKind::Scan,
            Op::Filt(_) => OpKind::Filt,
            Op::Proj(_) => OpKind::Proj,
            Op::Join(_) => OpKind::Join,
            Op::SemiJoin(_) => OpKind::SemiJoin,
            Op::Aggr(_) => OpKind::Aggr,
            Op::Union(_) => OpKind::Union,
            Op::Exchange(_) => OpKind::Exchange,
            Op::Unnest(_) => OpKind::Unnest,
            Op::Sort(_) => OpKind::Sort,
            Op::Sample(_) => OpKind::Sample,
            Op::MarkDistinct(_) => OpKind::MarkDistinct,
            Op::Values(_) => OpKind::Values,
            Op::Limit(_) => OpKind::Limit,
            Op::Output(_) => OpKind::Output,
        }
    }

    #[inline]
    pub fn filt(pred: Expr, source: PlanRef) -> Self {
        Op::Filt(Filt { pred, source })
    }

    #[inline]
    pub fn proj(assignments: IndexMap<Symbol, Expr>, source: PlanRef) -> Self {
        Op::Proj(Proj {
            assignments,
            source,
        })
    }

    /// Projection passing through given symbols.
    #[inline]
    pub fn identity_proj(symbols: &[Symbol], source: PlanRef) -> Self {
        let assignments = symbols.iter().map(|s| (s.clone(), s.to_expr())).collect();
        Op::proj(assignments, source)
    }

    /// Empty data set with given output symbols.
    #[inline]
    pub fn empty(outputs: Vec<Symbol>) -> Self {
        Op::Values(Values {
            outputs,
            rows: vec![],
        })
    }
}

impl PlanNode {
    #[inline]
    pub fn new(id: NodeId, op: Op) -> Self {
        PlanNode { id, op }
    }

    #[inline]
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Output symbols in order.
    pub fn outputs(&self) -> Vec<Symbol> {
        match &self.op {
            Op::Scan(scan) => scan.outputs.clone(),
            Op::Filt(filt) => filt.source.outputs(),
            Op::Proj(proj) => proj.assignments.keys().cloned().collect(),
            Op::Join(join) => {
                let mut outputs = join.left.outputs();
                outputs.extend(join.right.outputs());
                outputs
            }
            Op::SemiJoin(sj) => {
                let mut outputs = sj.source.outputs();
                outputs.push(sj.output.clone());
                outputs
            }
            Op::Aggr(aggr) => aggr
                .group_by
                .iter()
                .chain(aggr.aggrs.keys())
                .cloned()
                .collect(),
            Op::Union(union) => union.mapping.keys().cloned().collect(),
            Op::Exchange(exch) => exch.outputs.clone(),
            Op::Unnest(unnest) => {
                let mut outputs = unnest.replicate.clone();
                outputs.extend(unnest.unnest.values().flatten().cloned());
                outputs.extend(unnest.ordinality.iter().cloned());
                outputs
            }
            Op::Sort(sort) => sort.source.outputs(),
            Op::Sample(sample) => sample.source.outputs(),
            Op::MarkDistinct(md) => {
                let mut outputs = md.source.outputs();
                outputs.push(md.marker.clone());
                outputs
            }
            Op::Values(values) => values.outputs.clone(),
            Op::Limit(limit) => limit.source.outputs(),
            Op::Output(output) => output.outputs.clone(),
        }
    }

    /// Returns child nodes in order.
    pub fn sources(&self) -> SmallVec<[&PlanRef; 2]> {
        match &self.op {
            Op::Scan(_) | Op::Values(_) => smallvec![],
            Op::Filt(filt) => smallvec![&filt.source],
            Op::Proj(proj) => smallvec![&proj.source],
            Op::Join(join) => smallvec![&join.left, &join.right],
            Op::SemiJoin(sj) => smallvec![&sj.source, &sj.filtering_source],
            Op::Aggr(aggr) => smallvec![&aggr.source],
            Op::Union(union) => union.sources.iter().collect(),
            Op::Exchange(exch) => exch.sources.iter().collect(),
            Op::Unnest(unnest) => smallvec![&unnest.source],
            Op::Sort(sort) => smallvec![&sort.source],
            Op::Sample(sample) => smallvec![&sample.source],
            Op::MarkDistinct(md) => smallvec![&md.source],
            Op::Limit(limit) => smallvec![&limit.source],
            Op::Output(output) => smallvec![&output.source],
        }
    }

    /// Rebuild the node with new children, keeping id and attributes.
    pub fn with_sources(&self, sources: Vec<PlanRef>) -> Result<PlanNode> {
        let expected = self.sources().len();
        if sources.len() != expected {
            return Err(Error::InvalidPlan(format!(
                "{} node {} expects {} sources but got {}",
                self.kind(),
                self.id,
                expected,
                sources.len()
            )));
        }
        let mut sources = sources.into_iter();
        let mut op = self.op.clone();
        match &mut op {
            Op::Scan(_) | Op::Values(_) => (),
            Op::Filt(Filt { source, .. })
            | Op::Proj(Proj { source, .. })
            | Op::Aggr(Aggr { source, .. })
            | Op::Unnest(Unnest { source, .. })
            | Op::Sort(Sort { source, .. })
            | Op::Sample(Sample { source, .. })
            | Op::MarkDistinct(MarkDistinct { source, .. })
            | Op::Limit(Limit { source, .. })
            | Op::Output(Output { source, .. }) => {
                *source = next_source(&mut sources)?;
            }
            Op::Join(join) => {
                join.left = next_source(&mut sources)?;
                join.right = next_source(&mut sources)?;
            }
            Op::SemiJoin(sj) => {
                sj.source = next_source(&mut sources)?;
                sj.filtering_source = next_source(&mut sources)?;
            }
            Op::Union(union) => union.sources = sources.by_ref().collect(),
            Op::Exchange(exch) => exch.sources = sources.by_ref().collect(),
        }
        Ok(PlanNode { id: self.id, op })
    }

    pub fn walk<V: OpVisitor>(&self, visitor: &mut V) -> ControlFlow<V::Break> {
        visitor.enter(self)?;
        for s in self.sources() {
            s.walk(visitor)?
        }
        visitor.leave(self)
    }
}

#[inline]
fn next_source<I: Iterator<Item = PlanRef>>(sources: &mut I) -> Result<PlanRef> {
    sources
        .next()
        .ok_or_else(|| Error::InvalidPlan("missing source".to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub table: TableHandle,
    pub outputs: Vec<Symbol>,
    /// Column read by each output symbol.
    pub assignments: IndexMap<Symbol, ColumnHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filt {
    pub pred: Expr,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proj {
    pub assignments: IndexMap<Symbol, Expr>,
    pub source: PlanRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    #[inline]
    pub fn to_lower(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Cross => "cross",
        }
    }
}

/// Equality between a left output symbol and a right output symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EquiJoinClause {
    pub left: Symbol,
    pub right: Symbol,
}

impl EquiJoinClause {
    #[inline]
    pub fn new(left: Symbol, right: Symbol) -> Self {
        EquiJoinClause { left, right }
    }

    #[inline]
    pub fn to_expr(&self) -> Expr {
        Expr::eq(self.left.to_expr(), self.right.to_expr())
    }
}

/// Join node. Cross join has no criteria, all other kinds have
/// at least one clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub left: PlanRef,
    pub right: PlanRef,
    pub criteria: Vec<EquiJoinClause>,
}

impl Join {
    /// Conjunction of all equality clauses.
    #[inline]
    pub fn criteria_pred(&self) -> Expr {
        Expr::and(self.criteria.iter().map(EquiJoinClause::to_expr).collect())
    }
}

/// Semi join outputs all source symbols and a boolean symbol telling
/// whether the source join symbol matches any row of filtering source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemiJoin {
    pub source: PlanRef,
    pub filtering_source: PlanRef,
    pub source_join_symbol: Symbol,
    pub filtering_join_symbol: Symbol,
    pub output: Symbol,
}

/// Resolved signature of an aggregate function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: SmolStr,
    pub ret: DataType,
    pub args: Vec<DataType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggr {
    pub group_by: Vec<Symbol>,
    pub aggrs: IndexMap<Symbol, FuncCall>,
    pub signatures: IndexMap<Symbol, Signature>,
    pub source: PlanRef,
}

/// Union all. Each output symbol maps to one symbol of every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Union {
    pub sources: Vec<PlanRef>,
    pub mapping: IndexMap<Symbol, Vec<Symbol>>,
}

impl Union {
    /// Mapping from output symbols to symbols of the i-th source.
    pub fn source_symbol_map(&self, idx: usize) -> HashMap<Symbol, Expr> {
        self.mapping
            .iter()
            .filter_map(|(out, inputs)| inputs.get(idx).map(|s| (out.clone(), s.to_expr())))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Gather,
    Repartition,
    Replicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub kind: ExchangeKind,
    pub partition_keys: Vec<Symbol>,
    pub sources: Vec<PlanRef>,
    pub outputs: Vec<Symbol>,
    /// Input symbols of each source, aligned with outputs.
    pub inputs: Vec<Vec<Symbol>>,
}

impl Exchange {
    /// Mapping from output symbols to symbols of the i-th source.
    pub fn source_symbol_map(&self, idx: usize) -> HashMap<Symbol, Expr> {
        match self.inputs.get(idx) {
            Some(inputs) => self
                .outputs
                .iter()
                .zip(inputs)
                .map(|(out, input)| (out.clone(), input.to_expr()))
                .collect(),
            None => HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unnest {
    /// Symbols copied to every unnested row.
    pub replicate: Vec<Symbol>,
    /// Source symbol and the element symbols it expands to.
    pub unnest: IndexMap<Symbol, Vec<Symbol>>,
    pub ordinality: Option<Symbol>,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub items: Vec<SortItem>,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortItem {
    pub sym: Symbol,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub ratio: ValidF64,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkDistinct {
    pub marker: Symbol,
    pub distinct: Vec<Symbol>,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values {
    pub outputs: Vec<Symbol>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    pub count: u64,
    pub source: PlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub names: Vec<SmolStr>,
    pub outputs: Vec<Symbol>,
    pub source: PlanRef,
}

pub trait OpVisitor {
    type Break;
    /// Returns true if continue
    #[inline]
    fn enter(&mut self, _node: &PlanNode) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    /// Returns true if continue
    #[inline]
    fn leave(&mut self, _node: &PlanNode) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(id: u32, syms: &[&str]) -> PlanRef {
        Arc::new(PlanNode::new(
            NodeId::from(id),
            Op::empty(syms.iter().map(|s| Symbol::new(s)).collect()),
        ))
    }

    fn names(syms: Vec<Symbol>) -> Vec<String> {
        syms.into_iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_plan_outputs() {
        let left = values(0, &["a", "b"]);
        let right = values(1, &["c"]);
        let join = PlanNode::new(
            NodeId::from(2),
            Op::Join(Join {
                kind: JoinKind::Inner,
                left: Arc::clone(&left),
                right: Arc::clone(&right),
                criteria: vec![EquiJoinClause::new(Symbol::new("a"), Symbol::new("c"))],
            }),
        );
        assert_eq!(vec!["a", "b", "c"], names(join.outputs()));
        let md = PlanNode::new(
            NodeId::from(3),
            Op::MarkDistinct(MarkDistinct {
                marker: Symbol::new("m"),
                distinct: vec![Symbol::new("a")],
                source: Arc::new(join),
            }),
        );
        assert_eq!(vec!["a", "b", "c", "m"], names(md.outputs()));
        let unnest = PlanNode::new(
            NodeId::from(4),
            Op::Unnest(Unnest {
                replicate: vec![Symbol::new("a")],
                unnest: vec![(Symbol::new("b"), vec![Symbol::new("e1"), Symbol::new("e2")])]
                    .into_iter()
                    .collect(),
                ordinality: Some(Symbol::new("o")),
                source: left,
            }),
        );
        assert_eq!(vec!["a", "e1", "e2", "o"], names(unnest.outputs()));
    }

    #[test]
    fn test_plan_with_sources() {
        let left = values(0, &["a"]);
        let right = values(1, &["b"]);
        let filt = PlanNode::new(
            NodeId::from(2),
            Op::filt(Expr::gt(Expr::col("a"), Expr::const_i64(1)), Arc::clone(&left)),
        );
        let rebuilt = filt.with_sources(vec![Arc::clone(&right)]).unwrap();
        assert_eq!(filt.id, rebuilt.id);
        assert!(Arc::ptr_eq(rebuilt.sources()[0], &right));
        assert!(matches!(
            filt.with_sources(vec![left, right]),
            Err(Error::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_union_symbol_map() {
        let union = Union {
            sources: vec![values(0, &["a1"]), values(1, &["a2"])],
            mapping: vec![(Symbol::new("a"), vec![Symbol::new("a1"), Symbol::new("a2")])]
                .into_iter()
                .collect(),
        };
        let m = union.source_symbol_map(1);
        assert_eq!(Some(&Expr::col("a2")), m.get(&Symbol::new("a")));
    }
}
