use crate::error::{Error, Result};
use crate::id::{NodeIdAllocator, SymbolAllocator};
use crate::op::*;
use indexmap::IndexMap;
use sieve_catalog::{Column, TableHandle};
use sieve_datatype::{DataType, ValidF64};
use sieve_expr::{Expr, FuncCall, Symbol, TypeInfer};
use smol_str::SmolStr;
use std::collections::HashSet;
use std::sync::Arc;

/// PlanBuilder assembles plan trees bottom-up.
///
/// Every symbol defined by a node is registered with its type, and
/// every symbol referenced by a node must be an output of its sources.
/// Node ids are allocated in creation order.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    ids: NodeIdAllocator,
    symbols: SymbolAllocator,
}

impl PlanBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over the allocators, so that rules can keep allocating
    /// ids and symbols without collision.
    #[inline]
    pub fn into_parts(self) -> (NodeIdAllocator, SymbolAllocator) {
        (self.ids, self.symbols)
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolAllocator {
        &self.symbols
    }

    #[inline]
    fn node(&mut self, op: Op) -> PlanRef {
        Arc::new(PlanNode::new(self.ids.next_id(), op))
    }

    fn define(&mut self, name: &str, ty: DataType) -> Result<Symbol> {
        let sym = Symbol::new(name);
        if self.symbols.types().contains(&sym) {
            return Err(Error::InvalidPlan(format!("symbol {} already defined", sym)));
        }
        self.symbols.register(sym.clone(), ty);
        Ok(sym)
    }

    /// Scan given columns of the table, each column is bound to
    /// the paired symbol name.
    pub fn scan(&mut self, table: &TableHandle, columns: &[(&str, Column)]) -> Result<PlanRef> {
        let mut outputs = Vec::with_capacity(columns.len());
        let mut assignments = IndexMap::with_capacity(columns.len());
        for (name, col) in columns {
            if col.table_id != table.id {
                return Err(Error::InvalidPlan(format!(
                    "column {} not in table {}",
                    col.name, table
                )));
            }
            let sym = self.define(name, col.ty)?;
            outputs.push(sym.clone());
            assignments.insert(sym, col.handle());
        }
        Ok(self.node(Op::Scan(Scan {
            table: table.clone(),
            outputs,
            assignments,
        })))
    }

    pub fn filter(&mut self, pred: Expr, source: PlanRef) -> Result<PlanRef> {
        check_scope(&pred, &source)?;
        Ok(self.node(Op::filt(pred, source)))
    }

    pub fn project(&mut self, assignments: Vec<(&str, Expr)>, source: PlanRef) -> Result<PlanRef> {
        let mut assigns = IndexMap::with_capacity(assignments.len());
        for (name, e) in assignments {
            check_scope(&e, &source)?;
            let sym = Symbol::new(name);
            // passing through source symbol does not define new one
            let sym = if e.is_col(&sym) {
                sym
            } else {
                let ty = e.infer(self.symbols.types())?;
                self.define(name, ty)?
            };
            assigns.insert(sym, e);
        }
        Ok(self.node(Op::proj(assigns, source)))
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        left: PlanRef,
        right: PlanRef,
        criteria: &[(&str, &str)],
    ) -> Result<PlanRef> {
        if kind == JoinKind::Cross && !criteria.is_empty() {
            return Err(Error::InvalidPlan("cross join with criteria".to_string()));
        }
        if kind != JoinKind::Cross && criteria.is_empty() {
            return Err(Error::InvalidPlan(format!(
                "{} join without criteria",
                kind.to_lower()
            )));
        }
        let mut clauses = Vec::with_capacity(criteria.len());
        for (l, r) in criteria {
            let (l, r) = (Symbol::new(l), Symbol::new(r));
            check_output(&l, &left)?;
            check_output(&r, &right)?;
            clauses.push(EquiJoinClause::new(l, r));
        }
        Ok(self.node(Op::Join(Join {
            kind,
            left,
            right,
            criteria: clauses,
        })))
    }

    pub fn semi_join(
        &mut self,
        source: PlanRef,
        filtering_source: PlanRef,
        source_join_symbol: &str,
        filtering_join_symbol: &str,
        output: &str,
    ) -> Result<PlanRef> {
        let source_join_symbol = Symbol::new(source_join_symbol);
        let filtering_join_symbol = Symbol::new(filtering_join_symbol);
        check_output(&source_join_symbol, &source)?;
        check_output(&filtering_join_symbol, &filtering_source)?;
        let output = self.define(output, DataType::Boolean)?;
        Ok(self.node(Op::SemiJoin(SemiJoin {
            source,
            filtering_source,
            source_join_symbol,
            filtering_join_symbol,
            output,
        })))
    }

    pub fn aggregate(
        &mut self,
        group_by: &[&str],
        aggrs: Vec<(&str, FuncCall)>,
        source: PlanRef,
    ) -> Result<PlanRef> {
        let mut keys = Vec::with_capacity(group_by.len());
        for name in group_by {
            let sym = Symbol::new(name);
            check_output(&sym, &source)?;
            keys.push(sym);
        }
        let mut calls = IndexMap::with_capacity(aggrs.len());
        let mut signatures = IndexMap::with_capacity(aggrs.len());
        for (name, call) in aggrs {
            let mut args = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                check_scope(arg, &source)?;
                args.push(arg.infer(self.symbols.types())?);
            }
            let ret = Expr::Func(call.clone()).infer(self.symbols.types())?;
            let sym = self.define(name, ret)?;
            signatures.insert(
                sym.clone(),
                Signature {
                    name: call.name.clone(),
                    ret,
                    args,
                },
            );
            calls.insert(sym, call);
        }
        Ok(self.node(Op::Aggr(Aggr {
            group_by: keys,
            aggrs: calls,
            signatures,
            source,
        })))
    }

    /// Union all sources. Each output symbol takes one symbol of
    /// every source, typed after the first one.
    pub fn union(&mut self, sources: Vec<PlanRef>, mapping: &[(&str, Vec<&str>)]) -> Result<PlanRef> {
        let mut symbol_map = IndexMap::with_capacity(mapping.len());
        for (name, inputs) in mapping {
            let inputs = aligned_inputs(inputs, &sources)?;
            let ty = self.symbols.types().type_of(&inputs[0])?;
            let sym = self.define(name, ty)?;
            symbol_map.insert(sym, inputs);
        }
        Ok(self.node(Op::Union(Union {
            sources,
            mapping: symbol_map,
        })))
    }

    pub fn exchange(
        &mut self,
        kind: ExchangeKind,
        partition_keys: &[&str],
        sources: Vec<PlanRef>,
        mapping: &[(&str, Vec<&str>)],
    ) -> Result<PlanRef> {
        let mut outputs = Vec::with_capacity(mapping.len());
        let mut inputs = vec![Vec::with_capacity(mapping.len()); sources.len()];
        for (name, syms) in mapping {
            let syms = aligned_inputs(syms, &sources)?;
            let ty = self.symbols.types().type_of(&syms[0])?;
            outputs.push(self.define(name, ty)?);
            for (input, sym) in inputs.iter_mut().zip(syms) {
                input.push(sym)
            }
        }
        let partition_keys: Vec<Symbol> = partition_keys.iter().map(Symbol::new).collect();
        if let Some(k) = partition_keys.iter().find(|k| !outputs.contains(k)) {
            return Err(Error::InvalidPlan(format!("partition key {} not in outputs", k)));
        }
        Ok(self.node(Op::Exchange(Exchange {
            kind,
            partition_keys,
            sources,
            outputs,
            inputs,
        })))
    }

    pub fn unnest(
        &mut self,
        replicate: &[&str],
        unnest: Vec<(&str, Vec<(&str, DataType)>)>,
        ordinality: Option<&str>,
        source: PlanRef,
    ) -> Result<PlanRef> {
        let mut rep = Vec::with_capacity(replicate.len());
        for name in replicate {
            let sym = Symbol::new(name);
            check_output(&sym, &source)?;
            rep.push(sym);
        }
        let mut unnest_map = IndexMap::with_capacity(unnest.len());
        for (name, elems) in unnest {
            let sym = Symbol::new(name);
            check_output(&sym, &source)?;
            let mut elem_syms = Vec::with_capacity(elems.len());
            for (elem, ty) in elems {
                elem_syms.push(self.define(elem, ty)?);
            }
            unnest_map.insert(sym, elem_syms);
        }
        let ordinality = match ordinality {
            Some(name) => Some(self.define(name, DataType::Bigint)?),
            None => None,
        };
        Ok(self.node(Op::Unnest(Unnest {
            replicate: rep,
            unnest: unnest_map,
            ordinality,
            source,
        })))
    }

    pub fn sort(&mut self, items: &[(&str, bool)], source: PlanRef) -> Result<PlanRef> {
        let mut sort_items = Vec::with_capacity(items.len());
        for (name, desc) in items {
            let sym = Symbol::new(name);
            check_output(&sym, &source)?;
            sort_items.push(SortItem { sym, desc: *desc });
        }
        Ok(self.node(Op::Sort(Sort {
            items: sort_items,
            source,
        })))
    }

    pub fn sample(&mut self, ratio: f64, source: PlanRef) -> Result<PlanRef> {
        let ratio = ValidF64::new(ratio)
            .filter(|r| (0.0..=1.0).contains(&r.value()))
            .ok_or_else(|| Error::InvalidPlan(format!("invalid sample ratio {}", ratio)))?;
        Ok(self.node(Op::Sample(Sample { ratio, source })))
    }

    pub fn mark_distinct(&mut self, marker: &str, distinct: &[&str], source: PlanRef) -> Result<PlanRef> {
        let mut syms = Vec::with_capacity(distinct.len());
        for name in distinct {
            let sym = Symbol::new(name);
            check_output(&sym, &source)?;
            syms.push(sym);
        }
        let marker = self.define(marker, DataType::Boolean)?;
        Ok(self.node(Op::MarkDistinct(MarkDistinct {
            marker,
            distinct: syms,
            source,
        })))
    }

    pub fn values(&mut self, outputs: &[(&str, DataType)], rows: Vec<Vec<Expr>>) -> Result<PlanRef> {
        if let Some(row) = rows.iter().find(|r| r.len() != outputs.len()) {
            return Err(Error::InvalidPlan(format!(
                "values row has {} columns but {} expected",
                row.len(),
                outputs.len()
            )));
        }
        let mut syms = Vec::with_capacity(outputs.len());
        for (name, ty) in outputs {
            syms.push(self.define(name, *ty)?);
        }
        Ok(self.node(Op::Values(Values {
            outputs: syms,
            rows,
        })))
    }

    pub fn limit(&mut self, count: u64, source: PlanRef) -> Result<PlanRef> {
        Ok(self.node(Op::Limit(Limit { count, source })))
    }

    /// Output all symbols of the source with given names.
    pub fn output(&mut self, names: &[&str], source: PlanRef) -> Result<PlanRef> {
        let outputs = source.outputs();
        if names.len() != outputs.len() {
            return Err(Error::InvalidPlan(format!(
                "{} output names for {} symbols",
                names.len(),
                outputs.len()
            )));
        }
        Ok(self.node(Op::Output(Output {
            names: names.iter().map(SmolStr::new).collect(),
            outputs,
            source,
        })))
    }
}

#[inline]
fn check_output(sym: &Symbol, source: &PlanRef) -> Result<()> {
    if source.outputs().contains(sym) {
        Ok(())
    } else {
        Err(Error::InvalidPlan(format!(
            "symbol {} not in outputs of {}",
            sym,
            source.id
        )))
    }
}

#[inline]
fn check_scope(e: &Expr, source: &PlanRef) -> Result<()> {
    let outputs: HashSet<Symbol> = source.outputs().into_iter().collect();
    match e.unique_symbols().into_iter().find(|s| !outputs.contains(s)) {
        Some(sym) => Err(Error::InvalidPlan(format!(
            "symbol {} not in outputs of {}",
            sym,
            source.id
        ))),
        None => Ok(()),
    }
}

fn aligned_inputs(names: &[&str], sources: &[PlanRef]) -> Result<Vec<Symbol>> {
    if names.is_empty() || names.len() != sources.len() {
        return Err(Error::InvalidPlan(format!(
            "{} input symbols for {} sources",
            names.len(),
            sources.len()
        )));
    }
    let mut syms = Vec::with_capacity(names.len());
    for (name, source) in names.iter().zip(sources) {
        let sym = Symbol::new(name);
        check_output(&sym, source)?;
        syms.push(sym);
    }
    Ok(syms)
}
