//! Predicate pushdown.
//!
//! The rewrite walks the plan top-down carrying the predicate inherited
//! from ancestors, starting with TRUE at the root. Filters dissolve into
//! the inherited predicate, every other node moves as much of it as it
//! can to its children and keeps the rest in a new filter above itself.
//! Scans translate what reaches them into connector predicates, which
//! are collected per scan node and returned with the new plan.
//!
//! Unchanged subtrees are returned as the same `Arc`, so the caller
//! can tell what changed by pointer identity.
use crate::error::{Error, Result};
use crate::id::{NodeId, NodeIdAllocator, SymbolAllocator};
use crate::op::{Aggr, EquiJoinClause, Join, JoinKind, Op, PlanNode, PlanRef, Proj, Scan, SemiJoin, Signature};
use crate::rule::aggr_pushdown::{negotiate, AggrBundle, AggrOutcome, AggrRewrites};
use crate::rule::outerjoin_reduce::reduce_join_kind;
use crate::rule::pred_pullup::effective_predicate;
use crate::rule::{PushdownConfig, RuleEffect};
use indexmap::IndexMap;
use sieve_catalog::{extract_tuple_domain, ConnectorPredicate, Metadata, TupleDomain};
use sieve_datatype::DataType;
use sieve_expr::fold::simplify;
use sieve_expr::{
    combine_conjuncts, expr_or_null_symbols, extract_conjuncts, is_deterministic, non_inferrable_conjuncts,
    strip_non_deterministic_conjuncts, CmpKind, EqualityInference, Expr, FuncCall, Symbol, TypeInfer,
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use std::iter;
use std::sync::Arc;

/// Result of predicate pushdown.
#[derive(Debug)]
pub struct PushdownOutput {
    pub root: PlanRef,
    pub effect: RuleEffect,
    /// Connector predicate of each scan reached by the rewrite.
    pub scan_predicates: HashMap<NodeId, ConnectorPredicate>,
    /// Per aggregation whose counts are computed by connector, the
    /// sum of partial counts mapped to the original count call.
    pub aggr_rewrites: AggrRewrites,
}

/// Push predicates of the plan down to scans.
///
/// Symbol and node id allocators must already know all symbols and
/// ids of the input plan.
pub fn pred_pushdown(
    root: &PlanRef,
    metadata: &dyn Metadata,
    sym_alloc: &mut SymbolAllocator,
    id_alloc: &mut NodeIdAllocator,
    config: &PushdownConfig,
) -> Result<PushdownOutput> {
    pred_pushdown_with_rewrites(root, metadata, sym_alloc, id_alloc, config, &AggrRewrites::new())
}

/// Push predicates down a plan produced by an earlier run.
///
/// `prior` is the `aggr_rewrites` of that run. Sums it records are
/// proposed to connectors as the counts they replaced.
pub fn pred_pushdown_with_rewrites(
    root: &PlanRef,
    metadata: &dyn Metadata,
    sym_alloc: &mut SymbolAllocator,
    id_alloc: &mut NodeIdAllocator,
    config: &PushdownConfig,
    prior: &AggrRewrites,
) -> Result<PushdownOutput> {
    let mut rewriter = Rewriter {
        metadata,
        sym_alloc,
        id_alloc,
        config,
        prior_rewrites: prior,
        scan_predicates: HashMap::new(),
        aggr_rewrites: HashMap::new(),
    };
    let res = rewriter.rewrite(root, PushdownContext::new(Expr::const_bool(true)), 0)?;
    let mut effect = RuleEffect::NONE;
    if !Arc::ptr_eq(&res.node, root) {
        effect |= RuleEffect::OP;
    }
    if rewriter
        .scan_predicates
        .values()
        .any(|p| !p.expr.is_true() || p.has_aggr_pushdown())
    {
        effect |= RuleEffect::EXPR;
    }
    Ok(PushdownOutput {
        root: res.node,
        effect,
        scan_predicates: rewriter.scan_predicates,
        aggr_rewrites: rewriter.aggr_rewrites,
    })
}

struct PushdownContext {
    pred: Expr,
    aggr: Option<AggrBundle>,
}

impl PushdownContext {
    #[inline]
    fn new(pred: Expr) -> Self {
        PushdownContext { pred, aggr: None }
    }
}

struct Rewritten {
    node: PlanRef,
    /// Set if the aggregation bundle passed down was accepted.
    aggr: Option<AggrOutcome>,
}

impl Rewritten {
    #[inline]
    fn plain(node: PlanRef) -> Self {
        Rewritten { node, aggr: None }
    }
}

struct Rewriter<'a> {
    metadata: &'a dyn Metadata,
    sym_alloc: &'a mut SymbolAllocator,
    id_alloc: &'a mut NodeIdAllocator,
    config: &'a PushdownConfig,
    prior_rewrites: &'a AggrRewrites,
    scan_predicates: HashMap<NodeId, ConnectorPredicate>,
    aggr_rewrites: AggrRewrites,
}

impl Rewriter<'_> {
    fn rewrite(&mut self, node: &PlanRef, ctx: PushdownContext, depth: usize) -> Result<Rewritten> {
        if depth > self.config.max_depth {
            return Err(Error::PlanTooDeep(self.config.max_depth));
        }
        match &node.op {
            Op::Filt(filt) => {
                let pred = combine_conjuncts([filt.pred.clone(), ctx.pred]);
                self.rewrite(&filt.source, PushdownContext { pred, aggr: ctx.aggr }, depth + 1)
            }
            Op::Proj(proj) => self.rewrite_proj(node, proj, ctx, depth),
            Op::Sort(sort) => {
                let res = self.rewrite(&sort.source, ctx, depth + 1)?;
                let node = self.rebuild(node, vec![res.node])?;
                Ok(Rewritten { node, aggr: res.aggr })
            }
            Op::Sample(sample) => {
                let source = self
                    .rewrite(&sample.source, PushdownContext::new(ctx.pred), depth + 1)?
                    .node;
                Ok(Rewritten::plain(self.rebuild(node, vec![source])?))
            }
            Op::MarkDistinct(md) => {
                if ctx.pred.contains_symbol(&md.marker) {
                    return Err(Error::MarkerSymbolReferenced(md.marker.clone()));
                }
                let source = self.rewrite(&md.source, PushdownContext::new(ctx.pred), depth + 1)?.node;
                Ok(Rewritten::plain(self.rebuild(node, vec![source])?))
            }
            Op::Union(union) => {
                let mut sources = Vec::with_capacity(union.sources.len());
                for (i, source) in union.sources.iter().enumerate() {
                    let pred = ctx.pred.replace_symbols(&union.source_symbol_map(i));
                    sources.push(self.rewrite(source, PushdownContext::new(pred), depth + 1)?.node);
                }
                Ok(Rewritten::plain(self.rebuild(node, sources)?))
            }
            Op::Exchange(exch) => {
                let mut sources = Vec::with_capacity(exch.sources.len());
                for (i, source) in exch.sources.iter().enumerate() {
                    let pred = ctx.pred.replace_symbols(&exch.source_symbol_map(i));
                    sources.push(self.rewrite(source, PushdownContext::new(pred), depth + 1)?.node);
                }
                Ok(Rewritten::plain(self.rebuild(node, sources)?))
            }
            Op::Join(join) => self.rewrite_join(node, join, ctx.pred, depth),
            Op::SemiJoin(sj) => self.rewrite_semi_join(node, sj, ctx.pred, depth),
            Op::Aggr(aggr) => self.rewrite_aggr(node, aggr, ctx.pred, depth),
            Op::Unnest(unnest) => {
                let replicate: HashSet<Symbol> = unnest.replicate.iter().cloned().collect();
                let (pushed, post) = split_by_scope(&ctx.pred, &replicate);
                let source = self.rewrite(&unnest.source, PushdownContext::new(pushed), depth + 1)?.node;
                let node = self.rebuild(node, vec![source])?;
                Ok(Rewritten::plain(self.with_filter(node, post)))
            }
            Op::Scan(scan) => self.rewrite_scan(node, scan, ctx),
            Op::Values(_) | Op::Limit(_) | Op::Output(_) => {
                let mut sources = Vec::with_capacity(1);
                for source in node.sources() {
                    let res = self.rewrite(source, PushdownContext::new(Expr::const_bool(true)), depth + 1)?;
                    sources.push(res.node);
                }
                let node = self.rebuild(node, sources)?;
                Ok(Rewritten::plain(self.with_filter(node, ctx.pred)))
            }
        }
    }

    fn rewrite_proj(&mut self, node: &PlanRef, proj: &Proj, ctx: PushdownContext, depth: usize) -> Result<Rewritten> {
        let mapping: HashMap<Symbol, Expr> = proj
            .assignments
            .iter()
            .map(|(s, e)| (s.clone(), e.clone()))
            .collect();
        let mut pushed = vec![];
        let mut kept = vec![];
        for c in extract_conjuncts(&ctx.pred) {
            if is_deterministic(&c) && can_inline(&c, &proj.assignments) {
                pushed.push(c.replace_symbols(&mapping))
            } else {
                kept.push(c)
            }
        }
        let mut substitutions = vec![];
        let bundle = match ctx.aggr {
            Some(bundle) if kept.is_empty() => {
                let aggr_id = bundle.aggr_id;
                match bundle.through_project(&proj.assignments, self.sym_alloc.types()) {
                    Ok((bundle, subs)) => {
                        substitutions = subs;
                        Some(bundle)
                    }
                    Err(reason) => {
                        log::debug!("aggregation {} stops at projection {}: {}", aggr_id, node.id, reason);
                        None
                    }
                }
            }
            Some(bundle) => {
                log::debug!(
                    "aggregation {} stops at projection {}: filter kept above",
                    bundle.aggr_id,
                    node.id
                );
                None
            }
            None => None,
        };
        let ctx = PushdownContext {
            pred: combine_conjuncts(pushed),
            aggr: bundle,
        };
        let res = self.rewrite(&proj.source, ctx, depth + 1)?;
        let new_node = if res.aggr.is_some() && !substitutions.is_empty() {
            // arguments are pre-aggregated, read them from the slots directly
            let mut assignments = proj.assignments.clone();
            for (sym, e) in substitutions {
                assignments.insert(sym, e);
            }
            Arc::new(PlanNode::new(node.id, Op::proj(assignments, res.node)))
        } else {
            self.rebuild(node, vec![res.node])?
        };
        Ok(Rewritten {
            node: self.with_filter(new_node, combine_conjuncts(kept)),
            aggr: res.aggr,
        })
    }

    fn rewrite_join(&mut self, node: &PlanRef, join: &Join, pred: Expr, depth: usize) -> Result<Rewritten> {
        let kind = reduce_join_kind(join, &pred);
        let left_eff = effective_predicate(&join.left, self.config.max_depth)?;
        let right_eff = effective_predicate(&join.right, self.config.max_depth)?;
        let join_pred = join.criteria_pred();
        let left_syms: HashSet<Symbol> = join.left.outputs().into_iter().collect();
        let right_syms: HashSet<Symbol> = join.right.outputs().into_iter().collect();
        let split = match kind {
            JoinKind::Inner | JoinKind::Cross => {
                process_inner_join(&pred, &left_eff, &right_eff, &join_pred, &left_syms)
            }
            JoinKind::Left => {
                let (outer, inner, post) = process_outer_join(&pred, &left_eff, &right_eff, &join_pred, &left_syms);
                JoinSplit {
                    left: outer,
                    right: inner,
                    join: join_pred.clone(),
                    post,
                }
            }
            JoinKind::Right => {
                let (outer, inner, post) = process_outer_join(&pred, &right_eff, &left_eff, &join_pred, &right_syms);
                JoinSplit {
                    left: inner,
                    right: outer,
                    join: join_pred.clone(),
                    post,
                }
            }
            JoinKind::Full => JoinSplit {
                left: Expr::const_bool(true),
                right: Expr::const_bool(true),
                join: join_pred.clone(),
                post: pred,
            },
        };
        let left = self.rewrite(&join.left, PushdownContext::new(split.left), depth + 1)?.node;
        let right = self.rewrite(&join.right, PushdownContext::new(split.right), depth + 1)?.node;
        let mut post = vec![split.post];
        let (left, right, criteria) =
            if join.kind == JoinKind::Cross || !same_criteria(&split.join, &join.criteria, &left_syms) {
                self.rebuild_criteria(&split.join, left, right, &left_syms, &mut post)?
            } else {
                (left, right, join.criteria.clone())
            };
        let mut output = if Arc::ptr_eq(&left, &join.left)
            && Arc::ptr_eq(&right, &join.right)
            && kind == join.kind
            && criteria == join.criteria
        {
            node.clone()
        } else {
            Arc::new(PlanNode::new(
                node.id,
                Op::Join(Join {
                    kind,
                    left,
                    right,
                    criteria,
                }),
            ))
        };
        output = self.with_filter(output, combine_conjuncts(post));
        let outputs = node.outputs();
        if output.outputs() != outputs {
            output = Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::identity_proj(&outputs, output)));
        }
        Ok(Rewritten::plain(output))
    }

    /// Rebuild equality clauses of inner join from the join predicate.
    /// Operands other than plain symbols are projected on each side.
    /// Conjuncts not in form of join equality go to post-join filter.
    fn rebuild_criteria(
        &mut self,
        join_pred: &Expr,
        left: PlanRef,
        right: PlanRef,
        left_syms: &HashSet<Symbol>,
        post: &mut Vec<Expr>,
    ) -> Result<(PlanRef, PlanRef, Vec<EquiJoinClause>)> {
        let conjuncts: Vec<Expr> = extract_conjuncts(join_pred)
            .iter()
            .map(simplify)
            .filter(|c| !c.is_true())
            .collect();
        let mut left_assigns = identity_assigns(&left);
        let mut right_assigns = identity_assigns(&right);
        let (left_width, right_width) = (left_assigns.len(), right_assigns.len());
        let mut criteria: Vec<EquiJoinClause> = Vec::with_capacity(conjuncts.len());
        for c in conjuncts {
            match align_equality(&c, left_syms) {
                Some((l, r)) => {
                    let l = self.join_operand(l, &mut left_assigns)?;
                    let r = self.join_operand(r, &mut right_assigns)?;
                    let clause = EquiJoinClause::new(l, r);
                    if !criteria.contains(&clause) {
                        criteria.push(clause)
                    }
                }
                None => post.push(c),
            }
        }
        // join must have at least one equality clause
        if criteria.is_empty() {
            let l = self.join_operand(Expr::const_i64(0), &mut left_assigns)?;
            let r = self.join_operand(Expr::const_i64(0), &mut right_assigns)?;
            criteria.push(EquiJoinClause::new(l, r));
        }
        let left = if left_assigns.len() > left_width {
            Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::proj(left_assigns, left)))
        } else {
            left
        };
        let right = if right_assigns.len() > right_width {
            Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::proj(right_assigns, right)))
        } else {
            right
        };
        Ok((left, right, criteria))
    }

    /// Returns symbol holding value of the operand, projecting a new
    /// one if not exists.
    fn join_operand(&mut self, e: Expr, assigns: &mut IndexMap<Symbol, Expr>) -> Result<Symbol> {
        if let Some((sym, _)) = assigns.iter().find(|(_, v)| **v == e) {
            return Ok(sym.clone());
        }
        let sym = self.sym_alloc.new_symbol_for_expr(&e)?;
        assigns.insert(sym.clone(), e);
        Ok(sym)
    }

    fn rewrite_semi_join(&mut self, node: &PlanRef, sj: &SemiJoin, pred: Expr, depth: usize) -> Result<Rewritten> {
        let source_eff = effective_predicate(&sj.source, self.config.max_depth)?;
        let filt_sym = &sj.filtering_join_symbol;
        let in_filt = |s: &Symbol| s == filt_sym;
        // push to filtering source through the join equality, keeping
        // nulls of the join symbol so that the match result is unchanged
        let join_pred = Expr::eq(sj.source_join_symbol.to_expr(), filt_sym.to_expr());
        let join_inference = EqualityInference::new([&pred, &source_eff, &join_pred]);
        let mut filtering = vec![];
        for c in non_inferrable_conjuncts(&pred)
            .into_iter()
            .chain(non_inferrable_conjuncts(&source_eff))
        {
            if let Some(r) = join_inference.rewrite_expr(&c, in_filt) {
                filtering.push(expr_or_null_symbols(r, in_filt));
            }
        }
        filtering.extend(
            join_inference
                .partition_by(in_filt)
                .scope_equalities
                .into_iter()
                .map(|e| expr_or_null_symbols(e, in_filt)),
        );
        let source_syms: HashSet<Symbol> = sj.source.outputs().into_iter().collect();
        let in_source = |s: &Symbol| source_syms.contains(s);
        let inference = EqualityInference::new(iter::once(&pred));
        let mut pushed = vec![];
        let mut post = vec![];
        for c in non_inferrable_conjuncts(&pred) {
            // each source row appears once in output, so non-deterministic
            // conjunct on source symbols can be pushed as well
            let rewritten = if is_deterministic(&c) {
                inference.rewrite_expr(&c, in_source)
            } else if c.in_scope(in_source) {
                Some(c.clone())
            } else {
                None
            };
            match rewritten {
                Some(r) => pushed.push(r),
                None => post.push(c),
            }
        }
        let partition = inference.partition_by(in_source);
        pushed.extend(partition.scope_equalities);
        post.extend(partition.scope_complement_equalities);
        post.extend(partition.scope_straddling_equalities);
        let source = self
            .rewrite(&sj.source, PushdownContext::new(combine_conjuncts(pushed)), depth + 1)?
            .node;
        let filtering_source = self
            .rewrite(
                &sj.filtering_source,
                PushdownContext::new(combine_conjuncts(filtering)),
                depth + 1,
            )?
            .node;
        let output = self.rebuild(node, vec![source, filtering_source])?;
        Ok(Rewritten::plain(self.with_filter(output, combine_conjuncts(post))))
    }

    fn rewrite_aggr(&mut self, node: &PlanRef, aggr: &Aggr, pred: Expr, depth: usize) -> Result<Rewritten> {
        // global aggregation returns one row even on empty input,
        // so nothing can be pushed below it
        let (pushed, post) = if aggr.group_by.is_empty() {
            (Expr::const_bool(true), pred)
        } else {
            let group_by: HashSet<Symbol> = aggr.group_by.iter().cloned().collect();
            split_by_scope(&pred, &group_by)
        };
        let bundle = if self.config.aggr_pushdown {
            match AggrBundle::new(node.id, aggr) {
                Ok(bundle) => Some(bundle),
                Err(reason) => {
                    log::debug!("aggregation {} not pushed down: {}", node.id, reason);
                    None
                }
            }
        } else {
            None
        };
        let res = self.rewrite(&aggr.source, PushdownContext { pred: pushed, aggr: bundle }, depth + 1)?;
        let output = match res.aggr {
            Some(outcome) if outcome.aggr_id == node.id && !outcome.count_outputs.is_empty() => {
                self.sum_partial_counts(node, aggr, res.node, &outcome.count_outputs)?
            }
            _ => self.rebuild(node, vec![res.node])?,
        };
        Ok(Rewritten::plain(self.with_filter(output, post)))
    }

    /// Replace count with sum of partial counts computed by connector,
    /// and restore original outputs with a projection.
    fn sum_partial_counts(
        &mut self,
        node: &PlanRef,
        aggr: &Aggr,
        source: PlanRef,
        count_outputs: &[Symbol],
    ) -> Result<PlanRef> {
        let mut aggrs = IndexMap::with_capacity(aggr.aggrs.len());
        let mut signatures = IndexMap::with_capacity(aggr.signatures.len());
        let mut restore: IndexMap<Symbol, Expr> = aggr.group_by.iter().map(|g| (g.clone(), g.to_expr())).collect();
        for (output, call) in &aggr.aggrs {
            if count_outputs.contains(output) {
                let sum = self.sym_alloc.new_symbol(output.name(), DataType::Bigint);
                let args = call
                    .args
                    .iter()
                    .map(|a| a.infer(self.sym_alloc.types()))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                signatures.insert(
                    sum.clone(),
                    Signature {
                        name: SmolStr::new("sum"),
                        ret: DataType::Bigint,
                        args,
                    },
                );
                aggrs.insert(sum.clone(), FuncCall::new("sum", call.args.clone()));
                restore.insert(output.clone(), sum.to_expr());
            } else {
                if let Some(sig) = aggr.signatures.get(output) {
                    signatures.insert(output.clone(), sig.clone());
                }
                aggrs.insert(output.clone(), call.clone());
                restore.insert(output.clone(), output.to_expr());
            }
        }
        let rebuilt = Arc::new(PlanNode::new(
            node.id,
            Op::Aggr(Aggr {
                group_by: aggr.group_by.clone(),
                aggrs,
                signatures,
                source,
            }),
        ));
        Ok(Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::proj(restore, rebuilt))))
    }

    fn rewrite_scan(&mut self, node: &PlanRef, scan: &Scan, ctx: PushdownContext) -> Result<Rewritten> {
        let pred = simplify(&ctx.pred);
        if pred.is_false() || pred.is_null_const() {
            return Ok(Rewritten::plain(self.empty_scan(node)));
        }
        let mut columns: HashMap<Symbol, SmolStr> = HashMap::with_capacity(scan.assignments.len());
        for (sym, handle) in &scan.assignments {
            match self.metadata.column_name(&scan.table, handle) {
                Ok(name) => {
                    columns.insert(sym.clone(), name);
                }
                Err(e) => log::warn!("failed to resolve column of {} in table {}: {}", sym, scan.table, e),
            }
        }
        let extracted = extract_tuple_domain(&pred, |s| columns.get(s).cloned());
        if extracted.tuple_domain.is_none() {
            return Ok(Rewritten::plain(self.empty_scan(node)));
        }
        let column_exprs: HashMap<Symbol, Expr> = columns
            .iter()
            .map(|(s, c)| (s.clone(), Expr::Col(Symbol::new(c))))
            .collect();
        let mut descriptor = ConnectorPredicate::new(extracted.tuple_domain, pred.replace_symbols(&column_exprs));
        let mut residual = extracted.remaining;
        let mut outcome = None;
        if let Some(bundle) = &ctx.aggr {
            if let Some(negotiated) = negotiate(
                self.metadata,
                &scan.table,
                bundle,
                &columns,
                self.sym_alloc.types(),
                &descriptor,
                &residual,
                self.prior_rewrites.get(&bundle.aggr_id),
            ) {
                descriptor = negotiated.descriptor;
                residual = negotiated.post_filter;
                if !negotiated.count_rewrites.is_empty() {
                    self.aggr_rewrites.insert(bundle.aggr_id, negotiated.count_rewrites);
                }
                outcome = Some(negotiated.outcome);
            }
        }
        log::debug!("scan {} of table {} takes predicate {}", node.id, scan.table, descriptor.expr);
        self.scan_predicates.insert(node.id, descriptor);
        Ok(Rewritten {
            node: self.with_filter(node.clone(), residual),
            aggr: outcome,
        })
    }

    /// Scan producing no row is replaced by empty values.
    fn empty_scan(&mut self, node: &PlanRef) -> PlanRef {
        log::debug!("scan {} produces no row", node.id);
        self.scan_predicates.insert(
            node.id,
            ConnectorPredicate::new(TupleDomain::none(), Expr::const_bool(false)),
        );
        Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::empty(node.outputs())))
    }

    #[inline]
    fn with_filter(&mut self, node: PlanRef, pred: Expr) -> PlanRef {
        if pred.is_true() {
            node
        } else {
            Arc::new(PlanNode::new(self.id_alloc.next_id(), Op::filt(pred, node)))
        }
    }

    /// Returns the node itself if all sources are unchanged.
    #[inline]
    fn rebuild(&self, node: &PlanRef, sources: Vec<PlanRef>) -> Result<PlanRef> {
        let unchanged = node.sources().len() == sources.len()
            && node
                .sources()
                .into_iter()
                .zip(&sources)
                .all(|(old, new)| Arc::ptr_eq(old, new));
        if unchanged {
            Ok(node.clone())
        } else {
            Ok(Arc::new(node.with_sources(sources)?))
        }
    }
}

struct JoinSplit {
    left: Expr,
    right: Expr,
    join: Expr,
    post: Expr,
}

/// Split predicates of inner join into the parts pushed to each side,
/// the join equalities and the filter after join.
fn process_inner_join(
    inherited: &Expr,
    left_eff: &Expr,
    right_eff: &Expr,
    join_pred: &Expr,
    left_syms: &HashSet<Symbol>,
) -> JoinSplit {
    let in_left = |s: &Symbol| left_syms.contains(s);
    let not_left = |s: &Symbol| !left_syms.contains(s);
    let mut left = vec![];
    let mut right = vec![];
    let mut join_conjuncts: Vec<Expr> = extract_conjuncts(inherited)
        .into_iter()
        .chain(extract_conjuncts(join_pred))
        .filter(|c| !is_deterministic(c))
        .collect();
    let inherited = strip_non_deterministic_conjuncts(inherited);
    let join_pred = strip_non_deterministic_conjuncts(join_pred);
    let left_eff = strip_non_deterministic_conjuncts(left_eff);
    let right_eff = strip_non_deterministic_conjuncts(right_eff);

    let all = EqualityInference::new([&inherited, &left_eff, &right_eff, &join_pred]);
    let without_left = EqualityInference::new([&inherited, &right_eff, &join_pred]);
    let without_right = EqualityInference::new([&inherited, &left_eff, &join_pred]);

    for c in non_inferrable_conjuncts(&inherited)
        .into_iter()
        .chain(non_inferrable_conjuncts(&join_pred))
    {
        let l = all.rewrite_expr(&c, in_left);
        let r = all.rewrite_expr(&c, not_left);
        if l.is_none() && r.is_none() {
            join_conjuncts.push(c);
        }
        left.extend(l);
        right.extend(r);
    }
    // effective predicate of one side may hold on the other side
    for c in non_inferrable_conjuncts(&right_eff) {
        left.extend(all.rewrite_expr(&c, in_left));
    }
    for c in non_inferrable_conjuncts(&left_eff) {
        right.extend(all.rewrite_expr(&c, not_left));
    }
    left.extend(without_left.partition_by(in_left).scope_equalities);
    right.extend(without_right.partition_by(not_left).scope_equalities);
    join_conjuncts.extend(all.partition_by(in_left).scope_straddling_equalities);

    let (join_eqs, post): (Vec<Expr>, Vec<Expr>) = join_conjuncts
        .into_iter()
        .partition(|c| align_equality(c, left_syms).is_some());
    JoinSplit {
        left: combine_conjuncts(left),
        right: combine_conjuncts(right),
        join: combine_conjuncts(join_eqs),
        post: combine_conjuncts(post),
    }
}

/// Split predicates of outer join into the parts pushed to outer side
/// and inner side, and the filter after join. Inner side only receives
/// what follows from the outer side and the join predicate.
fn process_outer_join(
    inherited: &Expr,
    outer_eff: &Expr,
    inner_eff: &Expr,
    join_pred: &Expr,
    outer_syms: &HashSet<Symbol>,
) -> (Expr, Expr, Expr) {
    let in_outer = |s: &Symbol| outer_syms.contains(s);
    let not_outer = |s: &Symbol| !outer_syms.contains(s);
    let mut outer = vec![];
    let mut inner = vec![];
    let mut post: Vec<Expr> = extract_conjuncts(inherited)
        .into_iter()
        .filter(|c| !is_deterministic(c))
        .collect();
    let inherited = strip_non_deterministic_conjuncts(inherited);
    let outer_eff = strip_non_deterministic_conjuncts(outer_eff);
    let inner_eff = strip_non_deterministic_conjuncts(inner_eff);
    let join_pred = strip_non_deterministic_conjuncts(join_pred);

    let inherited_inference = EqualityInference::new(iter::once(&inherited));
    let outer_inference = EqualityInference::new([&inherited, &outer_eff]);
    let partition = inherited_inference.partition_by(in_outer);
    let outer_only = combine_conjuncts(partition.scope_equalities.iter().cloned());
    let nullable_inference = EqualityInference::new([&outer_only, &outer_eff, &inner_eff, &join_pred]);
    let nullable_inference_without_inner = EqualityInference::new([&outer_only, &outer_eff, &join_pred]);

    for c in non_inferrable_conjuncts(&inherited) {
        match outer_inference.rewrite_expr(&c, in_outer) {
            Some(r) => {
                // inner side gets the conjunct only if expressible by outer side
                inner.extend(nullable_inference.rewrite_expr(&r, not_outer));
                outer.push(r);
            }
            None => post.push(c),
        }
    }
    let outer_and_join = combine_conjuncts([outer_eff.clone(), join_pred.clone()]);
    for c in non_inferrable_conjuncts(&outer_and_join) {
        inner.extend(nullable_inference.rewrite_expr(&c, not_outer));
    }
    outer.extend(partition.scope_equalities);
    post.extend(partition.scope_complement_equalities);
    post.extend(partition.scope_straddling_equalities);
    inner.extend(nullable_inference_without_inner.partition_by(not_outer).scope_equalities);
    (
        combine_conjuncts(outer),
        combine_conjuncts(inner),
        combine_conjuncts(post),
    )
}

/// Split predicate into the part expressible by symbols in scope and
/// the rest.
fn split_by_scope(pred: &Expr, scope: &HashSet<Symbol>) -> (Expr, Expr) {
    let in_scope = |s: &Symbol| scope.contains(s);
    let mut pushed = vec![];
    let mut post: Vec<Expr> = extract_conjuncts(pred)
        .into_iter()
        .filter(|c| !is_deterministic(c))
        .collect();
    let pred = strip_non_deterministic_conjuncts(pred);
    let inference = EqualityInference::new(iter::once(&pred));
    for c in non_inferrable_conjuncts(&pred) {
        match inference.rewrite_expr(&c, in_scope) {
            Some(r) => pushed.push(r),
            None => post.push(c),
        }
    }
    let partition = inference.partition_by(in_scope);
    pushed.extend(partition.scope_equalities);
    post.extend(partition.scope_complement_equalities);
    post.extend(partition.scope_straddling_equalities);
    (combine_conjuncts(pushed), combine_conjuncts(post))
}

/// Conjunct can be pushed through projection if it does not duplicate
/// computation: each referenced symbol is a constant, a plain column,
/// or referenced only once.
fn can_inline(c: &Expr, assignments: &IndexMap<Symbol, Expr>) -> bool {
    let refs = c.collect_symbols();
    c.unique_symbols().iter().all(|s| match assignments.get(s) {
        None => false,
        Some(e) if !is_deterministic(e) => false,
        Some(Expr::Const(_)) | Some(Expr::Col(_)) => true,
        Some(_) => refs.iter().filter(|r| *r == s).count() == 1,
    })
}

/// Returns left and right operand if the expression is an equality
/// between an expression of left symbols and one of right symbols.
fn align_equality(e: &Expr, left_syms: &HashSet<Symbol>) -> Option<(Expr, Expr)> {
    if !is_deterministic(e) {
        return None;
    }
    match e {
        // constant operand is no join key
        Expr::Cmp(CmpKind::Equal, lhs, rhs)
            if !lhs.collect_symbols().is_empty() && !rhs.collect_symbols().is_empty() =>
        {
            let on_left = |x: &Expr| x.in_scope(|s| left_syms.contains(s));
            let on_right = |x: &Expr| x.in_scope(|s| !left_syms.contains(s));
            if on_left(lhs) && on_right(rhs) {
                Some((lhs.as_ref().clone(), rhs.as_ref().clone()))
            } else if on_left(rhs) && on_right(lhs) {
                Some((rhs.as_ref().clone(), lhs.as_ref().clone()))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Returns true if the join predicate consists of exactly the given
/// clauses, in any order and orientation.
fn same_criteria(join_pred: &Expr, criteria: &[EquiJoinClause], left_syms: &HashSet<Symbol>) -> bool {
    let mut pairs = HashSet::new();
    for c in extract_conjuncts(join_pred) {
        if c.is_true() {
            continue;
        }
        match align_equality(&c, left_syms) {
            Some(pair) => {
                pairs.insert(pair);
            }
            None => return false,
        }
    }
    let clauses: HashSet<(Expr, Expr)> = criteria
        .iter()
        .map(|c| (c.left.to_expr(), c.right.to_expr()))
        .collect();
    pairs == clauses
}

#[inline]
fn identity_assigns(node: &PlanNode) -> IndexMap<Symbol, Expr> {
    node.outputs()
        .into_iter()
        .map(|s| {
            let e = s.to_expr();
            (s, e)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, Tables};

    fn pushdown(t: &Tables, b: crate::builder::PlanBuilder, root: &PlanRef) -> PushdownOutput {
        let (mut ids, mut syms) = b.into_parts();
        pred_pushdown(root, &t.catalog, &mut syms, &mut ids, &PushdownConfig::default()).unwrap()
    }

    #[test]
    fn test_split_by_scope() {
        let scope: HashSet<Symbol> = [Symbol::new("k")].into_iter().collect();
        let pred = Expr::and(vec![
            Expr::eq(Expr::col("k"), Expr::col("v")),
            Expr::gt(Expr::col("v"), Expr::const_i64(1)),
            Expr::lt(Expr::func("random", vec![]), Expr::const_f64(0.1)),
        ]);
        // k = v makes v > 1 hold on k
        let (pushed, post) = split_by_scope(&pred, &scope);
        assert_eq!(Expr::gt(Expr::col("k"), Expr::const_i64(1)), pushed);
        let post = extract_conjuncts(&post);
        assert_eq!(2, post.len());
        assert!(post.iter().any(|c| !is_deterministic(c)));
    }

    #[test]
    fn test_can_inline() {
        let assignments: IndexMap<Symbol, Expr> = vec![
            (Symbol::new("a"), Expr::col("x")),
            (
                Symbol::new("b"),
                Expr::func("add", vec![Expr::col("x"), Expr::const_i64(1)]),
            ),
            (Symbol::new("r"), Expr::func("random", vec![])),
        ]
        .into_iter()
        .collect();
        let gt = |s: &str| Expr::gt(Expr::col(s), Expr::const_i64(0));
        assert!(can_inline(&gt("a"), &assignments));
        assert!(can_inline(&gt("b"), &assignments));
        assert!(!can_inline(&gt("r"), &assignments));
        let twice = Expr::gt(Expr::col("b"), Expr::func("abs", vec![Expr::col("b")]));
        assert!(!can_inline(&twice, &assignments));
        let twice_col = Expr::gt(Expr::col("a"), Expr::func("abs", vec![Expr::col("a")]));
        assert!(can_inline(&twice_col, &assignments));
    }

    #[test]
    fn test_align_equality() {
        let left: HashSet<Symbol> = [Symbol::new("a")].into_iter().collect();
        let e = Expr::eq(
            Expr::col("x"),
            Expr::func("add", vec![Expr::col("a"), Expr::const_i64(1)]),
        );
        assert_eq!(
            Some((
                Expr::func("add", vec![Expr::col("a"), Expr::const_i64(1)]),
                Expr::col("x")
            )),
            align_equality(&e, &left)
        );
        let e = Expr::eq(Expr::col("x"), Expr::func("add", vec![Expr::col("a"), Expr::col("x")]));
        assert_eq!(None, align_equality(&e, &left));
        let e = Expr::lt(Expr::col("a"), Expr::col("x"));
        assert_eq!(None, align_equality(&e, &left));
        let e = Expr::eq(Expr::const_i64(5), Expr::col("x"));
        assert_eq!(None, align_equality(&e, &left));
    }

    #[test]
    fn test_pushdown_through_project() {
        init();
        let t = Tables::new();
        let (b, root) = t.build(|b, t| {
            let scan = b.scan(&t.t1, &t.t1_cols(&["a", "b"]))?;
            let proj = b.project(
                vec![
                    ("a", Expr::col("a")),
                    ("e", Expr::func("add", vec![Expr::col("b"), Expr::const_i64(1)])),
                ],
                scan,
            )?;
            b.filter(
                Expr::and(vec![
                    Expr::gt(Expr::col("e"), Expr::const_i64(10)),
                    Expr::gt(Expr::col("e"), Expr::func("abs", vec![Expr::col("e")])),
                    Expr::eq(Expr::col("a"), Expr::const_i64(1)),
                ]),
                proj,
            )
        });
        let res = pushdown(&t, b, &root);
        assert!(res.effect.contains(RuleEffect::OPEXPR));
        // e referenced twice stays above projection
        let filt = match &res.root.op {
            Op::Filt(filt) => filt,
            _ => panic!("expect filter above projection"),
        };
        assert_eq!(
            Expr::gt(Expr::col("e"), Expr::func("abs", vec![Expr::col("e")])),
            filt.pred
        );
        let scan = match &filt.source.op {
            Op::Proj(proj) => &proj.source,
            _ => panic!("expect projection"),
        };
        // add(b, 1) > 10 is not a column domain
        let filt = match &scan.op {
            Op::Filt(filt) => filt,
            _ => panic!("expect residual filter above scan"),
        };
        assert_eq!(
            Expr::gt(
                Expr::func("add", vec![Expr::col("b"), Expr::const_i64(1)]),
                Expr::const_i64(10)
            ),
            filt.pred
        );
        let pred = &res.scan_predicates[&filt.source.id];
        assert!(pred.tuple_domain.get("a").is_some());
    }

    #[test]
    fn test_pushdown_contradiction() {
        init();
        let t = Tables::new();
        let (b, root) = t.build(|b, t| {
            let scan = b.scan(&t.t1, &t.t1_cols(&["a", "b"]))?;
            b.filter(
                Expr::and(vec![
                    Expr::eq(Expr::col("a"), Expr::const_i64(1)),
                    Expr::eq(Expr::col("a"), Expr::const_i64(2)),
                ]),
                scan,
            )
        });
        let res = pushdown(&t, b, &root);
        match &res.root.op {
            Op::Values(values) => {
                assert!(values.rows.is_empty());
                assert_eq!(vec![Symbol::new("a"), Symbol::new("b")], values.outputs);
            }
            _ => panic!("expect empty values"),
        }
        assert!(res.scan_predicates.values().all(|p| p.tuple_domain.is_none()));
    }
}
