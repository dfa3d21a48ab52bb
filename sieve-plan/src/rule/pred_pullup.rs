//! Bottom-up extraction of effective predicates.
//!
//! The effective predicate of a subtree is implied by the filters and
//! projections inside it, and only references output symbols of the
//! subtree root. Join pushdown uses it to move known facts of one side
//! to the other side.
use crate::error::{Error, Result};
use crate::op::{JoinKind, Op, PlanNode};
use sieve_expr::{
    combine_conjuncts, combine_disjuncts, extract_conjuncts, is_deterministic, non_inferrable_conjuncts,
    strip_non_deterministic_conjuncts, EqualityInference, Expr, Symbol,
};
use std::collections::HashSet;
use std::iter;

/// Returns effective predicate of the plan node.
#[inline]
pub fn effective_predicate(node: &PlanNode, max_depth: usize) -> Result<Expr> {
    extract(node, 0, max_depth)
}

fn extract(node: &PlanNode, depth: usize, max_depth: usize) -> Result<Expr> {
    if depth > max_depth {
        return Err(Error::PlanTooDeep(max_depth));
    }
    let res = match &node.op {
        Op::Scan(_) | Op::Values(_) | Op::Union(_) | Op::Exchange(_) => Expr::const_bool(true),
        Op::Filt(filt) => {
            let underlying = extract(&filt.source, depth + 1, max_depth)?;
            combine_conjuncts([strip_non_deterministic_conjuncts(&filt.pred), underlying])
        }
        Op::Proj(proj) => {
            let underlying = extract(&proj.source, depth + 1, max_depth)?;
            let equalities = proj
                .assignments
                .iter()
                .filter(|(s, e)| !e.is_col(s) && is_deterministic(e))
                .map(|(s, e)| Expr::eq(s.to_expr(), e.clone()));
            let outputs: HashSet<Symbol> = proj.assignments.keys().cloned().collect();
            pull_through(&combine_conjuncts(equalities.chain(iter::once(underlying))), &outputs)
        }
        Op::Aggr(aggr) => {
            // global aggregation returns one row even on empty input
            if aggr.group_by.is_empty() {
                Expr::const_bool(true)
            } else {
                let underlying = extract(&aggr.source, depth + 1, max_depth)?;
                let group_by: HashSet<Symbol> = aggr.group_by.iter().cloned().collect();
                pull_through(&underlying, &group_by)
            }
        }
        Op::Join(join) => {
            let left = extract(&join.left, depth + 1, max_depth)?;
            let right = extract(&join.right, depth + 1, max_depth)?;
            let criteria = join.criteria_pred();
            let left_syms: HashSet<Symbol> = join.left.outputs().into_iter().collect();
            let right_syms: HashSet<Symbol> = join.right.outputs().into_iter().collect();
            let outputs: HashSet<Symbol> = left_syms.union(&right_syms).cloned().collect();
            match join.kind {
                JoinKind::Inner | JoinKind::Cross => {
                    pull_through(&combine_conjuncts([left, right, criteria]), &outputs)
                }
                JoinKind::Left => combine_conjuncts(
                    iter::once(pull_through(&left, &outputs))
                        .chain(pull_nullable(&right, &outputs, &[&right_syms]))
                        .chain(pull_nullable(&criteria, &outputs, &[&right_syms])),
                ),
                JoinKind::Right => combine_conjuncts(
                    iter::once(pull_through(&right, &outputs))
                        .chain(pull_nullable(&left, &outputs, &[&left_syms]))
                        .chain(pull_nullable(&criteria, &outputs, &[&left_syms])),
                ),
                JoinKind::Full => combine_conjuncts(
                    pull_nullable(&left, &outputs, &[&left_syms])
                        .into_iter()
                        .chain(pull_nullable(&right, &outputs, &[&right_syms]))
                        .chain(pull_nullable(&criteria, &outputs, &[&left_syms, &right_syms])),
                ),
            }
        }
        Op::Unnest(unnest) => {
            let underlying = extract(&unnest.source, depth + 1, max_depth)?;
            let replicate: HashSet<Symbol> = unnest.replicate.iter().cloned().collect();
            pull_through(&underlying, &replicate)
        }
        Op::SemiJoin(sj) => pull_source(node, &sj.source, depth, max_depth)?,
        Op::Sort(sort) => pull_source(node, &sort.source, depth, max_depth)?,
        Op::Sample(sample) => pull_source(node, &sample.source, depth, max_depth)?,
        Op::MarkDistinct(md) => pull_source(node, &md.source, depth, max_depth)?,
        Op::Limit(limit) => pull_source(node, &limit.source, depth, max_depth)?,
        Op::Output(output) => pull_source(node, &output.source, depth, max_depth)?,
    };
    Ok(res)
}

#[inline]
fn pull_source(node: &PlanNode, source: &PlanNode, depth: usize, max_depth: usize) -> Result<Expr> {
    let underlying = extract(source, depth + 1, max_depth)?;
    let outputs: HashSet<Symbol> = node.outputs().into_iter().collect();
    Ok(pull_through(&underlying, &outputs))
}

/// Keep the part of the predicate that can be expressed with given symbols.
pub(crate) fn pull_through(e: &Expr, scope: &HashSet<Symbol>) -> Expr {
    let in_scope = |s: &Symbol| scope.contains(s);
    let inference = EqualityInference::new(iter::once(e));
    let mut conjuncts: Vec<Expr> = non_inferrable_conjuncts(e)
        .into_iter()
        .filter(is_deterministic)
        .filter_map(|c| inference.rewrite_expr(&c, in_scope))
        .collect();
    conjuncts.extend(inference.partition_by(in_scope).scope_equalities);
    combine_conjuncts(conjuncts)
}

/// Pull each conjunct through the outputs of an outer join, and extend
/// it to hold on rows where the null-producing side is null.
fn pull_nullable(e: &Expr, outputs: &HashSet<Symbol>, null_scopes: &[&HashSet<Symbol>]) -> Vec<Expr> {
    extract_conjuncts(e)
        .into_iter()
        .map(|c| pull_through(&c, outputs))
        .filter(|c| !c.is_true())
        .map(|c| {
            if c.collect_symbols().is_empty() {
                return Expr::const_bool(true);
            }
            let nulls = null_scopes.iter().filter_map(|scope| {
                let syms: Vec<Symbol> = c.unique_symbols().into_iter().filter(|s| scope.contains(s)).collect();
                if syms.is_empty() {
                    None
                } else {
                    Some(Expr::and(syms.into_iter().map(|s| Expr::is_null(s.to_expr())).collect()))
                }
            });
            combine_disjuncts(iter::once(c.clone()).chain(nulls))
        })
        .collect()
}
