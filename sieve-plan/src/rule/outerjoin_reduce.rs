//! Outer join reduction.
//!
//! If the predicate above an outer join rejects null rows of the
//! null-producing side, unmatched rows never survive the predicate,
//! and the join can be evaluated as an inner join.
use crate::op::{Join, JoinKind};
use sieve_expr::fold::null_rejects;
use sieve_expr::{extract_conjuncts, is_deterministic, Expr, Symbol};
use std::collections::HashSet;

/// Returns the join kind after reduction given the predicate above it.
/// Cross join is always reported as inner.
pub fn reduce_join_kind(join: &Join, pred: &Expr) -> JoinKind {
    let reduced = match join.kind {
        JoinKind::Inner | JoinKind::Cross => JoinKind::Inner,
        JoinKind::Left => {
            let right: HashSet<Symbol> = join.right.outputs().into_iter().collect();
            if rejects_null_rows(pred, &right) {
                JoinKind::Inner
            } else {
                JoinKind::Left
            }
        }
        JoinKind::Right => {
            let left: HashSet<Symbol> = join.left.outputs().into_iter().collect();
            if rejects_null_rows(pred, &left) {
                JoinKind::Inner
            } else {
                JoinKind::Right
            }
        }
        JoinKind::Full => {
            let left: HashSet<Symbol> = join.left.outputs().into_iter().collect();
            let right: HashSet<Symbol> = join.right.outputs().into_iter().collect();
            // rejecting null left rows removes the unmatched rows of right side
            match (rejects_null_rows(pred, &left), rejects_null_rows(pred, &right)) {
                (true, true) => JoinKind::Inner,
                (true, false) => JoinKind::Left,
                (false, true) => JoinKind::Right,
                (false, false) => JoinKind::Full,
            }
        }
    };
    if reduced != join.kind && join.kind != JoinKind::Cross {
        log::debug!(
            "reduce {} join to {} join by predicate {}",
            join.kind.to_lower(),
            reduced.to_lower(),
            pred
        );
    }
    reduced
}

/// Returns true if any deterministic conjunct evaluates to false or null
/// when all given symbols are null. A constant conjunct folding to false
/// or null rejects every row, including the null ones.
pub fn rejects_null_rows(pred: &Expr, nulls: &HashSet<Symbol>) -> bool {
    extract_conjuncts(pred)
        .iter()
        .filter(|c| {
            let syms = c.collect_symbols();
            is_deterministic(c) && (syms.is_empty() || syms.iter().any(|s| nulls.contains(s)))
        })
        .any(|c| match null_rejects(c, |s| nulls.contains(s)) {
            Ok(res) => res,
            Err(e) => {
                log::debug!("skip null rejection check of {}: {}", c, e);
                false
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use crate::tests::{build_plan, init};
    use rand::Rng;
    use sieve_expr::fold::simplify;
    use std::collections::HashMap;
    use std::iter;

    fn join_of(node: &crate::op::PlanNode) -> &Join {
        match &node.op {
            Op::Join(join) => join,
            _ => panic!("not a join"),
        }
    }

    #[test]
    fn test_reduce_left_join() {
        init();
        build_plan(|b, t| {
            let l = b.scan(&t.t1, &t.t1_cols(&["a", "b"]))?;
            let r = b.scan(&t.t2, &t.t2_cols(&["x", "y"]))?;
            let node = b.join(JoinKind::Left, l, r, &[("a", "x")])?;
            let join = join_of(&node);
            let y = || Expr::col("y");
            // y = 5 is null on unmatched rows
            let pred = Expr::eq(y(), Expr::const_i64(5));
            assert_eq!(JoinKind::Inner, reduce_join_kind(join, &pred));
            // unmatched rows satisfy y IS NULL
            let pred = Expr::is_null(y());
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &pred));
            // coalesce does not propagate null
            let pred = Expr::eq(
                Expr::func("coalesce", vec![y(), Expr::const_i64(0)]),
                Expr::const_i64(0),
            );
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &pred));
            // predicate on left side only
            let pred = Expr::gt(Expr::col("a"), Expr::const_i64(0));
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &pred));
            // one rejecting conjunct is enough
            let pred = Expr::and(vec![Expr::is_null(Expr::col("b")), Expr::lt(y(), Expr::const_i64(3))]);
            assert_eq!(JoinKind::Inner, reduce_join_kind(join, &pred));
            // non-deterministic conjunct is never used
            let pred = Expr::lt(
                Expr::func("add", vec![y(), Expr::func("random", vec![])]),
                Expr::const_i64(3),
            );
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &pred));
            // constant conjunct that never holds removes all rows
            let pred = Expr::gt(Expr::const_i64(1), Expr::const_i64(2));
            assert_eq!(JoinKind::Inner, reduce_join_kind(join, &pred));
            let pred = Expr::and(vec![Expr::gt(Expr::col("b"), Expr::const_i64(0)), Expr::const_null()]);
            assert_eq!(JoinKind::Inner, reduce_join_kind(join, &pred));
            let pred = Expr::lt(Expr::const_i64(1), Expr::const_i64(2));
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &pred));
            Ok(())
        })
    }

    #[test]
    fn test_reduce_full_join() {
        init();
        build_plan(|b, t| {
            let l = b.scan(&t.t1, &t.t1_cols(&["a"]))?;
            let r = b.scan(&t.t2, &t.t2_cols(&["x"]))?;
            let node = b.join(JoinKind::Full, l, r, &[("a", "x")])?;
            let join = join_of(&node);
            let a_gt = Expr::gt(Expr::col("a"), Expr::const_i64(1));
            let x_gt = Expr::gt(Expr::col("x"), Expr::const_i64(1));
            assert_eq!(JoinKind::Left, reduce_join_kind(join, &a_gt));
            assert_eq!(JoinKind::Right, reduce_join_kind(join, &x_gt));
            assert_eq!(
                JoinKind::Inner,
                reduce_join_kind(join, &Expr::and(vec![a_gt, x_gt]))
            );
            assert_eq!(JoinKind::Full, reduce_join_kind(join, &Expr::const_bool(true)));
            Ok(())
        })
    }

    #[test]
    fn test_reduce_cross_join() {
        init();
        build_plan(|b, t| {
            let l = b.scan(&t.t1, &t.t1_cols(&["a"]))?;
            let r = b.scan(&t.t2, &t.t2_cols(&["x"]))?;
            let node = b.join(JoinKind::Cross, l, r, &[])?;
            assert_eq!(JoinKind::Inner, reduce_join_kind(join_of(&node), &Expr::const_bool(true)));
            Ok(())
        })
    }

    // Whenever a left join is reduced, binding the right side to null
    // must make the predicate false or null.
    #[test]
    fn test_reduce_soundness() {
        init();
        let mut rng = rand::thread_rng();
        build_plan(|b, t| {
            let l = b.scan(&t.t1, &t.t1_cols(&["a"]))?;
            let r = b.scan(&t.t2, &t.t2_cols(&["y"]))?;
            let node = b.join(JoinKind::Left, l, r, &[("a", "y")])?;
            let join = join_of(&node);
            let left_values: Vec<Expr> = iter::once(Expr::const_null())
                .chain((0..5).map(Expr::const_i64))
                .collect();
            for _ in 0..200 {
                let pred = random_pred(&mut rng, 3);
                if reduce_join_kind(join, &pred) != JoinKind::Inner {
                    continue;
                }
                // every left row padded with null must be filtered out
                for a in &left_values {
                    let row: HashMap<Symbol, Expr> = [
                        (Symbol::new("a"), a.clone()),
                        (Symbol::new("y"), Expr::const_null()),
                    ]
                    .into_iter()
                    .collect();
                    let res = simplify(&pred.replace_symbols(&row));
                    assert!(
                        res.is_false() || res.is_null_const(),
                        "unsound reduction of {} to {}",
                        pred,
                        res
                    );
                }
            }
            Ok(())
        })
    }

    fn random_pred<R: Rng>(rng: &mut R, depth: u32) -> Expr {
        let leaf = |rng: &mut R| {
            let sym = if rng.gen_bool(0.5) { "a" } else { "y" };
            let v = Expr::const_i64(rng.gen_range(0..5));
            match rng.gen_range(0..5) {
                0 => Expr::eq(Expr::col(sym), v),
                1 => Expr::gt(Expr::col(sym), v),
                2 => Expr::is_null(Expr::col(sym)),
                3 => Expr::is_not_null(Expr::col(sym)),
                _ => Expr::eq(Expr::func("coalesce", vec![Expr::col(sym), v.clone()]), v),
            }
        };
        if depth == 0 {
            return leaf(rng);
        }
        match rng.gen_range(0..4) {
            0 => Expr::and(vec![random_pred(rng, depth - 1), random_pred(rng, depth - 1)]),
            1 => Expr::or(vec![random_pred(rng, depth - 1), random_pred(rng, depth - 1)]),
            2 => Expr::not(random_pred(rng, depth - 1)),
            _ => leaf(rng),
        }
    }
}
