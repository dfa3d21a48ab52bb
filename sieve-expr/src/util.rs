use crate::controlflow::ControlFlow;
use crate::expr::{Expr, ExprVisitor, Symbol};
use crate::func::is_deterministic_func;
use indexmap::IndexSet;

/// Flatten top-level AND into conjuncts.
#[inline]
pub fn extract_conjuncts(e: &Expr) -> Vec<Expr> {
    let mut res = vec![];
    collect_conjuncts(e, &mut res);
    res
}

fn collect_conjuncts(e: &Expr, res: &mut Vec<Expr>) {
    match e {
        Expr::And(es) => {
            for c in es {
                collect_conjuncts(c, res)
            }
        }
        _ => res.push(e.clone()),
    }
}

/// Flatten top-level OR into disjuncts.
#[inline]
pub fn extract_disjuncts(e: &Expr) -> Vec<Expr> {
    match e {
        Expr::Or(es) => es.iter().flat_map(extract_disjuncts).collect(),
        _ => vec![e.clone()],
    }
}

/// Combine conjuncts into single expression.
/// Nested ANDs are flattened, TRUE literals dropped and duplicates
/// removed with first occurrence kept. Empty result is TRUE.
#[inline]
pub fn combine_conjuncts<I: IntoIterator<Item = Expr>>(es: I) -> Expr {
    let set: IndexSet<Expr> = es
        .into_iter()
        .flat_map(|e| extract_conjuncts(&e))
        .filter(|e| !e.is_true())
        .collect();
    Expr::and(set.into_iter().collect())
}

/// Combine disjuncts into single expression. Empty result is FALSE.
#[inline]
pub fn combine_disjuncts<I: IntoIterator<Item = Expr>>(es: I) -> Expr {
    let set: IndexSet<Expr> = es
        .into_iter()
        .flat_map(|e| extract_disjuncts(&e))
        .filter(|e| !e.is_false())
        .collect();
    Expr::or(set.into_iter().collect())
}

/// Returns false if the expression calls any non-deterministic function.
#[inline]
pub fn is_deterministic(e: &Expr) -> bool {
    struct Check;
    impl<'a> ExprVisitor<'a> for Check {
        type Cont = ();
        type Break = ();
        #[inline]
        fn enter(&mut self, e: &Expr) -> ControlFlow<()> {
            match e {
                Expr::Func(fc) if !is_deterministic_func(fc.name()) => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }
    }
    e.walk(&mut Check).is_continue()
}

#[inline]
pub fn strip_non_deterministic_conjuncts(e: &Expr) -> Expr {
    combine_conjuncts(extract_conjuncts(e).into_iter().filter(is_deterministic))
}

#[inline]
pub fn strip_deterministic_conjuncts(e: &Expr) -> Expr {
    combine_conjuncts(
        extract_conjuncts(e)
            .into_iter()
            .filter(|c| !is_deterministic(c)),
    )
}

/// Extends the expression with "OR (s1 IS NULL AND s2 IS NULL ...)"
/// for its symbols matching the scope. The expression is returned as is
/// if no symbol matches.
#[inline]
pub fn expr_or_null_symbols<F: Fn(&Symbol) -> bool>(e: Expr, scope: F) -> Expr {
    let symbols: IndexSet<Symbol> = e.unique_symbols().into_iter().filter(|s| scope(s)).collect();
    if symbols.is_empty() {
        return e;
    }
    let nulls = Expr::and(symbols.into_iter().map(|s| Expr::is_null(Expr::Col(s))).collect());
    Expr::or(vec![e, nulls])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::Fold;
    use rand::Rng;

    fn x_gt(v: i64) -> Expr {
        Expr::gt(Expr::col("x"), Expr::const_i64(v))
    }

    #[test]
    fn test_extract_conjuncts() {
        let e = Expr::and(vec![
            x_gt(1),
            Expr::and(vec![x_gt(2), Expr::or(vec![x_gt(3), x_gt(4)])]),
        ]);
        let cs = extract_conjuncts(&e);
        assert_eq!(3, cs.len());
        assert_eq!(Expr::or(vec![x_gt(3), x_gt(4)]), cs[2]);
        assert_eq!(vec![x_gt(1)], extract_conjuncts(&x_gt(1)));
    }

    #[test]
    fn test_combine_conjuncts() {
        assert_eq!(Expr::const_bool(true), combine_conjuncts(vec![]));
        assert_eq!(
            Expr::const_bool(true),
            combine_conjuncts(vec![Expr::const_bool(true), Expr::const_bool(true)])
        );
        assert_eq!(x_gt(1), combine_conjuncts(vec![x_gt(1), Expr::const_bool(true), x_gt(1)]));
        assert_eq!(
            Expr::And(vec![x_gt(1), x_gt(2)]),
            combine_conjuncts(vec![x_gt(1), Expr::and(vec![x_gt(2), x_gt(1)])])
        );
    }

    #[test]
    fn test_conjunct_roundtrip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(0..6);
            let cs: Vec<Expr> = (0..n).map(|_| x_gt(rng.gen_range(0..4))).collect();
            let e = Expr::and(cs);
            let res = combine_conjuncts(extract_conjuncts(&e));
            // evaluate both sides for every x in range
            for x in -1..6 {
                let bind = |e: &mut Expr| {
                    if e.is_col(&Symbol::new("x")) {
                        *e = Expr::const_i64(x)
                    }
                };
                assert_eq!(
                    e.clone().replace_fold(bind).unwrap(),
                    res.clone().replace_fold(bind).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_is_deterministic() {
        assert!(is_deterministic(&x_gt(1)));
        let r = Expr::gt(Expr::func("random", vec![]), Expr::const_f64(0.5));
        assert!(!is_deterministic(&r));
        assert!(!is_deterministic(&Expr::and(vec![x_gt(1), Expr::not(r.clone())])));
        let e = Expr::and(vec![x_gt(1), r.clone(), x_gt(2)]);
        assert_eq!(Expr::and(vec![x_gt(1), x_gt(2)]), strip_non_deterministic_conjuncts(&e));
        assert_eq!(r, strip_deterministic_conjuncts(&e));
    }

    #[test]
    fn test_expr_or_null_symbols() {
        let e = Expr::eq(Expr::col("a"), Expr::col("b"));
        let res = expr_or_null_symbols(e.clone(), |s| s.name() == "b");
        assert_eq!(
            Expr::or(vec![e.clone(), Expr::is_null(Expr::col("b"))]),
            res
        );
        assert_eq!(e, expr_or_null_symbols(e.clone(), |s| s.name() == "c"));
    }
}
