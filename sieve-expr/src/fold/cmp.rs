use crate::error::Result;
use crate::expr::{CmpKind, Const, Expr};
use sieve_datatype::AlignPartialOrd;
use std::cmp::Ordering;

#[inline]
pub fn fold_cmp(kind: CmpKind, lhs: &Expr, rhs: &Expr) -> Result<Option<Const>> {
    match kind {
        CmpKind::Equal => fold_cmp_ord(lhs, rhs, |o| o == Ordering::Equal),
        CmpKind::NotEqual => fold_cmp_ord(lhs, rhs, |o| o != Ordering::Equal),
        CmpKind::Less => fold_cmp_ord(lhs, rhs, |o| o == Ordering::Less),
        CmpKind::LessEqual => fold_cmp_ord(lhs, rhs, |o| o != Ordering::Greater),
        CmpKind::Greater => fold_cmp_ord(lhs, rhs, |o| o == Ordering::Greater),
        CmpKind::GreaterEqual => fold_cmp_ord(lhs, rhs, |o| o != Ordering::Less),
        CmpKind::IsDistinctFrom => fold_distinct(lhs, rhs),
    }
}

#[inline]
fn fold_cmp_ord<F: Fn(Ordering) -> bool>(lhs: &Expr, rhs: &Expr, f: F) -> Result<Option<Const>> {
    let res = match (lhs, rhs) {
        (Expr::Const(Const::Null), _) | (_, Expr::Const(Const::Null)) => Some(Const::Null),
        (Expr::Const(c1), Expr::Const(c2)) => c1.align_partial_cmp(c2).map(|o| Const::Bool(f(o))),
        _ => None,
    };
    Ok(res)
}

/// Null-safe inequality: two nulls are not distinct.
#[inline]
fn fold_distinct(lhs: &Expr, rhs: &Expr) -> Result<Option<Const>> {
    let res = match (lhs, rhs) {
        (Expr::Const(Const::Null), Expr::Const(Const::Null)) => Some(Const::Bool(false)),
        (Expr::Const(Const::Null), Expr::Const(_)) | (Expr::Const(_), Expr::Const(Const::Null)) => {
            Some(Const::Bool(true))
        }
        (Expr::Const(c1), Expr::Const(c2)) => c1
            .align_partial_cmp(c2)
            .map(|o| Const::Bool(o != Ordering::Equal)),
        _ => None,
    };
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Const::*;

    macro_rules! assert_fold_cmp_null {
        ($c1:expr, $c2:expr) => {
            for kind in [
                CmpKind::Equal,
                CmpKind::NotEqual,
                CmpKind::Less,
                CmpKind::LessEqual,
                CmpKind::Greater,
                CmpKind::GreaterEqual,
            ] {
                assert_eq_fold_cmp(kind, $c1, $c2, Null);
            }
        };
    }

    #[test]
    fn test_fold_cmp_null() {
        assert_fold_cmp_null!(Null, I64(1));
        assert_fold_cmp_null!(I64(1), Null);
        assert_fold_cmp_null!(Null, Const::new_str("abc"));
        assert_fold_cmp_null!(Bool(true), Null);
        assert_fold_cmp_null!(Null, Null);
    }

    #[test]
    fn test_fold_cmp_values() {
        assert_eq_fold_cmp(CmpKind::Equal, I64(1), I64(1), Bool(true));
        assert_eq_fold_cmp(CmpKind::NotEqual, I64(1), I64(1), Bool(false));
        assert_eq_fold_cmp(CmpKind::Less, I64(1), Const::new_f64(1.5).unwrap(), Bool(true));
        assert_eq_fold_cmp(CmpKind::GreaterEqual, I64(2), I64(2), Bool(true));
        assert_eq_fold_cmp(CmpKind::Greater, Const::new_str("b"), Const::new_str("a"), Bool(true));
        assert_eq_fold_cmp(CmpKind::LessEqual, Bool(true), Bool(false), Bool(false));
    }

    #[test]
    fn test_fold_cmp_incomparable() {
        let res = fold_cmp(
            CmpKind::Equal,
            &Expr::Const(Const::new_str("1")),
            &Expr::Const(I64(1)),
        )
        .unwrap();
        assert!(res.is_none());
        let res = fold_cmp(CmpKind::Equal, &Expr::col("a"), &Expr::Const(I64(1))).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_fold_is_distinct_from() {
        assert_eq_fold_cmp(CmpKind::IsDistinctFrom, Null, Null, Bool(false));
        assert_eq_fold_cmp(CmpKind::IsDistinctFrom, Null, I64(1), Bool(true));
        assert_eq_fold_cmp(CmpKind::IsDistinctFrom, I64(1), I64(1), Bool(false));
        assert_eq_fold_cmp(CmpKind::IsDistinctFrom, I64(1), I64(2), Bool(true));
    }

    fn assert_eq_fold_cmp(kind: CmpKind, c1: Const, c2: Const, expected: Const) {
        let res = fold_cmp(kind, &Expr::Const(c1), &Expr::Const(c2))
            .unwrap()
            .unwrap();
        assert_eq!(expected, res)
    }
}
