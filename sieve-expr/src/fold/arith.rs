use crate::error::{Error, Result};
use crate::expr::{Const, Expr};
use crate::func::{FuncKind, FuncSpec};
use std::sync::Arc;

/// Fold scalar function call. Only calls with all-constant arguments
/// are evaluated, except null propagation and coalesce pruning.
pub fn fold_func(spec: &FuncSpec, args: &[Expr]) -> Result<Option<Expr>> {
    if !spec.deterministic {
        return Ok(None);
    }
    if spec.kind == FuncKind::Coalesce {
        return Ok(fold_coalesce(args));
    }
    if spec.null_propagating && args.iter().any(|a| a.is_null_const()) {
        return Ok(Some(Expr::const_null()));
    }
    let consts: Option<Vec<&Const>> = args
        .iter()
        .map(|a| match a {
            Expr::Const(c) => Some(c),
            _ => None,
        })
        .collect();
    let consts = match consts {
        Some(cs) => cs,
        None => return Ok(None),
    };
    let res = match (spec.kind, consts.as_slice()) {
        (FuncKind::Add, [a, b]) => fold_arith(a, b, i64::checked_add, |x, y| x + y)?,
        (FuncKind::Sub, [a, b]) => fold_arith(a, b, i64::checked_sub, |x, y| x - y)?,
        (FuncKind::Mul, [a, b]) => fold_arith(a, b, i64::checked_mul, |x, y| x * y)?,
        (FuncKind::Div, [a, b]) => {
            if b.is_zero() == Some(true) {
                return Err(Error::DivisionByZero);
            }
            fold_arith(a, b, i64::checked_div, |x, y| x / y)?
        }
        (FuncKind::Mod, [a, b]) => {
            if b.is_zero() == Some(true) {
                return Err(Error::DivisionByZero);
            }
            fold_arith(a, b, i64::checked_rem, |x, y| x % y)?
        }
        (FuncKind::Neg, [Const::I64(v)]) => Some(Const::I64(v.checked_neg().ok_or(Error::ValueOutOfRange)?)),
        (FuncKind::Neg, [Const::F64(v)]) => Const::new_f64(-v.value()),
        (FuncKind::Abs, [Const::I64(v)]) => Some(Const::I64(v.checked_abs().ok_or(Error::ValueOutOfRange)?)),
        (FuncKind::Abs, [Const::F64(v)]) => Const::new_f64(v.value().abs()),
        (FuncKind::Lower, [Const::String(s)]) => Some(Const::String(Arc::from(s.to_lowercase()))),
        (FuncKind::Upper, [Const::String(s)]) => Some(Const::String(Arc::from(s.to_uppercase()))),
        (FuncKind::Length, [Const::String(s)]) => Some(Const::I64(s.chars().count() as i64)),
        (FuncKind::Concat, cs) if cs.iter().all(|c| matches!(c, Const::String(_))) => {
            let mut res = String::new();
            for c in cs {
                if let Const::String(s) = c {
                    res.push_str(s)
                }
            }
            Some(Const::String(Arc::from(res)))
        }
        _ => None,
    };
    Ok(res.map(Expr::Const))
}

fn fold_arith<I, F>(a: &Const, b: &Const, fi: I, ff: F) -> Result<Option<Const>>
where
    I: Fn(i64, i64) -> Option<i64>,
    F: Fn(f64, f64) -> f64,
{
    let res = match (a, b) {
        (Const::I64(x), Const::I64(y)) => Some(Const::I64(fi(*x, *y).ok_or(Error::ValueOutOfRange)?)),
        (Const::I64(_) | Const::F64(_), Const::I64(_) | Const::F64(_)) => {
            match (a.cast_to_f64(), b.cast_to_f64()) {
                (Some(x), Some(y)) => Some(Const::new_f64(ff(x, y)).ok_or(Error::ValueOutOfRange)?),
                _ => None,
            }
        }
        _ => None,
    };
    Ok(res)
}

/// Drop leading nulls, stop at first non-null constant.
fn fold_coalesce(args: &[Expr]) -> Option<Expr> {
    let mut rest = Vec::with_capacity(args.len());
    for a in args {
        match a {
            Expr::Const(Const::Null) => (),
            Expr::Const(_) if rest.is_empty() => return Some(a.clone()),
            _ => rest.push(a.clone()),
        }
    }
    match rest.len() {
        0 => Some(Expr::const_null()),
        1 => rest.pop(),
        n if n == args.len() => None,
        _ => Some(Expr::func("coalesce", rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::lookup_func;

    fn fold(name: &str, args: Vec<Expr>) -> Result<Option<Expr>> {
        fold_func(lookup_func(name).unwrap(), &args)
    }

    #[test]
    fn test_fold_arith() {
        assert_eq!(
            Some(Expr::const_i64(3)),
            fold("add", vec![Expr::const_i64(1), Expr::const_i64(2)]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_f64(2.5)),
            fold("multiply", vec![Expr::const_i64(5), Expr::const_f64(0.5)]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_null()),
            fold("subtract", vec![Expr::col("a"), Expr::const_null()]).unwrap()
        );
        assert_eq!(None, fold("add", vec![Expr::col("a"), Expr::const_i64(1)]).unwrap());
        assert_eq!(
            Err(Error::ValueOutOfRange),
            fold("add", vec![Expr::const_i64(i64::MAX), Expr::const_i64(1)])
        );
        assert_eq!(
            Err(Error::DivisionByZero),
            fold("modulus", vec![Expr::const_i64(1), Expr::const_i64(0)])
        );
        assert_eq!(
            Some(Expr::const_i64(-4)),
            fold("negate", vec![Expr::const_i64(4)]).unwrap()
        );
    }

    #[test]
    fn test_fold_string_funcs() {
        assert_eq!(
            Some(Expr::const_str("abc")),
            fold("lower", vec![Expr::const_str("AbC")]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_i64(3)),
            fold("length", vec![Expr::const_str("abc")]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_str("ab")),
            fold("concat", vec![Expr::const_str("a"), Expr::const_str("b")]).unwrap()
        );
    }

    #[test]
    fn test_fold_coalesce() {
        assert_eq!(
            Some(Expr::const_i64(1)),
            fold("coalesce", vec![Expr::const_null(), Expr::const_i64(1), Expr::col("a")]).unwrap()
        );
        assert_eq!(
            Some(Expr::col("a")),
            fold("coalesce", vec![Expr::const_null(), Expr::col("a")]).unwrap()
        );
        assert_eq!(
            None,
            fold("coalesce", vec![Expr::col("a"), Expr::col("b")]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_null()),
            fold("coalesce", vec![Expr::const_null(), Expr::const_null()]).unwrap()
        );
    }

    #[test]
    fn test_fold_non_deterministic() {
        assert_eq!(None, fold("random", vec![]).unwrap());
    }
}
