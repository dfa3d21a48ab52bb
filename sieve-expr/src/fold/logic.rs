use crate::error::Result;
use crate::expr::{Const, Expr};

#[inline]
pub fn fold_not(arg: &Expr) -> Result<Option<Const>> {
    match arg {
        Expr::Const(Const::Null) => Ok(Some(Const::Null)),
        Expr::Const(c) => fold_not_const(c),
        _ => Ok(None),
    }
}

#[inline]
pub fn fold_not_const(arg: &Const) -> Result<Option<Const>> {
    Ok(arg.is_zero().map(Const::Bool))
}

#[inline]
pub fn fold_isnull(arg: &Expr) -> Result<Option<Const>> {
    let res = match arg {
        Expr::Const(Const::Null) => Some(Const::Bool(true)),
        Expr::Const(_) => Some(Const::Bool(false)),
        _ => None,
    };
    Ok(res)
}

/// Three-valued AND. False dominates, true is dropped,
/// null is kept unless every argument is null.
#[inline]
pub fn fold_and(args: &[Expr]) -> Result<Option<Expr>> {
    fold_logic(args, false)
}

/// Three-valued OR. True dominates, false is dropped,
/// null is kept unless every argument is null.
#[inline]
pub fn fold_or(args: &[Expr]) -> Result<Option<Expr>> {
    fold_logic(args, true)
}

fn fold_logic(args: &[Expr], dominant: bool) -> Result<Option<Expr>> {
    let mut rest = Vec::with_capacity(args.len());
    let mut changed = false;
    for a in args {
        match a {
            Expr::Const(Const::Null) => rest.push(a.clone()),
            Expr::Const(c) => match c.is_zero() {
                Some(zero) if zero != dominant => return Ok(Some(Expr::const_bool(dominant))),
                _ => changed = true,
            },
            _ => rest.push(a.clone()),
        }
    }
    if rest.iter().all(|e| e.is_null_const()) {
        if rest.is_empty() {
            return Ok(Some(Expr::const_bool(!dominant)));
        }
        return Ok(Some(Expr::const_null()));
    }
    if !changed && rest.len() == args.len() {
        return Ok(None);
    }
    if rest.len() == 1 {
        return Ok(rest.pop());
    }
    if dominant {
        Ok(Some(Expr::Or(rest)))
    } else {
        Ok(Some(Expr::And(rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Const::*;

    #[test]
    fn test_fold_not() {
        assert_eq_fold_not(I64(1), Bool(false));
        assert_eq_fold_not(I64(0), Bool(true));
        assert_eq_fold_not(Bool(true), Bool(false));
        assert_eq_fold_not(Bool(false), Bool(true));
        assert_eq_fold_not(Null, Null);
    }

    #[test]
    fn test_fold_and() {
        let x = Expr::eq(Expr::col("x"), Expr::const_i64(1));
        assert_eq!(
            Some(Expr::const_bool(false)),
            fold_and(&[x.clone(), Expr::const_bool(false)]).unwrap()
        );
        assert_eq!(Some(x.clone()), fold_and(&[x.clone(), Expr::const_bool(true)]).unwrap());
        assert_eq!(
            Some(Expr::const_null()),
            fold_and(&[Expr::const_null(), Expr::const_bool(true)]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_bool(true)),
            fold_and(&[Expr::const_bool(true), Expr::const_bool(true)]).unwrap()
        );
        assert_eq!(None, fold_and(&[x.clone(), Expr::const_null()]).unwrap());
    }

    #[test]
    fn test_fold_or() {
        let x = Expr::eq(Expr::col("x"), Expr::const_i64(1));
        assert_eq!(
            Some(Expr::const_bool(true)),
            fold_or(&[x.clone(), Expr::const_bool(true)]).unwrap()
        );
        assert_eq!(Some(x.clone()), fold_or(&[Expr::const_bool(false), x.clone()]).unwrap());
        assert_eq!(
            Some(Expr::const_null()),
            fold_or(&[Expr::const_null(), Expr::const_bool(false)]).unwrap()
        );
        assert_eq!(
            Some(Expr::const_bool(false)),
            fold_or(&[Expr::const_bool(false), Expr::const_bool(false)]).unwrap()
        );
    }

    fn assert_eq_fold_not(c1: Const, c2: Const) {
        let res = fold_not(&Expr::Const(c1)).unwrap().unwrap();
        assert_eq!(res, c2)
    }
}
