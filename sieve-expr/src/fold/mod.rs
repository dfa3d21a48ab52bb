mod arith;
mod cmp;
mod logic;

use crate::controlflow::{Branch, ControlFlow, Unbranch};
use crate::error::{Error, Result};
use crate::expr::{Const, Expr, ExprMutVisitor, Symbol};
use crate::func::lookup_func;

pub use arith::*;
pub use cmp::*;
pub use logic::*;

/// General trait to wrap expressions to perform constant folding,
/// as well as checking whether an expression rejects null given
/// specific condition.
pub trait Fold: Sized {
    /// fold consumes self and returns any error if folding can
    /// be performed but fails.
    fn fold(self) -> Result<Expr> {
        self.replace_fold(|_| {})
    }

    fn replace_fold<F: Fn(&mut Expr)>(self, f: F) -> Result<Expr>;

    /// Returns true if the folded result is constant null or false.
    fn reject_null<F: Fn(&mut Expr)>(self, f: F) -> Result<bool> {
        self.replace_fold(f).map(|res| match &res {
            Expr::Const(Const::Null) => true,
            Expr::Const(c) => c.is_zero().unwrap_or_default(),
            _ => false,
        })
    }
}

impl Fold for Expr {
    fn replace_fold<F: Fn(&mut Expr)>(mut self, f: F) -> Result<Expr> {
        let mut fe = FoldExpr(&f);
        self.walk_mut(&mut fe).unbranch()?;
        Ok(self)
    }
}

/// Bind given symbols to null and check whether the expression
/// is then guaranteed to be false or null.
#[inline]
pub fn null_rejects<F: Fn(&Symbol) -> bool>(e: &Expr, nulls: F) -> Result<bool> {
    e.clone().reject_null(|e| {
        if let Expr::Col(s) = e {
            if nulls(s) {
                *e = Expr::const_null()
            }
        }
    })
}

/// Fold the expression, keeping original one if evaluation fails.
#[inline]
pub fn simplify(e: &Expr) -> Expr {
    match e.clone().fold() {
        Ok(res) => res,
        Err(err) => {
            log::debug!("skip simplifying {}: {}", e, err);
            e.clone()
        }
    }
}

struct FoldExpr<'a, F>(&'a F);

impl<'a, F> FoldExpr<'a, F> {
    fn update(&mut self, res: Result<Option<Const>>, e: &mut Expr) -> ControlFlow<Error> {
        self.update_expr(res.map(|r| r.map(Expr::Const)), e)
    }

    fn update_expr(&mut self, res: Result<Option<Expr>>, e: &mut Expr) -> ControlFlow<Error> {
        if let Some(new) = res.branch()? {
            *e = new
        }
        ControlFlow::Continue(())
    }
}

impl<'a, F: Fn(&mut Expr)> ExprMutVisitor for FoldExpr<'a, F> {
    type Cont = ();
    type Break = Error;
    fn leave(&mut self, e: &mut Expr) -> ControlFlow<Error> {
        (self.0)(e);
        match e {
            Expr::Const(_) | Expr::Col(_) => ControlFlow::Continue(()),
            Expr::Cmp(kind, lhs, rhs) => {
                let res = fold_cmp(*kind, lhs, rhs);
                self.update(res, e)
            }
            Expr::Not(arg) => {
                let res = fold_not(arg);
                self.update(res, e)
            }
            Expr::IsNull(arg) => {
                let res = fold_isnull(arg);
                self.update(res, e)
            }
            Expr::And(args) => {
                let res = fold_and(args);
                self.update_expr(res, e)
            }
            Expr::Or(args) => {
                let res = fold_or(args);
                self.update_expr(res, e)
            }
            Expr::Cast(arg, ty) => {
                let res = match arg.as_ref() {
                    Expr::Const(c) => c.cast_to(*ty).map(Some).map_err(Error::from),
                    _ => Ok(None),
                };
                self.update(res, e)
            }
            Expr::Func(fc) => match lookup_func(fc.name()) {
                Some(spec) if !spec.aggregate => {
                    let res = fold_func(spec, &fc.args);
                    self.update_expr(res, e)
                }
                _ => ControlFlow::Continue(()),
            },
        }
    }
}
