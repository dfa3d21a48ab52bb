use crate::error::{Error, Result};
use crate::expr::{Expr, Symbol};
use crate::func::{lookup_func, RetType};
use sieve_datatype::{DataType, Typed};
use std::collections::HashMap;

/// Symbol table mapping each symbol to its resolved type.
#[derive(Debug, Clone, Default)]
pub struct Types(HashMap<Symbol, DataType>);

impl Types {
    #[inline]
    pub fn new() -> Self {
        Types::default()
    }

    #[inline]
    pub fn insert(&mut self, sym: Symbol, ty: DataType) {
        self.0.insert(sym, ty);
    }

    #[inline]
    pub fn get(&self, sym: &Symbol) -> Option<DataType> {
        self.0.get(sym).cloned()
    }

    #[inline]
    pub fn contains(&self, sym: &Symbol) -> bool {
        self.0.contains_key(sym)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn type_of(&self, sym: &Symbol) -> Result<DataType> {
        self.get(sym)
            .ok_or_else(|| Error::UnknownSymbol(sym.name().to_string()))
    }

    /// Type of every distinct sub-expression.
    pub fn types_of(&self, e: &Expr) -> Result<HashMap<Expr, DataType>> {
        let mut res = HashMap::new();
        for sub in e.sub_exprs() {
            res.insert(sub.clone(), sub.infer(self)?);
        }
        Ok(res)
    }
}

impl FromIterator<(Symbol, DataType)> for Types {
    fn from_iter<I: IntoIterator<Item = (Symbol, DataType)>>(iter: I) -> Self {
        Types(iter.into_iter().collect())
    }
}

pub trait TypeInfer {
    fn infer(&self, types: &Types) -> Result<DataType>;
}

impl TypeInfer for Expr {
    fn infer(&self, types: &Types) -> Result<DataType> {
        let ty = match self {
            Expr::Const(c) => c.ty(),
            Expr::Col(s) => types.type_of(s)?,
            Expr::Cmp(..) | Expr::And(_) | Expr::Or(_) | Expr::Not(_) | Expr::IsNull(_) => {
                DataType::Boolean
            }
            Expr::Cast(_, ty) => *ty,
            Expr::Func(fc) => match lookup_func(fc.name()) {
                None => DataType::Unknown,
                Some(spec) => match spec.ret {
                    RetType::Fixed(ty) => ty,
                    RetType::FirstArg => {
                        let mut res = DataType::Unknown;
                        for a in &fc.args {
                            let ty = a.infer(types)?;
                            if !ty.is_unknown() {
                                res = ty;
                                break;
                            }
                        }
                        res
                    }
                    RetType::NumericSuper => {
                        let mut res: Option<DataType> = None;
                        for a in &fc.args {
                            let ty = a.infer(types)?;
                            if ty.is_unknown() {
                                continue;
                            }
                            res = match res {
                                None if ty.is_numeric() => Some(ty),
                                None => return Err(Error::InvalidArgumentType(fc.to_string())),
                                Some(prev) => Some(
                                    prev.numeric_super(ty)
                                        .ok_or_else(|| Error::InvalidArgumentType(fc.to_string()))?,
                                ),
                            };
                        }
                        res.unwrap_or(DataType::Unknown)
                    }
                    RetType::Sum => match fc.args.first() {
                        Some(a) if a.infer(types)?.is_int() => DataType::Bigint,
                        _ => DataType::Double,
                    },
                },
            },
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Types {
        vec![
            (Symbol::new("i"), DataType::Integer),
            (Symbol::new("b"), DataType::Bigint),
            (Symbol::new("d"), DataType::Double),
            (Symbol::new("s"), DataType::Varchar),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_infer_expr_type() {
        let types = types();
        assert_eq!(DataType::Integer, Expr::col("i").infer(&types).unwrap());
        assert_eq!(
            DataType::Bigint,
            Expr::func("add", vec![Expr::col("i"), Expr::col("b")]).infer(&types).unwrap()
        );
        assert_eq!(
            DataType::Double,
            Expr::func("multiply", vec![Expr::col("b"), Expr::col("d")]).infer(&types).unwrap()
        );
        assert_eq!(
            DataType::Boolean,
            Expr::gt(Expr::col("s"), Expr::const_str("a")).infer(&types).unwrap()
        );
        assert_eq!(
            DataType::Bigint,
            Expr::func("sum", vec![Expr::col("i")]).infer(&types).unwrap()
        );
        assert_eq!(
            DataType::Integer,
            Expr::func("coalesce", vec![Expr::const_null(), Expr::col("i")]).infer(&types).unwrap()
        );
        assert!(matches!(
            Expr::func("add", vec![Expr::col("s"), Expr::col("i")]).infer(&types),
            Err(Error::InvalidArgumentType(_))
        ));
        assert!(matches!(
            Expr::col("missing").infer(&types),
            Err(Error::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_types_of() {
        let types = types();
        let e = Expr::eq(Expr::col("i"), Expr::const_i64(1));
        let res = types.types_of(&e).unwrap();
        assert_eq!(3, res.len());
        assert_eq!(Some(&DataType::Boolean), res.get(&e));
        assert_eq!(Some(&DataType::Bigint), res.get(&Expr::const_i64(1)));
    }
}
