use crate::controlflow::ControlFlow;
use indexmap::IndexSet;
use smallvec::{smallvec, SmallVec};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub use sieve_datatype::{Const, DataType, ValidF64};

/// Symbol is the name of a single column definition in the plan.
/// Equality and hashing are by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(SmolStr);

impl Symbol {
    #[inline]
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(SmolStr::new(name))
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.0.as_str()
    }

    #[inline]
    pub fn to_expr(&self) -> Expr {
        Expr::Col(self.clone())
    }
}

impl From<&str> for Symbol {
    #[inline]
    fn from(src: &str) -> Self {
        Symbol::new(src)
    }
}

impl PartialOrd for Symbol {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    IsDistinctFrom,
}

impl CmpKind {
    #[inline]
    pub fn to_op(&self) -> &'static str {
        match self {
            CmpKind::Equal => "=",
            CmpKind::NotEqual => "<>",
            CmpKind::Less => "<",
            CmpKind::LessEqual => "<=",
            CmpKind::Greater => ">",
            CmpKind::GreaterEqual => ">=",
            CmpKind::IsDistinctFrom => "IS DISTINCT FROM",
        }
    }

    /// Returns the operator that keeps semantics when operands are swapped.
    #[inline]
    pub fn flip(&self) -> Self {
        match self {
            CmpKind::Less => CmpKind::Greater,
            CmpKind::LessEqual => CmpKind::GreaterEqual,
            CmpKind::Greater => CmpKind::Less,
            CmpKind::GreaterEqual => CmpKind::LessEqual,
            other => *other,
        }
    }
}

/// Function call, including aggregate function call inside aggregation node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncCall {
    pub name: SmolStr,
    pub args: Vec<Expr>,
    pub distinct: bool,
}

impl FuncCall {
    #[inline]
    pub fn new(name: &str, args: Vec<Expr>) -> Self {
        FuncCall {
            name: SmolStr::new(name.to_ascii_lowercase()),
            args,
            distinct: false,
        }
    }

    #[inline]
    pub fn new_distinct(name: &str, args: Vec<Expr>) -> Self {
        FuncCall {
            distinct: true,
            ..FuncCall::new(name, args)
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl fmt::Display for FuncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", a)?;
        }
        f.write_str(")")
    }
}

/// Scalar expression. Expressions are never mutated once built into a plan,
/// rewrites always produce new trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(Const),
    Col(Symbol),
    Cmp(CmpKind, Box<Expr>, Box<Expr>),
    Func(FuncCall),
    Cast(Box<Expr>, DataType),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const(Const::Bool(true))
    }
}

impl Expr {
    #[inline]
    pub fn const_null() -> Self {
        Expr::Const(Const::Null)
    }

    #[inline]
    pub fn const_bool(v: bool) -> Self {
        Expr::Const(Const::Bool(v))
    }

    #[inline]
    pub fn const_i64(i: i64) -> Self {
        Expr::Const(Const::I64(i))
    }

    /// Non-finite input becomes null.
    #[inline]
    pub fn const_f64(f: f64) -> Self {
        Expr::Const(Const::new_f64(f).unwrap_or(Const::Null))
    }

    #[inline]
    pub fn const_str(s: &str) -> Self {
        Expr::Const(Const::String(Arc::from(s)))
    }

    #[inline]
    pub fn col(name: &str) -> Self {
        Expr::Col(Symbol::new(name))
    }

    #[inline]
    pub fn cmp(kind: CmpKind, lhs: Expr, rhs: Expr) -> Self {
        Expr::Cmp(kind, Box::new(lhs), Box::new(rhs))
    }

    #[inline]
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::Equal, lhs, rhs)
    }

    #[inline]
    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::NotEqual, lhs, rhs)
    }

    #[inline]
    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::Less, lhs, rhs)
    }

    #[inline]
    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::LessEqual, lhs, rhs)
    }

    #[inline]
    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::Greater, lhs, rhs)
    }

    #[inline]
    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Expr::cmp(CmpKind::GreaterEqual, lhs, rhs)
    }

    #[inline]
    pub fn func(name: &str, args: Vec<Expr>) -> Self {
        Expr::Func(FuncCall::new(name, args))
    }

    #[inline]
    pub fn cast(arg: Expr, ty: DataType) -> Self {
        Expr::Cast(Box::new(arg), ty)
    }

    /// Build AND over given expressions. Empty input is TRUE and single
    /// input is returned as is.
    #[inline]
    pub fn and(mut es: Vec<Expr>) -> Self {
        match es.len() {
            0 => Expr::const_bool(true),
            1 => es.pop().unwrap_or_default(),
            _ => Expr::And(es),
        }
    }

    /// Build OR over given expressions. Empty input is FALSE and single
    /// input is returned as is.
    #[inline]
    pub fn or(mut es: Vec<Expr>) -> Self {
        match es.len() {
            0 => Expr::const_bool(false),
            1 => es.pop().unwrap_or_else(|| Expr::const_bool(false)),
            _ => Expr::Or(es),
        }
    }

    #[inline]
    pub fn not(arg: Expr) -> Self {
        Expr::Not(Box::new(arg))
    }

    #[inline]
    pub fn is_null(arg: Expr) -> Self {
        Expr::IsNull(Box::new(arg))
    }

    #[inline]
    pub fn is_not_null(arg: Expr) -> Self {
        Expr::not(Expr::is_null(arg))
    }

    #[inline]
    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Const(Const::Bool(true)))
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Const(Const::Bool(false)))
    }

    #[inline]
    pub fn is_null_const(&self) -> bool {
        matches!(self, Expr::Const(Const::Null))
    }

    #[inline]
    pub fn as_col(&self) -> Option<&Symbol> {
        match self {
            Expr::Col(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_col(&self, sym: &Symbol) -> bool {
        self.as_col().map(|s| s == sym).unwrap_or_default()
    }

    #[inline]
    pub fn args(&self) -> SmallVec<[&Expr; 2]> {
        match self {
            Expr::Const(_) | Expr::Col(_) => smallvec![],
            Expr::Cmp(_, lhs, rhs) => smallvec![lhs.as_ref(), rhs.as_ref()],
            Expr::Func(f) => f.args.iter().collect(),
            Expr::Cast(arg, _) | Expr::Not(arg) | Expr::IsNull(arg) => smallvec![arg.as_ref()],
            Expr::And(es) | Expr::Or(es) => es.iter().collect(),
        }
    }

    #[inline]
    pub fn args_mut(&mut self) -> SmallVec<[&mut Expr; 2]> {
        match self {
            Expr::Const(_) | Expr::Col(_) => smallvec![],
            Expr::Cmp(_, lhs, rhs) => smallvec![lhs.as_mut(), rhs.as_mut()],
            Expr::Func(f) => f.args.iter_mut().collect(),
            Expr::Cast(arg, _) | Expr::Not(arg) | Expr::IsNull(arg) => smallvec![arg.as_mut()],
            Expr::And(es) | Expr::Or(es) => es.iter_mut().collect(),
        }
    }

    pub fn walk<'a, V: ExprVisitor<'a>>(&'a self, visitor: &mut V) -> ControlFlow<V::Break, V::Cont> {
        let mut eff = visitor.enter(self)?;
        for c in self.args() {
            eff.merge(c.walk(visitor)?)
        }
        eff.merge(visitor.leave(self)?);
        ControlFlow::Continue(eff)
    }

    pub fn walk_mut<V: ExprMutVisitor>(&mut self, visitor: &mut V) -> ControlFlow<V::Break, V::Cont> {
        let mut eff = visitor.enter(self)?;
        for c in self.args_mut() {
            eff.merge(c.walk_mut(visitor)?)
        }
        eff.merge(visitor.leave(self)?);
        ControlFlow::Continue(eff)
    }

    /// Collect all symbol references, duplicates included, in pre-order.
    #[inline]
    pub fn collect_symbols(&self) -> Vec<Symbol> {
        struct Collect(Vec<Symbol>);
        impl<'a> ExprVisitor<'a> for Collect {
            type Cont = ();
            type Break = ();
            #[inline]
            fn enter(&mut self, e: &Expr) -> ControlFlow<()> {
                if let Expr::Col(s) = e {
                    self.0.push(s.clone())
                }
                ControlFlow::Continue(())
            }
        }
        let mut c = Collect(vec![]);
        let _ = self.walk(&mut c);
        c.0
    }

    /// Collect distinct symbols in order of first appearance.
    #[inline]
    pub fn unique_symbols(&self) -> IndexSet<Symbol> {
        self.collect_symbols().into_iter().collect()
    }

    /// Returns true if every referenced symbol satisfies the scope.
    /// Expressions without symbols are in any scope.
    #[inline]
    pub fn in_scope<F: Fn(&Symbol) -> bool>(&self, scope: F) -> bool {
        struct Check<F>(F);
        impl<'a, F: Fn(&Symbol) -> bool> ExprVisitor<'a> for Check<F> {
            type Cont = ();
            type Break = ();
            #[inline]
            fn enter(&mut self, e: &Expr) -> ControlFlow<()> {
                match e {
                    Expr::Col(s) if !(self.0)(s) => ControlFlow::Break(()),
                    _ => ControlFlow::Continue(()),
                }
            }
        }
        self.walk(&mut Check(scope)).is_continue()
    }

    #[inline]
    pub fn contains_symbol(&self, sym: &Symbol) -> bool {
        !self.in_scope(|s| s != sym)
    }

    /// All distinct sub-expressions including self, in pre-order.
    #[inline]
    pub fn sub_exprs(&self) -> Vec<&Expr> {
        struct Collect<'a>(Vec<&'a Expr>, HashSet<&'a Expr>);
        impl<'a> ExprVisitor<'a> for Collect<'a> {
            type Cont = ();
            type Break = ();
            #[inline]
            fn enter(&mut self, e: &'a Expr) -> ControlFlow<()> {
                if self.1.insert(e) {
                    self.0.push(e)
                }
                ControlFlow::Continue(())
            }
        }
        let mut c = Collect(vec![], HashSet::new());
        let _ = self.walk(&mut c);
        c.0
    }

    /// Number of nodes in the expression tree.
    #[inline]
    pub fn tree_size(&self) -> usize {
        1 + self.args().iter().map(|a| a.tree_size()).sum::<usize>()
    }

    /// Rewrite the tree top-down. If `f` returns a replacement for a node,
    /// the replacement is taken as is and its children are not visited.
    pub fn rewrite<F: FnMut(&Expr) -> Option<Expr>>(&self, f: &mut F) -> Expr {
        if let Some(new) = f(self) {
            return new;
        }
        match self {
            Expr::Const(_) | Expr::Col(_) => self.clone(),
            Expr::Cmp(kind, lhs, rhs) => Expr::cmp(*kind, lhs.rewrite(f), rhs.rewrite(f)),
            Expr::Func(fc) => Expr::Func(FuncCall {
                name: fc.name.clone(),
                args: fc.args.iter().map(|a| a.rewrite(f)).collect(),
                distinct: fc.distinct,
            }),
            Expr::Cast(arg, ty) => Expr::cast(arg.rewrite(f), *ty),
            Expr::And(es) => Expr::And(es.iter().map(|e| e.rewrite(f)).collect()),
            Expr::Or(es) => Expr::Or(es.iter().map(|e| e.rewrite(f)).collect()),
            Expr::Not(arg) => Expr::not(arg.rewrite(f)),
            Expr::IsNull(arg) => Expr::is_null(arg.rewrite(f)),
        }
    }

    /// Substitute symbol references according to the mapping.
    #[inline]
    pub fn replace_symbols(&self, mapping: &HashMap<Symbol, Expr>) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Col(s) => mapping.get(s).cloned(),
            _ => None,
        })
    }

    /// Substitute whole sub-expressions according to the mapping,
    /// larger subtrees are preferred.
    #[inline]
    pub fn replace_exprs(&self, mapping: &HashMap<Expr, Expr>) -> Expr {
        if mapping.is_empty() {
            return self.clone();
        }
        self.rewrite(&mut |e| mapping.get(e).cloned())
    }

    #[inline]
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(_) | Expr::Col(_) | Expr::Func(_) | Expr::Cast(..) => write!(f, "{}", self),
            _ => write!(f, "({})", self),
        }
    }
}

impl From<Symbol> for Expr {
    #[inline]
    fn from(src: Symbol) -> Self {
        Expr::Col(src)
    }
}

impl From<Const> for Expr {
    #[inline]
    fn from(src: Const) -> Self {
        Expr::Const(src)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Col(s) => write!(f, "{}", s),
            Expr::Cmp(kind, lhs, rhs) => {
                lhs.fmt_operand(f)?;
                write!(f, " {} ", kind.to_op())?;
                rhs.fmt_operand(f)
            }
            Expr::Func(fc) => write!(f, "{}", fc),
            Expr::Cast(arg, ty) => write!(f, "CAST({} AS {})", arg, ty),
            Expr::And(es) | Expr::Or(es) => {
                let sep = if matches!(self, Expr::And(_)) { " AND " } else { " OR " };
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    match e {
                        Expr::And(_) | Expr::Or(_) => write!(f, "({})", e)?,
                        _ => write!(f, "{}", e)?,
                    }
                }
                Ok(())
            }
            Expr::Not(arg) => {
                f.write_str("NOT ")?;
                arg.fmt_operand(f)
            }
            Expr::IsNull(arg) => {
                arg.fmt_operand(f)?;
                f.write_str(" IS NULL")
            }
        }
    }
}

pub trait Effect: Default {
    fn merge(&mut self, other: Self);
}

impl Effect for () {
    #[inline]
    fn merge(&mut self, _other: Self) {}
}

pub trait ExprVisitor<'a>: Sized {
    type Cont: Effect;
    type Break;
    /// Returns true if continue
    #[inline]
    fn enter(&mut self, _e: &'a Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }

    /// Returns true if continue
    #[inline]
    fn leave(&mut self, _e: &'a Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }
}

pub trait ExprMutVisitor {
    type Cont: Effect;
    type Break;
    /// Returns true if continue
    #[inline]
    fn enter(&mut self, _e: &mut Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }

    /// Returns true if continue
    #[inline]
    fn leave(&mut self, _e: &mut Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }
}
