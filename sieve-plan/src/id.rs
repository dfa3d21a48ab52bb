use sieve_datatype::DataType;
use sieve_expr::{Expr, Symbol, TypeInfer, Types};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use crate::error::Result;

/// NodeId wraps u32 to be the identifier of plan nodes in single plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl From<u32> for NodeId {
    fn from(src: u32) -> Self {
        NodeId(src)
    }
}

impl Deref for NodeId {
    type Target = u32;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Generates unique node ids. The allocator must start above
/// all ids already used by the input plan.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    next: u32,
}

impl NodeIdAllocator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn starting_from(next: u32) -> Self {
        NodeIdAllocator { next }
    }

    #[inline]
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Mints unique symbols and owns the type of every symbol in the plan.
#[derive(Debug, Default)]
pub struct SymbolAllocator {
    types: Types,
    suffixes: HashMap<SmolStr, u32>,
}

impl SymbolAllocator {
    #[inline]
    pub fn new(types: Types) -> Self {
        SymbolAllocator {
            types,
            suffixes: HashMap::new(),
        }
    }

    #[inline]
    pub fn types(&self) -> &Types {
        &self.types
    }

    /// Register a symbol of the input plan.
    #[inline]
    pub fn register(&mut self, sym: Symbol, ty: DataType) {
        self.types.insert(sym, ty)
    }

    /// Create a new symbol derived from the hint, unique among
    /// all symbols known to the allocator.
    pub fn new_symbol(&mut self, hint: &str, ty: DataType) -> Symbol {
        let base = symbol_base(hint);
        let mut sym = Symbol::new(&base);
        while self.types.contains(&sym) {
            let suffix = self.suffixes.entry(SmolStr::new(&base)).or_insert(0);
            *suffix += 1;
            sym = Symbol::new(format!("{}_{}", base, suffix));
        }
        self.types.insert(sym.clone(), ty);
        sym
    }

    /// Create a new symbol to hold the value of given expression.
    pub fn new_symbol_for_expr(&mut self, e: &Expr) -> Result<Symbol> {
        let ty = e.infer(&self.types)?;
        let hint = match e {
            Expr::Col(s) => s.name().to_string(),
            Expr::Func(f) => f.name().to_string(),
            _ => String::from("expr"),
        };
        Ok(self.new_symbol(&hint, ty))
    }
}

// strip suffix generated by previous allocations, so names stay short
fn symbol_base(hint: &str) -> String {
    let hint = hint.trim().to_ascii_lowercase();
    let base = match hint.rsplit_once('_') {
        Some((prefix, suffix)) if !prefix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => prefix,
        _ => hint.as_str(),
    };
    if base.is_empty() {
        String::from("expr")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_allocator() {
        let mut alloc = NodeIdAllocator::starting_from(10);
        assert_eq!(NodeId::from(10), alloc.next_id());
        assert_eq!(11, *alloc.next_id());
        assert_eq!("#12", alloc.next_id().to_string());
    }

    #[test]
    fn test_symbol_allocator() {
        let mut alloc = SymbolAllocator::default();
        alloc.register(Symbol::new("a"), DataType::Bigint);
        let s1 = alloc.new_symbol("a", DataType::Bigint);
        assert_eq!("a_1", s1.name());
        let s2 = alloc.new_symbol("a_1", DataType::Varchar);
        assert_eq!("a_2", s2.name());
        assert_eq!(Some(DataType::Varchar), alloc.types().get(&s2));
        let s3 = alloc.new_symbol("", DataType::Bigint);
        assert_eq!("expr", s3.name());
        let s4 = alloc
            .new_symbol_for_expr(&Expr::func("abs", vec![Expr::col("a")]))
            .unwrap();
        assert_eq!("abs", s4.name());
        assert_eq!(Some(DataType::Bigint), alloc.types().get(&s4));
        assert!(alloc.new_symbol_for_expr(&Expr::col("unknown")).is_err());
    }
}
