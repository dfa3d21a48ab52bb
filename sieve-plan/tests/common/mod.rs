#![allow(dead_code)]

pub mod eval;

use sieve_catalog::mem_impl::MemCatalog;
use sieve_catalog::{Column, TableHandle};
use sieve_datatype::DataType;
use sieve_expr::Expr;
use sieve_plan::builder::PlanBuilder;
use sieve_plan::error::Error;
use sieve_plan::explain::Explain;
use sieve_plan::id::{NodeIdAllocator, SymbolAllocator};
use sieve_plan::op::{PlanNode, PlanRef};
use sieve_plan::rule::{pred_pushdown, PushdownConfig, PushdownOutput};

/// Tables t1(a, b) and t2(x, y) of connector "mem", t3(k, v, w) of
/// connector "olap". All columns are bigint.
pub struct Env {
    pub catalog: MemCatalog,
    pub t1: TableHandle,
    pub t2: TableHandle,
    pub t3: TableHandle,
    pub builder: PlanBuilder,
}

impl Env {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let catalog = MemCatalog::default();
        let t1 = catalog
            .create_table("mem", "t1", &[("a", DataType::Bigint), ("b", DataType::Bigint)])
            .unwrap();
        let t2 = catalog
            .create_table("mem", "t2", &[("x", DataType::Bigint), ("y", DataType::Bigint)])
            .unwrap();
        let t3 = catalog
            .create_table(
                "olap",
                "t3",
                &[("k", DataType::Bigint), ("v", DataType::Bigint), ("w", DataType::Bigint)],
            )
            .unwrap();
        Env {
            catalog,
            t1,
            t2,
            t3,
            builder: PlanBuilder::new(),
        }
    }

    pub fn scan(&mut self, table: &TableHandle, names: &[&str]) -> PlanRef {
        let cols: Vec<(&str, Column)> = names
            .iter()
            .map(|n| (*n, self.catalog.find_column_by_name(&table.id, n).unwrap()))
            .collect();
        self.builder.scan(table, &cols).unwrap()
    }

    pub fn scan_t1(&mut self) -> PlanRef {
        let t = self.t1.clone();
        self.scan(&t, &["a", "b"])
    }

    pub fn scan_t2(&mut self) -> PlanRef {
        let t = self.t2.clone();
        self.scan(&t, &["x", "y"])
    }

    pub fn scan_t3(&mut self) -> PlanRef {
        let t = self.t3.clone();
        self.scan(&t, &["k", "v", "w"])
    }

    pub fn pushdown(self, root: &PlanRef, config: &PushdownConfig) -> (MemCatalog, Result<PushdownOutput, Error>) {
        let (catalog, mut ids, mut syms) = self.into_parts();
        let res = pred_pushdown(root, &catalog, &mut syms, &mut ids, config);
        (catalog, res)
    }

    /// Catalog and allocators, for callers running the rule themselves.
    pub fn into_parts(self) -> (MemCatalog, NodeIdAllocator, SymbolAllocator) {
        let (ids, syms) = self.builder.into_parts();
        (self.catalog, ids, syms)
    }
}

pub fn gt(sym: &str, v: i64) -> Expr {
    Expr::gt(Expr::col(sym), Expr::const_i64(v))
}

pub fn explain(node: &PlanNode) -> String {
    let mut s = String::new();
    node.explain(&mut s).unwrap();
    s
}
