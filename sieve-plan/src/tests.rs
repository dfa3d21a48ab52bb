use crate::builder::PlanBuilder;
use crate::error::Result;
use crate::op::PlanRef;
use sieve_catalog::mem_impl::MemCatalog;
use sieve_catalog::{Column, TableHandle};
use sieve_datatype::DataType;

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Tables shared by plan tests.
///
/// t1 and t2 are served by connector "mem", t3 by connector "olap",
/// whose aggregation pushdown is disabled until enabled by the test.
pub(crate) struct Tables {
    pub(crate) catalog: MemCatalog,
    pub(crate) t1: TableHandle,
    pub(crate) t2: TableHandle,
    pub(crate) t3: TableHandle,
}

impl Tables {
    pub(crate) fn new() -> Self {
        let catalog = MemCatalog::default();
        let t1 = catalog
            .create_table(
                "mem",
                "t1",
                &[
                    ("a", DataType::Bigint),
                    ("b", DataType::Bigint),
                    ("c", DataType::Bigint),
                    ("s", DataType::Varchar),
                    ("d", DataType::Double),
                ],
            )
            .unwrap();
        let t2 = catalog
            .create_table(
                "mem",
                "t2",
                &[
                    ("x", DataType::Bigint),
                    ("y", DataType::Bigint),
                    ("z", DataType::Varchar),
                ],
            )
            .unwrap();
        let t3 = catalog
            .create_table(
                "olap",
                "t3",
                &[
                    ("k", DataType::Bigint),
                    ("v", DataType::Bigint),
                    ("w", DataType::Bigint),
                    ("u", DataType::Varchar),
                    ("f", DataType::Double),
                ],
            )
            .unwrap();
        Tables { catalog, t1, t2, t3 }
    }

    /// Columns of the table bound to symbols of the same names.
    pub(crate) fn cols(&self, table: &TableHandle, names: &[&'static str]) -> Vec<(&'static str, Column)> {
        names
            .iter()
            .map(|name| {
                let col = self
                    .catalog
                    .find_column_by_name(&table.id, name)
                    .unwrap_or_else(|| panic!("column {} not in table {}", name, table));
                (*name, col)
            })
            .collect()
    }

    pub(crate) fn t1_cols(&self, names: &[&'static str]) -> Vec<(&'static str, Column)> {
        self.cols(&self.t1, names)
    }

    pub(crate) fn t2_cols(&self, names: &[&'static str]) -> Vec<(&'static str, Column)> {
        self.cols(&self.t2, names)
    }

    pub(crate) fn t3_cols(&self, names: &[&'static str]) -> Vec<(&'static str, Column)> {
        self.cols(&self.t3, names)
    }

    pub(crate) fn build<F>(&self, f: F) -> (PlanBuilder, PlanRef)
    where
        F: FnOnce(&mut PlanBuilder, &Tables) -> Result<PlanRef>,
    {
        let mut builder = PlanBuilder::new();
        let root = f(&mut builder, self).unwrap();
        (builder, root)
    }

    pub(crate) fn with_builder<F>(f: F) -> (PlanBuilder, PlanRef)
    where
        F: FnOnce(&mut PlanBuilder, &Tables) -> Result<PlanRef>,
    {
        Tables::new().build(f)
    }
}

pub(crate) fn build_plan<F>(f: F)
where
    F: FnOnce(&mut PlanBuilder, &Tables) -> Result<()>,
{
    let tables = Tables::new();
    let mut builder = PlanBuilder::new();
    f(&mut builder, &tables).unwrap()
}
