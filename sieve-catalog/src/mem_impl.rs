use crate::error::{Error, Result};
use crate::{Column, ColumnHandle, ColumnID, ConnectorPredicate, Metadata, TableHandle, TableID};
use indexmap::IndexMap;
use parking_lot::RwLock;
use sieve_datatype::DataType;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};

/// In-memory catalog, mainly for tests.
///
/// Aggregation pushdown is accepted only for connectors registered via
/// `enable_aggr_pushdown`. All proposals are recorded.
#[derive(Debug, Default)]
pub struct MemCatalog {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: IndexMap<SmolStr, TableWithColumns>,
    table_names: HashMap<TableID, SmolStr>,
    aggr_connectors: HashSet<SmolStr>,
    proposals: Vec<(TableID, ConnectorPredicate)>,
    table_id_gen: u32,
    column_id_gen: u32,
}

#[derive(Debug)]
struct TableWithColumns {
    table: TableHandle,
    columns: Vec<Column>,
}

impl MemCatalog {
    /// Create table with given columns.
    pub fn create_table(
        &self,
        connector: &str,
        table_name: &str,
        columns: &[(&str, DataType)],
    ) -> Result<TableHandle> {
        let mut inner = self.inner.write();
        if inner.tables.contains_key(table_name) {
            return Err(Error::TableAlreadyExists(table_name.to_string()));
        }
        let mut names = HashSet::new();
        for (name, _) in columns {
            if !names.insert(*name) {
                return Err(Error::ColumnNameNotUnique(name.to_string()));
            }
        }
        inner.table_id_gen += 1;
        let table = TableHandle {
            id: TableID::new(inner.table_id_gen),
            connector: SmolStr::new(connector),
            name: SmolStr::new(table_name),
        };
        let mut cols = Vec::with_capacity(columns.len());
        for (idx, (name, ty)) in columns.iter().enumerate() {
            inner.column_id_gen += 1;
            cols.push(Column {
                id: ColumnID::new(inner.column_id_gen),
                table_id: table.id,
                name: SmolStr::new(name),
                ty: *ty,
                idx: idx as u32,
            });
        }
        inner.table_names.insert(table.id, table.name.clone());
        inner.tables.insert(
            table.name.clone(),
            TableWithColumns {
                table: table.clone(),
                columns: cols,
            },
        );
        Ok(table)
    }

    #[inline]
    pub fn find_table_by_name(&self, table_name: &str) -> Option<TableHandle> {
        let inner = self.inner.read();
        inner.tables.get(table_name).map(|t| t.table.clone())
    }

    #[inline]
    pub fn all_columns_in_table(&self, table_id: &TableID) -> Vec<Column> {
        let inner = self.inner.read();
        inner
            .table_names
            .get(table_id)
            .and_then(|name| inner.tables.get(name))
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    #[inline]
    pub fn find_column_by_name(&self, table_id: &TableID, column_name: &str) -> Option<Column> {
        self.all_columns_in_table(table_id)
            .into_iter()
            .find(|c| c.name == column_name)
    }

    #[inline]
    pub fn enable_aggr_pushdown(&self, connector: &str) {
        let mut inner = self.inner.write();
        inner.aggr_connectors.insert(SmolStr::new(connector));
    }

    /// Returns all aggregation pushdown proposals received so far.
    #[inline]
    pub fn proposals(&self) -> Vec<(TableID, ConnectorPredicate)> {
        let inner = self.inner.read();
        inner.proposals.clone()
    }
}

impl Metadata for MemCatalog {
    fn column_name(&self, table: &TableHandle, column: &ColumnHandle) -> Result<SmolStr> {
        let inner = self.inner.read();
        inner
            .tables
            .get(&table.name)
            .and_then(|t| t.columns.iter().find(|c| c.id == column.id))
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::ColumnNotExists(column.id.value(), table.name.to_string()))
    }

    fn propose_aggr_pushdown(&self, table: &TableHandle, pred: &ConnectorPredicate) -> Result<bool> {
        let mut inner = self.inner.write();
        if !inner.tables.contains_key(&table.name) {
            return Err(Error::TableNotExists(table.name.to_string()));
        }
        inner.proposals.push((table.id, pred.clone()));
        let accepted = inner.aggr_connectors.contains(&table.connector);
        log::debug!(
            "aggregation pushdown on table {} {}",
            table,
            if accepted { "accepted" } else { "rejected" }
        );
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_catalog() {
        let cat = MemCatalog::default();
        let t1 = cat
            .create_table("mem", "t1", &[("c0", DataType::Bigint), ("c1", DataType::Varchar)])
            .unwrap();
        assert_eq!(
            Err(Error::TableAlreadyExists("t1".to_string())),
            cat.create_table("mem", "t1", &[])
        );
        assert_eq!(
            Err(Error::ColumnNameNotUnique("c0".to_string())),
            cat.create_table("mem", "t2", &[("c0", DataType::Bigint), ("c0", DataType::Bigint)])
        );
        let c1 = cat.find_column_by_name(&t1.id, "c1").unwrap();
        assert_eq!(DataType::Varchar, c1.ty);
        assert_eq!("c1", cat.column_name(&t1, &c1.handle()).unwrap().as_str());
        assert_eq!(Some(t1.clone()), cat.find_table_by_name("t1"));
        assert_eq!(2, cat.all_columns_in_table(&t1.id).len());
    }

    #[test]
    fn test_mem_catalog_aggr_pushdown() {
        let cat = MemCatalog::default();
        let t1 = cat.create_table("mem", "t1", &[("c0", DataType::Bigint)]).unwrap();
        let t2 = cat.create_table("olap", "t2", &[("c0", DataType::Bigint)]).unwrap();
        cat.enable_aggr_pushdown("olap");
        let pred = ConnectorPredicate::default();
        assert!(!cat.propose_aggr_pushdown(&t1, &pred).unwrap());
        assert!(cat.propose_aggr_pushdown(&t2, &pred).unwrap());
        assert_eq!(2, cat.proposals().len());
    }
}
