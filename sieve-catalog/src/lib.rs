pub mod domain;
pub mod error;
pub mod mem_impl;
pub mod pred;

pub use domain::*;
pub use pred::*;

use crate::error::Result;
use sieve_datatype::DataType;
use smol_str::SmolStr;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Metadata service consumed by the optimizer.
/// Implementations must be thread-safe and cheap to call repeatedly.
pub trait Metadata {
    /// Returns source name of the column.
    fn column_name(&self, table: &TableHandle, column: &ColumnHandle) -> Result<SmolStr>;

    /// Ask whether the table can evaluate the group-by and aggregates in
    /// the predicate itself. Rejection is a normal answer, not an error.
    fn propose_aggr_pushdown(&self, table: &TableHandle, pred: &ConnectorPredicate) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectID<T> {
    id: u32,
    _marker: PhantomData<T>,
}

impl<T> ObjectID<T> {
    /// Required to create object only within the catalog module.
    pub(crate) fn new(id: u32) -> Self {
        ObjectID {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct T;
pub type TableID = ObjectID<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct C;
pub type ColumnID = ObjectID<C>;

/// Table reference held by scan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle {
    pub id: TableID,
    /// Connector that owns the table, used to decide pushdown capability.
    pub connector: SmolStr,
    pub name: SmolStr,
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.connector, self.name)
    }
}

/// Column reference held by scan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnHandle {
    pub id: ColumnID,
    pub table_id: TableID,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: ColumnID,
    pub table_id: TableID,
    pub name: SmolStr,
    pub ty: DataType,
    pub idx: u32,
}

impl Column {
    #[inline]
    pub fn handle(&self) -> ColumnHandle {
        ColumnHandle {
            id: self.id,
            table_id: self.table_id,
        }
    }
}
