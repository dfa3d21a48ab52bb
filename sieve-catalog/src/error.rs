use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("Table '{0}' not exists")]
    TableNotExists(String),
    #[error("Column {0} not exists in table '{1}'")]
    ColumnNotExists(u32, String),
    #[error("Column name '{0}' is not unique")]
    ColumnNameNotUnique(String),
}
