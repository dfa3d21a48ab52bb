use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Value out of range")]
    ValueOutOfRange,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("Invalid argument type of {0}")]
    InvalidArgumentType(String),
    #[error("Invalid type to compare")]
    InvalidTypeToCompare,
    #[error(transparent)]
    DatatypeError(#[from] sieve_datatype::error::Error),
}
