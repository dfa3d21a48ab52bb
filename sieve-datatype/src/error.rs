use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Value out of range")]
    ValueOutOfRange,
    #[error("Invalid value format")]
    InvalidValueFormat,
    #[error("Cannot cast {0} to {1}")]
    InvalidCast(String, &'static str),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(_: std::num::ParseFloatError) -> Self {
        Error::InvalidValueFormat
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(_: std::num::ParseIntError) -> Self {
        Error::InvalidValueFormat
    }
}
