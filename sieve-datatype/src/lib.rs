pub mod align;
pub mod error;
pub mod konst;

pub use align::*;
pub use konst::*;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Type not resolved, e.g. constant null without context.
    Unknown,
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Bigint,
    Double,
    Varchar,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Unknown
    }
}

impl DataType {
    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, DataType::Unknown)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, DataType::Boolean)
    }

    /// Returns true for all integral types.
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Bigint)
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Double)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar)
    }

    #[inline]
    pub fn to_lower(&self) -> &'static str {
        match self {
            DataType::Unknown => "unknown",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Bigint => "bigint",
            DataType::Double => "double",
            DataType::Varchar => "varchar",
        }
    }

    /// Common super type of two numeric types, used by arithmetic.
    #[inline]
    pub fn numeric_super(self, other: DataType) -> Option<DataType> {
        use DataType::*;
        let res = match (self, other) {
            (Integer, Integer) => Integer,
            (Integer | Bigint, Integer | Bigint) => Bigint,
            (Integer | Bigint | Double, Integer | Bigint | Double) => Double,
            _ => return None,
        };
        Some(res)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_lower())
    }
}

pub trait Typed {
    /// Returns data type
    fn ty(&self) -> DataType;
}
