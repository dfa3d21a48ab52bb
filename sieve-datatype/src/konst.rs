use crate::align::{AlignPartialOrd, AlignType};
use crate::error::{Error, Result};
use crate::{DataType, Typed};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Const {
    I64(i64),
    F64(ValidF64),
    String(Arc<str>),
    Bool(bool),
    Null,
}

impl Default for Const {
    fn default() -> Self {
        Const::Null
    }
}

impl Typed for Const {
    #[inline]
    fn ty(&self) -> DataType {
        match self {
            Const::I64(_) => DataType::Bigint,
            Const::F64(_) => DataType::Double,
            Const::String(_) => DataType::Varchar,
            Const::Bool(_) => DataType::Boolean,
            Const::Null => DataType::Unknown,
        }
    }
}

impl Const {
    #[inline]
    pub fn new_f64(v: f64) -> Option<Self> {
        ValidF64::new(v).map(Const::F64)
    }

    #[inline]
    pub fn new_str(s: &str) -> Self {
        Const::String(Arc::from(s))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Const::Null)
    }

    /// Returns None for null, otherwise whether the value equals zero.
    /// False is treated as zero.
    #[inline]
    pub fn is_zero(&self) -> Option<bool> {
        let res = match self {
            Const::I64(i) => *i == 0,
            Const::F64(f) => f.value() == 0.0,
            Const::Bool(b) => !*b,
            Const::String(s) => s.parse::<f64>().map(|v| v == 0.0).unwrap_or(true),
            Const::Null => return None,
        };
        Some(res)
    }

    #[inline]
    pub fn cast_to_f64(&self) -> Option<f64> {
        match self {
            Const::I64(v) => Some(*v as f64),
            Const::F64(v) => Some(v.value()),
            Const::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Const::String(v) => v.trim().parse().ok(),
            Const::Null => None,
        }
    }

    /// Cast constant to target type.
    /// Null can be cast to any type.
    pub fn cast_to(&self, ty: DataType) -> Result<Const> {
        let invalid = || Error::InvalidCast(self.to_string(), ty.to_lower());
        let res = match (self, ty) {
            (Const::Null, _) => Const::Null,
            (_, DataType::Unknown) => return Err(invalid()),
            (Const::I64(v), DataType::Integer) => {
                if *v < i32::MIN as i64 || *v > i32::MAX as i64 {
                    return Err(Error::ValueOutOfRange);
                }
                Const::I64(*v)
            }
            (Const::I64(v), DataType::Bigint) => Const::I64(*v),
            (Const::I64(v), DataType::Double) => Const::F64(ValidF64(*v as f64)),
            (Const::I64(v), DataType::Boolean) => Const::Bool(*v != 0),
            (Const::I64(v), DataType::Varchar) => Const::String(Arc::from(v.to_string())),
            (Const::F64(v), DataType::Integer | DataType::Bigint) => {
                let r = v.value().round();
                let (lo, hi) = if ty == DataType::Integer {
                    (i32::MIN as f64, i32::MAX as f64)
                } else {
                    (i64::MIN as f64, i64::MAX as f64)
                };
                if r < lo || r > hi {
                    return Err(Error::ValueOutOfRange);
                }
                Const::I64(r as i64)
            }
            (Const::F64(v), DataType::Double) => Const::F64(*v),
            (Const::F64(v), DataType::Boolean) => Const::Bool(v.value() != 0.0),
            (Const::F64(v), DataType::Varchar) => Const::String(Arc::from(v.value().to_string())),
            (Const::Bool(v), DataType::Boolean) => Const::Bool(*v),
            (Const::Bool(v), DataType::Integer | DataType::Bigint) => Const::I64(*v as i64),
            (Const::Bool(v), DataType::Double) => Const::F64(ValidF64(if *v { 1.0 } else { 0.0 })),
            (Const::Bool(v), DataType::Varchar) => {
                Const::String(Arc::from(if *v { "true" } else { "false" }))
            }
            (Const::String(s), DataType::Varchar) => Const::String(Arc::clone(s)),
            (Const::String(s), DataType::Integer | DataType::Bigint) => {
                let v: i64 = s.trim().parse()?;
                return Const::I64(v).cast_to(ty);
            }
            (Const::String(s), DataType::Double) => {
                let v: f64 = s.trim().parse()?;
                ValidF64::new(v).map(Const::F64).ok_or(Error::ValueOutOfRange)?
            }
            (Const::String(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Const::Bool(true),
                "false" => Const::Bool(false),
                _ => return Err(invalid()),
            },
        };
        Ok(res)
    }
}

impl AlignPartialOrd for Const {
    fn align_partial_cmp(&self, other: &Self) -> Option<Ordering> {
        AlignType::cmp_align(self.ty(), other.ty()).and_then(|ty| match ty {
            AlignType::F64 => match (self.cast_to_f64(), other.cast_to_f64()) {
                (Some(v0), Some(v1)) => v0.partial_cmp(&v1),
                _ => None,
            },
            AlignType::Identical => match (self, other) {
                (Const::I64(v0), Const::I64(v1)) => v0.partial_cmp(v1),
                (Const::F64(v0), Const::F64(v1)) => v0.value().partial_cmp(&v1.value()),
                (Const::Bool(v0), Const::Bool(v1)) => v0.partial_cmp(v1),
                (Const::String(v0), Const::String(v1)) => v0.partial_cmp(v1),
                _ => None,
            },
        })
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::I64(v) => write!(f, "{}", v),
            Const::F64(v) => write!(f, "{:?}", v.value()),
            Const::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Const::Bool(true) => f.write_str("true"),
            Const::Bool(false) => f.write_str("false"),
            Const::Null => f.write_str("null"),
        }
    }
}

pub const F64_ZERO: ValidF64 = ValidF64(0.0);
pub const F64_ONE: ValidF64 = ValidF64(1.0);

#[derive(Debug, Clone, Copy)]
pub struct ValidF64(f64);

impl ValidF64 {
    #[inline]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_infinite() || value.is_nan() {
            None
        } else {
            Some(ValidF64(value))
        }
    }

    #[inline]
    pub const fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for ValidF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

// we must ensure f64 is valid for equality check
impl Eq for ValidF64 {}

impl PartialOrd for ValidF64 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValidF64 {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // nan and infinity are excluded on construction
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl Hash for ValidF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits())
    }
}

impl Deref for ValidF64 {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
