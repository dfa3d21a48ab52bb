use crate::DataType;
use std::cmp::Ordering;

pub trait AlignPartialOrd<Rhs: ?Sized = Self> {
    fn align_partial_cmp(&self, other: &Rhs) -> Option<Ordering>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignType {
    Identical,
    F64,
}

impl AlignType {
    /// Align two types to single type for comparison.
    ///
    /// Integer and floating types are aligned to f64 when they differ.
    /// String, boolean and unknown types are only comparable with
    /// themselves.
    #[inline]
    pub fn cmp_align(this: DataType, that: DataType) -> Option<Self> {
        use DataType::*;
        if this == that {
            return match this {
                Unknown => None,
                _ => Some(AlignType::Identical),
            };
        }
        match (this, that) {
            (Integer | Bigint | Double, Integer | Bigint | Double) => Some(AlignType::F64),
            _ => None,
        }
    }
}
