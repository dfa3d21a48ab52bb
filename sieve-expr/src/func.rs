use sieve_datatype::DataType;

/// How return type of a function is derived from its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetType {
    Fixed(DataType),
    /// Same as the first argument with known type.
    FirstArg,
    /// Common numeric type of all arguments.
    NumericSuper,
    /// Bigint for integral argument, double otherwise.
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Abs,
    Lower,
    Upper,
    Length,
    Concat,
    Coalesce,
    Random,
    Uuid,
    Shuffle,
    // aggregate functions
    Min,
    Max,
    Sum,
    Count,
    Avg,
}

#[derive(Debug, Clone, Copy)]
pub struct FuncSpec {
    pub kind: FuncKind,
    pub name: &'static str,
    pub ret: RetType,
    pub deterministic: bool,
    /// Returns null whenever any argument is null.
    pub null_propagating: bool,
    pub aggregate: bool,
}

const fn scalar(kind: FuncKind, name: &'static str, ret: RetType) -> FuncSpec {
    FuncSpec {
        kind,
        name,
        ret,
        deterministic: true,
        null_propagating: true,
        aggregate: false,
    }
}

const fn aggr(kind: FuncKind, name: &'static str, ret: RetType) -> FuncSpec {
    FuncSpec {
        kind,
        name,
        ret,
        deterministic: true,
        null_propagating: false,
        aggregate: true,
    }
}

const fn random(kind: FuncKind, name: &'static str, ret: RetType) -> FuncSpec {
    FuncSpec {
        kind,
        name,
        ret,
        deterministic: false,
        null_propagating: false,
        aggregate: false,
    }
}

static FUNCS: &[FuncSpec] = &[
    scalar(FuncKind::Add, "add", RetType::NumericSuper),
    scalar(FuncKind::Sub, "subtract", RetType::NumericSuper),
    scalar(FuncKind::Mul, "multiply", RetType::NumericSuper),
    scalar(FuncKind::Div, "divide", RetType::NumericSuper),
    scalar(FuncKind::Mod, "modulus", RetType::NumericSuper),
    scalar(FuncKind::Neg, "negate", RetType::FirstArg),
    scalar(FuncKind::Abs, "abs", RetType::FirstArg),
    scalar(FuncKind::Lower, "lower", RetType::Fixed(DataType::Varchar)),
    scalar(FuncKind::Upper, "upper", RetType::Fixed(DataType::Varchar)),
    scalar(FuncKind::Length, "length", RetType::Fixed(DataType::Bigint)),
    scalar(FuncKind::Concat, "concat", RetType::Fixed(DataType::Varchar)),
    FuncSpec {
        null_propagating: false,
        ..scalar(FuncKind::Coalesce, "coalesce", RetType::FirstArg)
    },
    random(FuncKind::Random, "random", RetType::Fixed(DataType::Double)),
    random(FuncKind::Random, "rand", RetType::Fixed(DataType::Double)),
    random(FuncKind::Uuid, "uuid", RetType::Fixed(DataType::Varchar)),
    random(FuncKind::Shuffle, "shuffle", RetType::FirstArg),
    aggr(FuncKind::Min, "min", RetType::FirstArg),
    aggr(FuncKind::Max, "max", RetType::FirstArg),
    aggr(FuncKind::Sum, "sum", RetType::Sum),
    aggr(FuncKind::Count, "count", RetType::Fixed(DataType::Bigint)),
    aggr(FuncKind::Avg, "avg", RetType::Fixed(DataType::Double)),
];

/// Find function by name, case-insensitive.
#[inline]
pub fn lookup_func(name: &str) -> Option<&'static FuncSpec> {
    FUNCS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

impl FuncKind {
    #[inline]
    pub fn from_name(name: &str) -> Option<Self> {
        lookup_func(name).map(|f| f.kind)
    }
}

/// Unknown functions are treated as deterministic.
#[inline]
pub fn is_deterministic_func(name: &str) -> bool {
    lookup_func(name).map(|f| f.deterministic).unwrap_or(true)
}
