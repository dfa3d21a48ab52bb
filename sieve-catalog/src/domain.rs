//! Column domains extracted from predicates.
//!
//! A domain restricts values of a single column to one contiguous range
//! and optionally null. Only conjuncts comparing a column with a constant
//! are translated, everything else is left as remaining expression.
use indexmap::IndexMap;
use sieve_datatype::AlignPartialOrd;
use sieve_expr::{extract_conjuncts, CmpKind, Const, Expr, Symbol};
use smol_str::SmolStr;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Unbounded,
    Inclusive(Const),
    Exclusive(Const),
}

impl Bound {
    #[inline]
    fn value(&self) -> Option<&Const> {
        match self {
            Bound::Unbounded => None,
            Bound::Inclusive(c) | Bound::Exclusive(c) => Some(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub low: Bound,
    pub high: Bound,
}

impl Range {
    #[inline]
    pub fn single(v: Const) -> Self {
        Range {
            low: Bound::Inclusive(v.clone()),
            high: Bound::Inclusive(v),
        }
    }

    /// Returns None if bounds are not comparable.
    fn intersect(&self, other: &Range) -> Option<Option<Range>> {
        let low = pick_bound(&self.low, &other.low, Ordering::Greater)?;
        let high = pick_bound(&self.high, &other.high, Ordering::Less)?;
        if let (Some(l), Some(h)) = (low.value(), high.value()) {
            match l.align_partial_cmp(h)? {
                Ordering::Greater => return Some(None),
                Ordering::Equal
                    if matches!(low, Bound::Exclusive(_)) || matches!(high, Bound::Exclusive(_)) =>
                {
                    return Some(None)
                }
                _ => (),
            }
        }
        Some(Some(Range { low, high }))
    }
}

/// Pick the tighter bound. `prefer` is the ordering that makes the
/// first value tighter: greater for low bounds, less for high bounds.
fn pick_bound(b1: &Bound, b2: &Bound, prefer: Ordering) -> Option<Bound> {
    let res = match (b1.value(), b2.value()) {
        (None, _) => b2.clone(),
        (_, None) => b1.clone(),
        (Some(v1), Some(v2)) => match v1.align_partial_cmp(v2)? {
            Ordering::Equal => {
                if matches!(b1, Bound::Exclusive(_)) {
                    b1.clone()
                } else {
                    b2.clone()
                }
            }
            o if o == prefer => b1.clone(),
            _ => b2.clone(),
        },
    };
    Some(res)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSet {
    None,
    All,
    Range(Range),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub values: ValueSet,
    pub null_allowed: bool,
}

impl Domain {
    #[inline]
    pub fn all() -> Self {
        Domain {
            values: ValueSet::All,
            null_allowed: true,
        }
    }

    #[inline]
    pub fn none() -> Self {
        Domain {
            values: ValueSet::None,
            null_allowed: false,
        }
    }

    #[inline]
    pub fn only_null() -> Self {
        Domain {
            values: ValueSet::None,
            null_allowed: true,
        }
    }

    #[inline]
    pub fn not_null() -> Self {
        Domain {
            values: ValueSet::All,
            null_allowed: false,
        }
    }

    #[inline]
    pub fn range(range: Range) -> Self {
        Domain {
            values: ValueSet::Range(range),
            null_allowed: false,
        }
    }

    /// Domain of "column op value". Returns None for operators
    /// that cannot be expressed as single range.
    pub fn from_cmp(kind: CmpKind, v: Const) -> Option<Self> {
        if v.is_null() {
            // comparison with null is never true
            return match kind {
                CmpKind::IsDistinctFrom => Some(Domain::not_null()),
                _ => Some(Domain::none()),
            };
        }
        let range = match kind {
            CmpKind::Equal => Range::single(v),
            CmpKind::Less => Range {
                low: Bound::Unbounded,
                high: Bound::Exclusive(v),
            },
            CmpKind::LessEqual => Range {
                low: Bound::Unbounded,
                high: Bound::Inclusive(v),
            },
            CmpKind::Greater => Range {
                low: Bound::Exclusive(v),
                high: Bound::Unbounded,
            },
            CmpKind::GreaterEqual => Range {
                low: Bound::Inclusive(v),
                high: Bound::Unbounded,
            },
            CmpKind::NotEqual | CmpKind::IsDistinctFrom => return None,
        };
        Some(Domain::range(range))
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.values == ValueSet::None && !self.null_allowed
    }

    #[inline]
    pub fn is_all(&self) -> bool {
        self.values == ValueSet::All && self.null_allowed
    }

    /// Returns None if the two domains hold incomparable values.
    pub fn intersect(&self, other: &Domain) -> Option<Domain> {
        let values = match (&self.values, &other.values) {
            (ValueSet::None, _) | (_, ValueSet::None) => ValueSet::None,
            (ValueSet::All, v) | (v, ValueSet::All) => v.clone(),
            (ValueSet::Range(r1), ValueSet::Range(r2)) => match r1.intersect(r2)? {
                Some(r) => ValueSet::Range(r),
                None => ValueSet::None,
            },
        };
        Some(Domain {
            values,
            null_allowed: self.null_allowed && other.null_allowed,
        })
    }
}

/// Domains of multiple columns, keyed by source column name.
/// `None` means no row can satisfy the restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDomain {
    domains: Option<IndexMap<SmolStr, Domain>>,
}

impl Default for TupleDomain {
    fn default() -> Self {
        TupleDomain::all()
    }
}

impl TupleDomain {
    #[inline]
    pub fn all() -> Self {
        TupleDomain {
            domains: Some(IndexMap::new()),
        }
    }

    #[inline]
    pub fn none() -> Self {
        TupleDomain { domains: None }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.domains.is_none()
    }

    #[inline]
    pub fn is_all(&self) -> bool {
        self.domains.as_ref().map(|ds| ds.is_empty()).unwrap_or_default()
    }

    #[inline]
    pub fn domains(&self) -> Option<&IndexMap<SmolStr, Domain>> {
        self.domains.as_ref()
    }

    #[inline]
    pub fn get(&self, column: &str) -> Option<&Domain> {
        self.domains.as_ref().and_then(|ds| ds.get(column))
    }

    /// Intersect the domain of given column. Returns false without any
    /// change if the domains are incomparable.
    pub fn intersect_column(&mut self, column: SmolStr, domain: Domain) -> bool {
        let ds = match self.domains.as_mut() {
            Some(ds) => ds,
            None => return true,
        };
        let merged = match ds.get(&column) {
            Some(d) => match d.intersect(&domain) {
                Some(m) => m,
                None => return false,
            },
            None => domain,
        };
        if merged.is_none() {
            self.domains = None;
        } else {
            ds.insert(column, merged);
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub tuple_domain: TupleDomain,
    /// Conjuncts not expressed by the tuple domain.
    pub remaining: Expr,
}

/// Translate conjuncts of the predicate into column domains.
/// `column_of` resolves symbol to source column name, symbols not
/// resolved stay in remaining expression.
pub fn extract_tuple_domain<F>(e: &Expr, column_of: F) -> ExtractionResult
where
    F: Fn(&Symbol) -> Option<SmolStr>,
{
    let mut tuple_domain = TupleDomain::all();
    let mut remaining = vec![];
    for c in extract_conjuncts(e) {
        if c.is_false() || c.is_null_const() {
            return ExtractionResult {
                tuple_domain: TupleDomain::none(),
                remaining: Expr::const_bool(true),
            };
        }
        let translated = match conjunct_domain(&c) {
            Some((sym, domain)) => match column_of(sym) {
                Some(col) => tuple_domain.intersect_column(col, domain),
                None => false,
            },
            None => false,
        };
        if !translated {
            remaining.push(c)
        }
        if tuple_domain.is_none() {
            return ExtractionResult {
                tuple_domain,
                remaining: Expr::const_bool(true),
            };
        }
    }
    ExtractionResult {
        tuple_domain,
        remaining: Expr::and(remaining),
    }
}

fn conjunct_domain(e: &Expr) -> Option<(&Symbol, Domain)> {
    match e {
        Expr::Cmp(kind, lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
            (Expr::Col(s), Expr::Const(v)) => Some((s, Domain::from_cmp(*kind, v.clone())?)),
            (Expr::Const(v), Expr::Col(s)) => Some((s, Domain::from_cmp(kind.flip(), v.clone())?)),
            _ => None,
        },
        Expr::IsNull(arg) => arg.as_col().map(|s| (s, Domain::only_null())),
        Expr::Not(arg) => match arg.as_ref() {
            Expr::IsNull(inner) => inner.as_col().map(|s| (s, Domain::not_null())),
            _ => None,
        },
        _ => None,
    }
}
