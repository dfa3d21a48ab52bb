//! This module defines the rules that rewrite the logical plan.
//! Predicate pushdown is the main one, the others are building
//! blocks it relies on.
use bitflags::bitflags;

pub mod aggr_pushdown;
pub mod outerjoin_reduce;
pub mod pred_pullup;
pub mod pred_pushdown;

pub use aggr_pushdown::AggrRewrites;
pub use outerjoin_reduce::reduce_join_kind;
pub use pred_pullup::effective_predicate;
pub use pred_pushdown::{pred_pushdown, pred_pushdown_with_rewrites, PushdownOutput};

bitflags! {
    /// Changes made by a rule.
    pub struct RuleEffect: u8 {
        const NONE = 0x00;
        const OP = 0x01; // operator tree changed
        const EXPR = 0x02; // predicate handed to connector
        const OPEXPR = Self::OP.bits | Self::EXPR.bits;
    }
}

/// Options of predicate pushdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushdownConfig {
    /// Maximum depth of plan tree. Deeper plan fails the rewrite.
    pub max_depth: usize,
    /// Whether to negotiate aggregation pushdown with connectors.
    pub aggr_pushdown: bool,
}

impl Default for PushdownConfig {
    fn default() -> Self {
        PushdownConfig {
            max_depth: 1024,
            aggr_pushdown: true,
        }
    }
}

impl PushdownConfig {
    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[inline]
    pub fn with_aggr_pushdown(mut self, aggr_pushdown: bool) -> Self {
        self.aggr_pushdown = aggr_pushdown;
        self
    }
}
