//! Bridge between `Result` and `ControlFlow`.
//!
//! Expression and plan visitors return `ControlFlow<E>`, so a walk stops
//! at the first failure. Folding and plan printing work with `Result`,
//! and these traits convert at the visitor boundary.
pub use std::ops::ControlFlow;

/// Break the walk with the error.
pub trait Branch<B, C> {
    fn branch(self) -> ControlFlow<B, C>;
}

impl<B, C> Branch<B, C> for Result<C, B> {
    #[inline]
    fn branch(self) -> ControlFlow<B, C> {
        self.map_or_else(ControlFlow::Break, ControlFlow::Continue)
    }
}

/// Outcome of a finished walk as `Result`.
pub trait Unbranch {
    type R;
    fn unbranch(self) -> Self::R;
}

impl<B, C> Unbranch for ControlFlow<B, C> {
    type R = Result<C, B>;
    #[inline]
    fn unbranch(self) -> Self::R {
        match self {
            ControlFlow::Continue(c) => Ok(c),
            ControlFlow::Break(b) => Err(b),
        }
    }
}
