pub mod controlflow;
pub mod equality;
pub mod error;
pub mod expr;
pub mod fold;
pub mod func;
pub mod infer;
pub mod util;

pub use crate::equality::*;
pub use crate::expr::*;
pub use crate::func::*;
pub use crate::infer::*;
pub use crate::util::*;
