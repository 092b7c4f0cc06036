//! Integer math used on the sampling and control path.

pub mod fixed;
pub mod logexp;

pub use fixed::Fixed;
pub use logexp::{log2_approx, pow2_approx};
