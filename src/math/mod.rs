//! Mathematical utilities: probability arrays, interpolation, least squares.

pub mod interp;
pub mod ols;
pub mod prob;

pub use interp::*;
pub use ols::*;
pub use prob::*;
