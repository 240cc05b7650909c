//! Operator families sharing one implementation.
//!
//! Each family is parameterized only by the scalar operation it applies.

pub mod binary;
pub mod unary;

pub use binary::BinaryElementwiseOp;
pub use unary::UnaryElementwiseOp;
