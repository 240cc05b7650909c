//! Individual operator implementations.

pub mod axis_abs;
pub mod extern_call;
pub mod mean_window;
pub mod multiply_add;

pub use axis_abs::AxisAbsOp;
pub use extern_call::ExternOp;
pub use mean_window::MeanWindowOp;
pub use multiply_add::MultiplyAddOp;
