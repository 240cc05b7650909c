//! Compiler passes that run on the dataflow graph before lowering.

mod fusion;
mod legalization;

pub use fusion::FusionPass;
pub use legalization::TargetLegalizationPass;
