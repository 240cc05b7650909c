//! Compiler pass trait and stage definitions.

use crate::Result;
use crate::ir::IrGraph;
use crate::registry::OperatorRegistry;
use crate::target::Target;

/// Compilation stage for organizing passes.
///
/// Passes are grouped into stages and run in a fixed order. Within each stage,
/// passes run in the order they were registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Check that every node can be lowered for the requested target.
    Legalization,

    /// Graph rewriting that changes kernel boundaries (fusion, etc.).
    Optimization,
}

/// Read-only state shared by all passes of one compilation.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    pub registry: &'a OperatorRegistry,
    pub target: &'a Target,
    pub opt_level: u8,
}

/// Trait for implementing compiler passes.
///
/// A pass is a graph transformation that runs during a specific compilation
/// stage. Passes are standalone objects (not owned by operators) to allow
/// optimizations that span multiple operator types.
///
/// # Return Value
///
/// The `run()` method returns `Ok(true)` if the pass made changes to the
/// graph, or `Ok(false)` if no changes were made.
///
/// # Example
///
/// ```ignore
/// struct CountNodesPass;
///
/// impl Pass for CountNodesPass {
///     fn name(&self) -> &str {
///         "count_nodes"
///     }
///
///     fn stage(&self) -> Stage {
///         Stage::Optimization
///     }
///
///     fn run(&self, graph: &mut IrGraph, _ctx: &PassContext) -> Result<bool> {
///         tracing::info!(nodes = graph.node_count(), "graph size");
///         Ok(false)
///     }
/// }
/// ```
pub trait Pass: Send + Sync {
    /// Get the pass name (used for logging and for disabling the pass).
    fn name(&self) -> &str;

    /// Get the compilation stage this pass belongs to.
    fn stage(&self) -> Stage;

    /// Run the pass on the given graph.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the pass made changes to the graph.
    /// * `Ok(false)` if no changes were made.
    /// * `Err(_)` if the pass encountered an error.
    fn run(&self, graph: &mut IrGraph, ctx: &PassContext) -> Result<bool>;
}
