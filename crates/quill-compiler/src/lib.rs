//! Module compiler for Quill.
//!
//! This crate takes an `IrModule` of typed expression functions and compiles
//! it into a `CompiledModule` of kernels plus one execution plan per function,
//! which `quill-runtime` can execute.
//!
//! Every function goes through the same pipeline:
//! 1. **Inference** - Validate the function and infer a type for every call
//! 2. **Graph build** - Convert the reachable expressions into an `IrGraph`
//! 3. **Legalization** - Check every operator supports the target
//! 4. **Optimization** - Fuse elementwise chains (opt level 1 and above)
//! 5. **Lowering** - Emit one kernel per fusion group and schedule them
//!
//! # Example
//!
//! ```no_run
//! use quill_compiler::compile;
//! use quill_core::{DataType, Expr, Function, IrModule, OperatorRegistry, Target, TensorType, Var};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = OperatorRegistry::new();
//! let ty = TensorType::new([2, 2], DataType::F32);
//! let (a, b) = (Var::new("a", ty.clone()), Var::new("b", ty));
//! let body = Expr::call("add", vec![a.expr(), b.expr()]);
//! let module = IrModule::from_function(Function::new(vec![a, b], body));
//!
//! let compiled = compile(&module, &Target::host(), 2, &registry)?;
//! println!("Compiled {} kernels", compiled.kernels.len());
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod graph_builder;
pub mod inference;
mod lowering;
pub mod passes;
pub mod scheduler;

pub use graph_builder::build_graph;
pub use inference::{TypeMap, infer_function, infer_module};
pub use passes::{FusionPass, TargetLegalizationPass};
pub use scheduler::Scheduler;

pub use quill_core::{CompiledModule, IrGraph, Pass, Stage};

use lowering::KernelNamer;
use quill_core::{Error, IrModule, OperatorRegistry, PassContext, Result, Target};
use std::collections::BTreeMap;

/// Default optimization level.
pub const DEFAULT_OPT_LEVEL: u8 = 2;

/// Options controlling a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// 0 disables fusion; 1 and above enable it.
    pub opt_level: u8,
    /// Names of passes to skip.
    pub disabled_passes: Vec<String>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opt_level(mut self, opt_level: u8) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn disable_pass(mut self, name: &str) -> Self {
        self.disabled_passes.push(name.to_string());
        self
    }

    fn is_disabled(&self, name: &str) -> bool {
        self.disabled_passes.iter().any(|p| p == name)
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: DEFAULT_OPT_LEVEL,
            disabled_passes: Vec::new(),
        }
    }
}

/// Compiler pipeline with pluggable passes.
///
/// Built-in passes are `TargetLegalizationPass` (Legalization stage) and
/// `FusionPass` (Optimization stage). Custom passes can be added via
/// `add_pass()`; within a stage, passes run in registration order.
pub struct CompilerPipeline {
    /// All passes to run, ordered by (stage, registration order).
    passes: Vec<Box<dyn Pass>>,
    options: CompileOptions,
}

impl CompilerPipeline {
    /// Create a pipeline with the built-in passes.
    pub fn new(options: CompileOptions) -> Self {
        let mut pipeline = Self {
            passes: Vec::new(),
            options,
        };
        pipeline.add_pass(TargetLegalizationPass::new());
        pipeline.add_pass(FusionPass::new());
        pipeline
    }

    /// Add a custom pass to the pipeline.
    ///
    /// The pass is inserted into the stage reported by `pass.stage()`.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile every function of `module` for `target`.
    ///
    /// All functions are validated and type-checked before any lowering, so
    /// a failure anywhere produces no artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The module has no functions
    /// - Any function fails validation or type inference
    /// - Any operator cannot be lowered for the target
    /// - Any pass fails
    #[tracing::instrument(
        skip_all,
        fields(module = module.name(), target = %target, opt_level = self.options.opt_level)
    )]
    pub fn compile(
        &mut self,
        module: &IrModule,
        target: &Target,
        registry: &OperatorRegistry,
    ) -> Result<CompiledModule> {
        if module.is_empty() {
            return Err(Error::InvalidGraph(format!(
                "module '{}' has no functions",
                module.name()
            )));
        }

        // Stable sort keeps registration order within a stage.
        self.passes.sort_by_key(|p| p.stage());

        let types = infer_module(module, registry)?;

        let ctx = PassContext {
            registry,
            target,
            opt_level: self.options.opt_level,
        };
        let mut namer = KernelNamer::default();
        let mut kernels = BTreeMap::new();
        let mut functions = BTreeMap::new();

        for (name, function) in module.functions() {
            let function_types = types.get(name).ok_or_else(|| {
                Error::InvalidGraph(format!("function '{name}' was not type-checked"))
            })?;
            let mut graph = build_graph(function, function_types, registry)?;

            for pass in &self.passes {
                if self.options.is_disabled(pass.name()) {
                    tracing::debug!(pass = pass.name(), "skipping disabled pass");
                    continue;
                }
                let _span =
                    tracing::debug_span!("pass", name = pass.name(), stage = ?pass.stage())
                        .entered();
                let changed = pass.run(&mut graph, &ctx)?;
                tracing::trace!(changed, "pass finished");
            }

            let lowered = lowering::lower_function(module.name(), name, &graph, &ctx, &mut namer)?;
            tracing::debug!(
                function = name,
                kernels = lowered.kernels.len(),
                "lowered function"
            );
            for kernel in lowered.kernels {
                kernels.insert(kernel.name.clone(), kernel);
            }
            functions.insert(name.to_string(), lowered.plan);
        }

        let compiled = CompiledModule {
            name: module.name().to_string(),
            target: target.clone(),
            opt_level: self.options.opt_level,
            kernels,
            functions,
        };
        compiled.validate()?;

        tracing::info!(
            module = %compiled.name,
            kernels = compiled.kernels.len(),
            functions = compiled.functions.len(),
            "compiled module"
        );
        Ok(compiled)
    }
}

impl Default for CompilerPipeline {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

/// Compile `module` for `target` with the built-in passes.
///
/// Convenience wrapper around `CompilerPipeline`.
pub fn compile(
    module: &IrModule,
    target: &Target,
    opt_level: u8,
    registry: &OperatorRegistry,
) -> Result<CompiledModule> {
    let options = CompileOptions::default().with_opt_level(opt_level);
    CompilerPipeline::new(options).compile(module, target, registry)
}
