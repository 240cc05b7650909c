//! Runtime initialization and module loading.

use crate::error::{Result, RuntimeError};
use crate::executor::Executor;
use quill_core::{CompiledModule, Target, Tensor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Host function callable from `Extern` kernels.
///
/// Receives the kernel inputs in order and returns the output tensor, or a
/// message describing why it could not.
pub type ExternFn = dyn Fn(&[Tensor]) -> std::result::Result<Tensor, String> + Send + Sync;

/// Execution device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
}

impl Device {
    /// Whether modules compiled for `target` can execute on this device.
    pub fn supports(&self, target: &Target) -> bool {
        match self {
            Device::Cpu => target.runs_on_host(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Main entry point for execution.
///
/// Holds the device and the extern functions kernels may call, and creates
/// executors for compiled modules.
///
/// # Example
/// ```
/// # use quill_runtime::Runtime;
/// let mut runtime = Runtime::cpu();
/// runtime
///     .register_extern("host_identity", |args| Ok(args[0].clone()), false)
///     .unwrap();
/// ```
pub struct Runtime {
    device: Device,
    externs: HashMap<String, Arc<ExternFn>>,
}

impl Runtime {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            externs: HashMap::new(),
        }
    }

    /// Runtime for the host CPU.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Register a host function under `name`.
    ///
    /// # Errors
    /// Returns `DuplicateExtern` if `name` is taken and `allow_override` is false.
    pub fn register_extern<F>(
        &mut self,
        name: &str,
        function: F,
        allow_override: bool,
    ) -> Result<()>
    where
        F: Fn(&[Tensor]) -> std::result::Result<Tensor, String> + Send + Sync + 'static,
    {
        if !allow_override && self.externs.contains_key(name) {
            return Err(RuntimeError::DuplicateExtern(name.to_string()));
        }
        if self
            .externs
            .insert(name.to_string(), Arc::new(function))
            .is_some()
        {
            tracing::debug!(name, "overrode extern function");
        }
        Ok(())
    }

    pub fn has_extern(&self, name: &str) -> bool {
        self.externs.contains_key(name)
    }

    /// Load the module's entry function: `"main"`, or its only function.
    ///
    /// # Errors
    /// Returns `UnknownFunction` if there is no entry, plus every error of
    /// [`load_function`](Self::load_function).
    pub fn load(&self, module: Arc<CompiledModule>) -> Result<Executor> {
        let name = module
            .entry()
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| RuntimeError::UnknownFunction(quill_core::IrModule::ENTRY.to_string()))?;
        self.load_function(module, &name)
    }

    /// Load one function of a compiled module into an executor.
    ///
    /// # Errors
    /// - `UnsupportedTarget` if the device cannot run the module's target
    /// - `UnknownFunction` if the module has no function `name`
    /// - `Core(Format)` if the module is internally inconsistent
    /// - `UnresolvedExtern` if a kernel calls an unregistered host function
    pub fn load_function(&self, module: Arc<CompiledModule>, name: &str) -> Result<Executor> {
        if !self.device.supports(&module.target) {
            return Err(RuntimeError::UnsupportedTarget(module.target.to_string()));
        }
        let plan = module
            .function(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?
            .clone();
        module.validate()?;

        let mut externs = HashMap::new();
        for step in &plan.steps {
            let Some(symbol) = module.kernel(&step.kernel).and_then(|k| k.extern_symbol()) else {
                continue;
            };
            let function = self
                .externs
                .get(symbol)
                .ok_or_else(|| RuntimeError::UnresolvedExtern(symbol.to_string()))?;
            externs.insert(symbol.to_string(), Arc::clone(function));
        }

        tracing::debug!(
            module = %module.name,
            function = name,
            device = %self.device,
            steps = plan.steps.len(),
            "loaded function"
        );
        Ok(Executor::new(module, name, plan, externs))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::cpu()
    }
}
