//! Compiled modules and their on-disk artifact format.
//!
//! A `CompiledModule` is the output of compilation: a set of named kernels
//! plus one execution plan per source function. It is read-only once built
//! and can be shared by any number of executors.
//!
//! Artifact layout: 8-byte magic, little-endian `u32` format version, then the
//! bincode-encoded module.

use crate::kernel::Kernel;
use crate::target::Target;
use crate::types::{Tensor, TensorType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Leading bytes of every artifact.
pub const ARTIFACT_MAGIC: &[u8; 8] = b"QUILLMOD";

/// Current artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

/// A function parameter and the storage slot it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSlot {
    pub name: String,
    pub ty: TensorType,
    pub slot: usize,
}

/// A constant preloaded into a storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantSlot {
    pub slot: usize,
    pub value: Tensor,
}

/// One kernel launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelStep {
    pub kernel: String,
    /// Slots read, in kernel input order.
    pub inputs: Vec<usize>,
    pub output: usize,
    /// Indices of earlier steps this step reads from.
    pub deps: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub slot: usize,
    pub ty: TensorType,
}

/// Execution plan for one function: slot layout and kernel order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPlan {
    pub params: Vec<ParamSlot>,
    pub constants: Vec<ConstantSlot>,
    /// Steps in execution order. Every step comes after its dependencies.
    pub steps: Vec<KernelStep>,
    pub outputs: Vec<OutputSlot>,
    pub num_slots: usize,
}

impl FunctionPlan {
    pub fn param(&self, name: &str) -> Option<&ParamSlot> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check that every slot is written once before it is read, and that
    /// each kernel agrees with the types of the slots it is wired to.
    fn validate(&self, function: &str, kernels: &BTreeMap<String, Kernel>) -> Result<()> {
        let fail = |message: String| Error::Format(format!("function '{function}': {message}"));
        let constant_types: Vec<TensorType> =
            self.constants.iter().map(|c| c.value.tensor_type()).collect();
        let mut slot_types: Vec<Option<&TensorType>> = vec![None; self.num_slots];

        for param in &self.params {
            define_slot(&mut slot_types, param.slot, &param.ty).map_err(fail)?;
        }
        for (constant, ty) in self.constants.iter().zip(&constant_types) {
            define_slot(&mut slot_types, constant.slot, ty).map_err(fail)?;
        }

        for (index, step) in self.steps.iter().enumerate() {
            let kernel = kernels
                .get(&step.kernel)
                .ok_or_else(|| fail(format!("calls missing kernel '{}'", step.kernel)))?;
            kernel.validate()?;
            if kernel.inputs.len() != step.inputs.len() {
                return Err(fail(format!(
                    "kernel '{}' takes {} inputs, step passes {}",
                    step.kernel,
                    kernel.inputs.len(),
                    step.inputs.len()
                )));
            }
            if let Some(&dep) = step.deps.iter().find(|&&d| d >= index) {
                return Err(fail(format!("step {index} depends on later step {dep}")));
            }
            for (&slot, expected) in step.inputs.iter().zip(&kernel.inputs) {
                match slot_types.get(slot).copied().flatten() {
                    Some(actual) if actual == expected => {}
                    Some(actual) => {
                        return Err(fail(format!(
                            "kernel '{}' expects {expected}, slot {slot} holds {actual}",
                            step.kernel
                        )));
                    }
                    None => {
                        return Err(fail(format!(
                            "step {index} reads slot {slot} before it is written"
                        )));
                    }
                }
            }
            define_slot(&mut slot_types, step.output, &kernel.output).map_err(fail)?;
        }

        for output in &self.outputs {
            match slot_types.get(output.slot).copied().flatten() {
                Some(actual) if *actual == output.ty => {}
                _ => {
                    return Err(fail(format!(
                        "output slot {} does not hold {}",
                        output.slot, output.ty
                    )));
                }
            }
        }
        Ok(())
    }
}

fn define_slot<'a>(
    slots: &mut [Option<&'a TensorType>],
    slot: usize,
    ty: &'a TensorType,
) -> std::result::Result<(), String> {
    let count = slots.len();
    match slots.get_mut(slot) {
        None => Err(format!("slot {slot} is outside {count} slots")),
        Some(Some(_)) => Err(format!("slot {slot} is written more than once")),
        Some(entry) => {
            *entry = Some(ty);
            Ok(())
        }
    }
}

/// Result of compiling an `IrModule` for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModule {
    pub name: String,
    pub target: Target,
    pub opt_level: u8,
    pub kernels: BTreeMap<String, Kernel>,
    pub functions: BTreeMap<String, FunctionPlan>,
}

impl CompiledModule {
    pub fn kernel(&self, name: &str) -> Option<&Kernel> {
        self.kernels.get(name)
    }

    /// Kernel names in sorted order.
    pub fn kernel_names(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(|s| s.as_str())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionPlan> {
        self.functions.get(name)
    }

    /// The entry function: `"main"` if present, otherwise the only function.
    pub fn entry(&self) -> Option<(&str, &FunctionPlan)> {
        if let Some((name, plan)) = self.functions.get_key_value(crate::IrModule::ENTRY) {
            return Some((name.as_str(), plan));
        }
        match self.functions.len() {
            1 => self.functions.iter().next().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        }
    }

    /// Kernel names a function executes, in execution order.
    pub fn kernels_for(&self, function: &str) -> Vec<&str> {
        self.functions
            .get(function)
            .map(|plan| plan.steps.iter().map(|s| s.kernel.as_str()).collect())
            .unwrap_or_default()
    }

    /// Check internal consistency: every kernel body matches its declared
    /// types, and every plan wires kernels to slots of matching types.
    pub fn validate(&self) -> Result<()> {
        for (name, kernel) in &self.kernels {
            if &kernel.name != name {
                return Err(Error::Format(format!(
                    "kernel '{}' is stored under '{name}'",
                    kernel.name
                )));
            }
            kernel.validate()?;
        }
        for (name, plan) in &self.functions {
            plan.validate(name, &self.kernels)?;
        }
        Ok(())
    }

    /// Encode the module as an artifact.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)
            .map_err(|e| Error::Format(format!("failed to encode module: {e}")))?;
        let mut bytes = Vec::with_capacity(ARTIFACT_MAGIC.len() + 4 + payload.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode an artifact produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns `Format` for a wrong magic, an unsupported version, an
    /// undecodable payload, or an internally inconsistent module.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header_len = ARTIFACT_MAGIC.len() + 4;
        if bytes.len() < header_len || &bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
            return Err(Error::Format("not a compiled module artifact".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[ARTIFACT_MAGIC.len()..header_len]);
        let version = u32::from_le_bytes(version);
        if version != ARTIFACT_VERSION {
            return Err(Error::Format(format!(
                "unsupported artifact version {version} (expected {ARTIFACT_VERSION})"
            )));
        }

        let module: CompiledModule = bincode::deserialize(&bytes[header_len..])
            .map_err(|e| Error::Format(format!("failed to decode module: {e}")))?;
        module.validate()?;
        Ok(module)
    }

    /// Write the module artifact to `path`.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            kernels = self.kernels.len(),
            "exported compiled module"
        );
        Ok(())
    }

    /// Read a module artifact from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let module = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            module = %module.name,
            kernels = module.kernels.len(),
            "loaded compiled module"
        );
        Ok(module)
    }
}
