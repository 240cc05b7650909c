//! CPU executor for compiled Quill modules.
//!
//! This crate loads the `CompiledModule`s produced by `quill-compiler` and
//! runs their kernels on the host.
//!
//! # Architecture
//!
//! The runtime manages three main responsibilities:
//! 1. **Loading** - Check the module's target and resolve extern functions
//! 2. **Binding** - Validate and store named inputs in the slot file
//! 3. **Execution** - Interpret kernels in plan order, reading and writing slots
//!
//! # Example
//!
//! ```no_run
//! use quill_runtime::Runtime;
//! use quill_core::{CompiledModule, Tensor};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let module = Arc::new(CompiledModule::load("add.quill")?);
//!
//!     let runtime = Runtime::cpu();
//!     let mut executor = runtime.load(module)?;
//!
//!     executor.set_input("a", Tensor::from_vec(vec![1.0f32, 2.0], &[2]))?;
//!     executor.set_input("b", Tensor::from_vec(vec![3.0f32, 4.0], &[2]))?;
//!     executor.run()?;
//!
//!     let result = executor.get_output(0)?.to_vec::<f32>()?;
//!     println!("Result: {:?}", result);
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod interpreter;
mod runtime;

pub use error::{Result, RuntimeError};
pub use executor::{Executor, ExecutorState};
pub use runtime::{Device, ExternFn, Runtime};

pub use quill_core::Tensor;
