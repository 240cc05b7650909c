//! Slot-based function executor.
//!
//! Executes one compiled function by interpreting its kernel steps in plan
//! order over a slot file.

use crate::error::{Result, RuntimeError};
use crate::interpreter;
use crate::runtime::ExternFn;
use quill_core::{CompiledModule, FunctionPlan, Tensor};
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    /// No inputs bound yet.
    Created,
    /// Some, but not all, inputs bound.
    InputsBound,
    /// Every input bound; `run` may be called.
    Ready,
    Running,
    /// The last run succeeded and its outputs are available.
    Completed,
}

/// Executes one function of a compiled module.
///
/// The executor maintains a slot file of tensors. Constants are written at
/// load time, inputs by `set_input`, and every kernel step reads its input
/// slots and writes its output slot.
///
/// Executors own their storage, so several may run the same
/// `Arc<CompiledModule>` on different threads.
pub struct Executor {
    module: Arc<CompiledModule>,
    function: String,
    plan: FunctionPlan,

    /// Extern functions used by this function's kernels, by symbol.
    externs: HashMap<String, Arc<ExternFn>>,

    /// Slot file indexed by slot number. `None` means not written yet.
    slots: Vec<Option<Tensor>>,
    /// Per parameter: whether it has been bound.
    bound: Vec<bool>,
    outputs: Option<Vec<Tensor>>,
    state: ExecutorState,
}

impl Executor {
    pub(crate) fn new(
        module: Arc<CompiledModule>,
        function: &str,
        plan: FunctionPlan,
        externs: HashMap<String, Arc<ExternFn>>,
    ) -> Self {
        let mut slots = vec![None; plan.num_slots];
        for constant in &plan.constants {
            slots[constant.slot] = Some(constant.value.clone());
        }
        let bound = vec![false; plan.params.len()];

        Self {
            module,
            function: function.to_string(),
            plan,
            externs,
            slots,
            bound,
            outputs: None,
            state: ExecutorState::Created,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn module(&self) -> &Arc<CompiledModule> {
        &self.module
    }

    pub fn function_name(&self) -> &str {
        &self.function
    }

    /// Parameter names in positional order.
    pub fn input_names(&self) -> Vec<&str> {
        self.plan.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn num_outputs(&self) -> usize {
        self.plan.outputs.len()
    }

    /// Bind a tensor to the parameter `name`.
    ///
    /// # Errors
    /// - `UnknownInput` if the function has no such parameter
    /// - `TypeMismatch` if the dtype differs (checked before the shape)
    /// - `ShapeMismatch` if the shape differs
    pub fn set_input(&mut self, name: &str, tensor: Tensor) -> Result<()> {
        let index = self
            .plan
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| RuntimeError::UnknownInput(name.to_string()))?;
        let param = &self.plan.params[index];

        if tensor.dtype() != param.ty.dtype {
            return Err(RuntimeError::TypeMismatch {
                name: name.to_string(),
                expected: param.ty.dtype,
                actual: tensor.dtype(),
            });
        }
        if tensor.shape() != param.ty.shape.as_slice() {
            return Err(RuntimeError::ShapeMismatch {
                name: name.to_string(),
                expected: param.ty.shape.clone(),
                actual: tensor.shape().to_vec(),
            });
        }

        self.slots[param.slot] = Some(tensor);
        self.bound[index] = true;
        self.state = if self.bound.iter().all(|&b| b) {
            ExecutorState::Ready
        } else {
            ExecutorState::InputsBound
        };
        Ok(())
    }

    /// Execute every kernel step of the function.
    ///
    /// Inputs stay bound afterwards, so the function can be re-run or
    /// partially rebound.
    ///
    /// # Errors
    /// Returns `MissingInput` for the first parameter that was never bound,
    /// or the error of the first failing kernel. A failed run leaves no
    /// outputs and the executor `Ready`.
    pub fn run(&mut self) -> Result<()> {
        if let Some(index) = self.bound.iter().position(|&b| !b) {
            return Err(RuntimeError::MissingInput {
                name: self.plan.params[index].name.clone(),
            });
        }

        self.state = ExecutorState::Running;
        self.outputs = None;
        for step in &self.plan.steps {
            self.slots[step.output] = None;
        }

        match self.execute_steps() {
            Ok(outputs) => {
                self.outputs = Some(outputs);
                self.state = ExecutorState::Completed;
                Ok(())
            }
            Err(e) => {
                for step in &self.plan.steps {
                    self.slots[step.output] = None;
                }
                self.state = ExecutorState::Ready;
                Err(e)
            }
        }
    }

    fn execute_steps(&mut self) -> Result<Vec<Tensor>> {
        for (index, step) in self.plan.steps.iter().enumerate() {
            let kernel = self.module.kernel(&step.kernel).ok_or_else(|| RuntimeError::Kernel {
                kernel: step.kernel.clone(),
                message: "kernel is missing from the module".to_string(),
            })?;

            let inputs = step
                .inputs
                .iter()
                .map(|&slot| {
                    self.slots[slot].as_ref().ok_or_else(|| RuntimeError::Kernel {
                        kernel: step.kernel.clone(),
                        message: format!(
                            "slot {slot} is empty when executing step {index}; \
                             the plan has incorrect routing"
                        ),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            tracing::trace!(step = index, kernel = %step.kernel, "executing kernel");
            let output = interpreter::execute(kernel, &inputs, &self.externs)?;
            self.slots[step.output] = Some(output);
        }

        self.plan
            .outputs
            .iter()
            .map(|out| {
                self.slots[out.slot].clone().ok_or_else(|| RuntimeError::Kernel {
                    kernel: self.function.clone(),
                    message: format!("output slot {} was never written", out.slot),
                })
            })
            .collect()
    }

    /// Output `index` of the last completed run.
    ///
    /// # Errors
    /// - `OutputIndexOutOfRange` if `index` is not below the output count
    /// - `NotExecuted` if no run has completed
    pub fn get_output(&self, index: usize) -> Result<&Tensor> {
        let count = self.num_outputs();
        if index >= count {
            return Err(RuntimeError::OutputIndexOutOfRange { index, count });
        }
        self.outputs
            .as_ref()
            .and_then(|outputs| outputs.get(index))
            .ok_or(RuntimeError::NotExecuted)
    }

    /// Bind `args` positionally, run, and return every output.
    pub fn invoke(&mut self, args: &[Tensor]) -> Result<Vec<Tensor>> {
        if args.len() != self.plan.params.len() {
            return Err(RuntimeError::ArgumentCount {
                expected: self.plan.params.len(),
                actual: args.len(),
            });
        }
        let names: Vec<String> = self.plan.params.iter().map(|p| p.name.clone()).collect();
        for (name, arg) in names.iter().zip(args) {
            self.set_input(name, arg.clone())?;
        }
        self.run()?;
        self.outputs.clone().ok_or(RuntimeError::NotExecuted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{
        BinaryOp, DataType, Kernel, KernelBody, KernelStep, OutputSlot, ParamSlot, ScalarExpr,
        Target, TensorType,
    };
    use std::collections::BTreeMap;

    /// `main(a, b) = a + b` over `[2]` f32 tensors.
    fn add_module() -> Arc<CompiledModule> {
        let ty = TensorType::new([2], DataType::F32);
        let kernel = Kernel {
            name: "default_main_fused_add".to_string(),
            body: KernelBody::Elementwise(ScalarExpr::binary(
                BinaryOp::Add,
                ScalarExpr::input(0),
                ScalarExpr::input(1),
            )),
            inputs: vec![ty.clone(), ty.clone()],
            output: ty.clone(),
            ops: vec!["add".to_string()],
            source: None,
        };
        let plan = FunctionPlan {
            params: vec![
                ParamSlot {
                    name: "a".to_string(),
                    ty: ty.clone(),
                    slot: 0,
                },
                ParamSlot {
                    name: "b".to_string(),
                    ty: ty.clone(),
                    slot: 1,
                },
            ],
            constants: vec![],
            steps: vec![KernelStep {
                kernel: kernel.name.clone(),
                inputs: vec![0, 1],
                output: 2,
                deps: vec![],
            }],
            outputs: vec![OutputSlot { slot: 2, ty }],
            num_slots: 3,
        };
        Arc::new(CompiledModule {
            name: "default".to_string(),
            target: Target::host(),
            opt_level: 2,
            kernels: BTreeMap::from([(kernel.name.clone(), kernel)]),
            functions: BTreeMap::from([("main".to_string(), plan)]),
        })
    }

    fn executor() -> Executor {
        let module = add_module();
        let plan = module.functions["main"].clone();
        Executor::new(module, "main", plan, HashMap::new())
    }

    fn vec2(a: f32, b: f32) -> Tensor {
        Tensor::from_vec(vec![a, b], &[2])
    }

    #[test]
    fn test_state_transitions() {
        let mut exec = executor();
        assert_eq!(exec.state(), ExecutorState::Created);

        exec.set_input("a", vec2(1.0, 2.0)).unwrap();
        assert_eq!(exec.state(), ExecutorState::InputsBound);

        exec.set_input("b", vec2(3.0, 4.0)).unwrap();
        assert_eq!(exec.state(), ExecutorState::Ready);

        exec.run().unwrap();
        assert_eq!(exec.state(), ExecutorState::Completed);
        assert_eq!(exec.get_output(0).unwrap().to_vec::<f32>().unwrap(), vec![4.0, 6.0]);

        // rebinding after a run keeps the other inputs
        exec.set_input("a", vec2(10.0, 10.0)).unwrap();
        assert_eq!(exec.state(), ExecutorState::Ready);
        exec.run().unwrap();
        assert_eq!(exec.get_output(0).unwrap().to_vec::<f32>().unwrap(), vec![13.0, 14.0]);
    }

    #[test]
    fn test_dtype_checked_before_shape() {
        let mut exec = executor();
        let err = exec
            .set_input("a", Tensor::from_vec(vec![1i32, 2, 3], &[3]))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));

        let err = exec
            .set_input("a", Tensor::from_vec(vec![1.0f32, 2.0, 3.0], &[3]))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));

        let err = exec.set_input("c", vec2(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownInput(name) if name == "c"));
        assert_eq!(exec.state(), ExecutorState::Created);
    }

    #[test]
    fn test_missing_input() {
        let mut exec = executor();
        exec.set_input("a", vec2(1.0, 1.0)).unwrap();
        let err = exec.run().unwrap_err();
        assert!(matches!(err, RuntimeError::MissingInput { name } if name == "b"));
        assert!(matches!(exec.get_output(0), Err(RuntimeError::NotExecuted)));
    }

    #[test]
    fn test_invoke_checks_argument_count() {
        let mut exec = executor();
        assert!(matches!(
            exec.invoke(&[vec2(1.0, 1.0)]),
            Err(RuntimeError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        ));
        let outputs = exec.invoke(&[vec2(1.0, 2.0), vec2(0.5, 0.5)]).unwrap();
        assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![1.5, 2.5]);
    }
}
