//! Immutable expression IR: variables, constants, calls, functions, and modules.
//!
//! Nodes are reference-counted and never mutated after construction. A node
//! used as the argument of several calls is shared, not copied, so the
//! expression forms a DAG rooted at a function's outputs. Node identity is
//! pointer identity (`ExprId`).

use crate::attrs::Attrs;
use crate::types::{Tensor, TensorType};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct VarNode {
    id: u64,
    name: String,
    ty: TensorType,
}

/// A named, typed placeholder for a function input.
///
/// Two `Var`s are equal only if they come from the same `Var::new` call,
/// even when their names match.
#[derive(Debug, Clone)]
pub struct Var(Arc<VarNode>);

impl Var {
    pub fn new(name: &str, ty: TensorType) -> Self {
        Self(Arc::new(VarNode {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            ty,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ty(&self) -> &TensorType {
        &self.0.ty
    }

    /// Expression node referencing this variable.
    pub fn expr(&self) -> Expr {
        Expr::var(self)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

/// Operator application.
#[derive(Debug)]
pub struct Call {
    pub op: String,
    pub args: Vec<Expr>,
    pub attrs: Attrs,
}

/// The payload of an expression node.
#[derive(Debug)]
pub enum ExprKind {
    Var(Var),
    Constant(Tensor),
    Call(Call),
}

/// Identity of an expression node within a live graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

/// Shared handle to an immutable expression node.
#[derive(Debug, Clone)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    pub fn var(var: &Var) -> Self {
        Self(Arc::new(ExprKind::Var(var.clone())))
    }

    pub fn constant(value: Tensor) -> Self {
        Self(Arc::new(ExprKind::Constant(value)))
    }

    /// Call `op` with no attributes.
    pub fn call(op: &str, args: Vec<Expr>) -> Self {
        Self::call_with_attrs(op, args, Attrs::new())
    }

    pub fn call_with_attrs(op: &str, args: Vec<Expr>, attrs: Attrs) -> Self {
        Self(Arc::new(ExprKind::Call(Call {
            op: op.to_string(),
            args,
            attrs,
        })))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    pub fn id(&self) -> ExprId {
        ExprId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self.kind() {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self.kind() {
            ExprKind::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Arguments of a call; empty for leaves.
    pub fn args(&self) -> &[Expr] {
        match self.kind() {
            ExprKind::Call(call) => &call.args,
            _ => &[],
        }
    }

    /// Whether both handles point at the same node.
    pub fn same_node(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// One-level rendering used in diagnostics, e.g. `add(%a, multiply(..))`.
    pub fn summary(&self) -> String {
        match self.kind() {
            ExprKind::Call(call) => {
                let args: Vec<String> = call.args.iter().map(Expr::short_label).collect();
                if call.attrs.is_empty() {
                    format!("{}({})", call.op, args.join(", "))
                } else {
                    format!("{}({}, {})", call.op, args.join(", "), call.attrs)
                }
            }
            _ => self.short_label(),
        }
    }

    fn short_label(&self) -> String {
        match self.kind() {
            ExprKind::Var(var) => format!("%{}", var.name()),
            ExprKind::Constant(value) => format!("const<{}>", value.tensor_type()),
            ExprKind::Call(call) => format!("{}(..)", call.op),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Var(var) => write!(f, "%{}", var.name()),
            ExprKind::Constant(value) => write!(f, "const<{}>", value.tensor_type()),
            ExprKind::Call(call) => {
                write!(f, "{}(", call.op)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                if !call.attrs.is_empty() {
                    if !call.args.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", call.attrs)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Visit every node reachable from `roots` once, children before parents.
///
/// Roots are visited left to right and arguments in order, so the result
/// is deterministic for a given graph.
pub fn post_order(roots: &[Expr]) -> Vec<Expr> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<(Expr, bool)> = roots.iter().rev().map(|e| (e.clone(), false)).collect();

    while let Some((expr, expanded)) = stack.pop() {
        if expanded {
            order.push(expr);
            continue;
        }
        if !visited.insert(expr.id()) {
            continue;
        }
        stack.push((expr.clone(), true));
        for arg in expr.args().iter().rev() {
            if !visited.contains(&arg.id()) {
                stack.push((arg.clone(), false));
            }
        }
    }

    order
}

/// A function: ordered parameters and one or more output expressions.
#[derive(Debug, Clone)]
pub struct Function {
    params: Vec<Var>,
    outputs: Vec<Expr>,
}

impl Function {
    /// Single-output function.
    pub fn new(params: Vec<Var>, body: Expr) -> Self {
        Self {
            params,
            outputs: vec![body],
        }
    }

    /// Function returning several values, addressed by output index.
    pub fn with_outputs(params: Vec<Var>, outputs: Vec<Expr>) -> Self {
        Self { params, outputs }
    }

    pub fn params(&self) -> &[Var] {
        &self.params
    }

    pub fn outputs(&self) -> &[Expr] {
        &self.outputs
    }

    /// Position of `var` in the parameter list.
    pub fn param_index(&self, var: &Var) -> Option<usize> {
        self.params.iter().position(|p| p == var)
    }

    /// Variables referenced by the body that are not parameters.
    pub fn free_vars(&self) -> Vec<Var> {
        let params: HashSet<&Var> = self.params.iter().collect();
        let mut seen = HashSet::new();
        post_order(&self.outputs)
            .iter()
            .filter_map(|e| e.as_var())
            .filter(|v| !params.contains(v) && seen.insert(v.id()))
            .cloned()
            .collect()
    }

    /// Check the function is closed and well-formed.
    ///
    /// # Errors
    ///
    /// - `UnboundVariable` if the body references a variable that is not a parameter.
    /// - `InvalidGraph` for duplicate parameters, duplicate parameter names, or no outputs.
    pub fn validate(&self) -> Result<()> {
        if self.outputs.is_empty() {
            return Err(Error::InvalidGraph(
                "function has no output expression".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for param in &self.params {
            if !ids.insert(param.id()) {
                return Err(Error::InvalidGraph(format!(
                    "parameter %{} is listed twice",
                    param.name()
                )));
            }
            if !names.insert(param.name()) {
                return Err(Error::InvalidGraph(format!(
                    "two parameters are named %{}",
                    param.name()
                )));
            }
        }

        if let Some(var) = self.free_vars().first() {
            return Err(Error::UnboundVariable {
                name: var.name().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn (")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}: {}", param.name(), param.ty())?;
        }
        write!(f, ") {{ ")?;
        if let [single] = self.outputs.as_slice() {
            write!(f, "{single}")?;
        } else {
            write!(f, "(")?;
            for (i, out) in self.outputs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{out}")?;
            }
            write!(f, ")")?;
        }
        write!(f, " }}")
    }
}

/// Named collection of functions: the unit of compilation.
#[derive(Debug, Clone)]
pub struct IrModule {
    name: String,
    functions: BTreeMap<String, Function>,
}

impl IrModule {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const ENTRY: &'static str = "main";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: BTreeMap::new(),
        }
    }

    /// Module named `"default"` whose `"main"` function is `function`.
    pub fn from_function(function: Function) -> Self {
        let mut module = Self::default();
        module.functions.insert(Self::ENTRY.to_string(), function);
        module
    }

    /// Add a function under `name`.
    ///
    /// Returns an error if the module already has a function with that name.
    pub fn add_function(&mut self, name: &str, function: Function) -> Result<()> {
        if self.functions.contains_key(name) {
            return Err(Error::InvalidGraph(format!(
                "module '{}' already defines function '{name}'",
                self.name
            )));
        }
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Functions in name order.
    pub fn functions(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for IrModule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}
