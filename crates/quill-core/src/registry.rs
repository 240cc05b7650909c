//! Operator registry for name-based lookup.

use crate::operator::Operator;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for operator implementations.
///
/// Maps operator names (e.g., "add", "mean_window") to their `Operator`
/// implementations. Registration needs `&mut self` and normally happens once
/// at startup; lookups only need `&self`, so a populated registry can be
/// shared across threads behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// let mut registry = OperatorRegistry::new();
/// registry
///     .register(BinaryElementwiseOp::add())?
///     .register(MeanWindowOp)?;
///
/// let op = registry.lookup("add")?;
/// ```
pub struct OperatorRegistry {
    /// Map from operator name to implementation.
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorRegistry {
    /// Create a new empty operator registry.
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register an operator under its own name.
    ///
    /// Returns `self` for method chaining.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateOperator` if the name is already taken. Use
    /// [`register_override`](Self::register_override) to replace an entry.
    pub fn register<O>(&mut self, operator: O) -> Result<&mut Self>
    where
        O: Operator + 'static,
    {
        self.register_arc(Arc::new(operator))
    }

    /// Register an already shared operator.
    pub fn register_arc(&mut self, operator: Arc<dyn Operator>) -> Result<&mut Self> {
        let name = operator.name().to_string();
        if self.operators.contains_key(&name) {
            return Err(Error::DuplicateOperator(name));
        }
        tracing::trace!(operator = %name, "registered operator");
        self.operators.insert(name, operator);
        Ok(self)
    }

    /// Register an operator, replacing any existing entry with the same name.
    ///
    /// Returns the previous implementation, if there was one.
    pub fn register_override<O>(&mut self, operator: O) -> Option<Arc<dyn Operator>>
    where
        O: Operator + 'static,
    {
        let name = operator.name().to_string();
        let previous = self.operators.insert(name.clone(), Arc::new(operator));
        if previous.is_some() {
            tracing::debug!(operator = %name, "overrode operator");
        }
        previous
    }

    /// Look up an operator by name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperator` if no operator is registered with the given name.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Operator>> {
        self.operators
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    /// Look up an operator by name without cloning the handle.
    pub fn get(&self, name: &str) -> Option<&dyn Operator> {
        self.operators.get(name).map(|op| op.as_ref())
    }

    /// Check if an operator is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Get the number of registered operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Iterate over all registered operator names.
    pub fn operator_names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(|s| s.as_str())
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
