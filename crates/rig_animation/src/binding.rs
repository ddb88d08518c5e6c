// SPDX-License-Identifier: MIT OR Apache-2.0
//! Expression bindings between properties.
//!
//! A [`Binding`] recomputes one target property from a list of dependency
//! properties. Active bindings are kept in a [`BindingGraph`] which
//! evaluates them in dependency order, so a binding reading the target of
//! another binding always sees the fresh value.

use crate::boxed::Boxed;
use crate::error::{AnimationError, Result};
use crate::property::{BindingOwner, PropertyId, PropertyStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(pub Uuid);

impl BindingId {
    /// Create a new random binding ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a binding combines its dependencies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BindingExpression {
    /// Copy the single dependency
    Copy,
    /// Multiply the single dependency by a factor
    Scale(f64),
    /// Add a constant to the single dependency
    Offset(f64),
    /// Sum of all dependencies
    Sum,
    /// Product of all dependencies
    Product,
    /// Smallest dependency
    Min,
    /// Largest dependency
    Max,
}

/// A property computed from other properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Binding ID
    pub id: BindingId,
    /// Property written by the binding
    pub target: PropertyId,
    /// Properties read by the binding
    pub dependencies: Vec<PropertyId>,
    /// Combination rule
    pub expression: BindingExpression,
}

impl Binding {
    /// Create a new binding
    pub fn new(target: PropertyId, dependencies: Vec<PropertyId>, expression: BindingExpression) -> Self {
        Self {
            id: BindingId::new(),
            target,
            dependencies,
            expression,
        }
    }

    /// Compute the target value from the current dependency values
    pub fn evaluate(&self, store: &PropertyStore) -> Result<Boxed> {
        let target = store
            .get(self.target)
            .ok_or(AnimationError::PropertyNotFound(self.target))?;
        let target_type = target.property_type();

        // A plain copy between properties of the same type works for any type
        if self.expression == BindingExpression::Copy {
            if let [dependency] = self.dependencies.as_slice() {
                let value = store
                    .box_value(*dependency)
                    .ok_or(AnimationError::PropertyNotFound(*dependency))?;
                if value.property_type() == target_type {
                    return Ok(value);
                }
            }
        }

        let inputs = self
            .dependencies
            .iter()
            .map(|id| {
                let property = store.get(*id).ok_or(AnimationError::PropertyNotFound(*id))?;
                property.value().as_f64().ok_or_else(|| {
                    self.failure(format!("{} input is not numeric", property.spec.name))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let value = match self.expression {
            BindingExpression::Copy => self.single(&inputs)?,
            BindingExpression::Scale(factor) => self.single(&inputs)? * factor,
            BindingExpression::Offset(offset) => self.single(&inputs)? + offset,
            BindingExpression::Sum => inputs.iter().sum(),
            BindingExpression::Product => inputs.iter().product(),
            BindingExpression::Min => inputs
                .iter()
                .copied()
                .reduce(f64::min)
                .ok_or_else(|| self.failure("no inputs".to_owned()))?,
            BindingExpression::Max => inputs
                .iter()
                .copied()
                .reduce(f64::max)
                .ok_or_else(|| self.failure("no inputs".to_owned()))?,
        };

        Boxed::from_f64(target_type, value)
            .ok_or_else(|| self.failure(format!("can't produce a {target_type} value")))
    }

    fn single(&self, inputs: &[f64]) -> Result<f64> {
        match inputs {
            [value] => Ok(*value),
            _ => Err(self.failure(format!("expected 1 input, got {}", inputs.len()))),
        }
    }

    fn failure(&self, reason: String) -> AnimationError {
        AnimationError::BindingEvaluation(self.id, reason)
    }
}

/// The set of active expression bindings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingGraph {
    bindings: IndexMap<BindingId, Binding>,
}

impl BindingGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a binding, taking ownership of its target property.
    ///
    /// Fails if the target is already bound or the binding would close a
    /// dependency cycle.
    pub fn add(&mut self, store: &mut PropertyStore, binding: Binding) -> Result<BindingId> {
        let id = binding.id;
        store.set_binding(binding.target, BindingOwner::Expression(id))?;
        self.bindings.insert(id, binding);

        if let Err(err) = self.topological_order() {
            self.remove(store, id);
            return Err(err);
        }

        tracing::debug!("Activated binding {:?}", id);
        Ok(id)
    }

    /// Deactivate a binding, releasing its target property
    pub fn remove(&mut self, store: &mut PropertyStore, id: BindingId) -> Option<Binding> {
        let binding = self.bindings.shift_remove(&id)?;
        if store.binding_owner(binding.target) == Some(BindingOwner::Expression(id)) {
            store.remove_binding(binding.target);
        }
        Some(binding)
    }

    /// Get a binding
    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    /// Iterate over active bindings
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Get the number of active bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if there are no active bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Get bindings in evaluation order
    pub fn topological_order(&self) -> Result<Vec<BindingId>> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for id in self.bindings.keys() {
            if !visited.contains(id) {
                self.visit(*id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: BindingId,
        visited: &mut HashSet<BindingId>,
        temp_mark: &mut HashSet<BindingId>,
        order: &mut Vec<BindingId>,
    ) -> Result<()> {
        if temp_mark.contains(&id) {
            return Err(AnimationError::BindingCycle);
        }
        if visited.contains(&id) {
            return Ok(());
        }

        temp_mark.insert(id);

        // Visit every binding writing one of our inputs first
        if let Some(binding) = self.bindings.get(&id) {
            for other in self.bindings.values() {
                if binding.dependencies.contains(&other.target) {
                    self.visit(other.id, visited, temp_mark, order)?;
                }
            }
        }

        temp_mark.remove(&id);
        visited.insert(id);
        order.push(id);

        Ok(())
    }

    /// Re-evaluate every binding in dependency order
    pub fn evaluate(&self, store: &mut PropertyStore) -> Result<()> {
        for id in self.topological_order()? {
            if let Some(binding) = self.bindings.get(&id) {
                let value = binding.evaluate(store)?;
                store.assert_value(binding.target, value)?;
            }
        }
        Ok(())
    }
}
