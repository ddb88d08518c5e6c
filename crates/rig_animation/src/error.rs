// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors shared by paths, properties and controllers.

use crate::binding::BindingId;
use crate::boxed::PropertyType;
use crate::property::PropertyId;
use thiserror::Error;

/// Animation errors
#[derive(Debug, Error)]
pub enum AnimationError {
    /// A value's type does not match the property or path it targets
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type of the property or path
        expected: PropertyType,
        /// Type of the offending value
        found: PropertyType,
    },

    /// A node already exists at this time
    #[error("Node already exists at t={0}")]
    NodeExists(f32),

    /// Node time is not a number
    #[error("Invalid node time: {0}")]
    InvalidTime(f32),

    /// Property not found in the store
    #[error("Property not found: {0:?}")]
    PropertyNotFound(PropertyId),

    /// Property is not tracked by the controller
    #[error("Property not controlled: {0:?}")]
    PropertyNotControlled(PropertyId),

    /// Property is owned by a binding and refuses external writes
    #[error("Property is bound: {0:?}")]
    PropertyBound(PropertyId),

    /// Binding expression dependencies form a cycle
    #[error("Binding dependencies contain a cycle")]
    BindingCycle,

    /// Binding expression can't be evaluated with its inputs
    #[error("Binding {0:?} can't be evaluated: {1}")]
    BindingEvaluation(BindingId, String),
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
