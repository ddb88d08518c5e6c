// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe animation core for the Rig editor.
//!
//! This crate provides the animated data model:
//! - Boxed property values and their types
//! - Keyframe nodes and interpolation
//! - Ordered keyframe paths
//! - An observable property store with expression bindings
//! - Controllers driving properties from a progress clock
//!
//! ## Architecture
//!
//! Properties live in a single [`PropertyStore`] arena and are referenced
//! by ID. A property is driven by at most one owner at a time, either a
//! [`Controller`] record or an expression [`Binding`]. Controllers map
//! their [`Timeline`] progress onto each path-driven property through
//! [`Path::lerp_property`].

pub mod binding;
pub mod boxed;
pub mod controller;
pub mod error;
pub mod node;
pub mod path;
pub mod property;
pub mod timeline;

pub use binding::{Binding, BindingExpression, BindingGraph, BindingId};
pub use boxed::{AssetId, Boxed, Color, PropertyType, Quaternion};
pub use controller::{
    Controller, ControllerId, ControllerMethod, ControllerOperation, PropData, PropDataSnapshot,
};
pub use error::{AnimationError, Result};
pub use node::Node;
pub use path::{Path, PathChange, PathDirection, PathOperation};
pub use property::{BindingOwner, ObjectId, Property, PropertyId, PropertySpec, PropertyStore};
pub use timeline::Timeline;
