// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observable property store.
//!
//! Every animatable property lives in a single [`PropertyStore`] arena and
//! is addressed by [`PropertyId`]. A property may be owned by one binding
//! at a time: a controller asserting a constant or a path, or an
//! expression [`Binding`](crate::binding::Binding). External writes to an
//! owned property are refused. Writes that change a value push the
//! property onto a dirty queue drained by [`PropertyStore::take_dirty`].

use crate::binding::BindingId;
use crate::boxed::{Boxed, PropertyType};
use crate::controller::ControllerId;
use crate::error::{AnimationError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an object that owns properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Create a new random object ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub Uuid);

impl PropertyId {
    /// Create a new random property ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PropertyId {
    fn default() -> Self {
        Self::new()
    }
}

/// Static description of a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Property name, unique per owner
    pub name: String,
    /// Value type
    pub property_type: PropertyType,
    /// Whether controllers may animate it
    pub animatable: bool,
}

impl PropertySpec {
    /// Describe an animatable property
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            animatable: true,
        }
    }

    /// Mark the property as not animatable
    pub fn fixed(mut self) -> Self {
        self.animatable = false;
        self
    }
}

/// Whatever currently drives a property's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingOwner {
    /// A controller holding a constant value
    ControllerConstant(ControllerId),
    /// A controller following a path with its progress
    ControllerPath(ControllerId),
    /// An expression binding
    Expression(BindingId),
}

/// A property instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property ID
    pub id: PropertyId,
    /// Object the property belongs to
    pub owner: ObjectId,
    /// Static description
    pub spec: PropertySpec,
    /// Current value
    value: Boxed,
    /// Current driver, if any
    binding: Option<BindingOwner>,
}

impl Property {
    /// Get the current value
    pub fn value(&self) -> &Boxed {
        &self.value
    }

    /// Get the value type
    pub fn property_type(&self) -> PropertyType {
        self.spec.property_type
    }

    /// Get the current driver
    pub fn binding(&self) -> Option<BindingOwner> {
        self.binding
    }
}

/// Arena of all properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyStore {
    properties: IndexMap<PropertyId, Property>,
    #[serde(skip)]
    dirty: IndexSet<PropertyId>,
}

impl PropertyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property for `owner` with an initial value
    pub fn add(&mut self, owner: ObjectId, spec: PropertySpec, initial: Boxed) -> Result<PropertyId> {
        check_type(spec.property_type, &initial)?;

        let id = PropertyId::new();
        self.properties.insert(
            id,
            Property {
                id,
                owner,
                spec,
                value: initial,
                binding: None,
            },
        );
        Ok(id)
    }

    /// Get a property
    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(&id)
    }

    /// Get the number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Copy out the current value of a property
    pub fn box_value(&self, id: PropertyId) -> Option<Boxed> {
        self.properties.get(&id).map(|p| p.value.clone())
    }

    /// Write a value from outside any binding.
    ///
    /// Refused while a binding owns the property.
    pub fn set(&mut self, id: PropertyId, value: Boxed) -> Result<()> {
        let property = self
            .properties
            .get(&id)
            .ok_or(AnimationError::PropertyNotFound(id))?;

        if property.binding.is_some() {
            return Err(AnimationError::PropertyBound(id));
        }

        self.write(id, value)
    }

    /// Write a value on behalf of the binding that owns the property
    pub fn assert_value(&mut self, id: PropertyId, value: Boxed) -> Result<()> {
        self.write(id, value)
    }

    fn write(&mut self, id: PropertyId, value: Boxed) -> Result<()> {
        let property = self
            .properties
            .get_mut(&id)
            .ok_or(AnimationError::PropertyNotFound(id))?;
        check_type(property.spec.property_type, &value)?;

        if property.value != value {
            property.value = value;
            self.dirty.insert(id);
        }
        Ok(())
    }

    /// Attach a driver to a property
    pub fn set_binding(&mut self, id: PropertyId, owner: BindingOwner) -> Result<()> {
        let property = self
            .properties
            .get_mut(&id)
            .ok_or(AnimationError::PropertyNotFound(id))?;

        if property.binding.is_some() {
            return Err(AnimationError::PropertyBound(id));
        }
        property.binding = Some(owner);
        Ok(())
    }

    /// Detach the driver of a property, returning it
    pub fn remove_binding(&mut self, id: PropertyId) -> Option<BindingOwner> {
        self.properties.get_mut(&id)?.binding.take()
    }

    /// Get the driver of a property
    pub fn binding_owner(&self, id: PropertyId) -> Option<BindingOwner> {
        self.properties.get(&id)?.binding
    }

    /// Find a property of `owner` by name
    pub fn lookup(&self, owner: ObjectId, name: &str) -> Option<PropertyId> {
        self.properties
            .values()
            .find(|p| p.owner == owner && p.spec.name == name)
            .map(|p| p.id)
    }

    /// Iterate over the properties of an object
    pub fn properties_of(&self, owner: ObjectId) -> impl Iterator<Item = &Property> {
        self.properties.values().filter(move |p| p.owner == owner)
    }

    /// Take the properties whose value changed since the last call
    pub fn take_dirty(&mut self) -> Vec<PropertyId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}

fn check_type(expected: PropertyType, value: &Boxed) -> Result<()> {
    let found = value.property_type();
    if found != expected {
        return Err(AnimationError::TypeMismatch { expected, found });
    }
    Ok(())
}
