// SPDX-License-Identifier: MIT OR Apache-2.0
//! Controllers.
//!
//! A [`Controller`] owns a [`Timeline`] and a set of property records. Each
//! record decides how its property is driven while the controller is
//! effectively active (active and not suspended): held at a constant,
//! following a keyframe [`Path`] with the timeline's progress, or computed
//! by an expression [`Binding`].
//!
//! Path node times are normalized to the controller length. Inserting a
//! node past the end grows the length and re-expresses every existing
//! node relative to the new length so absolute times are preserved.

use crate::binding::Binding;
use crate::boxed::{Boxed, PropertyType};
use crate::error::{AnimationError, Result};
use crate::node::Node;
use crate::path::{Path, PathChange, PathDirection};
use crate::property::{BindingOwner, ObjectId, PropertyId, PropertyStore};
use crate::timeline::Timeline;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    /// Create a new random controller ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a controlled property gets its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerMethod {
    /// Hold a constant value
    #[default]
    Constant,
    /// Follow a keyframe path
    Path,
    /// Evaluate an expression binding
    Binding,
}

impl ControllerMethod {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Path => "path",
            Self::Binding => "binding",
        }
    }
}

/// Per-property record held by a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropData {
    /// The controlled property
    pub property: PropertyId,
    /// Type of the controlled property
    pub property_type: PropertyType,
    /// Active method
    pub method: ControllerMethod,
    /// Keyframes, created on first use
    pub path: Option<Path>,
    /// Value asserted by the constant method
    pub constant_value: Boxed,
    /// Expression used by the binding method
    pub binding: Option<Binding>,
    /// Whether this record currently drives its property
    #[serde(skip)]
    pub active: bool,
}

impl PropData {
    /// Deep copy of everything needed to recreate this record
    pub fn snapshot(&self) -> PropDataSnapshot {
        PropDataSnapshot {
            property: self.property,
            method: self.method,
            path: self.path.clone(),
            constant_value: self.constant_value.clone(),
            binding: self.binding.clone(),
        }
    }
}

/// Saved state of a property record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropDataSnapshot {
    /// The controlled property
    pub property: PropertyId,
    /// Method at the time of the snapshot
    pub method: ControllerMethod,
    /// Keyframes at the time of the snapshot
    pub path: Option<Path>,
    /// Constant at the time of the snapshot
    pub constant_value: Boxed,
    /// Binding at the time of the snapshot
    pub binding: Option<Binding>,
}

/// Change to a controller's set of property records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerOperation {
    /// A property started being controlled
    Added(PropertyId),
    /// A property stopped being controlled
    Removed(PropertyId),
    /// A property's method changed
    MethodChanged(PropertyId),
}

/// Drives a set of properties from a shared progress clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
    /// Controller ID
    pub id: ControllerId,
    /// Display label
    label: String,
    /// Requested activity
    active: bool,
    /// Editor override forcing the controller off
    suspended: bool,
    /// Deactivate once progress reaches the end
    auto_deactivate: bool,
    /// Progress clock
    timeline: Timeline,
    /// Property records in insertion order
    properties: IndexMap<PropertyId, PropData>,
    /// Notifications not yet collected
    #[serde(skip)]
    operations: Vec<ControllerOperation>,
}

impl Controller {
    /// Create an inactive controller with zero length
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: ControllerId::new(),
            label: label.into(),
            active: false,
            suspended: false,
            auto_deactivate: false,
            timeline: Timeline::default(),
            properties: IndexMap::new(),
            operations: Vec::new(),
        }
    }

    /// Get the label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Set the label
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Get the progress clock
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Check the requested activity
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Check the editor override
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the controller currently drives its properties
    pub fn effective_active(&self) -> bool {
        self.active && !self.suspended
    }

    /// Request activation or deactivation
    pub fn set_active(&mut self, store: &mut PropertyStore, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        self.update_effective_active_state(store);
    }

    /// Suspend or resume without touching the requested activity
    pub fn set_suspended(&mut self, store: &mut PropertyStore, suspended: bool) {
        if self.suspended == suspended {
            return;
        }
        self.suspended = suspended;
        self.update_effective_active_state(store);
    }

    fn update_effective_active_state(&mut self, store: &mut PropertyStore) {
        let effective = self.effective_active();
        tracing::debug!(
            "Controller \"{}\" {}",
            self.label,
            if effective { "activated" } else { "deactivated" }
        );

        let (id, progress, direction) = (self.id, self.timeline.progress(), self.timeline.direction());
        for prop in self.properties.values_mut() {
            if effective {
                if !prop.active {
                    activate_property(id, progress, direction, prop, store);
                }
            } else {
                deactivate_property(id, prop, store);
            }
        }
    }

    /// Check auto deactivation
    pub fn auto_deactivate(&self) -> bool {
        self.auto_deactivate
    }

    /// Enable or disable auto deactivation
    pub fn set_auto_deactivate(&mut self, auto_deactivate: bool) {
        self.auto_deactivate = auto_deactivate;
    }

    /// Check if the timeline loops
    pub fn is_looping(&self) -> bool {
        self.timeline.is_looping()
    }

    /// Enable or disable looping
    pub fn set_loop(&mut self, loop_enabled: bool) {
        self.timeline.set_loop(loop_enabled);
    }

    /// Check if the timeline is running
    pub fn is_running(&self) -> bool {
        self.timeline.is_running()
    }

    /// Start or stop the timeline
    pub fn set_running(&mut self, running: bool) {
        self.timeline.set_running(running);
    }

    /// Set the playback direction
    pub fn set_direction(&mut self, direction: PathDirection) {
        self.timeline.set_direction(direction);
    }

    /// Get the length in seconds
    pub fn length(&self) -> f32 {
        self.timeline.length()
    }

    /// Set the length without moving any node
    pub fn set_length(&mut self, store: &mut PropertyStore, length: f32) {
        if self.timeline.length() == length {
            return;
        }
        self.timeline.set_length(length);
        self.apply_progress(store);
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> f64 {
        self.timeline.elapsed()
    }

    /// Move to an elapsed time
    pub fn set_elapsed(&mut self, store: &mut PropertyStore, elapsed: f64) {
        if self.timeline.set_elapsed(elapsed) {
            self.apply_progress(store);
        }
    }

    /// Get the progress through the length
    pub fn progress(&self) -> f64 {
        self.timeline.progress()
    }

    /// Move to a fraction of the length
    pub fn set_progress(&mut self, store: &mut PropertyStore, progress: f64) {
        if self.timeline.set_progress(progress) {
            self.apply_progress(store);
        }
    }

    /// Advance a running controller by `delta` seconds
    pub fn advance(&mut self, store: &mut PropertyStore, delta: f64) {
        if self.timeline.advance(delta) {
            self.apply_progress(store);
        }
    }

    /// Re-assert every active path-driven property at the current progress
    pub fn apply_progress(&mut self, store: &mut PropertyStore) {
        if !self.effective_active() {
            return;
        }

        let (progress, direction) = (self.timeline.progress(), self.timeline.direction());
        for prop in self.properties.values() {
            if prop.active && prop.method == ControllerMethod::Path {
                assert_path_value(prop, progress, direction, store);
            }
        }

        if self.auto_deactivate && progress >= 1.0 {
            self.set_active(store, false);
        }
    }

    /// Re-evaluate every active binding-driven property
    pub fn evaluate_bindings(&self, store: &mut PropertyStore) -> Result<()> {
        if !self.effective_active() {
            return Ok(());
        }

        for prop in self.properties.values() {
            if !prop.active || prop.method != ControllerMethod::Binding {
                continue;
            }
            if let Some(binding) = &prop.binding {
                let value = binding.evaluate(store)?;
                store.assert_value(prop.property, value)?;
            }
        }
        Ok(())
    }

    /// Find the record for a property
    pub fn find_prop_data(&self, property: PropertyId) -> Option<&PropData> {
        self.properties.get(&property)
    }

    /// Find the record for a named property of an object
    pub fn find_prop_data_by_name(
        &self,
        store: &PropertyStore,
        object: ObjectId,
        name: &str,
    ) -> Option<&PropData> {
        let property = store.lookup(object, name)?;
        self.find_prop_data(property)
    }

    /// Iterate over all property records
    pub fn properties(&self) -> impl Iterator<Item = &PropData> {
        self.properties.values()
    }

    /// Check if a property is controlled
    pub fn controls(&self, property: PropertyId) -> bool {
        self.properties.contains_key(&property)
    }

    fn prop_mut(&mut self, property: PropertyId) -> Result<&mut PropData> {
        self.properties
            .get_mut(&property)
            .ok_or(AnimationError::PropertyNotControlled(property))
    }

    /// Start controlling a property.
    ///
    /// The record starts with the constant method holding the property's
    /// current value. Adding a tracked property again does nothing.
    pub fn add_property(&mut self, store: &mut PropertyStore, property: PropertyId) -> Result<()> {
        if self.properties.contains_key(&property) {
            return Ok(());
        }

        let current = store
            .get(property)
            .ok_or(AnimationError::PropertyNotFound(property))?;
        let mut prop = PropData {
            property,
            property_type: current.property_type(),
            method: ControllerMethod::Constant,
            path: None,
            constant_value: current.value().clone(),
            binding: None,
            active: false,
        };

        if self.effective_active() {
            activate_property(
                self.id,
                self.timeline.progress(),
                self.timeline.direction(),
                &mut prop,
                store,
            );
        }

        self.properties.insert(property, prop);
        self.operations.push(ControllerOperation::Added(property));
        Ok(())
    }

    /// Stop controlling a property, returning its record
    pub fn remove_property(&mut self, store: &mut PropertyStore, property: PropertyId) -> Option<PropData> {
        let mut prop = self.properties.shift_remove(&property)?;
        deactivate_property(self.id, &mut prop, store);
        self.operations.push(ControllerOperation::Removed(property));
        Some(prop)
    }

    /// Switch how a property is driven
    pub fn set_property_method(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        method: ControllerMethod,
    ) -> Result<()> {
        let (id, effective) = (self.id, self.effective_active());
        let (progress, direction) = (self.timeline.progress(), self.timeline.direction());
        let prop = self.prop_mut(property)?;
        if prop.method == method {
            return Ok(());
        }

        if effective {
            // Switch only after the old driver is released
            deactivate_property(id, prop, store);
            prop.method = method;
            activate_property(id, progress, direction, prop, store);
        } else {
            prop.method = method;
        }

        self.operations.push(ControllerOperation::MethodChanged(property));
        Ok(())
    }

    /// Replace the constant held for a property
    pub fn set_property_constant(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        value: Boxed,
    ) -> Result<()> {
        let prop = self.prop_mut(property)?;
        check_type(prop.property_type, value.property_type())?;

        prop.constant_value = value;
        if prop.active && prop.method == ControllerMethod::Constant {
            store.assert_value(property, prop.constant_value.clone())?;
        }
        Ok(())
    }

    /// Replace the path for a property
    pub fn set_property_path(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        path: Path,
    ) -> Result<()> {
        let (progress, direction) = (self.timeline.progress(), self.timeline.direction());
        let prop = self.prop_mut(property)?;
        check_type(prop.property_type, path.property_type())?;

        prop.path = Some(path);
        if prop.active && prop.method == ControllerMethod::Path {
            assert_path_value(prop, progress, direction, store);
        }
        Ok(())
    }

    /// Replace the expression binding for a property
    pub fn set_property_binding(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        binding: Binding,
    ) -> Result<()> {
        let (id, progress, direction) = (self.id, self.timeline.progress(), self.timeline.direction());
        let prop = self.prop_mut(property)?;
        if binding.target != property {
            return Err(AnimationError::BindingEvaluation(
                binding.id,
                "binding targets a different property".to_owned(),
            ));
        }

        let need_activate = prop.active && prop.method == ControllerMethod::Binding;
        if need_activate {
            deactivate_property(id, prop, store);
        }

        prop.binding = Some(binding);

        if need_activate {
            activate_property(id, progress, direction, prop, store);
        }
        Ok(())
    }

    /// Get the path for a property, creating an empty one if needed
    pub fn path_for_property(&mut self, property: PropertyId) -> Option<&mut Path> {
        let prop = self.properties.get_mut(&property)?;
        let property_type = prop.property_type;
        Some(prop.path.get_or_insert_with(|| Path::new(property_type)))
    }

    /// Visit every node of every path-driven property
    pub fn foreach_node(&self, mut callback: impl FnMut(PropertyId, &Node)) {
        for prop in self.properties.values() {
            if prop.method != ControllerMethod::Path {
                continue;
            }
            if let Some(path) = &prop.path {
                for node in path.nodes() {
                    callback(prop.property, node);
                }
            }
        }
    }

    fn max_node_t(&self) -> f32 {
        self.properties
            .values()
            .filter_map(|prop| prop.path.as_ref()?.max_t())
            .fold(0.0, f32::max)
    }

    fn normalize(&self, t: f32) -> f32 {
        let length = self.length();
        if length != 0.0 {
            t / length
        } else {
            0.0
        }
    }

    /// Change the length, keeping every node at the same absolute time.
    ///
    /// Returns false when refused: a zero length would collapse all node
    /// times together.
    fn update_length(&mut self, store: &mut PropertyStore, new_length: f32) -> bool {
        if new_length == 0.0 {
            tracing::warn!(
                "Refusing to shrink controller \"{}\" to zero length",
                self.label
            );
            return false;
        }

        let prev_length = self.length();
        if prev_length != 0.0 {
            for prop in self.properties.values_mut() {
                if let Some(path) = prop.path.as_mut() {
                    path.renormalize(prev_length, new_length);
                }
            }
        }

        self.set_length(store, new_length);
        true
    }

    /// Insert a keyframe for a property at absolute time `t`.
    ///
    /// Times past the current length grow the controller to `t`.
    pub fn insert_path_value(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        t: f32,
        value: Boxed,
    ) -> Result<()> {
        let prop = self.prop_mut(property)?;
        check_type(prop.property_type, value.property_type())?;

        if t > self.length() {
            self.update_length(store, t);
        }

        let normalized_t = self.normalize(t);
        let (progress, direction) = (self.timeline.progress(), self.timeline.direction());
        let prop = self.prop_mut(property)?;
        let property_type = prop.property_type;
        prop.path
            .get_or_insert_with(|| Path::new(property_type))
            .insert(normalized_t, value)?;

        if prop.active && prop.method == ControllerMethod::Path {
            assert_path_value(prop, progress, direction, store);
        }
        Ok(())
    }

    /// Copy out the keyframe value nearest to absolute time `t`
    pub fn box_path_value(&self, property: PropertyId, t: f32) -> Option<Boxed> {
        let path = self.properties.get(&property)?.path.as_ref()?;
        path.find_nearest(self.normalize(t)).map(|n| n.value.clone())
    }

    /// Find the keyframe sitting exactly at absolute time `t`.
    ///
    /// Times past the length have no node yet.
    pub fn find_path_node(&self, property: PropertyId, t: f32) -> Option<&Node> {
        if t > self.length() {
            return None;
        }
        let path = self.properties.get(&property)?.path.as_ref()?;
        path.find_node(self.normalize(t))
    }

    /// Remove the keyframe nearest to absolute time `t`.
    ///
    /// When the removed node was the latest of the whole controller the
    /// length shrinks to the latest remaining node.
    pub fn remove_path_value(
        &mut self,
        store: &mut PropertyStore,
        property: PropertyId,
        t: f32,
    ) -> Result<Option<Node>> {
        let normalized_t = self.normalize(t);
        let prop = self.prop_mut(property)?;
        let Some(node) = prop.path.as_mut().and_then(|p| p.remove_nearest(normalized_t)) else {
            return Ok(None);
        };

        let max_t = self.max_node_t();
        if max_t < node.t {
            let length = self.length();
            self.update_length(store, max_t * length);
        }

        let (progress, direction) = (self.timeline.progress(), self.timeline.direction());
        let prop = self.prop_mut(property)?;
        if prop.active && prop.method == ControllerMethod::Path {
            assert_path_value(prop, progress, direction, store);
        }
        Ok(Some(node))
    }

    /// Snapshot every record controlling a property of `object`
    pub fn snapshot_properties_of(&self, store: &PropertyStore, object: ObjectId) -> Vec<PropDataSnapshot> {
        self.properties
            .values()
            .filter(|prop| store.get(prop.property).is_some_and(|p| p.owner == object))
            .map(PropData::snapshot)
            .collect()
    }

    /// Recreate a record from a snapshot
    pub fn restore_property(&mut self, store: &mut PropertyStore, snapshot: &PropDataSnapshot) -> Result<()> {
        let property = snapshot.property;
        self.add_property(store, property)?;

        if let Some(saved) = &snapshot.path {
            let path = self
                .path_for_property(property)
                .ok_or(AnimationError::PropertyNotControlled(property))?;
            for node in saved.nodes() {
                path.insert(node.t, node.value.clone())?;
            }
        }

        self.set_property_constant(store, property, snapshot.constant_value.clone())?;
        self.set_property_method(store, property, snapshot.method)?;
        if let Some(binding) = &snapshot.binding {
            self.set_property_binding(store, property, binding.clone())?;
        }
        Ok(())
    }

    /// Take the record notifications since the last call
    pub fn drain_operations(&mut self) -> Vec<ControllerOperation> {
        std::mem::take(&mut self.operations)
    }

    /// Take the path notifications of every record since the last call
    pub fn drain_path_changes(&mut self) -> Vec<(PropertyId, PathChange)> {
        let mut changes = Vec::new();
        for prop in self.properties.values_mut() {
            if let Some(path) = prop.path.as_mut() {
                changes.extend(path.drain_changes().into_iter().map(|c| (prop.property, c)));
            }
        }
        changes
    }
}

fn check_type(expected: PropertyType, found: PropertyType) -> Result<()> {
    if expected != found {
        return Err(AnimationError::TypeMismatch { expected, found });
    }
    Ok(())
}

fn owner_for(id: ControllerId, prop: &PropData) -> Option<BindingOwner> {
    match prop.method {
        ControllerMethod::Constant => Some(BindingOwner::ControllerConstant(id)),
        ControllerMethod::Path => Some(BindingOwner::ControllerPath(id)),
        ControllerMethod::Binding => prop.binding.as_ref().map(|b| BindingOwner::Expression(b.id)),
    }
}

fn assert_path_value(prop: &PropData, progress: f64, direction: PathDirection, store: &mut PropertyStore) {
    let sample = prop
        .path
        .as_ref()
        .and_then(|p| p.lerp_property_in(progress as f32, direction));
    let Some(value) = sample else {
        return;
    };
    if let Err(err) = store.assert_value(prop.property, value) {
        tracing::warn!("Failed to assert path value: {err}");
    }
}

fn activate_property(
    id: ControllerId,
    progress: f64,
    direction: PathDirection,
    prop: &mut PropData,
    store: &mut PropertyStore,
) {
    if store.binding_owner(prop.property).is_some() {
        let name = store
            .get(prop.property)
            .map(|p| p.spec.name.clone())
            .unwrap_or_default();
        tracing::warn!("Controller collision for \"{name}\" property");
        return;
    }

    if let Some(owner) = owner_for(id, prop) {
        if let Err(err) = store.set_binding(prop.property, owner) {
            tracing::warn!("Failed to bind property: {err}");
            return;
        }
    }

    let result = match prop.method {
        ControllerMethod::Constant => store.assert_value(prop.property, prop.constant_value.clone()),
        ControllerMethod::Path => {
            assert_path_value(prop, progress, direction, store);
            Ok(())
        }
        ControllerMethod::Binding => match &prop.binding {
            Some(binding) => binding
                .evaluate(store)
                .and_then(|value| store.assert_value(prop.property, value)),
            None => Ok(()),
        },
    };
    if let Err(err) = result {
        tracing::warn!("Failed to activate {} method: {err}", prop.method.name());
    }

    prop.active = true;
}

fn deactivate_property(id: ControllerId, prop: &mut PropData, store: &mut PropertyStore) {
    if !prop.active {
        return;
    }

    if let Some(owner) = owner_for(id, prop) {
        if store.binding_owner(prop.property) == Some(owner) {
            store.remove_binding(prop.property);
        }
    }
    prop.active = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingExpression;
    use crate::property::PropertySpec;

    fn setup() -> (PropertyStore, ObjectId, PropertyId, Controller) {
        let mut store = PropertyStore::new();
        let object = ObjectId::new();
        let x = store
            .add(object, PropertySpec::new("x", PropertyType::Float), Boxed::Float(0.0))
            .unwrap();
        let mut controller = Controller::new("main");
        controller.add_property(&mut store, x).unwrap();
        (store, object, x, controller)
    }

    #[test]
    fn test_add_property_captures_current_value() {
        let (mut store, object, x, mut controller) = setup();
        let y = store
            .add(object, PropertySpec::new("y", PropertyType::Float), Boxed::Float(4.0))
            .unwrap();
        controller.add_property(&mut store, y).unwrap();
        controller.add_property(&mut store, y).unwrap();

        let prop = controller.find_prop_data(y).unwrap();
        assert_eq!(prop.method, ControllerMethod::Constant);
        assert_eq!(prop.constant_value, Boxed::Float(4.0));
        assert_eq!(controller.properties().count(), 2);
        assert_eq!(
            controller.drain_operations(),
            vec![ControllerOperation::Added(x), ControllerOperation::Added(y)]
        );
    }

    #[test]
    fn test_constant_activation_blocks_external_writes() {
        let (mut store, _, x, mut controller) = setup();
        controller
            .set_property_constant(&mut store, x, Boxed::Float(3.0))
            .unwrap();
        assert_eq!(store.box_value(x), Some(Boxed::Float(0.0)));

        controller.set_active(&mut store, true);
        assert_eq!(store.box_value(x), Some(Boxed::Float(3.0)));
        assert!(store.set(x, Boxed::Float(1.0)).is_err());

        controller.set_active(&mut store, false);
        assert!(store.set(x, Boxed::Float(1.0)).is_ok());
    }

    #[test]
    fn test_suspend_overrides_active() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_active(&mut store, true);
        controller.set_suspended(&mut store, true);

        assert!(controller.is_active());
        assert!(!controller.effective_active());
        assert_eq!(store.binding_owner(x), None);

        controller.set_suspended(&mut store, false);
        assert_eq!(
            store.binding_owner(x),
            Some(BindingOwner::ControllerConstant(controller.id))
        );
    }

    #[test]
    fn test_collision_is_skipped() {
        let (mut store, _, x, mut first) = setup();
        first.set_active(&mut store, true);

        let mut second = Controller::new("second");
        second.add_property(&mut store, x).unwrap();
        second.set_active(&mut store, true);

        assert!(!second.find_prop_data(x).unwrap().active);
        assert_eq!(store.binding_owner(x), Some(BindingOwner::ControllerConstant(first.id)));

        // Deactivating the loser must not release the winner's binding
        second.set_active(&mut store, false);
        assert_eq!(store.binding_owner(x), Some(BindingOwner::ControllerConstant(first.id)));
    }

    #[test]
    fn test_path_follows_progress() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 2.0);
        controller.insert_path_value(&mut store, x, 0.0, Boxed::Float(0.0)).unwrap();
        controller.insert_path_value(&mut store, x, 2.0, Boxed::Float(10.0)).unwrap();
        controller
            .set_property_method(&mut store, x, ControllerMethod::Path)
            .unwrap();
        controller.set_active(&mut store, true);

        controller.set_elapsed(&mut store, 1.0);
        assert_eq!(store.box_value(x), Some(Boxed::Float(5.0)));

        controller.set_running(true);
        controller.advance(&mut store, 0.5);
        assert_eq!(store.box_value(x), Some(Boxed::Float(7.5)));
    }

    #[test]
    fn test_backwards_playback_samples_like_forwards() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 4.0);
        for (t, v) in [(0.0, 0.0), (1.0, 2.0), (2.0, 3.0), (4.0, 11.0)] {
            controller.insert_path_value(&mut store, x, t, Boxed::Float(v)).unwrap();
        }
        controller
            .set_property_method(&mut store, x, ControllerMethod::Path)
            .unwrap();
        controller.set_active(&mut store, true);

        let progresses = [1.0, 0.75, 0.5, 0.375, 0.25, 0.125, 0.0];
        let mut forwards = Vec::new();
        for progress in progresses {
            controller.set_progress(&mut store, progress);
            forwards.push(store.box_value(x));
        }

        controller.set_direction(PathDirection::Backwards);
        controller.set_progress(&mut store, 0.9);
        for (progress, expected) in progresses.into_iter().zip(forwards) {
            controller.set_progress(&mut store, progress);
            assert_eq!(store.box_value(x), expected, "progress {progress}");
        }

        controller.set_progress(&mut store, 0.5);
        assert_eq!(store.box_value(x), Some(Boxed::Float(3.0)));
    }

    #[test]
    fn test_find_path_node_on_empty_length() {
        let (mut store, _, x, mut controller) = setup();
        controller.insert_path_value(&mut store, x, 0.0, Boxed::Float(1.0)).unwrap();
        assert_eq!(controller.length(), 0.0);

        assert_eq!(controller.find_path_node(x, 0.0).map(|n| n.t), Some(0.0));
        assert!(controller.find_path_node(x, 4.0).is_none());

        controller.insert_path_value(&mut store, x, 4.0, Boxed::Float(2.0)).unwrap();
        assert_eq!(controller.length(), 4.0);
        assert_eq!(
            controller.find_path_node(x, 4.0).map(|n| n.value.clone()),
            Some(Boxed::Float(2.0))
        );
        assert!(controller.find_path_node(x, 2.0).is_none());
    }

    #[test]
    fn test_method_change_reports_once() {
        let (mut store, _, x, mut controller) = setup();
        controller.drain_operations();

        controller.set_property_method(&mut store, x, ControllerMethod::Path).unwrap();
        controller.set_property_method(&mut store, x, ControllerMethod::Path).unwrap();
        assert_eq!(controller.drain_operations(), vec![ControllerOperation::MethodChanged(x)]);

        let missing = PropertyId::new();
        assert!(matches!(
            controller.set_property_method(&mut store, missing, ControllerMethod::Path),
            Err(AnimationError::PropertyNotControlled(_))
        ));
    }

    #[test]
    fn test_insert_past_end_grows_length() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_property_method(&mut store, x, ControllerMethod::Path).unwrap();
        controller.set_length(&mut store, 5.0);
        controller.insert_path_value(&mut store, x, 2.5, Boxed::Float(1.0)).unwrap();
        controller.insert_path_value(&mut store, x, 5.0, Boxed::Float(2.0)).unwrap();

        controller.insert_path_value(&mut store, x, 10.0, Boxed::Float(3.0)).unwrap();

        assert_eq!(controller.length(), 10.0);
        let mut times = Vec::new();
        controller.foreach_node(|_, node| times.push(node.t));
        assert_eq!(times, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_remove_last_node_shrinks_length() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 10.0);
        controller.insert_path_value(&mut store, x, 5.0, Boxed::Float(1.0)).unwrap();
        controller.insert_path_value(&mut store, x, 10.0, Boxed::Float(2.0)).unwrap();

        let removed = controller.remove_path_value(&mut store, x, 9.0).unwrap().unwrap();
        assert_eq!(removed.t, 1.0);
        assert_eq!(controller.length(), 5.0);
        assert_eq!(controller.box_path_value(x, 5.0), Some(Boxed::Float(1.0)));
        assert_eq!(
            controller.find_prop_data(x).unwrap().path.as_ref().unwrap().nodes()[0].t,
            1.0
        );
    }

    #[test]
    fn test_shrink_to_zero_is_refused() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 4.0);
        controller.insert_path_value(&mut store, x, 4.0, Boxed::Float(1.0)).unwrap();

        controller.remove_path_value(&mut store, x, 4.0).unwrap();
        assert_eq!(controller.length(), 4.0);
        assert!(controller.remove_path_value(&mut store, x, 4.0).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_wrong_type() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 1.0);
        let result = controller.insert_path_value(&mut store, x, 3.0, Boxed::Boolean(true));
        assert!(matches!(result, Err(AnimationError::TypeMismatch { .. })));
        assert_eq!(controller.length(), 1.0);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let (mut store, object, x, mut controller) = setup();
        controller.set_length(&mut store, 2.0);
        controller.insert_path_value(&mut store, x, 1.0, Boxed::Float(5.0)).unwrap();
        controller.insert_path_value(&mut store, x, 2.0, Boxed::Float(6.0)).unwrap();
        controller.set_property_method(&mut store, x, ControllerMethod::Path).unwrap();

        let snapshots = controller.snapshot_properties_of(&store, object);
        assert_eq!(snapshots.len(), 1);
        assert!(controller.snapshot_properties_of(&store, ObjectId::new()).is_empty());

        controller.remove_property(&mut store, x);
        assert!(!controller.controls(x));

        controller.restore_property(&mut store, &snapshots[0]).unwrap();
        assert_eq!(controller.find_prop_data(x).unwrap().snapshot(), snapshots[0]);
    }

    #[test]
    fn test_binding_method() {
        let (mut store, object, x, mut controller) = setup();
        let source = store
            .add(object, PropertySpec::new("source", PropertyType::Float), Boxed::Float(2.0))
            .unwrap();
        let binding = Binding::new(x, vec![source], BindingExpression::Scale(2.0));

        controller.set_property_binding(&mut store, x, binding).unwrap();
        controller.set_property_method(&mut store, x, ControllerMethod::Binding).unwrap();
        controller.set_active(&mut store, true);
        assert_eq!(store.box_value(x), Some(Boxed::Float(4.0)));

        store.set(source, Boxed::Float(3.0)).unwrap();
        controller.evaluate_bindings(&mut store).unwrap();
        assert_eq!(store.box_value(x), Some(Boxed::Float(6.0)));
    }

    #[test]
    fn test_auto_deactivate_at_end() {
        let (mut store, _, _, mut controller) = setup();
        controller.set_length(&mut store, 1.0);
        controller.set_auto_deactivate(true);
        controller.set_active(&mut store, true);

        controller.set_progress(&mut store, 0.5);
        assert!(controller.is_active());
        controller.set_progress(&mut store, 1.0);
        assert!(!controller.is_active());
    }

    #[test]
    fn test_path_changes_are_collected() {
        let (mut store, _, x, mut controller) = setup();
        controller.set_length(&mut store, 1.0);
        controller.insert_path_value(&mut store, x, 0.5, Boxed::Float(1.0)).unwrap();
        controller.remove_path_value(&mut store, x, 0.5).unwrap();

        let changes = controller.drain_path_changes();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|(property, _)| *property == x));
    }
}
