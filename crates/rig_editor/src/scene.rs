// SPDX-License-Identifier: MIT OR Apache-2.0
//! The edited scene.
//!
//! [`EditTarget`] is everything the undo journal needs from the thing it
//! edits. [`Scene`] implements it over a property store and arenas of
//! entities, components and controllers. Deleted objects are moved to
//! detached storage rather than dropped, so an undo can put the very same
//! object back by handle.

use indexmap::IndexMap;
use rig_animation::{
    AnimationError, Binding, BindingGraph, BindingId, Boxed, Controller, ControllerId,
    ControllerMethod, ObjectId, Property, PropDataSnapshot, PropertyId, PropertySpec,
    PropertyStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The property owner handle of this entity
    pub fn object(&self) -> ObjectId {
        ObjectId(self.0)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    /// Create a new random component ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The property owner handle of this component
    pub fn object(&self) -> ObjectId {
        ObjectId(self.0)
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

/// The property owner handle of a controller
pub fn controller_object(id: ControllerId) -> ObjectId {
    ObjectId(id.0)
}

/// Scene errors
#[derive(Debug, Error)]
pub enum SceneError {
    /// Entity not found
    #[error("Entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Component not found
    #[error("Component not found: {0:?}")]
    ComponentNotFound(ComponentId),

    /// Controller not found
    #[error("Controller not found: {0:?}")]
    ControllerNotFound(ControllerId),

    /// Object is already part of the scene
    #[error("Already in the scene: {0}")]
    AlreadyAttached(Uuid),

    /// Animation error
    #[error(transparent)]
    Animation(#[from] AnimationError),
}

/// Result type for scene operations
pub type Result<T> = std::result::Result<T, SceneError>;

/// A node of the scene graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity ID
    pub id: EntityId,
    /// Display label
    pub label: String,
    /// Parent entity, if any
    pub parent: Option<EntityId>,
    /// Child entities
    pub children: Vec<EntityId>,
    /// Attached components
    pub components: Vec<ComponentId>,
}

/// A component attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Component ID
    pub id: ComponentId,
    /// Component kind, e.g. "light"
    pub kind: String,
    /// Owning entity
    pub entity: Option<EntityId>,
}

/// Saved controller records referencing one object's properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerPropertyState {
    /// Controller holding the records
    pub controller: ControllerId,
    /// Record snapshots
    pub properties: Vec<PropDataSnapshot>,
}

/// The operations the undo journal applies
pub trait EditTarget {
    /// Whether edits are currently refused
    fn play_mode(&self) -> bool;

    /// Look up a property
    fn property(&self, property: PropertyId) -> Option<&Property>;

    /// Look up a controller in the scene
    fn controller(&self, controller: ControllerId) -> Option<&Controller>;

    /// Look up an entity in the scene
    fn entity(&self, entity: EntityId) -> Option<&Entity>;

    /// Look up a component in the scene
    fn component(&self, component: ComponentId) -> Option<&Component>;

    /// Write a property value
    fn set_property(&mut self, property: PropertyId, value: &Boxed) -> Result<()>;

    /// Set the constant a controller holds for a property
    fn controller_set_const(&mut self, controller: ControllerId, property: PropertyId, value: &Boxed) -> Result<()>;

    /// Add a keyframe at absolute time `t`
    fn controller_path_add_node(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
        value: &Boxed,
    ) -> Result<()>;

    /// Replace the keyframe at absolute time `t`
    fn controller_path_set_node(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
        value: &Boxed,
    ) -> Result<()>;

    /// Remove the keyframe nearest to absolute time `t`
    fn controller_path_delete_node(&mut self, controller: ControllerId, property: PropertyId, t: f32) -> Result<()>;

    /// Copy the keyframe value nearest to absolute time `t`
    fn controller_box_path_value(&self, controller: ControllerId, property: PropertyId, t: f32) -> Option<Boxed>;

    /// Start controlling a property
    fn controller_add_property(&mut self, controller: ControllerId, property: PropertyId) -> Result<()>;

    /// Stop controlling a property
    fn controller_remove_property(&mut self, controller: ControllerId, property: PropertyId) -> Result<()>;

    /// Switch how a property is driven
    fn controller_set_method(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        method: ControllerMethod,
    ) -> Result<()>;

    /// Recreate a controller record from a snapshot
    fn controller_restore_property(&mut self, controller: ControllerId, snapshot: &PropDataSnapshot) -> Result<()>;

    /// Suspend or resume a controller
    fn controller_set_suspended(&mut self, controller: ControllerId, suspended: bool) -> Result<()>;

    /// Put an entity (back) into the scene under `parent`
    fn add_entity(&mut self, parent: Option<EntityId>, entity: EntityId) -> Result<()>;

    /// Take an entity and its subtree out of the scene
    fn delete_entity(&mut self, entity: EntityId) -> Result<()>;

    /// Attach a component to an entity
    fn add_component(&mut self, entity: EntityId, component: ComponentId) -> Result<()>;

    /// Take a component out of the scene
    fn delete_component(&mut self, component: ComponentId) -> Result<()>;

    /// Put a controller (back) into the scene
    fn add_controller(&mut self, controller: ControllerId) -> Result<()>;

    /// Take a controller out of the scene
    fn delete_controller(&mut self, controller: ControllerId) -> Result<()>;

    /// Snapshot every controller record referencing a property of `object`
    fn save_controller_properties(&self, object: ObjectId) -> Vec<ControllerPropertyState>;
}

/// Entities, components and controllers over one property store
#[derive(Debug, Default)]
pub struct Scene {
    properties: PropertyStore,
    bindings: BindingGraph,
    entities: IndexMap<EntityId, Entity>,
    components: IndexMap<ComponentId, Component>,
    controllers: IndexMap<ControllerId, Controller>,
    detached_entities: HashMap<EntityId, Entity>,
    detached_components: HashMap<ComponentId, Component>,
    detached_controllers: HashMap<ControllerId, Controller>,
    play_mode: bool,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the property store
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Copy out a property value
    pub fn property_value(&self, property: PropertyId) -> Option<Boxed> {
        self.properties.box_value(property)
    }

    /// Find a property by owner and name
    pub fn lookup(&self, object: ObjectId, name: &str) -> Option<PropertyId> {
        self.properties.lookup(object, name)
    }

    /// Enter or leave play mode
    pub fn set_play_mode(&mut self, play_mode: bool) {
        if self.play_mode != play_mode {
            tracing::info!("Play mode {}", if play_mode { "on" } else { "off" });
        }
        self.play_mode = play_mode;
    }

    /// Add a property owned by `owner`
    pub fn add_property(&mut self, owner: ObjectId, spec: PropertySpec, initial: Boxed) -> Result<PropertyId> {
        Ok(self.properties.add(owner, spec, initial)?)
    }

    /// Create an entity outside the scene, ready to be added
    pub fn create_entity(&mut self, label: impl Into<String>) -> EntityId {
        let id = EntityId::new();
        self.detached_entities.insert(
            id,
            Entity {
                id,
                label: label.into(),
                parent: None,
                children: Vec::new(),
                components: Vec::new(),
            },
        );
        id
    }

    /// Create an entity directly in the scene
    pub fn spawn_entity(&mut self, label: impl Into<String>, parent: Option<EntityId>) -> Result<EntityId> {
        let id = self.create_entity(label);
        self.add_entity(parent, id)?;
        Ok(id)
    }

    /// Create a component outside the scene, ready to be added
    pub fn create_component(&mut self, kind: impl Into<String>) -> ComponentId {
        let id = ComponentId::new();
        self.detached_components.insert(
            id,
            Component {
                id,
                kind: kind.into(),
                entity: None,
            },
        );
        id
    }

    /// Create a component directly on an entity
    pub fn spawn_component(&mut self, entity: EntityId, kind: impl Into<String>) -> Result<ComponentId> {
        let id = self.create_component(kind);
        self.add_component(entity, id)?;
        Ok(id)
    }

    /// Create a controller outside the scene, ready to be added
    pub fn create_controller(&mut self, label: impl Into<String>) -> ControllerId {
        let controller = Controller::new(label);
        let id = controller.id;
        self.detached_controllers.insert(id, controller);
        id
    }

    /// Create a controller directly in the scene
    pub fn spawn_controller(&mut self, label: impl Into<String>) -> ControllerId {
        let controller = Controller::new(label);
        let id = controller.id;
        self.controllers.insert(id, controller);
        id
    }

    /// Iterate over entities in the scene
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterate over components in the scene
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Iterate over controllers in the scene
    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }

    fn controller_and_store(&mut self, id: ControllerId) -> Result<(&mut Controller, &mut PropertyStore)> {
        let controller = self
            .controllers
            .get_mut(&id)
            .ok_or(SceneError::ControllerNotFound(id))?;
        Ok((controller, &mut self.properties))
    }

    /// Activate or deactivate a controller
    pub fn set_controller_active(&mut self, id: ControllerId, active: bool) -> Result<()> {
        let (controller, store) = self.controller_and_store(id)?;
        controller.set_active(store, active);
        Ok(())
    }

    /// Set a controller's length without moving its nodes
    pub fn set_controller_length(&mut self, id: ControllerId, length: f32) -> Result<()> {
        let (controller, store) = self.controller_and_store(id)?;
        controller.set_length(store, length);
        Ok(())
    }

    /// Move a controller to an elapsed time
    pub fn seek(&mut self, id: ControllerId, elapsed: f64) -> Result<()> {
        let (controller, store) = self.controller_and_store(id)?;
        controller.set_elapsed(store, elapsed);
        Ok(())
    }

    /// Advance every running controller by `delta` seconds
    pub fn advance(&mut self, delta: f64) {
        for controller in self.controllers.values_mut() {
            controller.advance(&mut self.properties, delta);
        }
    }

    /// Activate an expression binding
    pub fn add_binding(&mut self, binding: Binding) -> Result<BindingId> {
        Ok(self.bindings.add(&mut self.properties, binding)?)
    }

    /// Deactivate an expression binding
    pub fn remove_binding(&mut self, id: BindingId) -> Option<Binding> {
        self.bindings.remove(&mut self.properties, id)
    }

    /// Re-run expression bindings and binding-driven controller records
    pub fn evaluate(&mut self) -> Result<()> {
        self.bindings.evaluate(&mut self.properties)?;
        for controller in self.controllers.values() {
            controller.evaluate_bindings(&mut self.properties)?;
        }
        Ok(())
    }

    /// Take the properties whose value changed since the last call
    pub fn take_dirty(&mut self) -> Vec<PropertyId> {
        self.properties.take_dirty()
    }

    fn detach_subtree(&mut self, id: EntityId) {
        let Some(entity) = self.entities.shift_remove(&id) else {
            return;
        };
        for component in &entity.components {
            if let Some(component) = self.components.shift_remove(component) {
                self.detached_components.insert(component.id, component);
            }
        }
        for child in entity.children.clone() {
            self.detach_subtree(child);
        }
        self.detached_entities.insert(id, entity);
    }

    fn attach_subtree(&mut self, id: EntityId) {
        let Some(entity) = self.detached_entities.remove(&id) else {
            return;
        };
        for component in &entity.components {
            if let Some(component) = self.detached_components.remove(component) {
                self.components.insert(component.id, component);
            }
        }
        let children = entity.children.clone();
        self.entities.insert(id, entity);
        for child in children {
            self.attach_subtree(child);
        }
    }
}

impl EditTarget for Scene {
    fn play_mode(&self) -> bool {
        self.play_mode
    }

    fn property(&self, property: PropertyId) -> Option<&Property> {
        self.properties.get(property)
    }

    fn controller(&self, controller: ControllerId) -> Option<&Controller> {
        self.controllers.get(&controller)
    }

    fn entity(&self, entity: EntityId) -> Option<&Entity> {
        self.entities.get(&entity)
    }

    fn component(&self, component: ComponentId) -> Option<&Component> {
        self.components.get(&component)
    }

    fn set_property(&mut self, property: PropertyId, value: &Boxed) -> Result<()> {
        Ok(self.properties.set(property, value.clone())?)
    }

    fn controller_set_const(&mut self, controller: ControllerId, property: PropertyId, value: &Boxed) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        Ok(controller.set_property_constant(store, property, value.clone())?)
    }

    fn controller_path_add_node(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
        value: &Boxed,
    ) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        Ok(controller.insert_path_value(store, property, t, value.clone())?)
    }

    fn controller_path_set_node(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
        value: &Boxed,
    ) -> Result<()> {
        self.controller_path_add_node(controller, property, t, value)
    }

    fn controller_path_delete_node(&mut self, controller: ControllerId, property: PropertyId, t: f32) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        controller.remove_path_value(store, property, t)?;
        Ok(())
    }

    fn controller_box_path_value(&self, controller: ControllerId, property: PropertyId, t: f32) -> Option<Boxed> {
        self.controllers.get(&controller)?.box_path_value(property, t)
    }

    fn controller_add_property(&mut self, controller: ControllerId, property: PropertyId) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        Ok(controller.add_property(store, property)?)
    }

    fn controller_remove_property(&mut self, controller: ControllerId, property: PropertyId) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        controller.remove_property(store, property);
        Ok(())
    }

    fn controller_set_method(
        &mut self,
        controller: ControllerId,
        property: PropertyId,
        method: ControllerMethod,
    ) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        Ok(controller.set_property_method(store, property, method)?)
    }

    fn controller_restore_property(&mut self, controller: ControllerId, snapshot: &PropDataSnapshot) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        Ok(controller.restore_property(store, snapshot)?)
    }

    fn controller_set_suspended(&mut self, controller: ControllerId, suspended: bool) -> Result<()> {
        let (controller, store) = self.controller_and_store(controller)?;
        controller.set_suspended(store, suspended);
        Ok(())
    }

    fn add_entity(&mut self, parent: Option<EntityId>, entity: EntityId) -> Result<()> {
        if self.entities.contains_key(&entity) {
            return Err(SceneError::AlreadyAttached(entity.0));
        }
        if let Some(parent) = parent {
            if !self.entities.contains_key(&parent) {
                return Err(SceneError::EntityNotFound(parent));
            }
        }

        let record = self
            .detached_entities
            .get_mut(&entity)
            .ok_or(SceneError::EntityNotFound(entity))?;
        record.parent = parent;

        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            if !parent.children.contains(&entity) {
                parent.children.push(entity);
            }
        }

        self.attach_subtree(entity);
        tracing::debug!("Added entity {:?}", entity);
        Ok(())
    }

    fn delete_entity(&mut self, entity: EntityId) -> Result<()> {
        let parent = self
            .entities
            .get(&entity)
            .ok_or(SceneError::EntityNotFound(entity))?
            .parent;

        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            parent.children.retain(|c| *c != entity);
        }

        self.detach_subtree(entity);
        tracing::debug!("Deleted entity {:?}", entity);
        Ok(())
    }

    fn add_component(&mut self, entity: EntityId, component: ComponentId) -> Result<()> {
        if self.components.contains_key(&component) {
            return Err(SceneError::AlreadyAttached(component.0));
        }
        let owner = self
            .entities
            .get_mut(&entity)
            .ok_or(SceneError::EntityNotFound(entity))?;
        let mut record = self
            .detached_components
            .remove(&component)
            .ok_or(SceneError::ComponentNotFound(component))?;

        record.entity = Some(entity);
        if !owner.components.contains(&component) {
            owner.components.push(component);
        }
        self.components.insert(component, record);
        Ok(())
    }

    fn delete_component(&mut self, component: ComponentId) -> Result<()> {
        let record = self
            .components
            .shift_remove(&component)
            .ok_or(SceneError::ComponentNotFound(component))?;

        if let Some(owner) = record.entity.and_then(|e| self.entities.get_mut(&e)) {
            owner.components.retain(|c| *c != component);
        }
        self.detached_components.insert(component, record);
        Ok(())
    }

    fn add_controller(&mut self, controller: ControllerId) -> Result<()> {
        if self.controllers.contains_key(&controller) {
            return Err(SceneError::AlreadyAttached(controller.0));
        }
        let record = self
            .detached_controllers
            .remove(&controller)
            .ok_or(SceneError::ControllerNotFound(controller))?;
        self.controllers.insert(controller, record);
        Ok(())
    }

    fn delete_controller(&mut self, controller: ControllerId) -> Result<()> {
        let mut record = self
            .controllers
            .shift_remove(&controller)
            .ok_or(SceneError::ControllerNotFound(controller))?;

        // A detached controller must not keep driving properties
        record.set_suspended(&mut self.properties, true);
        self.detached_controllers.insert(controller, record);
        Ok(())
    }

    fn save_controller_properties(&self, object: ObjectId) -> Vec<ControllerPropertyState> {
        self.controllers
            .values()
            .filter_map(|controller| {
                let properties = controller.snapshot_properties_of(&self.properties, object);
                if properties.is_empty() {
                    return None;
                }
                Some(ControllerPropertyState {
                    controller: controller.id,
                    properties,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_animation::{BindingExpression, PropertyType};

    #[test]
    fn test_delete_entity_detaches_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn_entity("root", None).unwrap();
        let child = scene.spawn_entity("child", Some(root)).unwrap();
        let light = scene.spawn_component(child, "light").unwrap();

        scene.delete_entity(root).unwrap();
        assert!(scene.entity(root).is_none());
        assert!(scene.entity(child).is_none());
        assert!(scene.component(light).is_none());

        scene.add_entity(None, root).unwrap();
        assert_eq!(scene.entity(child).unwrap().parent, Some(root));
        assert_eq!(scene.component(light).unwrap().entity, Some(child));
    }

    #[test]
    fn test_delete_child_updates_parent() {
        let mut scene = Scene::new();
        let root = scene.spawn_entity("root", None).unwrap();
        let child = scene.spawn_entity("child", Some(root)).unwrap();

        scene.delete_entity(child).unwrap();
        assert!(scene.entity(root).unwrap().children.is_empty());

        scene.add_entity(Some(root), child).unwrap();
        assert_eq!(scene.entity(root).unwrap().children, vec![child]);
        assert!(matches!(
            scene.add_entity(Some(root), child),
            Err(SceneError::AlreadyAttached(_))
        ));
    }

    #[test]
    fn test_component_round_trip() {
        let mut scene = Scene::new();
        let entity = scene.spawn_entity("cube", None).unwrap();
        let material = scene.spawn_component(entity, "material").unwrap();

        scene.delete_component(material).unwrap();
        assert!(scene.entity(entity).unwrap().components.is_empty());

        scene.add_component(entity, material).unwrap();
        assert_eq!(scene.entity(entity).unwrap().components, vec![material]);
    }

    #[test]
    fn test_deleted_controller_releases_properties() {
        let mut scene = Scene::new();
        let entity = scene.spawn_entity("cube", None).unwrap();
        let x = scene
            .add_property(entity.object(), PropertySpec::new("x", PropertyType::Float), Boxed::Float(0.0))
            .unwrap();
        let controller = scene.spawn_controller("main");
        scene.controller_add_property(controller, x).unwrap();
        scene.set_controller_active(controller, true).unwrap();
        assert!(scene.set_property(x, &Boxed::Float(1.0)).is_err());

        scene.delete_controller(controller).unwrap();
        assert!(scene.controller(controller).is_none());
        assert!(scene.set_property(x, &Boxed::Float(1.0)).is_ok());

        scene.add_controller(controller).unwrap();
        assert!(scene.controller(controller).unwrap().is_suspended());
    }

    #[test]
    fn test_save_controller_properties() {
        let mut scene = Scene::new();
        let entity = scene.spawn_entity("cube", None).unwrap();
        let other = scene.spawn_entity("other", None).unwrap();
        let x = scene
            .add_property(entity.object(), PropertySpec::new("x", PropertyType::Float), Boxed::Float(0.0))
            .unwrap();
        let y = scene
            .add_property(other.object(), PropertySpec::new("y", PropertyType::Float), Boxed::Float(0.0))
            .unwrap();

        let first = scene.spawn_controller("first");
        let second = scene.spawn_controller("second");
        scene.controller_add_property(first, x).unwrap();
        scene.controller_add_property(second, y).unwrap();

        let saved = scene.save_controller_properties(entity.object());
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].controller, first);
        assert_eq!(saved[0].properties[0].property, x);
    }

    #[test]
    fn test_evaluate_bindings() {
        let mut scene = Scene::new();
        let entity = scene.spawn_entity("cube", None).unwrap();
        let a = scene
            .add_property(entity.object(), PropertySpec::new("a", PropertyType::Float), Boxed::Float(2.0))
            .unwrap();
        let b = scene
            .add_property(entity.object(), PropertySpec::new("b", PropertyType::Float), Boxed::Float(0.0))
            .unwrap();

        scene
            .add_binding(Binding::new(b, vec![a], BindingExpression::Scale(0.5)))
            .unwrap();
        scene.evaluate().unwrap();
        assert_eq!(scene.property_value(b), Some(Boxed::Float(1.0)));
        assert_eq!(scene.lookup(entity.object(), "b"), Some(b));
    }
}
