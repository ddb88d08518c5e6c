// SPDX-License-Identifier: MIT OR Apache-2.0
//! Journal records and their application.
//!
//! Every record of the [`UndoJournal`] is an [`UndoRedo`]: one
//! [`UndoRedoOp`] plus a flag telling whether a following edit of the same
//! target may coalesce into it. Applying a record forwards the edit to an
//! [`EditTarget`]; inverting it produces the record that takes the edit
//! back.

use crate::journal::{JournalError, Result, UndoJournal};
use crate::scene::{controller_object, ComponentId, ControllerPropertyState, EditTarget, EntityId};
use rig_animation::{Boxed, ControllerId, ControllerMethod, PropertyId};
use std::fmt;

/// An operation that can be applied to an edit target and inverted
pub trait JournalOp {
    /// Perform the edit
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()>;

    /// Build the operation that takes this edit back
    fn invert(&self) -> Result<UndoRedoOp>;

    /// One-line description for journal dumps
    fn describe(&self) -> String;
}

/// A journal record
#[derive(Debug, Clone, PartialEq)]
pub struct UndoRedo {
    /// The edit
    pub op: UndoRedoOp,
    /// A following edit of the same target may merge into this record
    pub mergable: bool,
}

impl UndoRedo {
    /// Create a record
    pub fn new(op: UndoRedoOp, mergable: bool) -> Self {
        Self { op, mergable }
    }
}

/// Every kind of journaled edit
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRedoOp {
    /// A group of records undone and redone as one
    SubJournal(UndoJournal),
    /// Plain property write
    SetProperty(SetPropertyOp),
    /// Start or stop controlling a property
    SetControlled(SetControlledOp),
    /// Switch how a controlled property is driven
    SetControlMethod(SetControlMethodOp),
    /// Change the constant a controller holds for a property
    ConstPropertyChange(ConstPropertyChangeOp),
    /// Add a keyframe
    PathAdd(PathNodeOp),
    /// Remove a keyframe
    PathRemove(PathNodeOp),
    /// Replace a keyframe value
    PathModify(PathModifyOp),
    /// Put an entity into the scene
    AddEntity(EntityOp),
    /// Take an entity out of the scene
    DeleteEntity(EntityOp),
    /// Attach a component
    AddComponent(ComponentOp),
    /// Detach a component
    DeleteComponent(ComponentOp),
    /// Put a controller into the scene
    AddController(ControllerOp),
    /// Take a controller out of the scene
    RemoveController(ControllerOp),
}

impl JournalOp for UndoRedoOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        match self {
            UndoRedoOp::SubJournal(journal) => journal.apply(target),
            UndoRedoOp::SetProperty(op) => op.apply(target),
            UndoRedoOp::SetControlled(op) => op.apply(target),
            UndoRedoOp::SetControlMethod(op) => op.apply(target),
            UndoRedoOp::ConstPropertyChange(op) => op.apply(target),
            UndoRedoOp::PathAdd(op) => op.add(target),
            UndoRedoOp::PathRemove(op) => op.remove(target),
            UndoRedoOp::PathModify(op) => op.apply(target),
            UndoRedoOp::AddEntity(op) => op.add(target),
            UndoRedoOp::DeleteEntity(op) => op.delete(target),
            UndoRedoOp::AddComponent(op) => op.add(target),
            UndoRedoOp::DeleteComponent(op) => op.delete(target),
            UndoRedoOp::AddController(op) => op.add(target),
            UndoRedoOp::RemoveController(op) => op.remove(target),
        }
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        match self {
            UndoRedoOp::SubJournal(journal) => journal.invert(),
            UndoRedoOp::SetProperty(op) => op.invert(),
            UndoRedoOp::SetControlled(op) => op.invert(),
            UndoRedoOp::SetControlMethod(op) => op.invert(),
            UndoRedoOp::ConstPropertyChange(op) => op.invert(),
            UndoRedoOp::PathAdd(op) => Ok(UndoRedoOp::PathRemove(op.clone())),
            UndoRedoOp::PathRemove(op) => {
                if op.value.is_none() {
                    return Err(JournalError::NotInvertible(self.describe()));
                }
                Ok(UndoRedoOp::PathAdd(op.clone()))
            }
            UndoRedoOp::PathModify(op) => op.invert(),
            UndoRedoOp::AddEntity(op) => Ok(UndoRedoOp::DeleteEntity(op.clone())),
            UndoRedoOp::DeleteEntity(op) => Ok(UndoRedoOp::AddEntity(op.clone())),
            UndoRedoOp::AddComponent(op) => Ok(UndoRedoOp::DeleteComponent(op.clone())),
            UndoRedoOp::DeleteComponent(op) => Ok(UndoRedoOp::AddComponent(op.clone())),
            UndoRedoOp::AddController(op) => Ok(UndoRedoOp::RemoveController(op.clone())),
            UndoRedoOp::RemoveController(op) => Ok(UndoRedoOp::AddController(op.clone())),
        }
    }

    fn describe(&self) -> String {
        match self {
            UndoRedoOp::SubJournal(journal) => journal.describe(),
            UndoRedoOp::SetProperty(op) => op.describe(),
            UndoRedoOp::SetControlled(op) => op.describe(),
            UndoRedoOp::SetControlMethod(op) => op.describe(),
            UndoRedoOp::ConstPropertyChange(op) => op.describe(),
            UndoRedoOp::PathAdd(op) => format!("path add {}", op.describe_node()),
            UndoRedoOp::PathRemove(op) => format!("path remove {}", op.describe_node()),
            UndoRedoOp::PathModify(op) => op.describe(),
            UndoRedoOp::AddEntity(op) => format!("add entity {}", op.entity.0),
            UndoRedoOp::DeleteEntity(op) => format!("delete entity {}", op.entity.0),
            UndoRedoOp::AddComponent(op) => format!("add {} component {}", op.kind, op.component.0),
            UndoRedoOp::DeleteComponent(op) => {
                format!("delete {} component {}", op.kind, op.component.0)
            }
            UndoRedoOp::AddController(op) => format!("add controller \"{}\"", op.label),
            UndoRedoOp::RemoveController(op) => format!("remove controller \"{}\"", op.label),
        }
    }
}

impl fmt::Display for UndoRedoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A plain property write
#[derive(Debug, Clone, PartialEq)]
pub struct SetPropertyOp {
    /// Written property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Value before the edit
    pub value0: Boxed,
    /// Value after the edit
    pub value1: Boxed,
}

impl JournalOp for SetPropertyOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.set_property(self.property, &self.value1)?;
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        Ok(UndoRedoOp::SetProperty(SetPropertyOp {
            property: self.property,
            name: self.name.clone(),
            value0: self.value1.clone(),
            value1: self.value0.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("set property {} = {} (was {})", self.name, self.value1, self.value0)
    }
}

/// A change of the constant a controller holds for a property
#[derive(Debug, Clone, PartialEq)]
pub struct ConstPropertyChangeOp {
    /// Controller holding the record
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub controller_label: String,
    /// Controlled property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Constant before the edit
    pub value0: Boxed,
    /// Constant after the edit
    pub value1: Boxed,
}

impl JournalOp for ConstPropertyChangeOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.controller_set_const(self.controller, self.property, &self.value1)?;
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        Ok(UndoRedoOp::ConstPropertyChange(ConstPropertyChangeOp {
            value0: self.value1.clone(),
            value1: self.value0.clone(),
            ..self.clone()
        }))
    }

    fn describe(&self) -> String {
        format!(
            "set constant \"{}\".{} = {} (was {})",
            self.controller_label, self.name, self.value1, self.value0
        )
    }
}

/// A keyframe added or removed.
///
/// `t` is absolute controller time. A removal logged before the node
/// was ever removed has no `value` yet; it is captured on first apply.
#[derive(Debug, Clone, PartialEq)]
pub struct PathNodeOp {
    /// Controller holding the path
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub controller_label: String,
    /// Animated property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Absolute keyframe time
    pub t: f32,
    /// Keyframe value, if known
    pub value: Option<Boxed>,
}

impl PathNodeOp {
    fn add(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        let value = self.value.as_ref().ok_or(JournalError::MissingPathValue)?;
        target.controller_path_add_node(self.controller, self.property, self.t, value)?;
        Ok(())
    }

    fn remove(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        if self.value.is_none() {
            self.value = target.controller_box_path_value(self.controller, self.property, self.t);
        }
        target.controller_path_delete_node(self.controller, self.property, self.t)?;
        Ok(())
    }

    fn describe_node(&self) -> String {
        let value = self
            .value
            .as_ref()
            .map_or_else(|| "?".to_owned(), Boxed::to_string);
        format!("\"{}\".{} @ {} = {}", self.controller_label, self.name, self.t, value)
    }
}

/// A keyframe value replaced in place
#[derive(Debug, Clone, PartialEq)]
pub struct PathModifyOp {
    /// Controller holding the path
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub controller_label: String,
    /// Animated property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Absolute keyframe time
    pub t: f32,
    /// Keyframe value before the edit
    pub value0: Boxed,
    /// Keyframe value after the edit
    pub value1: Boxed,
}

impl JournalOp for PathModifyOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.controller_path_set_node(self.controller, self.property, self.t, &self.value1)?;
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        Ok(UndoRedoOp::PathModify(PathModifyOp {
            value0: self.value1.clone(),
            value1: self.value0.clone(),
            ..self.clone()
        }))
    }

    fn describe(&self) -> String {
        format!(
            "path modify \"{}\".{} @ {} = {} (was {})",
            self.controller_label, self.name, self.t, self.value1, self.value0
        )
    }
}

/// Start or stop a controller tracking a property
#[derive(Debug, Clone, PartialEq)]
pub struct SetControlledOp {
    /// Controller
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub controller_label: String,
    /// Property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Whether the property becomes controlled
    pub value: bool,
}

impl JournalOp for SetControlledOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        if self.value {
            target.controller_add_property(self.controller, self.property)?;
        } else {
            target.controller_remove_property(self.controller, self.property)?;
        }
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        Ok(UndoRedoOp::SetControlled(SetControlledOp {
            value: !self.value,
            ..self.clone()
        }))
    }

    fn describe(&self) -> String {
        format!(
            "{} \"{}\".{}",
            if self.value { "control" } else { "uncontrol" },
            self.controller_label,
            self.name
        )
    }
}

/// A switch of how a controlled property is driven
#[derive(Debug, Clone, PartialEq)]
pub struct SetControlMethodOp {
    /// Controller
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub controller_label: String,
    /// Property
    pub property: PropertyId,
    /// Property name, for dumps
    pub name: String,
    /// Method before the edit
    pub prev_method: ControllerMethod,
    /// Method after the edit
    pub method: ControllerMethod,
}

impl JournalOp for SetControlMethodOp {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.controller_set_method(self.controller, self.property, self.method)?;
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        Ok(UndoRedoOp::SetControlMethod(SetControlMethodOp {
            prev_method: self.method,
            method: self.prev_method,
            ..self.clone()
        }))
    }

    fn describe(&self) -> String {
        format!(
            "set method \"{}\".{} = {} (was {})",
            self.controller_label,
            self.name,
            self.method.name(),
            self.prev_method.name()
        )
    }
}

/// An entity put into or taken out of the scene.
///
/// `controller_properties` is `None` until the first delete saves the
/// controller records that referenced the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOp {
    /// Parent the entity is attached under
    pub parent: Option<EntityId>,
    /// The entity
    pub entity: EntityId,
    /// Saved controller records
    pub controller_properties: Option<Vec<ControllerPropertyState>>,
}

impl EntityOp {
    fn add(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.add_entity(self.parent, self.entity)?;
        if let Some(states) = &self.controller_properties {
            restore_controller_properties(target, states)?;
        }
        Ok(())
    }

    fn delete(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        let states = self
            .controller_properties
            .get_or_insert_with(|| target.save_controller_properties(self.entity.object()));
        target.delete_entity(self.entity)?;
        remove_controller_properties(target, states)
    }
}

/// A component attached to or detached from an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentOp {
    /// Owning entity
    pub entity: EntityId,
    /// The component
    pub component: ComponentId,
    /// Component kind, for dumps
    pub kind: String,
    /// Saved controller records
    pub controller_properties: Option<Vec<ControllerPropertyState>>,
}

impl ComponentOp {
    fn add(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.add_component(self.entity, self.component)?;
        if let Some(states) = &self.controller_properties {
            restore_controller_properties(target, states)?;
        }
        Ok(())
    }

    fn delete(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        let states = self
            .controller_properties
            .get_or_insert_with(|| target.save_controller_properties(self.component.object()));
        remove_controller_properties(target, states)?;
        target.delete_component(self.component)?;
        Ok(())
    }
}

/// A controller put into or taken out of the scene
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOp {
    /// The controller
    pub controller: ControllerId,
    /// Controller label, for dumps
    pub label: String,
    /// Saved records of other controllers animating this one
    pub controller_properties: Option<Vec<ControllerPropertyState>>,
}

impl ControllerOp {
    fn add(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        target.add_controller(self.controller)?;
        target.controller_set_suspended(self.controller, false)?;
        if let Some(states) = &self.controller_properties {
            restore_controller_properties(target, states)?;
        }
        Ok(())
    }

    fn remove(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        let states = self
            .controller_properties
            .get_or_insert_with(|| target.save_controller_properties(controller_object(self.controller)));
        target.controller_set_suspended(self.controller, true)?;
        remove_controller_properties(target, states)?;
        target.delete_controller(self.controller)?;
        Ok(())
    }
}

impl JournalOp for UndoJournal {
    fn apply(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        for record in self.undo_ops_mut() {
            record.op.apply(target)?;
        }
        Ok(())
    }

    fn invert(&self) -> Result<UndoRedoOp> {
        let mut inverse = UndoJournal::new(false);
        for record in self.undo_ops().rev() {
            inverse.push_record(UndoRedo::new(record.op.invert()?, false));
        }
        Ok(UndoRedoOp::SubJournal(inverse))
    }

    fn describe(&self) -> String {
        format!("sub journal ({} ops)", self.undo_depth())
    }
}

fn restore_controller_properties(
    target: &mut dyn EditTarget,
    states: &[ControllerPropertyState],
) -> Result<()> {
    for state in states {
        for snapshot in &state.properties {
            target.controller_restore_property(state.controller, snapshot)?;
        }
    }
    Ok(())
}

fn remove_controller_properties(
    target: &mut dyn EditTarget,
    states: &[ControllerPropertyState],
) -> Result<()> {
    for state in states {
        for snapshot in &state.properties {
            target.controller_remove_property(state.controller, snapshot.property)?;
        }
    }
    Ok(())
}
