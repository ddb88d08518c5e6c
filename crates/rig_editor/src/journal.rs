// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo journal.
//!
//! The journal keeps two stacks of [`UndoRedo`] records. Logging an edit
//! applies it (when the journal applies on insert) and pushes it onto the
//! undo stack; undo reverts the newest record and moves it to the redo
//! stack. Logging a new edit while redos are pending keeps them in history:
//! the redo records are replayed onto the undo stack followed by their
//! inverses, so every state ever reached stays reachable by undo.
//!
//! Continuous edits of one target (a drag, a slider) coalesce: a mergable
//! edit matching the newest mergable record reverts that record and
//! re-inserts it with the new "after" value.
//!
//! Records are grouped with sub-journals, which undo and redo as one step.

use crate::config::JournalSettings;
use crate::scene::{ComponentId, EditTarget, EntityId, SceneError};
use crate::undo_redo::{
    ComponentOp, ConstPropertyChangeOp, ControllerOp, EntityOp, JournalOp, PathModifyOp,
    PathNodeOp, SetControlMethodOp, SetControlledOp, SetPropertyOp, UndoRedo, UndoRedoOp,
};
use rig_animation::{Boxed, Controller, ControllerId, ControllerMethod, PropData, PropertyId};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Journal errors
#[derive(Debug, Error)]
pub enum JournalError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Edits are refused in play mode
    #[error("Edits are refused in play mode")]
    PlayMode,

    /// The record can't be inverted yet
    #[error("Operation can't be inverted: {0}")]
    NotInvertible(String),

    /// A keyframe add without a value
    #[error("Path add has no value")]
    MissingPathValue,

    /// Property not found
    #[error("Property not found: {0:?}")]
    PropertyNotFound(PropertyId),

    /// The controller doesn't track the property
    #[error("Controller {controller:?} doesn't control {property:?}")]
    PropertyNotControlled {
        /// Controller
        controller: ControllerId,
        /// Property
        property: PropertyId,
    },

    /// A sub-journal that applies on insert was logged into one that doesn't
    #[error("Sub-journal applies on insert but the parent journal doesn't")]
    SubjournalApplies,

    /// Scene error
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Result type for journal operations
pub type Result<T> = std::result::Result<T, JournalError>;

/// Undo and redo stacks over an edit target
#[derive(Debug, Clone, PartialEq)]
pub struct UndoJournal {
    undo_ops: VecDeque<UndoRedo>,
    redo_ops: VecDeque<UndoRedo>,
    apply_on_insert: bool,
    max_depth: usize,
    dump_on_change: bool,
}

impl Default for UndoJournal {
    fn default() -> Self {
        Self::with_settings(&JournalSettings::default())
    }
}

impl UndoJournal {
    /// Create an unbounded journal that dumps itself after every change
    pub fn new(apply_on_insert: bool) -> Self {
        Self {
            undo_ops: VecDeque::new(),
            redo_ops: VecDeque::new(),
            apply_on_insert,
            max_depth: 0,
            dump_on_change: true,
        }
    }

    /// Create a journal from settings
    pub fn with_settings(settings: &JournalSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
            dump_on_change: settings.dump_on_change,
            ..Self::new(settings.apply_on_insert)
        }
    }

    /// Whether logged edits are applied immediately
    pub fn apply_on_insert(&self) -> bool {
        self.apply_on_insert
    }

    /// Set whether logged edits are applied immediately
    pub fn set_apply_on_insert(&mut self, apply_on_insert: bool) {
        self.apply_on_insert = apply_on_insert;
    }

    /// Whether the journal is dumped at debug level after each change
    pub fn dump_on_change(&self) -> bool {
        self.dump_on_change
    }

    /// Set whether the journal is dumped after each change
    pub fn set_dump_on_change(&mut self, dump_on_change: bool) {
        self.dump_on_change = dump_on_change;
    }

    /// Maximum undo depth, 0 for unbounded
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Set the maximum undo depth, dropping the oldest records past it
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
        self.trim();
    }

    /// Check if both stacks are empty
    pub fn is_empty(&self) -> bool {
        self.undo_ops.is_empty() && self.redo_ops.is_empty()
    }

    /// Check if there's something to undo
    pub fn can_undo(&self) -> bool {
        !self.undo_ops.is_empty()
    }

    /// Check if there's something to redo
    pub fn can_redo(&self) -> bool {
        !self.redo_ops.is_empty()
    }

    /// Get the undo stack depth
    pub fn undo_depth(&self) -> usize {
        self.undo_ops.len()
    }

    /// Get the redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.redo_ops.len()
    }

    /// Iterate over undo records, oldest first
    pub fn undo_ops(&self) -> impl DoubleEndedIterator<Item = &UndoRedo> {
        self.undo_ops.iter()
    }

    /// Iterate over redo records, oldest first
    pub fn redo_ops(&self) -> impl DoubleEndedIterator<Item = &UndoRedo> {
        self.redo_ops.iter()
    }

    pub(crate) fn undo_ops_mut(&mut self) -> impl Iterator<Item = &mut UndoRedo> {
        self.undo_ops.iter_mut()
    }

    /// Append a record without applying it or touching the redo stack
    pub(crate) fn push_record(&mut self, record: UndoRedo) {
        self.undo_ops.push_back(record);
    }

    /// Log the dump at debug level
    pub fn dump(&self) {
        tracing::debug!("{}", self);
    }

    /// Undo the newest record
    pub fn undo(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        check_editable(target)?;
        let record = self.revert(target)?;
        tracing::debug!("Undo: {}", record.op);
        self.redo_ops.push_back(record);
        self.dump_changed();
        Ok(())
    }

    /// Redo the newest undone record
    pub fn redo(&mut self, target: &mut dyn EditTarget) -> Result<()> {
        check_editable(target)?;
        let mut record = self.redo_ops.pop_back().ok_or(JournalError::NothingToRedo)?;

        if let Err(err) = record.op.apply(target) {
            self.redo_ops.push_back(record);
            return Err(err);
        }

        tracing::debug!("Redo: {}", record.op);
        self.undo_ops.push_back(record);
        self.dump_changed();
        Ok(())
    }

    /// Log a property write
    pub fn set_property(
        &mut self,
        target: &mut dyn EditTarget,
        mergable: bool,
        property: PropertyId,
        value: Boxed,
    ) -> Result<()> {
        check_editable(target)?;
        let current = target
            .property(property)
            .ok_or(JournalError::PropertyNotFound(property))?;
        let name = current.spec.name.clone();
        let value0 = current.value().clone();

        if mergable {
            let merged = self.take_mergable(target, |op| {
                matches!(op, UndoRedoOp::SetProperty(o) if o.property == property)
            });
            if let Some(mut record) = merged {
                if let UndoRedoOp::SetProperty(op) = &mut record.op {
                    op.value1 = value;
                }
                return self.insert(target, record);
            }
        }

        let op = SetPropertyOp {
            property,
            name,
            value0,
            value1: value,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::SetProperty(op), mergable))
    }

    /// Log a change of the constant a controller holds for a property
    pub fn set_controller_constant(
        &mut self,
        target: &mut dyn EditTarget,
        mergable: bool,
        controller: ControllerId,
        property: PropertyId,
        value: Boxed,
    ) -> Result<()> {
        check_editable(target)?;
        let (controller_label, name, prop) = controlled(target, controller, property)?;
        let value0 = prop.constant_value.clone();

        if mergable {
            let merged = self.take_mergable(target, |op| {
                matches!(op, UndoRedoOp::ConstPropertyChange(o)
                    if o.controller == controller && o.property == property)
            });
            if let Some(mut record) = merged {
                if let UndoRedoOp::ConstPropertyChange(op) = &mut record.op {
                    op.value1 = value;
                }
                return self.insert(target, record);
            }
        }

        let op = ConstPropertyChangeOp {
            controller,
            controller_label,
            property,
            name,
            value0,
            value1: value,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::ConstPropertyChange(op), mergable))
    }

    /// Log setting a keyframe at absolute time `t`, adding or replacing it
    pub fn set_controller_path_node_value(
        &mut self,
        target: &mut dyn EditTarget,
        mergable: bool,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
        value: Boxed,
    ) -> Result<()> {
        check_editable(target)?;
        let (controller_label, name, _) = controlled(target, controller, property)?;
        let existing = target
            .controller(controller)
            .and_then(|record| record.find_path_node(property, t))
            .map(|node| node.value.clone());

        if mergable {
            let merged = self.take_mergable(target, |op| match op {
                UndoRedoOp::PathAdd(o) => o.controller == controller && o.property == property && o.t == t,
                UndoRedoOp::PathModify(o) => {
                    o.controller == controller && o.property == property && o.t == t
                }
                _ => false,
            });
            if let Some(mut record) = merged {
                match &mut record.op {
                    UndoRedoOp::PathAdd(op) => op.value = Some(value),
                    UndoRedoOp::PathModify(op) => op.value1 = value,
                    _ => {}
                }
                return self.insert(target, record);
            }
        }

        let op = match existing {
            Some(value0) => UndoRedoOp::PathModify(PathModifyOp {
                controller,
                controller_label,
                property,
                name,
                t,
                value0,
                value1: value,
            }),
            None => UndoRedoOp::PathAdd(PathNodeOp {
                controller,
                controller_label,
                property,
                name,
                t,
                value: Some(value),
            }),
        };
        self.insert(target, UndoRedo::new(op, mergable))
    }

    /// Log removing the keyframe nearest to absolute time `t`.
    ///
    /// Nothing is logged when the path has no keyframes.
    pub fn remove_controller_path_node(
        &mut self,
        target: &mut dyn EditTarget,
        controller: ControllerId,
        property: PropertyId,
        t: f32,
    ) -> Result<()> {
        check_editable(target)?;
        let (controller_label, name, _) = controlled(target, controller, property)?;
        if target.controller_box_path_value(controller, property, t).is_none() {
            tracing::debug!("No keyframe of {}.{} to remove", controller_label, name);
            return Ok(());
        }
        let op = PathNodeOp {
            controller,
            controller_label,
            property,
            name,
            t,
            value: None,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::PathRemove(op), false))
    }

    /// Log starting or stopping control of a property
    pub fn set_controlled(
        &mut self,
        target: &mut dyn EditTarget,
        controller: ControllerId,
        property: PropertyId,
        value: bool,
    ) -> Result<()> {
        check_editable(target)?;
        let controller_label = target
            .controller(controller)
            .ok_or(SceneError::ControllerNotFound(controller))?
            .label()
            .to_owned();
        let name = property_name(target, property)?;
        let op = SetControlledOp {
            controller,
            controller_label,
            property,
            name,
            value,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::SetControlled(op), false))
    }

    /// Log switching how a controlled property is driven
    pub fn set_control_method(
        &mut self,
        target: &mut dyn EditTarget,
        controller: ControllerId,
        property: PropertyId,
        method: ControllerMethod,
    ) -> Result<()> {
        check_editable(target)?;
        let (controller_label, name, prop) = controlled(target, controller, property)?;
        let op = SetControlMethodOp {
            controller,
            controller_label,
            property,
            name,
            prev_method: prop.method,
            method,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::SetControlMethod(op), false))
    }

    /// Log putting a detached entity into the scene
    pub fn add_entity(
        &mut self,
        target: &mut dyn EditTarget,
        parent: Option<EntityId>,
        entity: EntityId,
    ) -> Result<()> {
        let op = EntityOp {
            parent,
            entity,
            controller_properties: Some(Vec::new()),
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::AddEntity(op), false))
    }

    /// Log deleting an entity.
    ///
    /// Children and components are deleted first, all grouped in one
    /// sub-journal so the whole subtree comes back in one undo step.
    pub fn delete_entity(&mut self, target: &mut dyn EditTarget, entity: EntityId) -> Result<()> {
        check_editable(target)?;
        let mut sub = UndoJournal::new(false);
        sub.log_entity_deletion(target, entity)?;
        self.log_subjournal(target, sub)
    }

    fn log_entity_deletion(&mut self, target: &mut dyn EditTarget, entity: EntityId) -> Result<()> {
        let record = target.entity(entity).ok_or(SceneError::EntityNotFound(entity))?;
        let parent = record.parent;
        let children = record.children.clone();
        let components = record.components.clone();

        for child in children {
            self.log_entity_deletion(target, child)?;
        }
        for component in components {
            self.delete_component(target, component)?;
        }

        let op = EntityOp {
            parent,
            entity,
            controller_properties: None,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::DeleteEntity(op), false))
    }

    /// Log attaching a detached component to an entity
    pub fn add_component(
        &mut self,
        target: &mut dyn EditTarget,
        entity: EntityId,
        component: ComponentId,
        kind: impl Into<String>,
    ) -> Result<()> {
        let op = ComponentOp {
            entity,
            component,
            kind: kind.into(),
            controller_properties: Some(Vec::new()),
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::AddComponent(op), false))
    }

    /// Log deleting a component
    pub fn delete_component(&mut self, target: &mut dyn EditTarget, component: ComponentId) -> Result<()> {
        let record = target
            .component(component)
            .ok_or(SceneError::ComponentNotFound(component))?;
        let entity = record.entity.ok_or(SceneError::ComponentNotFound(component))?;
        let op = ComponentOp {
            entity,
            component,
            kind: record.kind.clone(),
            controller_properties: None,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::DeleteComponent(op), false))
    }

    /// Log putting a detached controller into the scene
    pub fn log_add_controller(
        &mut self,
        target: &mut dyn EditTarget,
        controller: ControllerId,
        label: impl Into<String>,
    ) -> Result<()> {
        let op = ControllerOp {
            controller,
            label: label.into(),
            controller_properties: Some(Vec::new()),
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::AddController(op), false))
    }

    /// Log taking a controller out of the scene
    pub fn log_remove_controller(&mut self, target: &mut dyn EditTarget, controller: ControllerId) -> Result<()> {
        let label = target
            .controller(controller)
            .ok_or(SceneError::ControllerNotFound(controller))?
            .label()
            .to_owned();
        let op = ControllerOp {
            controller,
            label,
            controller_properties: None,
        };
        self.insert(target, UndoRedo::new(UndoRedoOp::RemoveController(op), false))
    }

    /// Log a group of records as one undo step.
    ///
    /// A sub-journal that already applied its records can only go into a
    /// journal that applies on insert, which then skips applying it again.
    pub fn log_subjournal(&mut self, target: &mut dyn EditTarget, subjournal: UndoJournal) -> Result<()> {
        if subjournal.apply_on_insert && !self.apply_on_insert {
            return Err(JournalError::SubjournalApplies);
        }
        self.insert(target, UndoRedo::new(UndoRedoOp::SubJournal(subjournal), false))
    }

    fn insert(&mut self, target: &mut dyn EditTarget, mut record: UndoRedo) -> Result<()> {
        if target.play_mode() {
            tracing::warn!("Refusing to log \"{}\" in play mode", record.op);
            return Err(JournalError::PlayMode);
        }

        self.flush_redos();

        let applied = matches!(&record.op, UndoRedoOp::SubJournal(sub) if sub.apply_on_insert);
        if self.apply_on_insert && !applied {
            record.op.apply(target)?;
        }

        self.undo_ops.push_back(record);
        self.trim();
        self.dump_changed();
        Ok(())
    }

    /// Move pending redos back onto the undo stack followed by their inverses
    fn flush_redos(&mut self) {
        if self.redo_ops.is_empty() {
            return;
        }

        let redos: Vec<UndoRedo> = self.redo_ops.drain(..).collect();
        let inverses: Vec<UndoRedo> = redos
            .iter()
            .filter_map(|record| match record.op.invert() {
                Ok(op) => Some(UndoRedo::new(op, false)),
                Err(err) => {
                    tracing::warn!("Dropping redo history: {}", err);
                    None
                }
            })
            .collect();

        self.undo_ops.extend(redos.into_iter().rev().map(|mut record| {
            record.mergable = false;
            record
        }));
        self.undo_ops.extend(inverses);
    }

    /// Take back the newest record and pop it
    fn revert(&mut self, target: &mut dyn EditTarget) -> Result<UndoRedo> {
        let record = self.undo_ops.back().ok_or(JournalError::NothingToUndo)?;

        if self.apply_on_insert {
            let mut inverse = record.op.invert()?;
            inverse.apply(target)?;
        }

        self.undo_ops.pop_back().ok_or(JournalError::NothingToUndo)
    }

    /// Revert and pop the newest record if a mergable edit matches it
    fn take_mergable(
        &mut self,
        target: &mut dyn EditTarget,
        matches: impl Fn(&UndoRedoOp) -> bool,
    ) -> Option<UndoRedo> {
        if !self.redo_ops.is_empty() {
            return None;
        }
        let newest = self.undo_ops.back()?;
        if !newest.mergable || !matches(&newest.op) {
            return None;
        }

        match self.revert(target) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("Can't merge into \"{}\": {}", newest_description(self), err);
                None
            }
        }
    }

    fn trim(&mut self) {
        if self.max_depth == 0 {
            return;
        }
        while self.undo_ops.len() > self.max_depth {
            self.undo_ops.pop_front();
        }
    }

    fn dump_changed(&self) {
        if self.dump_on_change {
            self.dump();
        }
    }

    fn write_ops(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for record in &self.redo_ops {
            write_record(f, record, depth)?;
        }

        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}REDO OPS")?;
        writeln!(f, "{indent}<-----")?;
        writeln!(f, "{indent}UNDO OPS")?;

        for record in self.undo_ops.iter().rev() {
            write_record(f, record, depth)?;
        }
        Ok(())
    }
}

impl fmt::Display for UndoJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Undo journal (apply on insert: {}, {} undo, {} redo)",
            self.apply_on_insert,
            self.undo_ops.len(),
            self.redo_ops.len()
        )?;
        self.write_ops(f, 0)
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &UndoRedo, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    let mergable = if record.mergable { " [mergable]" } else { "" };
    writeln!(f, "{indent}{}{mergable}", record.op)?;
    if let UndoRedoOp::SubJournal(sub) = &record.op {
        sub.write_ops(f, depth + 1)?;
    }
    Ok(())
}

fn newest_description(journal: &UndoJournal) -> String {
    journal
        .undo_ops
        .back()
        .map(|record| record.op.to_string())
        .unwrap_or_default()
}

fn check_editable(target: &dyn EditTarget) -> Result<()> {
    if target.play_mode() {
        tracing::warn!("Edits are refused in play mode");
        return Err(JournalError::PlayMode);
    }
    Ok(())
}

fn property_name(target: &dyn EditTarget, property: PropertyId) -> Result<String> {
    target
        .property(property)
        .map(|p| p.spec.name.clone())
        .ok_or(JournalError::PropertyNotFound(property))
}

/// Controller label, property name and a copy of the controller's record
fn controlled(
    target: &dyn EditTarget,
    controller: ControllerId,
    property: PropertyId,
) -> Result<(String, String, PropData)> {
    let record: &Controller = target
        .controller(controller)
        .ok_or(SceneError::ControllerNotFound(controller))?;
    let prop = record
        .find_prop_data(property)
        .ok_or(JournalError::PropertyNotControlled { controller, property })?;
    Ok((record.label().to_owned(), property_name(target, property)?, prop.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use rig_animation::{PropertySpec, PropertyType};

    struct Fixture {
        scene: Scene,
        journal: UndoJournal,
        entity: EntityId,
        x: PropertyId,
        controller: ControllerId,
    }

    fn fixture() -> Fixture {
        let mut scene = Scene::new();
        let entity = scene.spawn_entity("cube", None).unwrap();
        let x = scene
            .add_property(entity.object(), PropertySpec::new("x", PropertyType::Float), Boxed::Float(1.0))
            .unwrap();
        let controller = scene.spawn_controller("main");
        Fixture {
            scene,
            journal: UndoJournal::new(true),
            entity,
            x,
            controller,
        }
    }

    fn value(f: &Fixture) -> Boxed {
        f.scene.property_value(f.x).unwrap()
    }

    #[test]
    fn test_empty_journal() {
        let mut f = fixture();
        assert!(f.journal.is_empty());
        assert!(matches!(f.journal.undo(&mut f.scene), Err(JournalError::NothingToUndo)));
        assert!(matches!(f.journal.redo(&mut f.scene), Err(JournalError::NothingToRedo)));
    }

    #[test]
    fn test_mergable_set_property_coalesces() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, true, f.x, Boxed::Float(2.0)).unwrap();
        f.journal.set_property(&mut f.scene, true, f.x, Boxed::Float(3.0)).unwrap();

        assert_eq!(f.journal.undo_depth(), 1);
        let Some(UndoRedo { op: UndoRedoOp::SetProperty(op), .. }) = f.journal.undo_ops().next() else {
            panic!("expected a set property record");
        };
        assert_eq!(op.value0, Boxed::Float(1.0));
        assert_eq!(op.value1, Boxed::Float(3.0));
        assert_eq!(value(&f), Boxed::Float(3.0));

        f.journal.undo(&mut f.scene).unwrap();
        assert_eq!(value(&f), Boxed::Float(1.0));
    }

    #[test]
    fn test_unmergable_edits_stack() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        f.journal.set_property(&mut f.scene, true, f.x, Boxed::Float(3.0)).unwrap();
        assert_eq!(f.journal.undo_depth(), 2);
    }

    #[test]
    fn test_round_trip() {
        let mut f = fixture();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        f.journal
            .set_control_method(&mut f.scene, f.controller, f.x, ControllerMethod::Path)
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 0.0, Boxed::Float(0.0))
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 4.0, Boxed::Float(8.0))
            .unwrap();
        f.journal
            .set_controller_constant(&mut f.scene, false, f.controller, f.x, Boxed::Float(5.0))
            .unwrap();

        let prop = |f: &Fixture| f.scene.controller(f.controller).unwrap().find_prop_data(f.x).map(|p| p.snapshot());
        let after = prop(&f);
        let length = f.scene.controller(f.controller).unwrap().length();
        assert_eq!(length, 4.0);

        for _ in 0..5 {
            f.journal.undo(&mut f.scene).unwrap();
        }
        assert!(prop(&f).is_none());

        for _ in 0..5 {
            f.journal.redo(&mut f.scene).unwrap();
        }
        assert_eq!(prop(&f), after);
        assert_eq!(f.scene.controller(f.controller).unwrap().length(), length);
    }

    #[test]
    fn test_path_node_modify_and_merge() {
        let mut f = fixture();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 2.0, Boxed::Float(1.0))
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, true, f.controller, f.x, 2.0, Boxed::Float(2.0))
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, true, f.controller, f.x, 2.0, Boxed::Float(3.0))
            .unwrap();

        assert_eq!(f.journal.undo_depth(), 3);
        assert!(matches!(
            f.journal.undo_ops().last().map(|r| &r.op),
            Some(UndoRedoOp::PathModify(op)) if op.value0 == Boxed::Float(1.0) && op.value1 == Boxed::Float(3.0)
        ));

        f.journal.undo(&mut f.scene).unwrap();
        assert_eq!(
            f.scene.controller_box_path_value(f.controller, f.x, 2.0),
            Some(Boxed::Float(1.0))
        );
    }

    #[test]
    fn test_remove_path_node_undo() {
        let mut f = fixture();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 1.0, Boxed::Float(7.0))
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 3.0, Boxed::Float(9.0))
            .unwrap();

        f.journal.remove_controller_path_node(&mut f.scene, f.controller, f.x, 3.0).unwrap();
        assert_eq!(f.scene.controller(f.controller).unwrap().length(), 1.0);

        f.journal.undo(&mut f.scene).unwrap();
        let controller = f.scene.controller(f.controller).unwrap();
        assert_eq!(controller.length(), 3.0);
        assert_eq!(controller.box_path_value(f.x, 3.0), Some(Boxed::Float(9.0)));
        assert_eq!(controller.box_path_value(f.x, 1.0), Some(Boxed::Float(7.0)));
    }

    #[test]
    fn test_keyframe_past_empty_length_is_an_add() {
        let mut f = fixture();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 0.0, Boxed::Float(0.0))
            .unwrap();
        f.journal
            .set_controller_path_node_value(&mut f.scene, false, f.controller, f.x, 4.0, Boxed::Float(8.0))
            .unwrap();
        assert!(matches!(
            f.journal.undo_ops().last().map(|r| &r.op),
            Some(UndoRedoOp::PathAdd(op)) if op.t == 4.0
        ));

        f.journal.undo(&mut f.scene).unwrap();
        let controller = f.scene.controller(f.controller).unwrap();
        let path = controller.find_prop_data(f.x).unwrap().path.as_ref().unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.nodes()[0].value, Boxed::Float(0.0));
    }

    #[test]
    fn test_remove_from_empty_path_logs_nothing() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        let depth = f.journal.undo_depth();

        f.journal.remove_controller_path_node(&mut f.scene, f.controller, f.x, 1.0).unwrap();
        assert_eq!(f.journal.undo_depth(), depth);

        f.journal.undo(&mut f.scene).unwrap();
        f.journal.undo(&mut f.scene).unwrap();
        assert_eq!(value(&f), Boxed::Float(1.0));
        assert!(matches!(f.journal.undo(&mut f.scene), Err(JournalError::NothingToUndo)));
    }

    #[test]
    fn test_dump_on_change_defaults() {
        let mut journal = UndoJournal::new(true);
        assert!(journal.dump_on_change());
        journal.set_dump_on_change(false);
        assert!(!journal.dump_on_change());

        let settings = JournalSettings {
            dump_on_change: false,
            ..JournalSettings::default()
        };
        assert!(!UndoJournal::with_settings(&settings).dump_on_change());
    }

    #[test]
    fn test_new_edit_keeps_undone_history() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(3.0)).unwrap();
        f.journal.undo(&mut f.scene).unwrap();
        f.journal.undo(&mut f.scene).unwrap();
        assert_eq!(f.journal.redo_depth(), 2);

        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(4.0)).unwrap();
        assert_eq!(f.journal.redo_depth(), 0);
        assert_eq!(f.journal.undo_depth(), 5);

        let mut seen = Vec::new();
        while f.journal.can_undo() {
            f.journal.undo(&mut f.scene).unwrap();
            seen.push(value(&f));
        }
        let floats: Vec<f32> = seen.iter().filter_map(Boxed::as_float).collect();
        assert_eq!(floats, vec![1.0, 2.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_play_mode_refuses_edits() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        f.scene.set_play_mode(true);

        assert!(matches!(
            f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(3.0)),
            Err(JournalError::PlayMode)
        ));
        assert!(matches!(f.journal.undo(&mut f.scene), Err(JournalError::PlayMode)));
        assert_eq!(value(&f), Boxed::Float(2.0));
        assert_eq!(f.journal.undo_depth(), 1);
    }

    #[test]
    fn test_max_depth_drops_oldest() {
        let mut f = fixture();
        f.journal.set_max_depth(2);
        for v in [2.0, 3.0, 4.0] {
            f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(v)).unwrap();
        }
        assert_eq!(f.journal.undo_depth(), 2);

        f.journal.undo(&mut f.scene).unwrap();
        f.journal.undo(&mut f.scene).unwrap();
        assert!(!f.journal.can_undo());
        assert_eq!(value(&f), Boxed::Float(2.0));
    }

    #[test]
    fn test_delete_entity_restores_controller_records() {
        let mut f = fixture();
        let light = f.scene.spawn_component(f.entity, "light").unwrap();
        let intensity = f
            .scene
            .add_property(light.object(), PropertySpec::new("intensity", PropertyType::Float), Boxed::Float(1.0))
            .unwrap();
        for property in [f.x, intensity] {
            f.journal.set_controlled(&mut f.scene, f.controller, property, true).unwrap();
            f.journal
                .set_control_method(&mut f.scene, f.controller, property, ControllerMethod::Path)
                .unwrap();
            f.journal
                .set_controller_path_node_value(&mut f.scene, false, f.controller, property, 0.5, Boxed::Float(3.0))
                .unwrap();
            f.journal
                .set_controller_path_node_value(&mut f.scene, false, f.controller, property, 2.0, Boxed::Float(6.0))
                .unwrap();
        }
        let before: Vec<_> = f
            .scene
            .controller(f.controller)
            .unwrap()
            .properties()
            .map(|p| p.snapshot())
            .collect();

        f.journal.delete_entity(&mut f.scene, f.entity).unwrap();
        assert!(f.scene.entity(f.entity).is_none());
        assert!(f.scene.component(light).is_none());
        assert_eq!(f.scene.controller(f.controller).unwrap().properties().count(), 0);

        f.journal.undo(&mut f.scene).unwrap();
        assert!(f.scene.entity(f.entity).is_some());
        let mut after: Vec<_> = f
            .scene
            .controller(f.controller)
            .unwrap()
            .properties()
            .map(|p| p.snapshot())
            .collect();
        after.sort_by_key(|p| before.iter().position(|b| b.property == p.property));
        assert_eq!(after, before);

        f.journal.redo(&mut f.scene).unwrap();
        assert!(f.scene.entity(f.entity).is_none());
    }

    #[test]
    fn test_applied_subjournal_needs_applying_parent() {
        let mut f = fixture();
        let sub = UndoJournal::new(true);
        let mut parent = UndoJournal::new(false);
        assert!(matches!(
            parent.log_subjournal(&mut f.scene, sub),
            Err(JournalError::SubjournalApplies)
        ));
    }

    #[test]
    fn test_applied_subjournal_is_not_reapplied() {
        let mut f = fixture();
        let mut sub = UndoJournal::new(true);
        sub.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        sub.set_property(&mut f.scene, false, f.x, Boxed::Float(5.0)).unwrap();

        f.journal.log_subjournal(&mut f.scene, sub).unwrap();
        assert_eq!(f.journal.undo_depth(), 1);
        assert_eq!(value(&f), Boxed::Float(5.0));

        f.journal.undo(&mut f.scene).unwrap();
        assert_eq!(value(&f), Boxed::Float(1.0));
        f.journal.redo(&mut f.scene).unwrap();
        assert_eq!(value(&f), Boxed::Float(5.0));
    }

    #[test]
    fn test_remove_controller_round_trip() {
        let mut f = fixture();
        f.journal.set_controlled(&mut f.scene, f.controller, f.x, true).unwrap();
        f.scene.set_controller_active(f.controller, true).unwrap();
        assert!(f.scene.set_property(f.x, &Boxed::Float(9.0)).is_err());

        f.journal.log_remove_controller(&mut f.scene, f.controller).unwrap();
        assert!(f.scene.controller(f.controller).is_none());
        assert!(f.scene.set_property(f.x, &Boxed::Float(9.0)).is_ok());

        f.journal.undo(&mut f.scene).unwrap();
        let controller = f.scene.controller(f.controller).unwrap();
        assert!(!controller.is_suspended());
        assert!(controller.controls(f.x));
    }

    #[test]
    fn test_dump_lists_both_stacks() {
        let mut f = fixture();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(2.0)).unwrap();
        f.journal.set_property(&mut f.scene, false, f.x, Boxed::Float(3.0)).unwrap();
        f.journal.undo(&mut f.scene).unwrap();

        let dump = f.journal.to_string();
        let redo = dump.find("= 3").unwrap();
        let separator = dump.find("<-----").unwrap();
        let undo = dump.find("= 2").unwrap();
        assert!(redo < separator && separator < undo);
    }
}
