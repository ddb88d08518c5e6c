// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scripted edit sessions.
//!
//! An [`EditScript`] is a RON document declaring a small scene and a list
//! of edit steps. Steps go through the undo journal exactly like
//! interactive edits would, so a script can exercise merging, undo, redo
//! and grouping.
//!
//! ```ron
//! EditScript(
//!     entities: [
//!         (name: "cube", properties: [(name: "x", value: Float(0.0))]),
//!     ],
//!     controllers: [(name: "main", active: true)],
//!     steps: [
//!         SetControlled(controller: "main", target: (object: "cube", property: "x"), controlled: true),
//!         SetMethod(controller: "main", target: (object: "cube", property: "x"), method: Path),
//!         SetPathNode(controller: "main", target: (object: "cube", property: "x"), t: 2.0, value: Float(4.0)),
//!         Seek(controller: "main", elapsed: 1.0),
//!         Undo,
//!     ],
//! )
//! ```

use crate::config::EditorSettings;
use crate::journal::{JournalError, UndoJournal};
use crate::scene::{EditTarget, EntityId, Scene, SceneError};
use indexmap::IndexMap;
use rig_animation::{Boxed, ControllerId, ControllerMethod, ObjectId, PropertyId, PropertySpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Script errors
#[derive(Debug, Error)]
pub enum ScriptError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Name declared twice
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Unknown entity or component name
    #[error("Unknown object: {0}")]
    UnknownObject(String),

    /// Unknown property name
    #[error("Unknown property: {object}.{property}")]
    UnknownProperty {
        /// Object name
        object: String,
        /// Property name
        property: String,
    },

    /// Unknown controller name
    #[error("Unknown controller: {0}")]
    UnknownController(String),

    /// Journal error
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Scene error
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Result type for script operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// A property declaration, typed by its initial value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Initial value
    pub value: Boxed,
}

/// A component declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// Unique name used by steps
    pub name: String,
    /// Component kind
    pub kind: String,
    /// Component properties
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// An entity declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Unique name used by steps
    pub name: String,
    /// Parent entity, declared earlier
    #[serde(default)]
    pub parent: Option<String>,
    /// Entity properties
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Attached components
    #[serde(default)]
    pub components: Vec<ComponentDef>,
}

/// A controller declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDef {
    /// Unique name used by steps
    pub name: String,
    /// Initial length in seconds
    #[serde(default)]
    pub length: f32,
    /// Start active
    #[serde(default)]
    pub active: bool,
    /// Start outside the scene, to be added by an `AddController` step
    #[serde(default)]
    pub detached: bool,
}

/// A property addressed by object and property name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRef {
    /// Entity or component name
    pub object: String,
    /// Property name
    pub property: String,
}

/// One scripted edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    /// Write a property
    SetProperty {
        /// Written property
        target: PropertyRef,
        /// New value
        value: Boxed,
        /// Coalesce with the previous write
        #[serde(default)]
        mergable: bool,
    },
    /// Start or stop controlling a property
    SetControlled {
        /// Controller name
        controller: String,
        /// Property
        target: PropertyRef,
        /// Whether the property becomes controlled
        controlled: bool,
    },
    /// Switch how a controlled property is driven
    SetMethod {
        /// Controller name
        controller: String,
        /// Property
        target: PropertyRef,
        /// New method
        method: ControllerMethod,
    },
    /// Change the constant a controller holds for a property
    SetConstant {
        /// Controller name
        controller: String,
        /// Property
        target: PropertyRef,
        /// New constant
        value: Boxed,
        /// Coalesce with the previous change
        #[serde(default)]
        mergable: bool,
    },
    /// Add or replace a keyframe
    SetPathNode {
        /// Controller name
        controller: String,
        /// Property
        target: PropertyRef,
        /// Absolute keyframe time
        t: f32,
        /// Keyframe value
        value: Boxed,
        /// Coalesce with the previous change
        #[serde(default)]
        mergable: bool,
    },
    /// Remove the keyframe nearest to a time
    RemovePathNode {
        /// Controller name
        controller: String,
        /// Property
        target: PropertyRef,
        /// Absolute keyframe time
        t: f32,
    },
    /// Delete an entity with its subtree
    DeleteEntity(String),
    /// Put a detached controller into the scene
    AddController(String),
    /// Take a controller out of the scene
    RemoveController(String),
    /// Move a controller's clock, not journaled
    Seek {
        /// Controller name
        controller: String,
        /// Elapsed time in seconds
        elapsed: f64,
    },
    /// Undo the newest edit
    Undo,
    /// Redo the newest undone edit
    Redo,
    /// Run steps as one undo step
    Group(Vec<ScriptStep>),
}

/// A scene declaration plus the edits to run on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditScript {
    /// Entities, parents first
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    /// Controllers
    #[serde(default)]
    pub controllers: Vec<ControllerDef>,
    /// Edits
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl EditScript {
    /// Parse a script from RON
    pub fn from_ron(s: &str) -> Result<Self> {
        Ok(ron::from_str(s)?)
    }

    /// Load a script from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }
}

#[derive(Debug, Default)]
struct Names {
    objects: IndexMap<String, ObjectId>,
    entities: IndexMap<String, EntityId>,
    controllers: IndexMap<String, ControllerId>,
}

impl Names {
    fn object(&self, name: &str) -> Result<ObjectId> {
        self.objects
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownObject(name.to_owned()))
    }

    fn entity(&self, name: &str) -> Result<EntityId> {
        self.entities
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownObject(name.to_owned()))
    }

    fn controller(&self, name: &str) -> Result<ControllerId> {
        self.controllers
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownController(name.to_owned()))
    }

    fn property(&self, scene: &Scene, target: &PropertyRef) -> Result<PropertyId> {
        let object = self.object(&target.object)?;
        scene
            .lookup(object, &target.property)
            .ok_or_else(|| ScriptError::UnknownProperty {
                object: target.object.clone(),
                property: target.property.clone(),
            })
    }

    fn claim(&mut self, name: &str, object: ObjectId) -> Result<()> {
        if self.objects.contains_key(name) || self.controllers.contains_key(name) {
            return Err(ScriptError::DuplicateName(name.to_owned()));
        }
        self.objects.insert(name.to_owned(), object);
        Ok(())
    }
}

/// Runs script steps against a scene and its journal
#[derive(Debug)]
pub struct ScriptRunner {
    scene: Scene,
    journal: UndoJournal,
    names: Names,
}

impl ScriptRunner {
    /// Build the scene a script declares
    pub fn new(script: &EditScript, settings: &EditorSettings) -> Result<Self> {
        let mut scene = Scene::new();
        let mut names = Names::default();

        for def in &script.entities {
            let parent = def.parent.as_deref().map(|p| names.entity(p)).transpose()?;
            let entity = scene.spawn_entity(def.name.clone(), parent)?;
            names.claim(&def.name, entity.object())?;
            names.entities.insert(def.name.clone(), entity);
            add_properties(&mut scene, entity.object(), &def.properties)?;

            for component_def in &def.components {
                let component = scene.spawn_component(entity, component_def.kind.clone())?;
                names.claim(&component_def.name, component.object())?;
                add_properties(&mut scene, component.object(), &component_def.properties)?;
            }
        }

        for def in &script.controllers {
            if names.objects.contains_key(&def.name) || names.controllers.contains_key(&def.name) {
                return Err(ScriptError::DuplicateName(def.name.clone()));
            }
            let controller = scene.spawn_controller(def.name.clone());
            if def.length > 0.0 {
                scene.set_controller_length(controller, def.length)?;
            }
            scene.set_controller_active(controller, def.active)?;
            if def.detached {
                scene.delete_controller(controller)?;
            }
            names.controllers.insert(def.name.clone(), controller);
        }

        scene.set_play_mode(settings.play_mode);
        tracing::info!(
            "Script scene ready: {} entities, {} controllers",
            names.entities.len(),
            names.controllers.len()
        );

        Ok(Self {
            scene,
            journal: UndoJournal::with_settings(&settings.journal),
            names,
        })
    }

    /// Get the scene
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Get the journal
    pub fn journal(&self) -> &UndoJournal {
        &self.journal
    }

    /// Resolve a property reference
    pub fn property(&self, object: &str, property: &str) -> Result<PropertyId> {
        self.names.property(
            &self.scene,
            &PropertyRef {
                object: object.to_owned(),
                property: property.to_owned(),
            },
        )
    }

    /// Run steps in order, stopping at the first failure
    pub fn run(&mut self, steps: &[ScriptStep]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            tracing::debug!("Step {}: {:?}", index, step);
            run_step(&self.names, &mut self.scene, &mut self.journal, step)?;
            self.scene.evaluate()?;
        }
        Ok(())
    }

    /// Current value of every declared property, as `object.property`
    pub fn report(&self) -> Vec<(String, Boxed)> {
        let mut values = Vec::new();
        for (name, object) in &self.names.objects {
            for property in self.scene.properties().properties_of(*object) {
                values.push((format!("{}.{}", name, property.spec.name), property.value().clone()));
            }
        }
        values
    }
}

fn add_properties(scene: &mut Scene, object: ObjectId, defs: &[PropertyDef]) -> Result<()> {
    for def in defs {
        let spec = PropertySpec::new(def.name.clone(), def.value.property_type());
        scene.add_property(object, spec, def.value.clone())?;
    }
    Ok(())
}

fn run_step(names: &Names, scene: &mut Scene, journal: &mut UndoJournal, step: &ScriptStep) -> Result<()> {
    match step {
        ScriptStep::SetProperty { target, value, mergable } => {
            let property = names.property(scene, target)?;
            journal.set_property(scene, *mergable, property, value.clone())?;
        }
        ScriptStep::SetControlled {
            controller,
            target,
            controlled,
        } => {
            let controller = names.controller(controller)?;
            let property = names.property(scene, target)?;
            journal.set_controlled(scene, controller, property, *controlled)?;
        }
        ScriptStep::SetMethod {
            controller,
            target,
            method,
        } => {
            let controller = names.controller(controller)?;
            let property = names.property(scene, target)?;
            journal.set_control_method(scene, controller, property, *method)?;
        }
        ScriptStep::SetConstant {
            controller,
            target,
            value,
            mergable,
        } => {
            let controller = names.controller(controller)?;
            let property = names.property(scene, target)?;
            journal.set_controller_constant(scene, *mergable, controller, property, value.clone())?;
        }
        ScriptStep::SetPathNode {
            controller,
            target,
            t,
            value,
            mergable,
        } => {
            let controller = names.controller(controller)?;
            let property = names.property(scene, target)?;
            journal.set_controller_path_node_value(scene, *mergable, controller, property, *t, value.clone())?;
        }
        ScriptStep::RemovePathNode { controller, target, t } => {
            let controller = names.controller(controller)?;
            let property = names.property(scene, target)?;
            journal.remove_controller_path_node(scene, controller, property, *t)?;
        }
        ScriptStep::DeleteEntity(name) => {
            journal.delete_entity(scene, names.entity(name)?)?;
        }
        ScriptStep::AddController(name) => {
            journal.log_add_controller(scene, names.controller(name)?, name.clone())?;
        }
        ScriptStep::RemoveController(name) => {
            journal.log_remove_controller(scene, names.controller(name)?)?;
        }
        ScriptStep::Seek { controller, elapsed } => {
            scene.seek(names.controller(controller)?, *elapsed)?;
        }
        ScriptStep::Undo => journal.undo(scene)?,
        ScriptStep::Redo => journal.redo(scene)?,
        ScriptStep::Group(steps) => {
            let mut group = UndoJournal::new(journal.apply_on_insert());
            for step in steps {
                run_step(names, scene, &mut group, step)?;
            }
            journal.log_subjournal(scene, group)?;
        }
    }
    Ok(())
}
