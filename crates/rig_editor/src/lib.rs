// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rig editor core.
//!
//! Edits to an animated scene go through an [`UndoJournal`]:
//! - [`scene`]: the [`EditTarget`] contract and the [`Scene`] implementing it
//! - [`undo_redo`]: journal records, their application and inversion
//! - [`journal`]: undo/redo stacks, merging and sub-journals
//! - [`script`]: RON edit scripts driving a scene through the journal
//! - [`config`]: editor settings
//!
//! ## Architecture
//!
//! The journal never owns the scene. Every journal call borrows the
//! [`EditTarget`] mutably for its duration, so applying a record can't
//! log another one into the same journal.

pub mod config;
pub mod journal;
pub mod scene;
pub mod script;
pub mod undo_redo;

pub use config::{EditorSettings, JournalSettings};
pub use journal::{JournalError, UndoJournal};
pub use scene::{
    Component, ComponentId, ControllerPropertyState, EditTarget, Entity, EntityId, Scene, SceneError,
};
pub use script::{EditScript, ScriptError, ScriptRunner, ScriptStep};
pub use undo_redo::{JournalOp, UndoRedo, UndoRedoOp};
