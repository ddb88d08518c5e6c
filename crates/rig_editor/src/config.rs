// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor settings.
//!
//! Settings are stored as RON. A missing settings file means defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "rig_editor.ron";

/// Undo journal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalSettings {
    /// Apply operations as they are logged
    #[serde(default = "default_true")]
    pub apply_on_insert: bool,
    /// Maximum undo depth, 0 for unbounded
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Dump the journal at debug level after every change
    #[serde(default = "default_true")]
    pub dump_on_change: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    100
}

fn default_log_filter() -> String {
    "rig_editor=debug".to_string()
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            apply_on_insert: true,
            max_depth: default_max_depth(),
            dump_on_change: true,
        }
    }
}

/// Editor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Format version
    pub version: u32,
    /// Undo journal settings
    #[serde(default)]
    pub journal: JournalSettings,
    /// Default tracing directive, extended by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Start in play mode, where edits are refused
    #[serde(default)]
    pub play_mode: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            journal: JournalSettings::default(),
            log_filter: default_log_filter(),
            play_mode: false,
        }
    }
}

impl EditorSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: EditorSettings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        // Version check
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file doesn't exist
    pub fn load_or_default(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            tracing::info!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(path, content)
    }
}
