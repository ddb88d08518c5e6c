// SPDX-License-Identifier: MIT OR Apache-2.0
//! Progress clock driving a controller.

use crate::path::PathDirection;
use serde::{Deserialize, Serialize};

/// Elapsed time over a fixed length, optionally looping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Length in seconds
    length: f32,
    /// Current position in seconds
    elapsed: f64,
    /// Whether the position wraps at either end
    loop_enabled: bool,
    /// Whether `advance` moves the position
    running: bool,
    /// Direction of travel while running
    #[serde(skip)]
    direction: PathDirection,
}

impl Timeline {
    /// Create a stopped timeline
    pub fn new(length: f32) -> Self {
        Self {
            length: length.max(0.0),
            elapsed: 0.0,
            loop_enabled: false,
            running: false,
            direction: PathDirection::Forwards,
        }
    }

    /// Get the length
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Set the length; the position is re-validated against it
    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(0.0);
        self.elapsed = self.validate(self.elapsed).0;
    }

    /// Get the current position
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Move to a position.
    ///
    /// Out of range positions wrap when looping and clamp otherwise.
    /// Returns whether the position changed.
    pub fn set_elapsed(&mut self, elapsed: f64) -> bool {
        let (elapsed, _) = self.validate(elapsed);
        if elapsed == self.elapsed {
            return false;
        }
        self.elapsed = elapsed;
        true
    }

    /// Position as a fraction of the length
    pub fn progress(&self) -> f64 {
        if self.length == 0.0 {
            return 0.0;
        }
        self.elapsed / f64::from(self.length)
    }

    /// Move to a fraction of the length
    pub fn set_progress(&mut self, progress: f64) -> bool {
        self.set_elapsed(f64::from(self.length) * progress)
    }

    /// Check if looping is enabled
    pub fn is_looping(&self) -> bool {
        self.loop_enabled
    }

    /// Enable or disable looping
    pub fn set_loop(&mut self, loop_enabled: bool) {
        self.loop_enabled = loop_enabled;
    }

    /// Check if the timeline is running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start or stop the timeline
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Get the direction of travel
    pub fn direction(&self) -> PathDirection {
        self.direction
    }

    /// Set the direction of travel
    pub fn set_direction(&mut self, direction: PathDirection) {
        self.direction = direction;
    }

    /// Advance a running timeline by `delta` seconds.
    ///
    /// A non-looping timeline stops when it reaches either end. Returns
    /// whether the position changed.
    pub fn advance(&mut self, delta: f64) -> bool {
        if !self.running {
            return false;
        }

        let target = match self.direction {
            PathDirection::Forwards => self.elapsed + delta,
            PathDirection::Backwards => self.elapsed - delta,
        };

        let (elapsed, should_stop) = self.validate(target);
        if should_stop {
            self.running = false;
        }

        if elapsed == self.elapsed {
            return false;
        }
        self.elapsed = elapsed;
        true
    }

    fn validate(&self, elapsed: f64) -> (f64, bool) {
        let length = f64::from(self.length);
        if elapsed > length || elapsed < 0.0 {
            if self.loop_enabled && length > 0.0 {
                (elapsed.rem_euclid(length), false)
            } else {
                (elapsed.clamp(0.0, length), true)
            }
        } else {
            (elapsed, false)
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(0.0)
    }
}
