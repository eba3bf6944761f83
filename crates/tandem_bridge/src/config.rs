//! # Session Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! max_bodies = 10000
//! tick_rate = 60
//! debug_vertex_capacity = 1000000
//! handoff = "auto"            # "auto" | "shared_memory" | "transfer"
//!
//! [world]
//! gravity = [0.0, -9.8, 0.0]
//! max_sub_steps = 4
//! fixed_time_step = 0.016666668
//! debug_draw = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tandem_core::FrameLayout;
use tandem_shared::{
    HandoffDescriptor, HandoffMode, HandoffPreference, WorldConfig, DEBUG_VERTEX_CAPACITY,
    MAX_BODIES, PROTOCOL_VERSION, TICK_RATE,
};

use crate::error::ConfigError;

/// Everything fixed for the lifetime of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Body slots in the shared buffer.
    pub max_bodies: u32,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Debug line vertices the buffer can hold.
    pub debug_vertex_capacity: u32,
    /// Buffer handoff preference.
    pub handoff: HandoffPreference,
    /// Sent to the simulator with `INIT`.
    pub world: WorldConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_bodies: MAX_BODIES,
            tick_rate: TICK_RATE,
            debug_vertex_capacity: DEBUG_VERTEX_CAPACITY,
            handoff: HandoffPreference::Auto,
            world: WorldConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on bad syntax, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`Self::from_toml_str`], plus [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Free-list links are i32 with -1 as terminator
        if self.max_bodies == 0 || self.max_bodies > i32::MAX.unsigned_abs() {
            return Err(ConfigError::Invalid(format!(
                "max_bodies must be in 1..={}, got {}",
                i32::MAX,
                self.max_bodies
            )));
        }
        if self.tick_rate == 0 || self.tick_rate > 1_000_000 {
            return Err(ConfigError::Invalid(format!(
                "tick_rate must be in 1..=1000000, got {}",
                self.tick_rate
            )));
        }
        if self.world.max_sub_steps == 0 {
            return Err(ConfigError::Invalid("world.max_sub_steps must be at least 1".into()));
        }
        if !(self.world.fixed_time_step.is_finite() && self.world.fixed_time_step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "world.fixed_time_step must be positive, got {}",
                self.world.fixed_time_step
            )));
        }
        Ok(())
    }

    /// Buffer layout for this session.
    #[must_use]
    pub const fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.max_bodies, self.debug_vertex_capacity)
    }

    /// Descriptor sent with `INIT` once the mode is resolved.
    #[must_use]
    pub const fn descriptor(&self, mode: HandoffMode) -> HandoffDescriptor {
        HandoffDescriptor {
            mode,
            max_bodies: self.max_bodies,
            debug_vertex_capacity: self.debug_vertex_capacity,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = SessionConfig::default();
        assert_eq!(config.max_bodies, 10_000);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.world.max_sub_steps, 4);
        assert_eq!(config.handoff, HandoffPreference::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml_str(
            r#"
            max_bodies = 256
            handoff = "transfer"

            [world]
            debug_draw = true
            "#,
        )
        .unwrap();

        assert_eq!(config.max_bodies, 256);
        assert_eq!(config.handoff, HandoffPreference::Transfer);
        assert!(config.world.debug_draw);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.layout(), FrameLayout::new(256, DEBUG_VERTEX_CAPACITY));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(matches!(
            SessionConfig::from_toml_str("max_bodies = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("[world]\nfixed_time_step = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("tick_rate = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::load("/nonexistent/tandem.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
