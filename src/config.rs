//! Tuning for the tracker, respawning entities and the composition field
//!
//! Loaded from JSON; every field falls back to its default when omitted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Distance band is empty or inverted
    #[error("Invalid distance band: min {min} must be below max {max}")]
    DistanceBand { min: f32, max: f32 },

    /// Vertical clamp range is inverted
    #[error("Invalid vertical range: {min} > {max}")]
    VerticalRange { min: f32, max: f32 },

    /// A value that must be non-negative was negative (or NaN)
    #[error("{name} must be >= 0, got {value}")]
    Negative { name: &'static str, value: f64 },

    /// Field would create no entities
    #[error("count must be at least 1")]
    EmptyField,
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Recursively replace values in `base` with those present in `patch`
fn overlay(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Visibility tracker settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum time between visibility broadcasts (milliseconds)
    pub throttle_ms: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            throttle_ms: THROTTLE_MS,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("throttle_ms", self.throttle_ms)
    }
}

/// Per-entity respawn placement settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Fixed bounding radius; 0 derives bounds from geometry
    pub radius: f32,
    /// Closest respawn distance from the observer
    pub min_dist: f32,
    /// Furthest respawn distance from the observer
    pub max_dist: f32,
    /// Extra angle added to the half field of view (degrees)
    pub margin_deg: f32,

    // === Vertical clamp ===
    /// Clamp respawned height into `[y_min, y_max]`
    pub vertical_lock: bool,
    pub y_min: f32,
    pub y_max: f32,

    /// Randomize yaw only (keeps the entity upright)
    pub yaw_only: bool,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            radius: 0.0,
            min_dist: 15.0,
            max_dist: 60.0,
            margin_deg: 15.0,

            vertical_lock: false,
            y_min: 0.4,
            y_max: 1.8,

            yaw_only: true,
        }
    }
}

impl RespawnConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("radius", self.radius as f64)?;
        non_negative("margin_deg", self.margin_deg as f64)?;
        // Written as a negated comparison so NaN bounds are rejected too
        if !(self.min_dist < self.max_dist) {
            return Err(ConfigError::DistanceBand {
                min: self.min_dist,
                max: self.max_dist,
            });
        }
        if self.vertical_lock && !(self.y_min <= self.y_max) {
            return Err(ConfigError::VerticalRange {
                min: self.y_min,
                max: self.y_max,
            });
        }
        Ok(())
    }

    /// Clamp a height into the vertical range when the lock is enabled
    ///
    /// An inverted range pins every height to `y_max` instead of panicking.
    #[inline]
    pub fn clamp_height(&self, y: f32) -> f32 {
        if self.vertical_lock {
            y.max(self.y_min).min(self.y_max)
        } else {
            y
        }
    }
}

/// Composition field settings (entity count, initial layout, sweep)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Number of entities to create
    pub count: usize,
    /// Side length of the square sampled around the observer for placement
    pub spread: f32,
    /// Inner radius of the placement annulus
    pub min_radius: f32,
    /// Outer radius of the placement annulus
    pub max_radius: f32,
    /// Height entities are placed at
    pub ground_y: f32,
    /// Interval of the too-close sweep (milliseconds)
    pub safety_interval_ms: f64,

    pub tracker: TrackerConfig,
    pub respawn: RespawnConfig,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            count: 10,
            spread: 50.0,
            min_radius: 20.0,
            max_radius: 50.0,
            ground_y: 0.0,
            safety_interval_ms: SAFETY_INTERVAL_MS,

            tracker: TrackerConfig::default(),
            respawn: RespawnConfig {
                radius: 3.0,
                min_dist: 20.0,
                max_dist: 60.0,
                margin_deg: 15.0,
                vertical_lock: true,
                y_min: 0.0,
                y_max: 2.0,
                yaw_only: true,
            },
        }
    }
}

impl FieldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::EmptyField);
        }
        non_negative("spread", self.spread as f64)?;
        non_negative("min_radius", self.min_radius as f64)?;
        non_negative("safety_interval_ms", self.safety_interval_ms)?;
        if !(self.min_radius < self.max_radius) {
            return Err(ConfigError::DistanceBand {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        self.tracker.validate()?;
        self.respawn.validate()
    }

    /// Parse and validate a JSON document
    ///
    /// The document is layered over `FieldConfig::default()`, so a partial
    /// nested object keeps the field's defaults for the keys it omits.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut merged = serde_json::to_value(Self::default())?;
        overlay(&mut merged, serde_json::from_str(json)?);
        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded field config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Field config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FieldConfig::default().validate().is_ok());
        assert!(RespawnConfig::default().validate().is_ok());
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FieldConfig::from_json(r#"{ "count": 20, "respawn": { "margin_deg": 5.0 } }"#)
            .unwrap();
        assert_eq!(config.count, 20);
        assert_eq!(config.respawn.margin_deg, 5.0);
        // Omitted nested keys keep the field defaults
        let defaults = FieldConfig::default().respawn;
        assert_eq!(config.respawn.min_dist, defaults.min_dist);
        assert_eq!(config.respawn.radius, defaults.radius);
        assert!(config.respawn.vertical_lock);
        assert_eq!(config.tracker.throttle_ms, THROTTLE_MS);
    }

    #[test]
    fn test_inverted_band_rejected() {
        let respawn = RespawnConfig {
            min_dist: 60.0,
            max_dist: 20.0,
            ..Default::default()
        };
        assert!(matches!(respawn.validate(), Err(ConfigError::DistanceBand { .. })));

        let equal = RespawnConfig {
            min_dist: 30.0,
            max_dist: 30.0,
            ..Default::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn test_negative_margin_rejected() {
        let respawn = RespawnConfig {
            margin_deg: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            respawn.validate(),
            Err(ConfigError::Negative { name: "margin_deg", .. })
        ));
    }

    #[test]
    fn test_vertical_range_only_checked_when_locked() {
        let mut respawn = RespawnConfig {
            y_min: 5.0,
            y_max: 1.0,
            ..Default::default()
        };
        assert!(respawn.validate().is_ok());
        respawn.vertical_lock = true;
        assert!(matches!(respawn.validate(), Err(ConfigError::VerticalRange { .. })));
    }

    #[test]
    fn test_empty_field_rejected() {
        let config = FieldConfig {
            count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyField)));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(
            FieldConfig::from_json("{ count: nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_clamp_height() {
        let mut respawn = RespawnConfig::default();
        assert_eq!(respawn.clamp_height(10.0), 10.0);
        respawn.vertical_lock = true;
        assert_eq!(respawn.clamp_height(10.0), respawn.y_max);
        assert_eq!(respawn.clamp_height(-3.0), respawn.y_min);
    }

    #[test]
    fn test_clamp_height_inverted_range() {
        let respawn = RespawnConfig {
            vertical_lock: true,
            y_min: 5.0,
            y_max: 1.0,
            ..Default::default()
        };
        assert_eq!(respawn.clamp_height(3.0), 1.0);
        assert_eq!(respawn.clamp_height(-10.0), 1.0);
    }
}
