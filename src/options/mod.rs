//! Sensor configuration with TOML preset support.
//!
//! Options serialize to/from TOML; presets live in `assets/presets/`.

mod colors;
mod sensor;

use std::path::Path;

pub use colors::ColorOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use sensor::{SensorOptions, LOSSLESS_QUALITY};

use crate::error::SegmentationError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[sensor]`) work correctly.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct Options {
    /// Camera, resolution and instance segmentation settings.
    pub sensor: SensorOptions,
    /// Label palette.
    pub colors: ColorOptions,
}

impl Options {
    /// Generate JSON Schema describing the options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::Io`] if the file cannot be read and
    /// [`SegmentationError::OptionsParse`] if it is not valid TOML options.
    pub fn load(path: &Path) -> Result<Self, SegmentationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse options from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::OptionsParse`] on invalid input,
    /// including unknown tag names in `instance_segmentation_tags`.
    pub fn from_toml(content: &str) -> Result<Self, SegmentationError> {
        toml::from_str(content)
            .map_err(|e| SegmentationError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::OptionsParse`] if serialization fails and
    /// [`SegmentationError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SegmentationError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SegmentationError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
