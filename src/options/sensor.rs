use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::SemanticTag;

/// Output quality every segmentation sensor is forced to. Label colors must
/// survive encoding bit-exactly.
pub const LOSSLESS_QUALITY: u8 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Sensor", inline)]
#[serde(default)]
/// Segmentation camera parameters.
pub struct SensorOptions {
    /// Display name, used in logs and GPU labels.
    pub name: String,
    /// Camera the render hook is registered for.
    pub camera_id: u32,
    /// Width of one view in pixels.
    #[schemars(range(min = 1))]
    pub width: u32,
    /// Height of one view in pixels.
    #[schemars(range(min = 1))]
    pub height: u32,
    /// Number of views (1 for mono, 2 for stereo).
    #[schemars(title = "Views", range(min = 1, max = 2))]
    pub view_count: u32,
    /// Vertical field of view in degrees.
    #[schemars(
        title = "Field of View",
        range(min = 10.0, max = 150.0),
        extend("step" = 1.0)
    )]
    pub fov_y_degrees: f32,
    /// Near clipping plane distance in meters.
    pub near: f32,
    /// Far clipping plane distance in meters.
    pub far: f32,
    /// Distance between neighboring view origins in meters (stereo
    /// baseline).
    #[schemars(
        title = "Eye Separation",
        range(min = 0.0, max = 1.0),
        extend("step" = 0.001)
    )]
    pub eye_separation: f32,
    /// Configured output quality. Overridden to lossless at initialization.
    #[schemars(range(min = 1, max = 100))]
    pub jpeg_quality: u8,
    /// Tags whose objects receive unique per-instance colors.
    pub instance_segmentation_tags: Vec<SemanticTag>,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            name: "segmentation".to_owned(),
            camera_id: 0,
            width: 640,
            height: 480,
            view_count: 1,
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 500.0,
            eye_separation: 0.064,
            jpeg_quality: 90,
            instance_segmentation_tags: Vec::new(),
        }
    }
}

impl SensorOptions {
    /// Width over height of one view.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}
