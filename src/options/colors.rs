use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::{Rgba8, SemanticTag};

/// Built-in class colors (Cityscapes-style).
const DEFAULT_PALETTE: [(SemanticTag, [u8; 4]); SemanticTag::COUNT] = [
    (SemanticTag::Car, [0, 0, 142, 255]),
    (SemanticTag::Road, [128, 64, 128, 255]),
    (SemanticTag::Sidewalk, [244, 35, 232, 255]),
    (SemanticTag::Vegetation, [107, 142, 35, 255]),
    (SemanticTag::Obstacle, [190, 153, 153, 255]),
    (SemanticTag::TrafficLight, [250, 170, 30, 255]),
    (SemanticTag::Building, [70, 70, 70, 255]),
    (SemanticTag::Sign, [220, 220, 0, 255]),
    (SemanticTag::Shoulder, [152, 251, 152, 255]),
    (SemanticTag::Pedestrian, [220, 20, 60, 255]),
    (SemanticTag::Curb, [196, 196, 196, 255]),
];

/// Label palette.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Colors", inline)]
#[serde(default)]
pub struct ColorOptions {
    /// RGBA color of pixels without tagged geometry.
    pub background: [u8; 4],
    /// RGBA color per tag name. Missing tags use the built-in color.
    pub semantic: BTreeMap<String, [u8; 4]>,
}

impl Default for ColorOptions {
    fn default() -> Self {
        Self {
            background: [70, 130, 180, 255],
            semantic: DEFAULT_PALETTE
                .iter()
                .map(|(tag, color)| (tag.name().to_owned(), *color))
                .collect(),
        }
    }
}

impl ColorOptions {
    /// Background color.
    #[must_use]
    pub fn background_color(&self) -> Rgba8 {
        Rgba8::from(self.background)
    }

    /// Semantic color of every tag, indexed by [`SemanticTag::index`].
    ///
    /// Keys that are not tag names are logged and ignored.
    #[must_use]
    pub fn semantic_palette(&self) -> [Rgba8; SemanticTag::COUNT] {
        let mut palette = DEFAULT_PALETTE.map(|(_, color)| Rgba8::from(color));
        for (key, color) in &self.semantic {
            match key.parse::<SemanticTag>() {
                Ok(tag) => palette[tag.index()] = Rgba8::from(*color),
                Err(e) => log::warn!("ignoring palette entry: {e}"),
            }
        }
        palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette_is_in_tag_order() {
        for (i, (tag, _)) in DEFAULT_PALETTE.iter().enumerate() {
            assert_eq!(tag.index(), i);
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut colors = ColorOptions::default();
        let _ = colors.semantic.insert("Sky".to_owned(), [1, 2, 3, 255]);
        let _ = colors.semantic.insert("road".to_owned(), [9, 9, 9, 255]);
        let palette = colors.semantic_palette();
        assert_eq!(
            palette[SemanticTag::Road.index()],
            Rgba8::new(9, 9, 9, 255)
        );
        assert_eq!(
            palette[SemanticTag::Car.index()],
            Rgba8::new(0, 0, 142, 255)
        );
    }
}
