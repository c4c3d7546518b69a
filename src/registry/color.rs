use serde::{Deserialize, Serialize};

use super::tag::SemanticTag;

/// 8-bit RGBA color, the unit of segmentation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 4]", into = "[u8; 4]")]
pub struct Rgba8 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    /// Color from components.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Pack into the target texel layout `r | g << 8 | b << 16 | a << 24`.
    #[must_use]
    pub const fn pack(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Unpack a target texel.
    #[must_use]
    pub const fn unpack(texel: u32) -> Self {
        let [r, g, b, a] = texel.to_le_bytes();
        Self { r, g, b, a }
    }

    /// The color with alpha replaced.
    #[must_use]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// True when the RGB channels match, ignoring alpha.
    #[must_use]
    pub const fn same_rgb(self, other: Self) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }
}

impl From<[u8; 4]> for Rgba8 {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Rgba8> for [u8; 4] {
    fn from(c: Rgba8) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

/// What a segmentation color stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// No tagged geometry.
    Background,
    /// A class without instance segmentation.
    Semantic(SemanticTag),
    /// One object of a class with instance segmentation.
    Instance {
        /// Class of the object.
        tag: SemanticTag,
        /// Instance id modulo 65536.
        instance: u16,
    },
}

impl Label {
    /// Class of the label, `None` for background.
    #[must_use]
    pub const fn tag(self) -> Option<SemanticTag> {
        match self {
            Self::Background => None,
            Self::Semantic(tag) | Self::Instance { tag, .. } => Some(tag),
        }
    }
}

/// One row of a published color legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    /// Class.
    pub tag: SemanticTag,
    /// Semantic color of the class.
    pub color: Rgba8,
    /// Red channel shared by all instance colors of the class, if enabled.
    pub instance_block: Option<u8>,
}

/// Immutable snapshot of all color assignments.
///
/// Instance colors of a class live in a block keyed by the red channel:
/// object `i` is colored `(block, i >> 8, i & 0xff)`. Blocks never coincide
/// with the red channel of a semantic color or the background, so instance
/// colors are unique across classes and disjoint from semantic colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorTable {
    generation: u64,
    background: Rgba8,
    semantic: [Rgba8; SemanticTag::COUNT],
    instance_blocks: [Option<u8>; SemanticTag::COUNT],
}

impl ColorTable {
    pub(crate) const fn new(
        generation: u64,
        background: Rgba8,
        semantic: [Rgba8; SemanticTag::COUNT],
        instance_blocks: [Option<u8>; SemanticTag::COUNT],
    ) -> Self {
        Self {
            generation,
            background,
            semantic,
            instance_blocks,
        }
    }

    /// Publication counter; bumps on every broadcast.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Color of pixels not covered by tagged geometry.
    #[must_use]
    pub const fn background(&self) -> Rgba8 {
        self.background
    }

    /// Semantic color of a class.
    #[must_use]
    pub const fn semantic_color(&self, tag: SemanticTag) -> Rgba8 {
        self.semantic[tag.index()]
    }

    /// Instance block of a class, if instance segmentation is enabled.
    #[must_use]
    pub const fn instance_block(&self, tag: SemanticTag) -> Option<u8> {
        self.instance_blocks[tag.index()]
    }

    /// Color an object of `tag` with the given instance id is drawn with.
    #[must_use]
    pub const fn object_color(&self, tag: SemanticTag, instance: u32) -> Rgba8 {
        match self.instance_block(tag) {
            Some(block) => {
                let [b, g, ..] = instance.to_le_bytes();
                Rgba8::new(block, g, b, 255)
            }
            None => self.semantic_color(tag),
        }
    }

    /// Map an output color back to its label, ignoring alpha.
    #[must_use]
    pub fn decode(&self, color: Rgba8) -> Option<Label> {
        if color.same_rgb(self.background) {
            return Some(Label::Background);
        }
        let instance = SemanticTag::ALL.into_iter().find_map(|tag| {
            (self.instance_block(tag) == Some(color.r)).then(|| {
                Label::Instance {
                    tag,
                    instance: u16::from_be_bytes([color.g, color.b]),
                }
            })
        });
        instance.or_else(|| {
            SemanticTag::ALL
                .into_iter()
                .find(|&tag| color.same_rgb(self.semantic_color(tag)))
                .map(Label::Semantic)
        })
    }

    /// Legend of every class, for dataset consumers.
    #[must_use]
    pub fn legend(&self) -> Vec<LegendEntry> {
        SemanticTag::ALL
            .into_iter()
            .map(|tag| LegendEntry {
                tag,
                color: self.semantic_color(tag),
                instance_block: self.instance_block(tag),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_car_instances() -> ColorTable {
        let mut semantic = [Rgba8::BLACK; SemanticTag::COUNT];
        semantic[SemanticTag::Road.index()] = Rgba8::new(128, 64, 128, 255);
        let mut blocks = [None; SemanticTag::COUNT];
        blocks[SemanticTag::Car.index()] = Some(250);
        ColorTable::new(1, Rgba8::new(70, 130, 180, 255), semantic, blocks)
    }

    #[test]
    fn pack_is_little_endian_rgba() {
        let c = Rgba8::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.pack(), 0x4433_2211);
        assert_eq!(Rgba8::unpack(c.pack()), c);
    }

    #[test]
    fn instance_colors_encode_the_id() {
        let table = table_with_car_instances();
        assert_eq!(
            table.object_color(SemanticTag::Car, 0x0102),
            Rgba8::new(250, 0x01, 0x02, 255)
        );
        assert_eq!(
            table.object_color(SemanticTag::Road, 7),
            Rgba8::new(128, 64, 128, 255)
        );
    }

    #[test]
    fn decode_ignores_alpha() {
        let table = table_with_car_instances();
        assert_eq!(
            table.decode(Rgba8::new(70, 130, 180, 0)),
            Some(Label::Background)
        );
        assert_eq!(
            table.decode(Rgba8::new(250, 0, 9, 0)),
            Some(Label::Instance {
                tag: SemanticTag::Car,
                instance: 9
            })
        );
        assert_eq!(
            table.decode(Rgba8::new(128, 64, 128, 17)),
            Some(Label::Semantic(SemanticTag::Road))
        );
        assert_eq!(table.decode(Rgba8::new(1, 2, 3, 4)), None);
    }

    #[test]
    fn legend_covers_every_tag() {
        let legend = table_with_car_instances().legend();
        assert_eq!(legend.len(), SemanticTag::COUNT);
        assert_eq!(legend[SemanticTag::Car.index()].instance_block, Some(250));
        let json = serde_json::to_value(&legend).unwrap();
        assert_eq!(json[1]["color"], serde_json::json!([128, 64, 128, 255]));
    }
}
