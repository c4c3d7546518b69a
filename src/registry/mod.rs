//! Tag-to-color registry shared by every segmentation sensor.
//!
//! Sensors request instance segmentation per tag during initialization; the
//! registry reserves a red-channel block for each such tag and publishes an
//! immutable [`ColorTable`] snapshot on broadcast. Raster passes only ever
//! read the published snapshot.

mod color;
mod tag;

pub use color::{ColorTable, Label, LegendEntry, Rgba8};
pub use tag::{SemanticTag, UnknownTag};

use crate::options::ColorOptions;

/// Color registration protocol used by sensors.
pub trait ColorService {
    /// True if any tag has instance segmentation enabled.
    fn has_instance_segmentation(&self) -> bool;

    /// Enable instance segmentation for `tag`.
    ///
    /// Idempotent: a tag that already owns a block keeps it.
    fn allocate_instance_color(&mut self, tag: SemanticTag);

    /// Publish the current assignments as a new [`ColorTable`].
    fn broadcast_color_table(&mut self);

    /// Background color of every segmentation image.
    fn background(&self) -> Rgba8;

    /// Last published snapshot.
    fn color_table(&self) -> &ColorTable;
}

/// Default [`ColorService`] implementation.
pub struct ColorRegistry {
    background: Rgba8,
    semantic: [Rgba8; SemanticTag::COUNT],
    instance_blocks: [Option<u8>; SemanticTag::COUNT],
    published: ColorTable,
}

impl ColorRegistry {
    /// Registry with the palette from `options`. Nothing is instance
    /// segmented until a sensor asks for it.
    #[must_use]
    pub fn new(options: &ColorOptions) -> Self {
        let background = options.background_color();
        let semantic = options.semantic_palette();
        warn_on_ambiguous_palette(background, &semantic);
        let instance_blocks = [None; SemanticTag::COUNT];
        Self {
            background,
            semantic,
            instance_blocks,
            published: ColorTable::new(
                0,
                background,
                semantic,
                instance_blocks,
            ),
        }
    }

    /// Tags with instance segmentation enabled, including unpublished ones.
    pub fn instance_tags(&self) -> impl Iterator<Item = SemanticTag> + '_ {
        SemanticTag::ALL
            .into_iter()
            .filter(|tag| self.instance_blocks[tag.index()].is_some())
    }

    /// Highest red value not claimed by the background, a semantic color, or
    /// another block.
    fn free_block(&self) -> Option<u8> {
        highest_free_red(
            std::iter::once(self.background.r)
                .chain(self.semantic.iter().map(|color| color.r))
                .chain(self.instance_blocks.iter().flatten().copied()),
        )
    }
}

/// Highest red value in `1..=255` not in `taken`. Zero is never handed out.
fn highest_free_red(taken: impl IntoIterator<Item = u8>) -> Option<u8> {
    let mut claimed = [false; 256];
    claimed[0] = true;
    for r in taken {
        claimed[usize::from(r)] = true;
    }
    (1..=u8::MAX).rev().find(|&r| !claimed[usize::from(r)])
}

impl Default for ColorRegistry {
    fn default() -> Self {
        Self::new(&ColorOptions::default())
    }
}

impl ColorService for ColorRegistry {
    fn has_instance_segmentation(&self) -> bool {
        self.instance_blocks.iter().any(Option::is_some)
    }

    fn allocate_instance_color(&mut self, tag: SemanticTag) {
        if self.instance_blocks[tag.index()].is_some() {
            return;
        }
        match self.free_block() {
            Some(block) => {
                log::debug!("instance block {block} assigned to {tag}");
                self.instance_blocks[tag.index()] = Some(block);
            }
            None => log::warn!(
                "no free instance block for {tag}; objects keep the \
                 semantic color"
            ),
        }
    }

    fn broadcast_color_table(&mut self) {
        let generation = self.published.generation() + 1;
        self.published = ColorTable::new(
            generation,
            self.background,
            self.semantic,
            self.instance_blocks,
        );
        log::debug!(
            "color table generation {generation} published ({} instance tags)",
            self.instance_tags().count()
        );
    }

    fn background(&self) -> Rgba8 {
        self.background
    }

    fn color_table(&self) -> &ColorTable {
        &self.published
    }
}

fn warn_on_ambiguous_palette(
    background: Rgba8,
    semantic: &[Rgba8; SemanticTag::COUNT],
) {
    for (i, tag) in SemanticTag::ALL.into_iter().enumerate() {
        let color = semantic[i];
        if color.same_rgb(background) {
            log::warn!("{tag} shares its color with the background");
        }
        if let Some(other) = SemanticTag::ALL[..i]
            .iter()
            .find(|other| semantic[other.index()].same_rgb(color))
        {
            log::warn!("{tag} shares its color with {other}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn allocation_is_idempotent() {
        let mut registry = ColorRegistry::default();
        registry.allocate_instance_color(SemanticTag::Car);
        registry.broadcast_color_table();
        let first = registry.color_table().instance_block(SemanticTag::Car);
        registry.allocate_instance_color(SemanticTag::Car);
        registry.broadcast_color_table();
        assert!(first.is_some());
        assert_eq!(
            registry.color_table().instance_block(SemanticTag::Car),
            first
        );
    }

    #[test]
    fn blocks_are_unique_and_disjoint_from_semantic_colors() {
        let mut registry = ColorRegistry::default();
        for tag in SemanticTag::ALL {
            registry.allocate_instance_color(tag);
        }
        registry.broadcast_color_table();
        let table = registry.color_table();

        let mut blocks: Vec<u8> = SemanticTag::ALL
            .iter()
            .filter_map(|&tag| table.instance_block(tag))
            .collect();
        assert_eq!(blocks.len(), SemanticTag::COUNT);
        blocks.sort_unstable();
        blocks.dedup();
        assert_eq!(blocks.len(), SemanticTag::COUNT);

        for block in blocks {
            assert_ne!(block, table.background().r);
            for tag in SemanticTag::ALL {
                assert_ne!(block, table.semantic_color(tag).r);
            }
        }
    }

    #[test]
    fn broadcast_snapshots_assignments() {
        let mut registry = ColorRegistry::default();
        assert!(!registry.has_instance_segmentation());
        registry.allocate_instance_color(SemanticTag::Pedestrian);
        assert!(registry.has_instance_segmentation());
        assert!(registry.instance_tags().eq([SemanticTag::Pedestrian]));
        // Not visible until published.
        assert_eq!(
            registry.color_table().instance_block(SemanticTag::Pedestrian),
            None
        );
        registry.broadcast_color_table();
        assert_eq!(registry.color_table().generation(), 1);
        assert!(registry
            .color_table()
            .instance_block(SemanticTag::Pedestrian)
            .is_some());
    }

    #[test]
    fn highest_unclaimed_red_wins() {
        assert_eq!(highest_free_red([0, 255, 254]), Some(253));
        assert_eq!(highest_free_red(0..=u8::MAX), None);
    }

    #[test]
    fn colliding_reds_are_skipped() {
        let semantic: BTreeMap<String, [u8; 4]> = SemanticTag::ALL
            .iter()
            .map(|tag| (tag.name().to_owned(), [255, 0, 0, 255]))
            .collect();
        let mut registry = ColorRegistry::new(&ColorOptions {
            background: [254, 0, 0, 255],
            semantic,
        });
        registry.allocate_instance_color(SemanticTag::Car);
        registry.allocate_instance_color(SemanticTag::Road);
        registry.broadcast_color_table();
        let table = registry.color_table();
        assert_eq!(table.instance_block(SemanticTag::Car), Some(253));
        assert_eq!(table.instance_block(SemanticTag::Road), Some(252));
    }
}
