//! CPU copy of a segmentation target.

use rustc_hash::FxHashMap;

use crate::registry::{ColorTable, Label, Rgba8, SemanticTag};

/// Packed texels of every view of a segmentation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationImage {
    width: u32,
    height: u32,
    view_count: u32,
    /// Layer-major, then row-major packed texels.
    texels: Vec<u32>,
}

impl SegmentationImage {
    /// Wrap packed texels. Returns `None` if the length does not match the
    /// dimensions.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        view_count: u32,
        texels: Vec<u32>,
    ) -> Option<Self> {
        let expected = width as usize * height as usize * view_count as usize;
        (texels.len() == expected).then_some(Self {
            width,
            height,
            view_count,
            texels,
        })
    }

    /// Width of one view.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of one view.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of views.
    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Packed texels of one view.
    pub fn layer(&self, layer: u32) -> Option<&[u32]> {
        let len = self.layer_len();
        let start = layer as usize * len;
        self.texels.get(start..start + len)
    }

    /// Color at `(x, y)` in `layer`.
    pub fn pixel(&self, layer: u32, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = self.layer(layer)?;
        Some(Rgba8::unpack(row[(y * self.width + x) as usize]))
    }

    /// True if every texel of every view has alpha 255.
    pub fn all_opaque(&self) -> bool {
        self.texels.iter().all(|&t| Rgba8::unpack(t).a == u8::MAX)
    }

    /// Texel count per distinct color of one view.
    pub fn histogram(&self, layer: u32) -> FxHashMap<Rgba8, usize> {
        let mut counts = FxHashMap::default();
        for &texel in self.layer(layer).unwrap_or_default() {
            *counts.entry(Rgba8::unpack(texel)).or_insert(0) += 1;
        }
        counts
    }

    /// Texel count per class of one view, decoded with `table`. Colors the
    /// table does not know are counted under `None`.
    pub fn class_histogram(
        &self,
        layer: u32,
        table: &ColorTable,
    ) -> FxHashMap<Option<SemanticTag>, usize> {
        let mut counts = FxHashMap::default();
        for (color, n) in self.histogram(layer) {
            let class = table.decode(color).and_then(Label::tag);
            *counts.entry(class).or_insert(0) += n;
        }
        counts
    }

    /// Row-major RGBA bytes of one view, as image encoders expect.
    pub fn rgba_bytes(&self, layer: u32) -> Option<Vec<u8>> {
        let texels = self.layer(layer)?;
        Some(texels.iter().flat_map(|t| t.to_le_bytes()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_views() -> SegmentationImage {
        let sky = Rgba8::new(70, 130, 180, 255).pack();
        let road = Rgba8::new(128, 64, 128, 255).pack();
        SegmentationImage::new(2, 1, 2, vec![sky, road, road, road]).unwrap()
    }

    #[test]
    fn length_must_match_dimensions() {
        assert!(SegmentationImage::new(2, 2, 1, vec![0; 3]).is_none());
    }

    #[test]
    fn pixels_are_addressed_per_layer() {
        let image = two_views();
        assert_eq!(image.pixel(0, 0, 0), Some(Rgba8::new(70, 130, 180, 255)));
        assert_eq!(image.pixel(1, 0, 0), Some(Rgba8::new(128, 64, 128, 255)));
        assert_eq!(image.pixel(2, 0, 0), None);
        assert_eq!(image.pixel(0, 2, 0), None);
    }

    #[test]
    fn histogram_counts_one_layer() {
        let image = two_views();
        let histogram = image.histogram(1);
        assert_eq!(histogram.len(), 1);
        assert_eq!(histogram[&Rgba8::new(128, 64, 128, 255)], 2);
        assert!(image.all_opaque());
    }

    #[test]
    fn rgba_bytes_are_in_channel_order() {
        let image = two_views();
        let bytes = image.rgba_bytes(0).unwrap();
        assert_eq!(&bytes[..4], &[70, 130, 180, 255]);
    }
}
