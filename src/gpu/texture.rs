//! Multi-view segmentation render target.

use crate::error::SegmentationError;

/// Texel format of segmentation targets: RGBA8 packed into one `u32`
/// (`r | g << 8 | b << 16 | a << 24`). Integer texels keep label colors exact
/// and allow read-write storage access from the alpha repair kernel.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

/// Depth format of segmentation targets.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A layered color + depth target owned by one segmentation sensor.
///
/// Each array layer is one view (a single layer for mono cameras, two for
/// stereo). The color texture is created with `RENDER_ATTACHMENT |
/// STORAGE_BINDING | COPY_SRC` so it can be rasterized into, repaired in
/// place by a compute kernel, and read back.
pub struct RenderTarget {
    /// Color array texture.
    pub texture: wgpu::Texture,
    /// Depth array texture.
    pub depth_texture: wgpu::Texture,
    /// Per-layer color attachment views.
    layer_views: Vec<wgpu::TextureView>,
    /// Per-layer depth attachment views.
    depth_views: Vec<wgpu::TextureView>,
    /// Whole-array view for storage binding.
    storage_view: wgpu::TextureView,
    width: u32,
    height: u32,
    view_count: u32,
}

impl RenderTarget {
    /// Create a target of `width`×`height` texels per view.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidTarget`] if any dimension is zero.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        view_count: u32,
    ) -> Result<Self, SegmentationError> {
        if width == 0 || height == 0 || view_count == 0 {
            return Err(SegmentationError::InvalidTarget(format!(
                "{width}x{height} with {view_count} views"
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: view_count,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Segmentation Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Segmentation Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let layer_views = (0..view_count)
            .map(|layer| layer_view(&texture, "Segmentation Layer", layer))
            .collect();
        let depth_views = (0..view_count)
            .map(|layer| {
                layer_view(&depth_texture, "Segmentation Depth Layer", layer)
            })
            .collect();
        let storage_view =
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Segmentation Storage View"),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            });

        Ok(Self {
            texture,
            depth_texture,
            layer_views,
            depth_views,
            storage_view,
            width,
            height,
            view_count,
        })
    }

    /// Width of one view in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of one view in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of view layers.
    pub fn view_count(&self) -> u32 {
        self.view_count
    }

    /// Color attachment view of one layer.
    pub fn layer_view(&self, layer: u32) -> Option<&wgpu::TextureView> {
        self.layer_views.get(layer as usize)
    }

    /// Depth attachment view of one layer.
    pub fn depth_view(&self, layer: u32) -> Option<&wgpu::TextureView> {
        self.depth_views.get(layer as usize)
    }

    /// Whole-array view, bound as the repair kernel's output.
    pub fn storage_view(&self) -> &wgpu::TextureView {
        &self.storage_view
    }
}

fn layer_view(
    texture: &wgpu::Texture,
    label: &str,
    layer: u32,
) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{label} {layer}")),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
    })
}
