//! Blocking GPU → CPU copies of segmentation targets.

use std::sync::mpsc;

use crate::error::SegmentationError;
use crate::gpu::render_context::RenderContext;
use crate::gpu::texture::RenderTarget;
use crate::image::SegmentationImage;

const TEXEL_BYTES: u32 = 4;

/// Bytes per copied row, padded to the copy alignment.
#[must_use]
pub const fn padded_row_bytes(width: u32) -> u32 {
    (width * TEXEL_BYTES).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Copy every layer of `target` to the CPU and wait for it.
///
/// Work submitted earlier on the same queue (the frame's raster and repair
/// passes) completes before the copy.
///
/// # Errors
///
/// Returns [`SegmentationError::Readback`] if mapping or polling fails.
pub fn read_target(
    context: &RenderContext,
    target: &RenderTarget,
) -> Result<SegmentationImage, SegmentationError> {
    let (width, height, layers) =
        (target.width(), target.height(), target.view_count());
    let row_bytes = padded_row_bytes(width);
    let size = u64::from(row_bytes) * u64::from(height) * u64::from(layers);

    let staging = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Segmentation Readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context.create_encoder("Segmentation Readback");
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_bytes),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
    );
    context.submit(encoder);

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = context
        .device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| SegmentationError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| SegmentationError::Readback(e.to_string()))?
        .map_err(|e| SegmentationError::Readback(e.to_string()))?;

    let texels = {
        let data = slice.get_mapped_range();
        unpad_rows(&data, width, row_bytes)
    };
    staging.unmap();

    SegmentationImage::new(width, height, layers, texels).ok_or_else(|| {
        SegmentationError::Readback(format!(
            "copied texel count does not match {width}x{height}x{layers}"
        ))
    })
}

/// Strip row padding and decode little-endian texels.
fn unpad_rows(data: &[u8], width: u32, row_bytes: u32) -> Vec<u32> {
    let row_len = (width * TEXEL_BYTES) as usize;
    data.chunks(row_bytes as usize)
        .flat_map(|row| row[..row_len.min(row.len())].chunks_exact(4))
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_256_bytes() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(1920), 7680);
    }

    #[test]
    fn padding_is_dropped() {
        let mut data = vec![0u8; 512];
        data[..4].copy_from_slice(&7u32.to_le_bytes());
        data[256..260].copy_from_slice(&9u32.to_le_bytes());
        assert_eq!(unpad_rows(&data, 1, 256), [7, 9]);
    }
}
