//! Growable GPU buffers.
//!
//! Buffers grow 2x when data exceeds capacity and never shrink (GPU buffers
//! cannot be resized in place). Callers rebuild bind groups when a write
//! reports a reallocation.

use std::marker::PhantomData;

/// Smallest allocation in bytes. Storage bindings must not be empty.
const MIN_CAPACITY: usize = 64;

/// Capacity in bytes after growing to hold `needed` bytes.
fn grown_capacity(needed: usize, current: usize) -> usize {
    if needed <= current {
        current
    } else {
        (needed * 2).max(MIN_CAPACITY)
    }
}

/// Typed GPU buffer tracking an item count.
pub struct TypedBuffer<T> {
    buffer: wgpu::Buffer,
    capacity: usize,
    count: usize,
    usage: wgpu::BufferUsages,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> TypedBuffer<T> {
    /// Buffer with room for `capacity` items.
    pub fn with_capacity(
        device: &wgpu::Device,
        label: &str,
        capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let bytes = grown_capacity(capacity * size_of::<T>(), 0);
        Self {
            buffer: create(device, label, bytes, usage),
            capacity: bytes,
            count: 0,
            usage,
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    /// Write data to the buffer, growing if necessary.
    ///
    /// Returns `true` if the buffer was reallocated (bind groups need
    /// recreation).
    pub fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[T],
    ) -> bool {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let capacity = grown_capacity(bytes.len(), self.capacity);
        let reallocated = capacity != self.capacity;
        if reallocated {
            self.buffer = create(device, &self.label, capacity, self.usage);
            self.capacity = capacity;
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        self.count = data.len();
        reallocated
    }

    /// The underlying GPU buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of items written by the last [`TypedBuffer::write`].
    pub fn count(&self) -> usize {
        self.count
    }
}

fn create(
    device: &wgpu::Device,
    label: &str,
    bytes: usize,
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: bytes as u64,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_doubles_the_request() {
        assert_eq!(grown_capacity(100, 64), 200);
        assert_eq!(grown_capacity(4, 0), MIN_CAPACITY);
    }

    #[test]
    fn fitting_writes_keep_capacity() {
        assert_eq!(grown_capacity(64, 64), 64);
        assert_eq!(grown_capacity(0, 128), 128);
    }
}
