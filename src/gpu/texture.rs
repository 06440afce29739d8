// gpu/texture.rs — One pipeline buffer on the GPU, with upload and
// readback.
//
// THE ROW-ALIGNMENT PROBLEM
// ──────────────────────────
// Buffer↔texture copies need `bytes_per_row` to be a multiple of 256
// (`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`). An `Rgba32Float` texel is 16 bytes,
// so a row is `16 * width` bytes: aligned only when width is a multiple of
// 16. `queue.write_texture` has no such restriction, so uploads go through
// it directly after stripping any CPU-side stride padding. Readback copies
// into a padded buffer and strips the padding per row on the way out.
//
// Readback is expensive and synchronous: it stalls until the GPU has
// finished everything submitted so far. Display sinks call it once per
// buffer per frame; the hot path never does.

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::{Image, Rgba};

/// Bytes per `Rgba32Float` texel.
pub const TEXEL_BYTES: u32 = std::mem::size_of::<Rgba>() as u32;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A pipeline buffer resident on the GPU.
///
/// Usages: sampled by kernels that read it (TEXTURE_BINDING), written by the
/// kernel that produces it (STORAGE_BINDING), filled from frames (COPY_DST),
/// copied back for display (COPY_SRC).
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    /// Full view, bound both as a sampled input and a storage output.
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub fn new(gpu: &GpuDevice, width: u32, height: u32, label: &str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture { texture, view, width, height }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Queue a write of `src` into the texture. Takes effect before any
    /// command buffer submitted afterwards.
    ///
    /// # Panics
    /// Panics if `src` does not match the texture size; callers check first.
    pub fn upload(&self, gpu: &GpuDevice, src: &Image<Rgba>) {
        assert_eq!(src.dimensions(), self.dimensions(), "upload size mismatch");
        let compact;
        let pixels = if src.stride() == src.width() {
            src.as_slice()
        } else {
            compact = src.to_compact();
            compact.as_slice()
        };
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(pixels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * TEXEL_BYTES),
                rows_per_image: Some(self.height),
            },
            extent(self.width, self.height),
        );
    }

    /// Copy the texture back to the CPU, blocking until the GPU is done.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<Image<Rgba>, GpuError> {
        let row_bytes = self.width * TEXEL_BYTES;
        let aligned_bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);
        let readback_size = (aligned_bytes_per_row * self.height) as u64;

        let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuTexture::readback"),
            size: readback_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuTexture::readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        // Map asynchronously, then poll until the callback has fired.
        let buf_slice = readback_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below; a failed send only
            // means the caller already gave up.
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| GpuError::ReadbackLost)?
            .map_err(GpuError::BufferMap)?;

        let mapped = buf_slice.get_mapped_range();
        let pixels = unpad_rows(&mapped, self.width, self.height, aligned_bytes_per_row);
        drop(mapped);
        readback_buf.unmap();

        Ok(Image::from_vec(self.width as usize, self.height as usize, pixels))
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Decode `height` rows of `width` texels from a buffer whose rows are
/// `padded_row` bytes apart.
fn unpad_rows(bytes: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<Rgba> {
    let row_bytes = (width * TEXEL_BYTES) as usize;
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..height as usize {
        let start = y * padded_row as usize;
        out.extend(
            bytes[start..start + row_bytes]
                .chunks_exact(TEXEL_BYTES as usize)
                .map(bytemuck::pod_read_unaligned::<Rgba>),
        );
    }
    out
}

/// Round `value` up to the next multiple of `alignment`.
///
/// Examples:
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
