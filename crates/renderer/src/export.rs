use anyhow::{anyhow, Context, Result};
use capture::CapturedFrame;
use winit::dpi::PhysicalSize;

/// Offscreen color target plus the staging buffer used to read exported
/// frames back to the CPU.
///
/// The texture uses the same format as the swapchain so one pipeline serves
/// both the preview pass and the export pass; the readback path converts to
/// RGBA8 for the capture collaborator.
pub(crate) struct ExportTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    readback: wgpu::Buffer,
    size: PhysicalSize<u32>,
    format: wgpu::TextureFormat,
    padded_bytes_per_row: u32,
    unpadded_bytes_per_row: u32,
}

impl ExportTarget {
    pub fn new(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        format: wgpu::TextureFormat,
    ) -> Self {
        let unpadded_bytes_per_row = size.width * 4;
        let padded_bytes_per_row = padded_bytes_per_row(size.width);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("export color target"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("export readback"),
            size: padded_bytes_per_row as u64 * size.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback,
            size,
            format,
            padded_bytes_per_row,
            unpadded_bytes_per_row,
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn matches(&self, size: PhysicalSize<u32>, format: wgpu::TextureFormat) -> bool {
        self.size == size && self.format == format
    }

    /// Appends the texture-to-buffer copy for the frame just drawn.
    pub fn copy_out(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.size.height),
                },
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Blocks until queued GPU work completes, then returns the rendered
    /// frame as RGBA8. Must be called after the copy encoded by
    /// [`ExportTarget::copy_out`] has been submitted.
    pub fn read_frame(&self, device: &wgpu::Device, frame_index: u32) -> Result<CapturedFrame> {
        let slice = self.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        device
            .poll(wgpu::PollType::Wait)
            .context("GPU poll failed while reading back an export frame")?;
        rx.recv()
            .context("readback signal channel closed")?
            .context("failed to map the export readback buffer")?;

        let mapped = slice.get_mapped_range();
        let mut pixels =
            Vec::with_capacity(self.unpadded_bytes_per_row as usize * self.size.height as usize);
        for row in 0..self.size.height {
            let start = (row * self.padded_bytes_per_row) as usize;
            let end = start + self.unpadded_bytes_per_row as usize;
            pixels.extend_from_slice(&mapped[start..end]);
        }
        drop(mapped);
        self.readback.unmap();

        to_rgba8(self.format, &mut pixels)?;
        Ok(CapturedFrame::new(pixels, self.size.width, self.size.height)
            .with_frame_index(frame_index))
    }
}

/// Copy rows must start at 256-byte boundaries.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Rewrites the raster into RGBA channel order in place.
pub(crate) fn to_rgba8(format: wgpu::TextureFormat, pixels: &mut [u8]) -> Result<()> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(()),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            for pixel in pixels.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
            Ok(())
        }
        other => Err(anyhow!(
            "surface format {other:?} is not supported for frame capture"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_the_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(640), 2560);
        assert_eq!(padded_bytes_per_row(641), 2816);
    }

    #[test]
    fn bgra_is_swizzled_to_rgba() {
        let mut pixels = vec![1u8, 2, 3, 4, 10, 20, 30, 40];
        to_rgba8(wgpu::TextureFormat::Bgra8UnormSrgb, &mut pixels).expect("swizzle");
        assert_eq!(pixels, vec![3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn rgba_passes_through_untouched() {
        let mut pixels = vec![1u8, 2, 3, 4];
        to_rgba8(wgpu::TextureFormat::Rgba8UnormSrgb, &mut pixels).expect("identity");
        assert_eq!(pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn exotic_formats_are_rejected() {
        let mut pixels = vec![0u8; 8];
        assert!(to_rgba8(wgpu::TextureFormat::Rgba16Float, &mut pixels).is_err());
    }
}
