// display.rs — Display sinks: a mosaic of pipeline buffers in one
// framebuffer.
//
// Seven tiles, one per core buffer, laid out row-major in `columns` columns:
//
//   ┌────────┬───────────┬────────────┬───────────┐
//   │ Origin │ Greyscale │ HorizSobel │ VertSobel │
//   ├────────┼───────────┼────────────┼───────────┘
//   │  Comb  │ Threshold │  Outline   │
//   └────────┴───────────┴────────────┘
//
// With normalised Sobels shown, the two Sobel tiles read the normalised
// buffers instead (negative gradients become visible as dark grey rather
// than clamped black). Sinks only read; they never feed back into the
// pipeline.
//
// The framebuffer is packed 0RGB `u32`, as minifb expects.

use std::cell::Cell;

use tracing::warn;

use crate::backend::KernelBackend;
use crate::config::DisplayConfig;
use crate::convert::pack_0rgb;
use crate::error::EdgeError;
use crate::graph::BufferId;
use crate::image::{Image, Rgba};
use crate::pipeline::EdgePipeline;
use crate::source::FrameSource;

/// Framebuffer colour behind and between tiles.
pub const BACKGROUND: u32 = 0x0020_2020;

/// One tile of the mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkTile {
    pub buffer: BufferId,
    /// Top-left corner in framebuffer pixels.
    pub x: usize,
    pub y: usize,
}

/// Layout and rendering of the buffer mosaic.
#[derive(Debug, Clone)]
pub struct DisplaySinks {
    config: DisplayConfig,
    resolution: (u32, u32),
    tile_w: usize,
    tile_h: usize,
    show_normalised: bool,
    /// Set once the raw-Sobel fallback has been logged for the current
    /// `show_normalised` request.
    fallback_warned: Cell<bool>,
}

impl DisplaySinks {
    /// Tiles sized for a pipeline of `resolution`.
    pub fn new(resolution: (u32, u32), config: &DisplayConfig, show_normalised: bool) -> Self {
        let scale = config.scale.max(1) as usize;
        DisplaySinks {
            config: config.clone(),
            resolution,
            tile_w: resolution.0 as usize * scale,
            tile_h: resolution.1 as usize * scale,
            show_normalised,
            fallback_warned: Cell::new(false),
        }
    }

    /// Pipeline resolution the tiles were sized for.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn show_normalised(&self) -> bool {
        self.show_normalised
    }

    pub fn set_show_normalised(&mut self, show: bool) {
        self.show_normalised = show;
        self.fallback_warned.set(false);
    }

    /// Buffers shown, in tile order.
    pub fn buffers(&self) -> [BufferId; 7] {
        let mut out = BufferId::CORE;
        if self.show_normalised {
            out[2] = BufferId::HorizSobelNormalised;
            out[3] = BufferId::VertSobelNormalised;
        }
        out
    }

    pub fn tiles(&self) -> Vec<SinkTile> {
        let cols = self.config.columns.max(1) as usize;
        let gap = self.config.gap as usize;
        self.buffers()
            .iter()
            .enumerate()
            .map(|(i, &buffer)| SinkTile {
                buffer,
                x: gap + (i % cols) * (self.tile_w + gap),
                y: gap + (i / cols) * (self.tile_h + gap),
            })
            .collect()
    }

    /// `(width, height)` of the framebuffer holding every tile.
    pub fn framebuffer_size(&self) -> (usize, usize) {
        let n = self.buffers().len();
        let cols = (self.config.columns.max(1) as usize).min(n);
        let rows = n.div_ceil(cols);
        let gap = self.config.gap as usize;
        (
            gap + cols * (self.tile_w + gap),
            gap + rows * (self.tile_h + gap),
        )
    }

    /// Read every shown buffer from `pipeline` and draw the mosaic.
    ///
    /// Falls back to the raw Sobel buffers if the pipeline does not run the
    /// normalisation stages. Fails with `DimensionMismatch` if `pipeline`
    /// runs at a different resolution than these sinks were built for.
    pub fn render<B: KernelBackend, S: FrameSource>(
        &self,
        pipeline: &mut EdgePipeline<B, S>,
        fb: &mut [u32],
    ) -> Result<(), EdgeError> {
        if pipeline.resolution() != self.resolution {
            return Err(EdgeError::DimensionMismatch {
                expected: self.resolution,
                got: pipeline.resolution(),
            });
        }
        let sinks = if self.show_normalised && !pipeline.graph().has_normalisation() {
            if !self.fallback_warned.replace(true) {
                warn!("normalised Sobels requested but not computed; showing raw gradients");
            }
            let mut raw = self.clone();
            raw.show_normalised = false;
            raw
        } else {
            self.clone()
        };
        let mut images = Vec::with_capacity(7);
        for tile in sinks.tiles() {
            images.push((tile, pipeline.read_buffer(tile.buffer)?));
        }
        sinks.draw(fb, images.iter().map(|(t, img)| (*t, img)));
        Ok(())
    }

    /// Draw already-read buffers into `fb`.
    ///
    /// # Panics
    /// Panics if `fb` is smaller than `framebuffer_size()` or an image is
    /// not at the sinks' resolution.
    pub fn draw<'a>(
        &self,
        fb: &mut [u32],
        images: impl IntoIterator<Item = (SinkTile, &'a Image<Rgba>)>,
    ) {
        let (fb_w, fb_h) = self.framebuffer_size();
        assert!(fb.len() >= fb_w * fb_h, "framebuffer too small for mosaic");
        fb[..fb_w * fb_h].fill(BACKGROUND);
        let scale = self.config.scale.max(1) as usize;
        for (tile, img) in images {
            assert_eq!(img.dimensions(), self.resolution, "{} tile has the wrong size", tile.buffer);
            blit(fb, fb_w, img, tile.x, tile.y, scale);
        }
    }
}

/// Copy `img` into `fb` at (ox, oy), nearest-neighbour upscaled by `scale`.
fn blit(fb: &mut [u32], fb_w: usize, img: &Image<Rgba>, ox: usize, oy: usize, scale: usize) {
    for y in 0..img.height() {
        let row: Vec<u32> = img
            .row(y)
            .iter()
            .flat_map(|&c| std::iter::repeat(pack_0rgb(c)).take(scale))
            .collect();
        for sy in 0..scale {
            let start = (oy + y * scale + sy) * fb_w + ox;
            fb[start..start + row.len()].copy_from_slice(&row);
        }
    }
}
