// source.rs — Frame sources: a looping clip with a play/pause toggle.
//
// The pipeline pulls one frame per `process_frame` call:
//
//   source.advance()   — step to the next frame if playing, wrap at the end
//   source.current()   — borrow the frame to upload into Origin
//
// A paused source keeps returning the same frame, so the stage chain still
// runs (parameter changes stay visible while paused).
//
// Provided sources:
//   LoopingClip     in-memory frames
//   SyntheticClip   generated frames, no I/O (tests, benches, demos)
//   ImageSequence   PNG/JPEG files from a directory, decoded once at open

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::convert::rgba8_to_image;
use crate::error::EdgeError;
use crate::image::{Image, Rgba};

/// A continuously updating RGBA frame with playback control.
pub trait FrameSource {
    /// `(width, height)` of every frame. Fixed for the source's lifetime.
    fn resolution(&self) -> (u32, u32);

    /// Move to the next frame if playing. Loops forever.
    fn advance(&mut self);

    /// The current frame.
    fn current(&self) -> &Image<Rgba>;

    fn is_playing(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);
}

// ---------------------------------------------------------------------------
// LoopingClip
// ---------------------------------------------------------------------------

/// A fixed list of equally sized frames played in a loop.
#[derive(Debug, Clone)]
pub struct LoopingClip {
    frames: Vec<Image<Rgba>>,
    position: usize,
    playing: bool,
}

impl LoopingClip {
    /// Starts playing at frame 0.
    ///
    /// # Errors
    /// `EmptySource` for no frames, `DimensionMismatch` if sizes differ.
    pub fn new(frames: Vec<Image<Rgba>>) -> Result<Self, EdgeError> {
        let first = frames.first().ok_or(EdgeError::EmptySource)?.dimensions();
        if first.0 == 0 || first.1 == 0 {
            return Err(EdgeError::EmptyResolution(first.0, first.1));
        }
        if let Some(odd) = frames.iter().find(|f| f.dimensions() != first) {
            return Err(EdgeError::DimensionMismatch { expected: first, got: odd.dimensions() });
        }
        Ok(LoopingClip { frames, position: 0, playing: true })
    }

    /// A one-frame clip, e.g. a still image.
    pub fn still(frame: Image<Rgba>) -> Result<Self, EdgeError> {
        Self::new(vec![frame])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the current frame.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl FrameSource for LoopingClip {
    fn resolution(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }

    fn advance(&mut self) {
        if self.playing {
            self.position = (self.position + 1) % self.frames.len();
        }
    }

    fn current(&self) -> &Image<Rgba> {
        &self.frames[self.position]
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}

// ---------------------------------------------------------------------------
// SyntheticClip
// ---------------------------------------------------------------------------

/// Generated test footage: a diagonal colour gradient with two solid
/// rectangles sliding across it. Frames are pre-rendered.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    inner: LoopingClip,
}

impl SyntheticClip {
    pub fn new(width: u32, height: u32, frames: usize) -> Result<Self, EdgeError> {
        if width == 0 || height == 0 {
            return Err(EdgeError::EmptyResolution(width, height));
        }
        if frames == 0 {
            return Err(EdgeError::EmptySource);
        }
        let rendered = (0..frames)
            .map(|i| synthetic_frame(width as usize, height as usize, i, frames))
            .collect();
        Ok(SyntheticClip { inner: LoopingClip::new(rendered)? })
    }

    pub fn position(&self) -> usize {
        self.inner.position()
    }
}

/// Frame `index` of `count`. Rectangle positions wrap, so the clip loops
/// without a jump.
fn synthetic_frame(w: usize, h: usize, index: usize, count: usize) -> Image<Rgba> {
    let phase = index as f32 / count as f32;
    let (rw, rh) = ((w / 4).max(1), (h / 3).max(1));
    let ax = (phase * w as f32) as usize;
    let ay = h / 6;
    let bx = w - 1 - ((phase * w as f32) as usize % w);
    let by = h / 2;
    let inside = |x: usize, y: usize, ox: usize, oy: usize| {
        (x + w - ox) % w < rw && y >= oy && y < oy + rh
    };
    Image::from_fn(w, h, |x, y| {
        if inside(x, y, ax, ay) {
            Rgba::new(0.95, 0.9, 0.2, 1.0)
        } else if inside(x, y, bx, by) {
            Rgba::new(0.1, 0.2, 0.8, 1.0)
        } else {
            let u = x as f32 / w.max(2) as f32;
            let v = y as f32 / h.max(2) as f32;
            Rgba::new(0.2 + 0.3 * u, 0.25 + 0.2 * v, 0.3, 1.0)
        }
    })
}

impl FrameSource for SyntheticClip {
    fn resolution(&self) -> (u32, u32) {
        self.inner.resolution()
    }
    fn advance(&mut self) {
        self.inner.advance()
    }
    fn current(&self) -> &Image<Rgba> {
        self.inner.current()
    }
    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }
    fn play(&mut self) {
        self.inner.play()
    }
    fn pause(&mut self) {
        self.inner.pause()
    }
}

// ---------------------------------------------------------------------------
// ImageSequence
// ---------------------------------------------------------------------------

/// File extensions `ImageSequence` picks up (case-insensitive).
const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Every PNG/JPEG in a directory, sorted by file name, decoded at open.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    dir: PathBuf,
    inner: LoopingClip,
}

impl ImageSequence {
    /// # Errors
    /// `Io` if the directory cannot be read, `NoFrames` if it holds no
    /// frame files, `Image` on a decode failure, `DimensionMismatch` if the
    /// frames differ in size.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, EdgeError> {
        let dir = dir.as_ref().to_path_buf();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_frame_file(p))
            .collect();
        if paths.is_empty() {
            return Err(EdgeError::NoFrames(dir));
        }
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            debug!(path = %path.display(), "decoding frame");
            let decoded = image::open(path)?.to_rgba8();
            frames.push(rgba8_to_image(&decoded));
        }
        let inner = LoopingClip::new(frames)?;
        let (w, h) = inner.resolution();
        info!(dir = %dir.display(), frames = inner.len(), width = w, height = h, "opened image sequence");
        Ok(ImageSequence { dir, inner })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn resolution(&self) -> (u32, u32) {
        self.inner.resolution()
    }
    fn advance(&mut self) {
        self.inner.advance()
    }
    fn current(&self) -> &Image<Rgba> {
        self.inner.current()
    }
    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }
    fn play(&mut self) {
        self.inner.play()
    }
    fn pause(&mut self) {
        self.inner.pause()
    }
}
