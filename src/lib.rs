// EdgeScope: staged Sobel edge detection with every intermediate buffer
// exposed for inspection.
//
//   Origin → Greyscale → {HorizSobel, VertSobel} → CombSobel
//          → Threshold (hard | fuzzy) → Outline
//
// The pipeline drives an abstract kernel backend: a CPU reference
// implementation (always available, authoritative) and a wgpu compute
// backend validated against it.

pub mod image;
pub mod convert;
pub mod gradient;
pub mod threshold;
pub mod outline;
pub mod colour;
pub mod error;

pub mod kernels;
pub mod graph;
pub mod backend;
pub mod cpu;
pub mod gpu;

pub mod config;
pub mod params;
pub mod source;
pub mod pipeline;
pub mod display;

pub use backend::{KernelBackend, KernelHandle, TileGrid, TILE_SIZE};
pub use colour::PaletteColour;
pub use config::{DisplayConfig, EdgeConfig};
pub use cpu::CpuBackend;
pub use display::DisplaySinks;
pub use error::EdgeError;
pub use graph::BufferId;
pub use image::{Image, Rgba};
pub use pipeline::EdgePipeline;
pub use source::{FrameSource, ImageSequence, LoopingClip, SyntheticClip};
