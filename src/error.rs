// error.rs — Crate-wide error type.
//
// Everything here is a construction-time failure: resolving kernels,
// allocating buffers, opening frame sources and loading configuration.
// Per-frame parameter changes cannot fail.

use std::path::PathBuf;

use thiserror::Error;

use crate::gpu::device::GpuError;
use crate::graph::BufferId;

#[derive(Error, Debug)]
pub enum EdgeError {
    /// The backend has no kernel with this name.
    #[error("unknown kernel: {name}")]
    UnknownKernel { name: String },

    /// The kernel exists but declares no binding slot with this name.
    #[error("kernel {kernel} has no binding slot named '{slot}'")]
    UnknownSlot { kernel: String, slot: String },

    /// A buffer was bound, uploaded to or read before `allocate`.
    #[error("buffer {0} was never allocated")]
    Unallocated(BufferId),

    /// `allocate` was called twice for the same buffer. Buffers are never
    /// resized.
    #[error("buffer {0} is already allocated")]
    AlreadyAllocated(BufferId),

    /// A frame or buffer does not match the pipeline resolution.
    #[error("dimension mismatch: expected {}×{}, got {}×{}", expected.0, expected.1, got.0, got.1)]
    DimensionMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },

    /// A pipeline resolution of zero in either axis.
    #[error("pipeline resolution must be non-zero, got {0}×{1}")]
    EmptyResolution(u32, u32),

    /// The stage graph violates its ordering or single-writer invariants.
    #[error("invalid stage graph: {0}")]
    InvalidGraph(String),

    /// A frame source was opened with no frames.
    #[error("frame source has no frames")]
    EmptySource,

    /// No decodable frames were found in an image-sequence directory.
    #[error("no image frames found in {}", .0.display())]
    NoFrames(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to decode frame: {0}")]
    Image(#[from] image::ImageError),
}
