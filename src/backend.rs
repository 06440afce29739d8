// backend.rs — The execution substrate the pipeline drives.
//
// A backend owns the pipeline buffers and the compiled kernels. The pipeline
// never touches pixel memory directly: it resolves kernels by name, binds
// buffers to named slots, pushes scalar parameters, and dispatches tiles.
//
//   CpuBackend  (cpu.rs)          authoritative, deterministic, no device
//   GpuBackend  (gpu/backend.rs)  wgpu compute, one pass per dispatch
//
// CONTRACT
// ────────
//   allocate      once per buffer, before any bind/upload/read
//   find_kernel   name → opaque handle; fails for names the backend lacks
//   bind_buffer   (handle, slot, buffer); fails for unknown slots or
//                 unallocated buffers
//   set_float     fire-and-forget; takes effect for dispatches issued after
//   set_vector    the push and before the next push of the same name
//   dispatch      cannot fail; a kernel with an unbound slot is skipped
//   upload        fill a buffer from a CPU frame of matching size
//   submit        flush everything issued so far
//   read_buffer   copy a buffer back to the CPU (blocks on the device)
//
// Backends are single-threaded: the trait takes `&mut self` throughout and
// the pipeline issues every call from the thread that owns it.

use crate::error::EdgeError;
use crate::graph::BufferId;
use crate::image::{Image, Rgba};

/// Edge length of a dispatch tile. Every kernel runs over 8×8 tiles, which
/// is also the WGSL workgroup size.
pub const TILE_SIZE: u32 = 8;

/// Opaque reference to a resolved kernel. Only meaningful to the backend
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub(crate) usize);

/// Number of tiles along each axis of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl TileGrid {
    /// Tiles needed to cover a `width × height` buffer: `ceil(dim / 8)` per
    /// axis, one layer.
    pub fn covering(width: u32, height: u32) -> Self {
        TileGrid {
            x: width.div_ceil(TILE_SIZE),
            y: height.div_ceil(TILE_SIZE),
            z: 1,
        }
    }

    /// Total number of tiles.
    pub fn count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// Kernel lookup, buffer binding, parameter pushes and tiled dispatch.
pub trait KernelBackend {
    /// Short human-readable name for logs ("cpu", "wgpu").
    fn name(&self) -> &str;

    /// Allocate `buffer` at `width × height`. Re-allocating a buffer that
    /// already exists is an error: buffers never resize.
    fn allocate(&mut self, buffer: BufferId, width: u32, height: u32) -> Result<(), EdgeError>;

    /// Resolve a kernel by name.
    fn find_kernel(&mut self, name: &str) -> Result<KernelHandle, EdgeError>;

    /// Bind `buffer` to the named slot of `kernel`.
    fn bind_buffer(
        &mut self,
        kernel: KernelHandle,
        slot: &str,
        buffer: BufferId,
    ) -> Result<(), EdgeError>;

    /// Push a scalar parameter. Unknown names are ignored.
    fn set_float(&mut self, name: &str, value: f32);

    /// Push a four-component parameter. Unknown names are ignored.
    fn set_vector(&mut self, name: &str, value: [f32; 4]);

    /// Issue `kernel` over `grid` tiles.
    fn dispatch(&mut self, kernel: KernelHandle, grid: TileGrid);

    /// Copy a CPU frame into `buffer`.
    fn upload(&mut self, buffer: BufferId, frame: &Image<Rgba>) -> Result<(), EdgeError>;

    /// Flush all issued work.
    fn submit(&mut self);

    /// Copy `buffer` back to the CPU. Flushes pending work first.
    fn read_buffer(&mut self, buffer: BufferId) -> Result<Image<Rgba>, EdgeError>;
}
