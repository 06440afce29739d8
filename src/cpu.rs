// cpu.rs — Reference backend: every kernel evaluated on the CPU, tile by
// tile, in issue order.
//
// Each dispatch runs to completion before `dispatch` returns, so `submit` has
// nothing to flush and reads never block. Buffers live in a table indexed by
// `BufferId`; kernels in a table indexed by `KernelKind::ALL` position.
//
// The per-pixel kernel bodies live in kernels.rs and are shared with the
// GPU validation tests.

use tracing::{debug, warn};

use crate::backend::{KernelBackend, KernelHandle, TileGrid, TILE_SIZE};
use crate::error::EdgeError;
use crate::graph::BufferId;
use crate::image::{Image, Rgba};
use crate::kernels::{eval_at, param, KernelKind, KernelUniforms};

/// Bindings of one kernel: up to two inputs, then the output.
#[derive(Debug, Clone, Default)]
struct CpuKernel {
    inputs: [Option<BufferId>; 2],
    output: Option<BufferId>,
}

/// CPU implementation of [`KernelBackend`].
#[derive(Debug)]
pub struct CpuBackend {
    buffers: Vec<Option<Image<Rgba>>>,
    kernels: Vec<CpuKernel>,
    uniforms: KernelUniforms,
    /// Total dispatches issued since construction.
    dispatches: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend {
            buffers: vec![None; BufferId::ALL.len()],
            kernels: vec![CpuKernel::default(); KernelKind::ALL.len()],
            uniforms: KernelUniforms::default(),
            dispatches: 0,
        }
    }

    /// Parameter values as last pushed.
    pub fn uniforms(&self) -> KernelUniforms {
        self.uniforms
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    /// Borrow a buffer without copying it.
    pub fn buffer(&self, buffer: BufferId) -> Option<&Image<Rgba>> {
        self.buffers[buffer.index()].as_ref()
    }

    fn allocated(&self, buffer: BufferId) -> Result<&Image<Rgba>, EdgeError> {
        self.buffer(buffer).ok_or(EdgeError::Unallocated(buffer))
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate(&mut self, buffer: BufferId, width: u32, height: u32) -> Result<(), EdgeError> {
        if width == 0 || height == 0 {
            return Err(EdgeError::EmptyResolution(width, height));
        }
        let entry = &mut self.buffers[buffer.index()];
        if entry.is_some() {
            return Err(EdgeError::AlreadyAllocated(buffer));
        }
        *entry = Some(Image::new(width as usize, height as usize));
        debug!(%buffer, width, height, "allocated cpu buffer");
        Ok(())
    }

    fn find_kernel(&mut self, name: &str) -> Result<KernelHandle, EdgeError> {
        KernelKind::ALL
            .iter()
            .position(|k| k.name() == name)
            .map(KernelHandle)
            .ok_or_else(|| EdgeError::UnknownKernel { name: name.to_string() })
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelHandle,
        slot: &str,
        buffer: BufferId,
    ) -> Result<(), EdgeError> {
        let kind = KernelKind::ALL[kernel.0];
        self.allocated(buffer)?;
        let binding = kind.slot_binding(slot).ok_or_else(|| EdgeError::UnknownSlot {
            kernel: kind.name().to_string(),
            slot: slot.to_string(),
        })?;
        let entry = &mut self.kernels[kernel.0];
        match binding as usize {
            i @ 0..=1 => entry.inputs[i] = Some(buffer),
            _ => entry.output = Some(buffer),
        }
        Ok(())
    }

    fn set_float(&mut self, name: &str, value: f32) {
        match name {
            param::THRESHOLD => self.uniforms.threshold = value,
            param::FUZZY_BAND => self.uniforms.fuzzy_band = value,
            _ => debug!(name, "ignoring unknown float parameter"),
        }
    }

    fn set_vector(&mut self, name: &str, value: [f32; 4]) {
        match name {
            param::LINE_COLOUR => self.uniforms.line_colour = Rgba::from(value),
            _ => debug!(name, "ignoring unknown vector parameter"),
        }
    }

    fn dispatch(&mut self, kernel: KernelHandle, grid: TileGrid) {
        let kind = KernelKind::ALL[kernel.0];
        let bound = &self.kernels[kernel.0];
        let n_inputs = kind.input_slots().len();
        let inputs = &bound.inputs[..n_inputs];
        let (Some(out_id), true) = (bound.output, inputs.iter().all(Option::is_some)) else {
            warn!(kernel = %kind, "dispatch skipped: kernel has unbound slots");
            return;
        };
        let input_ids: Vec<BufferId> = inputs.iter().flatten().copied().collect();

        // Take the output out of the table so the inputs can be borrowed.
        let Some(mut out) = self.buffers[out_id.index()].take() else {
            warn!(kernel = %kind, buffer = %out_id, "dispatch skipped: output unallocated");
            return;
        };
        let srcs: Option<Vec<&Image<Rgba>>> = input_ids
            .iter()
            .map(|b| self.buffers[b.index()].as_ref())
            .collect();
        let Some(srcs) = srcs else {
            warn!(kernel = %kind, "dispatch skipped: input aliases output or is unallocated");
            self.buffers[out_id.index()] = Some(out);
            return;
        };

        let (w, h) = (out.width(), out.height());
        let tile = TILE_SIZE as usize;
        for _z in 0..grid.z {
            for ty in 0..grid.y as usize {
                let y_end = ((ty + 1) * tile).min(h);
                for tx in 0..grid.x as usize {
                    let x_end = ((tx + 1) * tile).min(w);
                    for y in ty * tile..y_end {
                        for x in tx * tile..x_end {
                            out.set(x, y, eval_at(kind, &srcs, &self.uniforms, x, y));
                        }
                    }
                }
            }
        }

        self.buffers[out_id.index()] = Some(out);
        self.dispatches += 1;
    }

    fn upload(&mut self, buffer: BufferId, frame: &Image<Rgba>) -> Result<(), EdgeError> {
        let expected = self.allocated(buffer)?.dimensions();
        if frame.dimensions() != expected {
            return Err(EdgeError::DimensionMismatch { expected, got: frame.dimensions() });
        }
        self.buffers[buffer.index()] = Some(frame.to_compact());
        Ok(())
    }

    fn submit(&mut self) {}

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Image<Rgba>, EdgeError> {
        self.allocated(buffer).cloned()
    }
}
