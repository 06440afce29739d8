// gpu/backend.rs — `KernelBackend` on wgpu compute.
//
// CONSTRUCTION
// ─────────────
// One shader module (shaders/edge.wgsl) compiled once with the tile size
// baked in, one bind group layout, and one compute pipeline per entry
// point. Compilation runs inside a validation error scope so a broken
// shader fails construction instead of panicking on first dispatch.
//
// PER DISPATCH
// ─────────────
//   1. If the kernel reads parameters, write a snapshot of the current
//      values into that kernel's own uniform buffer with
//      `queue.write_buffer`. Queue writes land at the start of the next
//      submit, ahead of every recorded pass, so a kernel whose uniform was
//      already written in the open encoder flushes it first. Each
//      parameter-reading kernel runs once per frame, so in practice the
//      encoder is only flushed by `submit`; the value pushed right before
//      a dispatch is always the value that dispatch sees.
//   2. Record one compute pass. Separate passes make wgpu insert the
//      storage-write → sampled-read barrier between consecutive stages.
//
// Bind groups are cached per kernel and rebuilt only when a binding
// changes. Work accumulates in one encoder until `submit`, `upload` or
// `read_buffer` flushes it.
//
// NEW RUST CONCEPTS:
// - `Option::get_or_insert_with` — lazily creates the command encoder on
//   first use and hands back `&mut` to it.
// - `device.push_error_scope` / `pop_error_scope` — capture validation
//   errors from a block of calls as a value rather than a panic.

use wgpu::util::DeviceExt;
use tracing::{debug, info, warn};

use crate::backend::{KernelBackend, KernelHandle, TileGrid, TILE_SIZE};
use crate::error::EdgeError;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::texture::GpuTexture;
use crate::graph::BufferId;
use crate::image::{Image, Rgba};
use crate::kernels::{param, KernelKind, KernelUniforms, OUTPUT_BINDING};

/// Binding index of the parameter uniform in edge.wgsl.
const PARAMS_BINDING: u32 = 3;

/// Mirrors `struct EdgeParams` in edge.wgsl (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct EdgeParams {
    line_colour: [f32; 4],
    threshold: f32,
    fuzzy_band: f32,
    _pad: [f32; 2],
}

impl From<&KernelUniforms> for EdgeParams {
    fn from(u: &KernelUniforms) -> Self {
        EdgeParams {
            line_colour: u.line_colour.to_array(),
            threshold: u.threshold,
            fuzzy_band: u.fuzzy_band,
            _pad: [0.0; 2],
        }
    }
}

/// One compiled kernel with its bindings.
struct GpuKernel {
    kind: KernelKind,
    pipeline: wgpu::ComputePipeline,
    params: wgpu::Buffer,
    /// `params` was written since the last flush.
    params_written: bool,
    inputs: [Option<BufferId>; 2],
    output: Option<BufferId>,
    /// Rebuilt when a binding changes.
    bind_group: Option<wgpu::BindGroup>,
}

/// wgpu implementation of [`KernelBackend`].
pub struct GpuBackend {
    kernels: Vec<GpuKernel>,
    textures: Vec<Option<GpuTexture>>,
    layout: wgpu::BindGroupLayout,
    uniforms: KernelUniforms,
    encoder: Option<wgpu::CommandEncoder>,
    /// Passes recorded since the last flush.
    pending: u32,
    /// Declared last: the device must outlive every resource above.
    gpu: GpuDevice,
}

impl GpuBackend {
    /// Initialise a device with default settings and compile the kernels.
    pub fn new() -> Result<Self, EdgeError> {
        Self::with_device(GpuDevice::new()?)
    }

    /// Compile the kernels on an existing device.
    pub fn with_device(gpu: GpuDevice) -> Result<Self, EdgeError> {
        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Tile size is baked into the source text before compilation.
        let shader_src = include_str!("../shaders/edge.wgsl")
            .replace("{{TILE}}", &TILE_SIZE.to_string());
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("edge.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("edge BGL"),
            entries: &[
                sampled_entry(0),
                sampled_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: OUTPUT_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("edge pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let initial = EdgeParams::from(&KernelUniforms::default());
        let kernels = KernelKind::ALL
            .iter()
            .map(|&kind| GpuKernel {
                kind,
                pipeline: device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kind.name()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: kind.entry_point(),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                }),
                params: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("EdgeParams"),
                    contents: bytemuck::bytes_of(&initial),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                }),
                params_written: false,
                inputs: [None; 2],
                output: None,
                bind_group: None,
            })
            .collect();

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::ShaderCompile(err.to_string()).into());
        }
        info!(kernels = KernelKind::ALL.len(), "compiled edge kernels");

        Ok(GpuBackend {
            kernels,
            textures: (0..BufferId::ALL.len()).map(|_| None).collect(),
            layout,
            uniforms: KernelUniforms::default(),
            encoder: None,
            pending: 0,
            gpu,
        })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    fn texture(&self, buffer: BufferId) -> Result<&GpuTexture, EdgeError> {
        self.textures[buffer.index()]
            .as_ref()
            .ok_or(EdgeError::Unallocated(buffer))
    }

    /// Submit the open encoder, if any.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
            debug!(passes = self.pending, "submitted edge passes");
            self.pending = 0;
        }
        for k in &mut self.kernels {
            k.params_written = false;
        }
    }

    /// Build (or reuse) the bind group of kernel `index`. `None` if a slot
    /// is unbound.
    fn ensure_bind_group(&mut self, index: usize) -> Option<()> {
        let k = &self.kernels[index];
        if k.bind_group.is_some() {
            return Some(());
        }
        let n = k.kind.input_slots().len();
        let a = k.inputs[0]?;
        let b = if n > 1 { k.inputs[1]? } else { a };
        let out = k.output?;
        let view = |id: BufferId| self.textures[id.index()].as_ref().map(|t| &t.view);
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(k.kind.name()),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view(a)?),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view(b)?),
                },
                wgpu::BindGroupEntry {
                    binding: OUTPUT_BINDING,
                    resource: wgpu::BindingResource::TextureView(view(out)?),
                },
                wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: k.params.as_entire_binding(),
                },
            ],
        });
        self.kernels[index].bind_group = Some(bind_group);
        Some(())
    }
}

fn sampled_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            // Rgba32Float is not filterable; kernels only use textureLoad.
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

impl KernelBackend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn allocate(&mut self, buffer: BufferId, width: u32, height: u32) -> Result<(), EdgeError> {
        if width == 0 || height == 0 {
            return Err(EdgeError::EmptyResolution(width, height));
        }
        if self.textures[buffer.index()].is_some() {
            return Err(EdgeError::AlreadyAllocated(buffer));
        }
        self.gpu.check_resolution(width, height)?;
        let label = buffer.to_string();
        self.textures[buffer.index()] = Some(GpuTexture::new(&self.gpu, width, height, &label));
        debug!(%buffer, width, height, "allocated gpu texture");
        Ok(())
    }

    fn find_kernel(&mut self, name: &str) -> Result<KernelHandle, EdgeError> {
        self.kernels
            .iter()
            .position(|k| k.kind.name() == name)
            .map(KernelHandle)
            .ok_or_else(|| EdgeError::UnknownKernel { name: name.to_string() })
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelHandle,
        slot: &str,
        buffer: BufferId,
    ) -> Result<(), EdgeError> {
        self.texture(buffer)?;
        let k = &mut self.kernels[kernel.0];
        let binding = k.kind.slot_binding(slot).ok_or_else(|| EdgeError::UnknownSlot {
            kernel: k.kind.name().to_string(),
            slot: slot.to_string(),
        })?;
        match binding as usize {
            i @ 0..=1 => k.inputs[i] = Some(buffer),
            _ => k.output = Some(buffer),
        }
        k.bind_group = None;
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
        let index = kernel.0;
        if self.ensure_bind_group(index).is_none() {
            warn!(kernel = %self.kernels[index].kind, "dispatch skipped: kernel has unbound slots");
            return;
        }

        if !self.kernels[index].kind.params().is_empty() {
            if self.kernels[index].params_written {
                self.flush();
            }
            let snapshot = EdgeParams::from(&self.uniforms);
            let k = &mut self.kernels[index];
            self.gpu.queue.write_buffer(&k.params, 0, bytemuck::bytes_of(&snapshot));
            k.params_written = true;
        }

        let encoder = self.encoder.get_or_insert_with(|| {
            self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("edge frame"),
            })
        });
        let k = &self.kernels[index];

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(k.kind.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&k.pipeline);
            // ensure_bind_group succeeded above.
            if let Some(bg) = &k.bind_group {
                pass.set_bind_group(0, bg, &[]);
            }
            pass.dispatch_workgroups(grid.x, grid.y, grid.z);
        }
        self.pending += 1;
    }

    fn upload(&mut self, buffer: BufferId, frame: &Image<Rgba>) -> Result<(), EdgeError> {
        let expected = self.texture(buffer)?.dimensions();
        if frame.dimensions() != expected {
            return Err(EdgeError::DimensionMismatch { expected, got: frame.dimensions() });
        }
        // `write_texture` lands before the *next* submit. Flush first so
        // already-recorded passes still see the previous contents.
        self.flush();
        self.texture(buffer)?.upload(&self.gpu, frame);
        Ok(())
    }

    fn submit(&mut self) {
        self.flush();
    }

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Image<Rgba>, EdgeError> {
        self.flush();
        Ok(self.texture(buffer)?.readback(&self.gpu)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::gpu::run_gpu_test_in_subprocess;
    use crate::kernels::slot;
    use crate::pipeline::EdgePipeline;
    use crate::source::SyntheticClip;

    #[test]
    fn test_params_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<EdgeParams>(), 32);
        let p = EdgeParams::from(&KernelUniforms::default());
        assert_eq!(p.line_colour, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(p.threshold, 0.5);
    }

    #[test]
    fn test_shader_declares_every_entry_point() {
        let src = include_str!("../shaders/edge.wgsl");
        for k in KernelKind::ALL {
            assert!(
                src.contains(&format!("fn {}(", k.entry_point())),
                "edge.wgsl is missing entry point {}",
                k.entry_point()
            );
        }
    }

    #[test]
    fn test_shader_tile_placeholder() {
        let src = include_str!("../shaders/edge.wgsl");
        assert_eq!(
            src.matches("@workgroup_size({{TILE}}, {{TILE}}, 1)").count(),
            KernelKind::ALL.len()
        );
    }

    /// Largest per-channel difference between the CPU and GPU pipelines over
    /// every buffer, after `frames` frames with the given settings.
    fn max_cpu_gpu_diff(hard: bool, threshold: f32, frames: usize) -> f32 {
        let (w, h) = (53, 37);
        let mut cpu = EdgePipeline::new(CpuBackend::new(), SyntheticClip::new(w, h, 4).unwrap())
            .unwrap();
        let mut gpu = EdgePipeline::new(
            GpuBackend::new().expect("GPU backend"),
            SyntheticClip::new(w, h, 4).unwrap(),
        )
        .unwrap();
        configure(&mut cpu, hard, threshold);
        configure(&mut gpu, hard, threshold);
        let mut worst = 0.0f32;
        for _ in 0..frames {
            cpu.process_frame().unwrap();
            gpu.process_frame().unwrap();
            for id in BufferId::ALL {
                let a = cpu.read_buffer(id).unwrap();
                let b = gpu.read_buffer(id).unwrap();
                for (x, y, v) in a.pixels() {
                    worst = worst.max(v.max_abs_diff(b.get(x, y)));
                }
            }
        }
        worst
    }

    fn configure<B: KernelBackend>(p: &mut EdgePipeline<B, SyntheticClip>, hard: bool, threshold: f32) {
        p.set_hard_threshold(hard);
        p.set_threshold(threshold);
        p.cycle_line_colour();
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu_hard() {
        let diff = max_cpu_gpu_diff(true, 0.3, 3);
        assert!(diff < 1e-4, "GPU deviates from CPU by {diff}");
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu_fuzzy() {
        let diff = max_cpu_gpu_diff(false, 0.4, 3);
        assert!(diff < 1e-4, "GPU deviates from CPU by {diff}");
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_upload_readback_round_trip() {
        let mut backend = GpuBackend::new().expect("GPU backend");
        backend.allocate(BufferId::Origin, 19, 5).unwrap();
        let frame = Image::from_fn(19, 5, |x, y| Rgba::new(x as f32 / 19.0, y as f32 / 5.0, 0.25, 1.0));
        backend.upload(BufferId::Origin, &frame).unwrap();
        let back = backend.read_buffer(BufferId::Origin).unwrap();
        assert_eq!(back.as_slice(), frame.as_slice());
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_params_follow_each_dispatch() {
        // One kernel dispatched twice before a submit, with a different
        // threshold each time and a different output buffer.
        let (w, h) = (12, 9);
        let mut backend = GpuBackend::new().expect("GPU backend");
        for id in [BufferId::CombSobel, BufferId::Threshold, BufferId::Outline] {
            backend.allocate(id, w, h).unwrap();
        }
        backend.upload(BufferId::CombSobel, &Image::filled(w as usize, h as usize, Rgba::splat(0.5))).unwrap();

        let k = backend.find_kernel("Threshold").unwrap();
        let grid = TileGrid::covering(w, h);
        backend.bind_buffer(k, slot::COMB_SOBEL, BufferId::CombSobel).unwrap();
        backend.bind_buffer(k, slot::THRESHOLD, BufferId::Threshold).unwrap();
        backend.set_float(param::THRESHOLD, 0.9);
        backend.dispatch(k, grid);
        backend.bind_buffer(k, slot::THRESHOLD, BufferId::Outline).unwrap();
        backend.set_float(param::THRESHOLD, 0.1);
        backend.dispatch(k, grid);
        backend.submit();

        let above = backend.read_buffer(BufferId::Threshold).unwrap();
        let below = backend.read_buffer(BufferId::Outline).unwrap();
        assert!(above.pixels().all(|(_, _, v)| v.r == 0.0));
        assert!(below.pixels().all(|(_, _, v)| v.r == 1.0));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_params_follow_each_dispatch() {
        let out = run_gpu_test_in_subprocess(
            "gpu::backend::tests::inner_gpu_params_follow_each_dispatch",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner GPU test did not pass:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_matches_cpu_hard() {
        let out = run_gpu_test_in_subprocess("gpu::backend::tests::inner_gpu_matches_cpu_hard");
        assert!(out.contains("GPU_TEST_OK"), "inner GPU test did not pass:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_matches_cpu_fuzzy() {
        let out = run_gpu_test_in_subprocess("gpu::backend::tests::inner_gpu_matches_cpu_fuzzy");
        assert!(out.contains("GPU_TEST_OK"), "inner GPU test did not pass:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_upload_readback_round_trip() {
        let out = run_gpu_test_in_subprocess(
            "gpu::backend::tests::inner_gpu_upload_readback_round_trip",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner GPU test did not pass:\n{out}");
    }
}
