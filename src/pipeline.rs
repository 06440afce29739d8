// pipeline.rs — The edge pipeline: frame source + stage graph + backend.
//
// CONSTRUCTION (fails fast)
// ─────────────────────────
//   1. validate config, build and validate the stage graph
//   2. allocate every buffer the graph touches at the source resolution
//   3. resolve each stage's kernel name to a handle
//   4. bind every stage slot to its buffer
//   5. compute the tile grid: ceil(w / 8) × ceil(h / 8)
//
// PER FRAME
// ─────────
//   upload source.current() → Origin
//   for each scheduled stage, in order:
//       push the parameters the kernel reads
//       dispatch over the tile grid
//   submit
//   source.advance()
//
// Only one threshold variant is scheduled per frame, picked from the
// hard-threshold flag as it stands when `process_frame` runs.

use tracing::info;

use crate::backend::{KernelBackend, KernelHandle, TileGrid};
use crate::colour::PaletteColour;
use crate::config::EdgeConfig;
use crate::error::EdgeError;
use crate::graph::{BufferId, StageGraph};
use crate::image::{Image, Rgba};
use crate::kernels::{param, KernelKind};
use crate::params::PipelineParams;
use crate::source::FrameSource;

/// A staged edge-detection pipeline over a backend `B` fed by source `S`.
pub struct EdgePipeline<B: KernelBackend, S: FrameSource> {
    backend: B,
    source: S,
    graph: StageGraph,
    /// One handle per `graph.stages()` entry.
    handles: Vec<KernelHandle>,
    params: PipelineParams,
    resolution: (u32, u32),
    tiles: TileGrid,
    frames: u64,
}

impl<B: KernelBackend, S: FrameSource> EdgePipeline<B, S> {
    /// Build a pipeline with default configuration.
    pub fn new(backend: B, source: S) -> Result<Self, EdgeError> {
        Self::with_config(backend, source, &EdgeConfig::default())
    }

    pub fn with_config(mut backend: B, source: S, config: &EdgeConfig) -> Result<Self, EdgeError> {
        config.validate()?;
        let graph = StageGraph::edge_detection(config.run_normalisation)?;

        let (width, height) = source.resolution();
        if width == 0 || height == 0 {
            return Err(EdgeError::EmptyResolution(width, height));
        }
        for buffer in graph.buffers() {
            backend.allocate(buffer, width, height)?;
        }

        let mut handles = Vec::with_capacity(graph.stages().len());
        for stage in graph.stages() {
            let handle = backend.find_kernel(stage.kernel.name())?;
            for (slot, buffer) in stage.bindings() {
                backend.bind_buffer(handle, slot, buffer)?;
            }
            handles.push(handle);
        }

        let params = PipelineParams::from_config(config);
        backend.set_float(param::FUZZY_BAND, params.fuzzy_band());

        let tiles = TileGrid::covering(width, height);
        info!(
            backend = backend.name(),
            width,
            height,
            tiles_x = tiles.x,
            tiles_y = tiles.y,
            stages = graph.stages().len(),
            "edge pipeline ready"
        );

        Ok(EdgePipeline {
            backend,
            source,
            graph,
            handles,
            params,
            resolution: (width, height),
            tiles,
            frames: 0,
        })
    }

    /// Run every scheduled stage on the source's current frame, then advance
    /// the source.
    ///
    /// # Errors
    /// `DimensionMismatch` if the source produced a frame of the wrong size.
    pub fn process_frame(&mut self) -> Result<(), EdgeError> {
        self.backend.upload(BufferId::Origin, self.source.current())?;

        let mode = self.params.mode();
        for (stage, &handle) in self.graph.stages().iter().zip(&self.handles) {
            if !stage.runs_in(mode) {
                continue;
            }
            push_params(&mut self.backend, &self.params, stage.kernel);
            self.backend.dispatch(handle, self.tiles);
        }
        self.backend.submit();

        self.source.advance();
        self.frames += 1;
        Ok(())
    }

    // --- Parameter controls ---

    pub fn set_threshold(&mut self, value: f32) {
        self.params.set_threshold(value);
    }

    pub fn set_hard_threshold(&mut self, hard: bool) {
        self.params.set_hard_threshold(hard);
    }

    /// Flip playback. Returns whether the source is now playing.
    pub fn pause_or_resume(&mut self) -> bool {
        if self.source.is_playing() {
            self.source.pause();
        } else {
            self.source.play();
        }
        let playing = self.source.is_playing();
        info!(playing, "playback toggled");
        playing
    }

    /// Advance the line colour one palette step.
    pub fn cycle_line_colour(&mut self) -> PaletteColour {
        self.params.cycle_line_colour()
    }

    // --- Readback / accessors ---

    /// Copy a buffer back to the CPU. Blocks on the GPU backend.
    pub fn read_buffer(&mut self, buffer: BufferId) -> Result<Image<Rgba>, EdgeError> {
        self.backend.read_buffer(buffer)
    }

    /// Buffers allocated for this pipeline.
    pub fn buffers(&self) -> Vec<BufferId> {
        self.graph.buffers()
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn tiles(&self) -> TileGrid {
        self.tiles
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    /// Frames processed since construction.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Push the parameters `kernel` reads, immediately before its dispatch.
fn push_params<B: KernelBackend>(backend: &mut B, params: &PipelineParams, kernel: KernelKind) {
    for &name in kernel.params() {
        match name {
            param::THRESHOLD => backend.set_float(name, params.threshold()),
            param::FUZZY_BAND => backend.set_float(name, params.fuzzy_band()),
            param::LINE_COLOUR => backend.set_vector(name, params.line_colour().to_array()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::source::{LoopingClip, SyntheticClip};

    fn pipeline() -> EdgePipeline<CpuBackend, SyntheticClip> {
        EdgePipeline::new(CpuBackend::new(), SyntheticClip::new(20, 12, 4).unwrap()).unwrap()
    }

    #[test]
    fn test_tiles_computed_once() {
        let mut p = pipeline();
        assert_eq!(p.tiles(), TileGrid { x: 3, y: 2, z: 1 });
        p.process_frame().unwrap();
        assert_eq!(p.tiles(), TileGrid { x: 3, y: 2, z: 1 });
    }

    #[test]
    fn test_frame_dispatch_count() {
        let mut p = pipeline();
        p.process_frame().unwrap();
        // Six core stages (one threshold variant) plus two normalisations.
        assert_eq!(p.backend().dispatch_count(), 8);
    }

    #[test]
    fn test_normalisation_can_be_disabled() {
        let cfg = EdgeConfig { run_normalisation: false, ..EdgeConfig::default() };
        let mut p = EdgePipeline::with_config(
            CpuBackend::new(),
            SyntheticClip::new(8, 8, 1).unwrap(),
            &cfg,
        )
        .unwrap();
        p.process_frame().unwrap();
        assert_eq!(p.backend().dispatch_count(), 6);
        assert!(matches!(
            p.read_buffer(BufferId::HorizSobelNormalised),
            Err(EdgeError::Unallocated(_))
        ));
    }

    #[test]
    fn test_uniform_frame_has_no_edges() {
        let frame = Image::filled(9, 9, Rgba::new(0.4, 0.5, 0.6, 1.0));
        let mut p = EdgePipeline::new(CpuBackend::new(), LoopingClip::still(frame.clone()).unwrap())
            .unwrap();
        p.process_frame().unwrap();
        let outline = p.read_buffer(BufferId::Outline).unwrap();
        for (x, y, v) in outline.pixels() {
            assert!(v.max_abs_diff(frame.get(x, y)) < 1e-6);
        }
    }

    #[test]
    fn test_pause_or_resume_twice_restores() {
        let mut p = pipeline();
        let initial = p.is_playing();
        assert_eq!(p.pause_or_resume(), !initial);
        assert_eq!(p.pause_or_resume(), initial);
    }

    #[test]
    fn test_paused_pipeline_still_processes() {
        let mut p = pipeline();
        p.pause_or_resume();
        p.process_frame().unwrap();
        p.process_frame().unwrap();
        assert_eq!(p.source().position(), 0);
        assert_eq!(p.frame_count(), 2);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let cfg = EdgeConfig { fuzzy_band: -1.0, ..EdgeConfig::default() };
        let res = EdgePipeline::with_config(CpuBackend::new(), SyntheticClip::new(8, 8, 1).unwrap(), &cfg);
        assert!(matches!(res, Err(EdgeError::InvalidConfig(_))));
    }
}
