// tests/test_pipeline.rs — Pipeline-level properties: dispatch order,
// parameter pushes, threshold variant selection, palette cycling, playback
// toggling and fixed buffer dimensions.
//
// A `RecordingBackend` wraps the CPU backend and logs every call the
// pipeline makes, so the tests can assert on the exact per-frame sequence.

use std::collections::HashSet;

use edgescope::backend::{KernelBackend, KernelHandle, TileGrid};
use edgescope::colour::PaletteColour;
use edgescope::config::EdgeConfig;
use edgescope::cpu::CpuBackend;
use edgescope::error::EdgeError;
use edgescope::graph::BufferId;
use edgescope::image::{Image, Rgba};
use edgescope::kernels::param;
use edgescope::pipeline::EdgePipeline;
use edgescope::source::{FrameSource, LoopingClip, SyntheticClip};

// ============================================================
// Recording backend
// ============================================================

#[derive(Debug, Clone, PartialEq)]
enum Event {
    SetFloat(String, f32),
    SetVector(String, [f32; 4]),
    /// Kernel name, tile grid, and the threshold / line colour the kernel
    /// would read if it ran now.
    Dispatch { kernel: String, grid: TileGrid, threshold: f32, line: Rgba },
    Upload(BufferId),
    Submit,
}

struct RecordingBackend {
    inner: CpuBackend,
    names: Vec<(KernelHandle, String)>,
    events: Vec<Event>,
    /// Kernel name `find_kernel` pretends not to know.
    missing: Option<&'static str>,
}

impl RecordingBackend {
    fn new() -> Self {
        RecordingBackend { inner: CpuBackend::new(), names: Vec::new(), events: Vec::new(), missing: None }
    }

    fn without(kernel: &'static str) -> Self {
        RecordingBackend { missing: Some(kernel), ..Self::new() }
    }

    fn name_of(&self, h: KernelHandle) -> String {
        self.names
            .iter()
            .find(|(k, _)| *k == h)
            .map(|(_, n)| n.clone())
            .unwrap_or_default()
    }
}

impl KernelBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }
    fn allocate(&mut self, buffer: BufferId, width: u32, height: u32) -> Result<(), EdgeError> {
        self.inner.allocate(buffer, width, height)
    }
    fn find_kernel(&mut self, name: &str) -> Result<KernelHandle, EdgeError> {
        if self.missing == Some(name) {
            return Err(EdgeError::UnknownKernel { name: name.to_string() });
        }
        let h = self.inner.find_kernel(name)?;
        self.names.push((h, name.to_string()));
        Ok(h)
    }
    fn bind_buffer(&mut self, k: KernelHandle, slot: &str, b: BufferId) -> Result<(), EdgeError> {
        self.inner.bind_buffer(k, slot, b)
    }
    fn set_float(&mut self, name: &str, value: f32) {
        self.events.push(Event::SetFloat(name.to_string(), value));
        self.inner.set_float(name, value);
    }
    fn set_vector(&mut self, name: &str, value: [f32; 4]) {
        self.events.push(Event::SetVector(name.to_string(), value));
        self.inner.set_vector(name, value);
    }
    fn dispatch(&mut self, kernel: KernelHandle, grid: TileGrid) {
        let u = self.inner.uniforms();
        self.events.push(Event::Dispatch {
            kernel: self.name_of(kernel),
            grid,
            threshold: u.threshold,
            line: u.line_colour,
        });
        self.inner.dispatch(kernel, grid);
    }
    fn upload(&mut self, buffer: BufferId, frame: &Image<Rgba>) -> Result<(), EdgeError> {
        self.events.push(Event::Upload(buffer));
        self.inner.upload(buffer, frame)
    }
    fn submit(&mut self) {
        self.events.push(Event::Submit);
        self.inner.submit();
    }
    fn read_buffer(&mut self, buffer: BufferId) -> Result<Image<Rgba>, EdgeError> {
        self.inner.read_buffer(buffer)
    }
}

// ============================================================
// Helpers
// ============================================================

fn recording_pipeline() -> EdgePipeline<RecordingBackend, SyntheticClip> {
    EdgePipeline::new(RecordingBackend::new(), SyntheticClip::new(24, 16, 6).unwrap()).unwrap()
}

/// Run one frame and return only that frame's events.
fn frame_events<S: FrameSource>(p: &mut EdgePipeline<RecordingBackend, S>) -> Vec<Event> {
    let start = p.backend().events.len();
    p.process_frame().unwrap();
    p.backend().events[start..].to_vec()
}

fn dispatched(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Dispatch { kernel, .. } => Some(kernel.clone()),
            _ => None,
        })
        .collect()
}

fn pos(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|k| k == name)
        .unwrap_or_else(|| panic!("{name} not dispatched in {order:?}"))
}

// ============================================================
// Stage order
// ============================================================

#[test]
fn stage_order_per_frame() {
    let mut p = recording_pipeline();
    for hard in [true, false] {
        p.set_hard_threshold(hard);
        let order = dispatched(&frame_events(&mut p));
        let t = if hard { "Threshold" } else { "ThresholdFuzzy" };

        assert!(pos(&order, "Greyscale") < pos(&order, "HorizSobel"));
        assert!(pos(&order, "Greyscale") < pos(&order, "VertSobel"));
        assert!(pos(&order, "HorizSobel") < pos(&order, "CombSobel"));
        assert!(pos(&order, "VertSobel") < pos(&order, "CombSobel"));
        assert!(pos(&order, "CombSobel") < pos(&order, t));
        assert!(pos(&order, t) < pos(&order, "Outline"));
        assert!(pos(&order, "HorizSobel") < pos(&order, "NormaliseHorizSobel"));
        assert!(pos(&order, "VertSobel") < pos(&order, "NormaliseVertSobel"));
    }
}

#[test]
fn frame_starts_with_upload_and_ends_with_submit() {
    let mut p = recording_pipeline();
    let events = frame_events(&mut p);
    assert_eq!(events.first(), Some(&Event::Upload(BufferId::Origin)));
    assert_eq!(events.last(), Some(&Event::Submit));
    assert_eq!(events.iter().filter(|e| **e == Event::Submit).count(), 1);
}

#[test]
fn every_dispatch_uses_the_same_tile_grid() {
    let mut p = recording_pipeline();
    let expected = TileGrid { x: 3, y: 2, z: 1 };
    assert_eq!(p.tiles(), expected);
    for e in frame_events(&mut p) {
        if let Event::Dispatch { grid, .. } = e {
            assert_eq!(grid, expected);
        }
    }
}

// ============================================================
// Parameter pushes
// ============================================================

#[test]
fn threshold_reaches_only_the_threshold_stage() {
    let mut p = recording_pipeline();
    for i in 0..=10 {
        let v = i as f32 / 10.0;
        p.set_threshold(v);
        let events = frame_events(&mut p);

        // Exactly one threshold push per frame, immediately before the
        // threshold dispatch.
        let pushes: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::SetFloat(n, _) if n == param::THRESHOLD))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(pushes.len(), 1, "frame with threshold {v}");
        assert_eq!(events[pushes[0]], Event::SetFloat(param::THRESHOLD.to_string(), v));
        match &events[pushes[0] + 1] {
            Event::Dispatch { kernel, threshold, .. } => {
                assert_eq!(kernel, "Threshold");
                assert_eq!(*threshold, v);
            }
            other => panic!("expected the threshold dispatch, got {other:?}"),
        }
    }
}

#[test]
fn fuzzy_stage_sees_the_threshold_too() {
    let mut p = recording_pipeline();
    p.set_hard_threshold(false);
    p.set_threshold(0.35);
    let events = frame_events(&mut p);
    let fuzzy = events
        .iter()
        .find_map(|e| match e {
            Event::Dispatch { kernel, threshold, .. } if kernel == "ThresholdFuzzy" => Some(*threshold),
            _ => None,
        })
        .expect("fuzzy threshold dispatched");
    assert_eq!(fuzzy, 0.35);
}

#[test]
fn line_colour_pushed_immediately_before_outline() {
    let mut p = recording_pipeline();
    let colour = p.cycle_line_colour();
    let events = frame_events(&mut p);
    let i = events
        .iter()
        .position(|e| matches!(e, Event::Dispatch { kernel, .. } if kernel == "Outline"))
        .unwrap();
    assert_eq!(
        events[i - 1],
        Event::SetVector(param::LINE_COLOUR.to_string(), colour.rgba().to_array())
    );
    assert!(matches!(&events[i], Event::Dispatch { line, .. } if *line == colour.rgba()));
    let vector_pushes = events.iter().filter(|e| matches!(e, Event::SetVector(..))).count();
    assert_eq!(vector_pushes, 1);
}

#[test]
fn threshold_outside_unit_range_is_passed_through() {
    let mut p = recording_pipeline();
    p.set_threshold(2.5);
    let events = frame_events(&mut p);
    assert!(events.contains(&Event::SetFloat(param::THRESHOLD.to_string(), 2.5)));
    // The background gradient is far below 2.5.
    let t = p.read_buffer(BufferId::Threshold).unwrap();
    assert_eq!(t.get(0, 0).r, 0.0);
}

// ============================================================
// Threshold variant selection
// ============================================================

#[test]
fn exactly_one_threshold_variant_per_frame() {
    let mut p = recording_pipeline();
    for &hard in &[true, false, false, true, false] {
        p.set_hard_threshold(hard);
        let order = dispatched(&frame_events(&mut p));
        let h = order.iter().filter(|k| *k == "Threshold").count();
        let f = order.iter().filter(|k| *k == "ThresholdFuzzy").count();
        assert_eq!(h + f, 1);
        assert_eq!(h == 1, hard);
    }
}

// ============================================================
// Palette and playback
// ============================================================

#[test]
fn nine_colour_cycles_return_to_start() {
    let mut p = recording_pipeline();
    let start = p.params().colour();
    assert_eq!(start, PaletteColour::Red);
    let mut seen = vec![start];
    for step in 1..=9 {
        let c = p.cycle_line_colour();
        assert_eq!(c, PaletteColour::ALL[step % 9], "step {step}");
        seen.push(c);
    }
    assert_eq!(p.params().colour(), start);
    // Every palette entry visited exactly once before wrapping.
    let distinct: HashSet<_> = seen[..9].iter().copied().collect();
    assert_eq!(distinct.len(), 9);
}

#[test]
fn configured_initial_colour() {
    let cfg = EdgeConfig { initial_colour: PaletteColour::Magenta, ..EdgeConfig::default() };
    let mut p = EdgePipeline::with_config(
        RecordingBackend::new(),
        SyntheticClip::new(8, 8, 1).unwrap(),
        &cfg,
    )
    .unwrap();
    assert_eq!(p.cycle_line_colour(), PaletteColour::Yellow);
}

#[test]
fn pause_toggle_twice_restores_playback() {
    let mut p = recording_pipeline();
    let initial = p.is_playing();
    p.pause_or_resume();
    assert_ne!(p.is_playing(), initial);
    p.pause_or_resume();
    assert_eq!(p.is_playing(), initial);
}

#[test]
fn paused_source_keeps_origin_fixed() {
    let mut p = recording_pipeline();
    p.process_frame().unwrap();
    p.pause_or_resume();
    p.process_frame().unwrap();
    let a = p.read_buffer(BufferId::Origin).unwrap();
    p.process_frame().unwrap();
    let b = p.read_buffer(BufferId::Origin).unwrap();
    assert_eq!(a.as_slice(), b.as_slice());

    p.pause_or_resume();
    p.process_frame().unwrap();
    p.process_frame().unwrap();
    let c = p.read_buffer(BufferId::Origin).unwrap();
    assert_ne!(a.as_slice(), c.as_slice());
}

// ============================================================
// Buffers and construction
// ============================================================

#[test]
fn buffer_dimensions_never_change() {
    let mut p = recording_pipeline();
    let res = p.resolution();
    assert_eq!(res, (24, 16));
    for i in 0..8 {
        p.set_threshold(i as f32 * 0.2);
        p.set_hard_threshold(i % 2 == 0);
        p.cycle_line_colour();
        p.process_frame().unwrap();
        for id in p.buffers() {
            assert_eq!(p.read_buffer(id).unwrap().dimensions(), res, "{id}");
        }
    }
    assert_eq!(p.resolution(), res);
}

#[test]
fn all_nine_buffers_allocated_by_default() {
    let p = recording_pipeline();
    assert_eq!(p.buffers(), BufferId::ALL.to_vec());
}

#[test]
fn unknown_kernel_fails_construction() {
    let res = EdgePipeline::new(RecordingBackend::without("Outline"), SyntheticClip::new(8, 8, 1).unwrap());
    match res {
        Err(EdgeError::UnknownKernel { name }) => assert_eq!(name, "Outline"),
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("construction should fail"),
    }
}

/// A source whose frames do not match its declared resolution.
struct LyingSource {
    frame: Image<Rgba>,
}

impl FrameSource for LyingSource {
    fn resolution(&self) -> (u32, u32) {
        (8, 8)
    }
    fn advance(&mut self) {}
    fn current(&self) -> &Image<Rgba> {
        &self.frame
    }
    fn is_playing(&self) -> bool {
        true
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
}

#[test]
fn mismatched_frame_is_rejected() {
    let mut p = EdgePipeline::new(CpuBackend::new(), LyingSource { frame: Image::new(9, 8) }).unwrap();
    let err = p.process_frame().unwrap_err();
    assert!(matches!(err, EdgeError::DimensionMismatch { expected: (8, 8), got: (9, 8) }));
    assert_eq!(p.frame_count(), 0);
}

#[test]
fn still_image_pipeline_is_deterministic() {
    let frame = SyntheticClip::new(30, 20, 3).unwrap().current().clone();
    let mut a = EdgePipeline::new(CpuBackend::new(), LoopingClip::still(frame.clone()).unwrap()).unwrap();
    let mut b = EdgePipeline::new(CpuBackend::new(), LoopingClip::still(frame).unwrap()).unwrap();
    a.process_frame().unwrap();
    b.process_frame().unwrap();
    b.process_frame().unwrap();
    for id in BufferId::ALL {
        assert_eq!(a.read_buffer(id).unwrap().as_slice(), b.read_buffer(id).unwrap().as_slice());
    }
}
