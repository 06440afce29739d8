// tests/test_sources.rs — Frame sources, configuration files and the
// display mosaic, driven end to end through the CPU pipeline.

use std::fs;
use std::path::Path;

use edgescope::colour::PaletteColour;
use edgescope::config::{DisplayConfig, EdgeConfig};
use edgescope::cpu::CpuBackend;
use edgescope::display::{DisplaySinks, BACKGROUND};
use edgescope::error::EdgeError;
use edgescope::graph::BufferId;
use edgescope::pipeline::EdgePipeline;
use edgescope::source::{FrameSource, ImageSequence};

/// Write a solid w×h PNG whose red channel is `red`.
fn write_png(dir: &Path, name: &str, w: u32, h: u32, red: u8) {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([red, 0, 0, 255]));
    img.save(dir.join(name)).unwrap();
}

fn red_of(seq: &ImageSequence) -> u8 {
    (seq.current().get(0, 0).r * 255.0).round() as u8
}

// ===== ImageSequence =====

#[test]
fn sequence_orders_frames_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "frame_2.png", 6, 4, 200);
    write_png(dir.path(), "frame_0.png", 6, 4, 0);
    write_png(dir.path(), "frame_1.PNG", 6, 4, 100);
    fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let mut seq = ImageSequence::open(dir.path()).unwrap();
    assert_eq!(seq.len(), 3);
    assert_eq!(seq.resolution(), (6, 4));
    assert_eq!(seq.dir(), dir.path());

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(red_of(&seq));
        seq.advance();
    }
    assert_eq!(seen, vec![0, 100, 200, 0], "loops back to the first frame");
}

#[test]
fn sequence_rejects_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.md"), "no frames here").unwrap();
    match ImageSequence::open(dir.path()) {
        Err(EdgeError::NoFrames(p)) => assert_eq!(p, dir.path()),
        other => panic!("expected NoFrames, got {other:?}"),
    }
}

#[test]
fn sequence_rejects_mixed_sizes() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "a.png", 6, 4, 0);
    write_png(dir.path(), "b.png", 8, 4, 0);
    assert!(matches!(
        ImageSequence::open(dir.path()),
        Err(EdgeError::DimensionMismatch { expected: (6, 4), got: (8, 4) })
    ));
}

#[test]
fn sequence_rejects_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(ImageSequence::open(&missing), Err(EdgeError::Io(_))));
}

#[test]
fn pipeline_runs_over_sequence() {
    let dir = tempfile::tempdir().unwrap();
    // A hard vertical edge in the second frame only.
    write_png(dir.path(), "0.png", 12, 8, 0);
    let mut edge = image::RgbaImage::from_pixel(12, 8, image::Rgba([0, 0, 0, 255]));
    for y in 0..8 {
        for x in 6..12 {
            edge.put_pixel(x, y, image::Rgba([255, 255, 255, 255]));
        }
    }
    edge.save(dir.path().join("1.png")).unwrap();

    let seq = ImageSequence::open(dir.path()).unwrap();
    let mut p = EdgePipeline::new(CpuBackend::new(), seq).unwrap();
    assert_eq!(p.resolution(), (12, 8));

    p.process_frame().unwrap();
    let t0 = p.read_buffer(BufferId::Threshold).unwrap();
    assert!(t0.pixels().all(|(_, _, v)| v.r == 0.0));

    p.process_frame().unwrap();
    let t1 = p.read_buffer(BufferId::Threshold).unwrap();
    assert_eq!(t1.get(5, 3).r, 1.0);
    assert_eq!(t1.get(6, 3).r, 1.0);
    assert_eq!(t1.get(0, 3).r, 0.0);
}

// ===== Configuration files =====

#[test]
fn config_file_drives_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edgescope.toml");
    fs::write(
        &path,
        r#"
threshold = 0.25
hard_threshold = false
initial_colour = "cyan"
run_normalisation = false

[display]
columns = 7
gap = 0
"#,
    )
    .unwrap();

    let config = EdgeConfig::load(&path).unwrap();
    let clip = edgescope::SyntheticClip::new(16, 16, 2).unwrap();
    let mut p = EdgePipeline::with_config(CpuBackend::new(), clip, &config).unwrap();

    assert_eq!(p.params().threshold(), 0.25);
    assert!(!p.params().hard_threshold());
    assert_eq!(p.params().colour(), PaletteColour::Cyan);
    assert!(!p.graph().has_normalisation());
    assert!(!p.buffers().contains(&BufferId::HorizSobelNormalised));

    p.process_frame().unwrap();
    assert_eq!(p.backend().dispatch_count(), 6);
    assert_eq!(p.cycle_line_colour(), PaletteColour::Magenta);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = EdgeConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, EdgeConfig::default());
}

#[test]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "threshold = \"high\"").unwrap();
    assert!(matches!(
        EdgeConfig::load_or_default(Some(&path)),
        Err(EdgeError::ConfigParse(_))
    ));
}

// ===== Display mosaic =====

#[test]
fn mosaic_shows_outline_in_last_tile() {
    let clip = edgescope::SyntheticClip::new(10, 6, 1).unwrap();
    let mut p = EdgePipeline::new(CpuBackend::new(), clip).unwrap();
    p.process_frame().unwrap();

    let layout = DisplayConfig { columns: 4, gap: 2, scale: 1 };
    let sinks = DisplaySinks::new(p.resolution(), &layout, false);
    let (w, h) = sinks.framebuffer_size();
    let mut fb = vec![0u32; w * h];
    sinks.render(&mut p, &mut fb).unwrap();

    // The gap at the top-left corner stays background.
    assert_eq!(fb[0], BACKGROUND);

    let outline = p.read_buffer(BufferId::Outline).unwrap();
    let last = sinks.tiles()[6];
    assert_eq!(last.buffer, BufferId::Outline);
    for (x, y, v) in outline.pixels() {
        let idx = (last.y + y) * w + last.x + x;
        assert_eq!(fb[idx], edgescope::convert::pack_0rgb(v));
    }
}

#[test]
fn mosaic_falls_back_to_raw_sobels_without_normalisation() {
    let clip = edgescope::SyntheticClip::new(10, 6, 1).unwrap();
    let config = EdgeConfig { run_normalisation: false, ..EdgeConfig::default() };
    let mut p = EdgePipeline::with_config(CpuBackend::new(), clip, &config).unwrap();
    p.process_frame().unwrap();

    // Asking for normalised Sobels that were never computed still renders.
    let sinks = DisplaySinks::new(p.resolution(), &DisplayConfig::default(), true);
    let (w, h) = sinks.framebuffer_size();
    let mut fb = vec![0u32; w * h];
    sinks.render(&mut p, &mut fb).unwrap();

    let gx = p.read_buffer(BufferId::HorizSobel).unwrap();
    let tile = sinks.tiles()[2];
    let idx = tile.y * w + tile.x;
    assert_eq!(fb[idx], edgescope::convert::pack_0rgb(gx.get(0, 0)));
}

#[test]
fn mosaic_rejects_pipeline_at_another_resolution() {
    let clip = edgescope::SyntheticClip::new(16, 16, 1).unwrap();
    let mut p = EdgePipeline::new(CpuBackend::new(), clip).unwrap();
    p.process_frame().unwrap();

    // Sinks laid out for 4×4 tiles must not draw 16×16 buffers.
    let sinks = DisplaySinks::new((4, 4), &DisplayConfig::default(), false);
    let (w, h) = sinks.framebuffer_size();
    let mut fb = vec![0u32; w * h];
    let err = sinks.render(&mut p, &mut fb).unwrap_err();
    assert!(matches!(
        err,
        EdgeError::DimensionMismatch { expected: (4, 4), got: (16, 16) }
    ));

    // Larger sinks than the pipeline are rejected too, not drawn overlapping.
    let sinks = DisplaySinks::new((32, 32), &DisplayConfig::default(), false);
    let (w, h) = sinks.framebuffer_size();
    let mut fb = vec![0u32; w * h];
    assert!(sinks.render(&mut p, &mut fb).is_err());
}
