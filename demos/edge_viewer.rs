// demos/edge_viewer.rs
//
// Live mosaic of every pipeline buffer: origin, greyscale, both Sobels,
// combined magnitude, threshold and outline.
//
// Usage:
//   cargo run --example edge_viewer --release
//   cargo run --example edge_viewer --release -- --gpu --frames-dir /path/to/frames
//   cargo run --example edge_viewer --release -- --config edgescope.toml
//
// Controls:
//   Up/Down  — raise/lower the threshold
//   H        — toggle hard/fuzzy threshold
//   C        — cycle the outline colour
//   N        — toggle raw/normalised Sobel tiles
//   Space    — pause/resume the source
//   Q/Esc    — quit
//
// Set RUST_LOG to change verbosity, e.g. RUST_LOG=edgescope=debug.

use edgescope::config::EdgeConfig;
use edgescope::cpu::CpuBackend;
use edgescope::display::{DisplaySinks, BACKGROUND};
use edgescope::gpu::GpuBackend;
use edgescope::pipeline::EdgePipeline;
use edgescope::source::{FrameSource, ImageSequence, SyntheticClip};
use edgescope::KernelBackend;

use clap::Parser;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Threshold change per Up/Down key repeat.
const THRESHOLD_STEP: f32 = 0.05;

#[derive(Parser, Debug)]
#[command(name = "edge_viewer")]
#[command(about = "Live view of every edge-detection buffer", long_about = None)]
struct Args {
    /// Run the kernels on the GPU instead of the CPU reference backend
    #[arg(long)]
    gpu: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of PNG/JPEG frames (a synthetic clip is used otherwise)
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Synthetic clip width
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Synthetic clip height
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Synthetic clip length in frames
    #[arg(long, default_value_t = 120)]
    length: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edgescope=info")),
        )
        .init();

    let args = Args::parse();
    let config = EdgeConfig::load_or_default(args.config.as_deref())?;

    match (&args.frames_dir, args.gpu) {
        (Some(dir), true) => run(GpuBackend::new()?, ImageSequence::open(dir)?, &config),
        (Some(dir), false) => run(CpuBackend::new(), ImageSequence::open(dir)?, &config),
        (None, gpu) => {
            let clip = SyntheticClip::new(args.width, args.height, args.length)?;
            if gpu {
                run(GpuBackend::new()?, clip, &config)
            } else {
                run(CpuBackend::new(), clip, &config)
            }
        }
    }
}

fn run<B: KernelBackend, S: FrameSource>(
    backend: B,
    source: S,
    config: &EdgeConfig,
) -> Result<(), Box<dyn Error>> {
    let mut pipeline = EdgePipeline::with_config(backend, source, config)?;
    let mut sinks = DisplaySinks::new(
        pipeline.resolution(),
        &config.display,
        config.show_normalised_sobels,
    );

    let (fb_w, fb_h) = sinks.framebuffer_size();
    let mut fb = vec![BACKGROUND; fb_w * fb_h];
    let (w, h) = pipeline.resolution();
    println!("Resolution: {}×{}, backend: {}", w, h, pipeline.backend().name());

    let title = format!("edgescope ({} backend)", pipeline.backend().name());
    let mut window = Window::new(&title, fb_w, fb_h, WindowOptions::default())?;
    window.set_target_fps(60);

    println!("\nControls: Up/Down=threshold, H=hard/fuzzy, C=colour, N=normalised, Space=pause, Q/Esc=quit\n");

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if window.is_key_pressed(Key::Up, KeyRepeat::Yes) {
            let t = pipeline.params().threshold() + THRESHOLD_STEP;
            pipeline.set_threshold(t);
            println!("Threshold: {:.2}", t);
        }
        if window.is_key_pressed(Key::Down, KeyRepeat::Yes) {
            let t = (pipeline.params().threshold() - THRESHOLD_STEP).max(0.0);
            pipeline.set_threshold(t);
            println!("Threshold: {:.2}", t);
        }
        if window.is_key_pressed(Key::H, KeyRepeat::No) {
            let hard = !pipeline.params().hard_threshold();
            pipeline.set_hard_threshold(hard);
            println!("Threshold mode: {}", if hard { "hard" } else { "fuzzy" });
        }
        if window.is_key_pressed(Key::C, KeyRepeat::No) {
            println!("Line colour: {}", pipeline.cycle_line_colour());
        }
        if window.is_key_pressed(Key::N, KeyRepeat::No) {
            if pipeline.graph().has_normalisation() {
                sinks.set_show_normalised(!sinks.show_normalised());
                println!("Sobel tiles: {}", if sinks.show_normalised() { "normalised" } else { "raw" });
            } else {
                println!("Normalisation is disabled in the configuration");
            }
        }
        if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            let playing = pipeline.pause_or_resume();
            println!("{}", if playing { "Resumed" } else { "Paused" });
        }

        pipeline.process_frame()?;
        sinks.render(&mut pipeline, &mut fb)?;
        window.update_with_buffer(&fb, fb_w, fb_h)?;
    }

    info!(frames = pipeline.frame_count(), "viewer closed");
    Ok(())
}
