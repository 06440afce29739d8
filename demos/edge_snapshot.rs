// demos/edge_snapshot.rs
//
// Run one frame through the pipeline without a window and write every
// allocated buffer to a PNG named after it.
//
// Usage:
//   cargo run --example edge_snapshot --release -- photo.png
//   cargo run --example edge_snapshot --release -- photo.png --gpu --out-dir snap
//   cargo run --example edge_snapshot --release -- --synthetic 640x480
//
// Raw Sobel and magnitude buffers hold values outside [0, 1] and are
// clamped when quantised; the normalised Sobel PNGs are the readable ones.

use edgescope::config::EdgeConfig;
use edgescope::convert;
use edgescope::cpu::CpuBackend;
use edgescope::gpu::GpuBackend;
use edgescope::pipeline::EdgePipeline;
use edgescope::source::{FrameSource, LoopingClip, SyntheticClip};
use edgescope::KernelBackend;

use clap::Parser;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "edge_snapshot")]
#[command(about = "Write every edge-detection buffer for one frame as PNG", long_about = None)]
struct Args {
    /// Input image (PNG or JPEG)
    #[arg(required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Use a synthetic frame of this size instead, e.g. 640x480
    #[arg(long, value_parser = parse_size, conflicts_with = "input")]
    synthetic: Option<(u32, u32)>,

    /// Run the kernels on the GPU instead of the CPU reference backend
    #[arg(long)]
    gpu: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory, created if missing
    #[arg(long, default_value = "edgescope_out")]
    out_dir: PathBuf,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edgescope=info")),
        )
        .init();

    let args = Args::parse();
    let config = EdgeConfig::load_or_default(args.config.as_deref())?;

    let clip = match (&args.input, args.synthetic) {
        (Some(path), _) => {
            let decoded = image::open(path)?.to_rgba8();
            LoopingClip::still(convert::rgba8_to_image(&decoded))?
        }
        (None, Some((w, h))) => {
            let synthetic = SyntheticClip::new(w, h, 1)?;
            LoopingClip::still(synthetic.current().clone())?
        }
        (None, None) => unreachable!("clap requires input or --synthetic"),
    };

    fs::create_dir_all(&args.out_dir)?;
    if args.gpu {
        snapshot(GpuBackend::new()?, clip, &config, &args.out_dir)
    } else {
        snapshot(CpuBackend::new(), clip, &config, &args.out_dir)
    }
}

fn snapshot<B: KernelBackend>(
    backend: B,
    clip: LoopingClip,
    config: &EdgeConfig,
    out_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut pipeline = EdgePipeline::with_config(backend, clip, config)?;
    let (w, h) = pipeline.resolution();

    let t0 = Instant::now();
    pipeline.process_frame()?;
    for buffer in pipeline.buffers() {
        let img = pipeline.read_buffer(buffer)?;
        let path = out_dir.join(format!("{buffer}.png"));
        convert::to_rgba8(&img).save(&path)?;
        println!("  {:<22} → {}", buffer.to_string(), path.display());
    }

    info!(
        backend = pipeline.backend().name(),
        width = w,
        height = h,
        elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
        "snapshot written"
    );
    Ok(())
}
