// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Captures a burst of stills and writes them as numbered JPEG files.
//!
//! Runs against the simulator by default. Build with `--features hardware`
//! and pass `--hardware` to drive the camera of a Raspberry Pi.

mod common;

use std::path::PathBuf;

use clap::Parser;
use omx_still::{Backend, CaptureConfig, FrameCollector, StillPipeline, sim::Simulator};
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "Capture a burst of still images")]
struct Args {
    /// Number of images in the burst.
    #[arg(short, long, default_value_t = 2)]
    frames: u32,

    /// JSON capture configuration. Defaults apply to every missing field.
    #[arg(short, long, env = "OMX_STILL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the images are written to.
    #[arg(short, long, default_value = "/tmp")]
    output_dir: PathBuf,

    /// Use the VideoCore IL core instead of the simulator.
    #[arg(long)]
    hardware: bool,

    /// Chunk size of the simulated encoder output.
    #[arg(long, default_value_t = 16384)]
    chunk_size: usize,
}

fn shoot<B: Backend>(backend: B, args: &Args, config: &CaptureConfig) -> omx_still::Result<FrameCollector> {
    let mut pipeline = StillPipeline::new(backend);
    info!(pipeline = %pipeline.id(), frames = args.frames, "opening");
    pipeline.open(config)?;

    let mut collector = FrameCollector::new();
    let summary = pipeline.shoot(args.frames, &mut collector)?;
    info!(?summary, "shot");

    pipeline.close()?;
    Ok(collector)
}

#[cfg(feature = "hardware")]
fn shoot_hardware(args: &Args, config: &CaptureConfig) -> omx_still::Result<FrameCollector> {
    let core = omx_still::hardware::OmxCore::load_default()?;
    shoot(core, args, config)
}

#[cfg(not(feature = "hardware"))]
fn shoot_hardware(_args: &Args, _config: &CaptureConfig) -> omx_still::Result<FrameCollector> {
    Err(omx_still::Error::Other(
        "built without the `hardware` feature".to_string(),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CaptureConfig::from_file(path)?,
        None => CaptureConfig::default(),
    };

    let collector = if args.hardware {
        shoot_hardware(&args, &config)?
    } else {
        let simulator = Simulator::new();
        simulator.queue_images(args.frames, args.chunk_size);
        shoot(simulator, &args, &config)?
    };

    common::write_frames(&args.output_dir, collector)?;
    Ok(())
}
