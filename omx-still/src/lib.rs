// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # omx-still - Still capture over OpenMAX IL
//!
//! Drives the VideoCore camera, video splitter, JPEG encoder and null sink
//! components as one pipeline and streams the encoded output back as a burst
//! of complete JPEG images.
//!
//! ## Overview
//!
//! The media subsystem is reached through the [`Backend`] trait. The pipeline
//! logic is the same for both implementations:
//!
//! - [`sim::Simulator`]: in-process simulation, used by the tests and the demo
//! - `hardware::OmxCore` (feature `hardware`): the real IL core, loaded at
//!   runtime from `libopenmaxil.so` through the `omx-sys` bindings
//!
//! ### Key Concepts
//!
//! - **Component**: one stateful IL component with its own event channel ([`Component`])
//! - **Tunnel**: a direct port-to-port connection between two components ([`Tunnel`])
//! - **Burst**: `N` stills captured back to back through single-step mode
//! - **Chunk**: the payload of one filled output buffer; an image usually spans several
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ StillPipeline │  open / shoot / close
//! └───────┬───────┘
//!         │
//!         ├─► Component ×4 ──► EventChannel  (waits)
//!         ├─► Tunnel ×3
//!         └─► FrameDemuxer ──► ChunkSink     (per filled buffer)
//!                 │
//!              Backend (Simulator | OmxCore)
//! ```
//!
//! ## Examples
//!
//! ```
//! use omx_still::{CaptureConfig, StillPipeline, sim::Simulator};
//!
//! # fn main() -> Result<(), omx_still::Error> {
//! let simulator = Simulator::new();
//! simulator.queue_images(1, 1024);
//!
//! let mut pipeline = StillPipeline::new(simulator.clone());
//! pipeline.open(&CaptureConfig::default())?;
//!
//! let mut jpeg = Vec::new();
//! pipeline.shoot(1, &mut |_frame: u32, chunk: &[u8]| jpeg.extend_from_slice(chunk))?;
//! pipeline.close()?;
//!
//! assert!(simulator.report().is_clean());
//! assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! A [`StillPipeline`] is driven from one thread. Backends may signal the
//! component event channels from any thread.
//!
//! ## Feature Flags
//!
//! - `hardware`: build the OpenMAX IL backend (needs the VideoCore headers)

mod component;
mod demux;
mod error;
mod event;
mod pipeline;
mod sink;
mod tunnel;

pub mod backend;
pub mod config;
pub mod port;
pub mod settings;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod hardware;

pub use backend::{Backend, BufferHeader, ComponentState};
pub use component::{Component, Role};
pub use demux::{FrameDemuxer, ends_image, starts_exif_image};
pub use error::{Error, Result, status};
pub use event::{EventChannel, EventFlags};
pub use pipeline::{PipelineStage, ShotSummary, StillPipeline};
pub use settings::{
    CaptureConfig, DynamicRange, ExposureControl, ImageFilter, JpegConfig, Metering, Mirror,
    SensorConfig, WhiteBalance,
};
pub use sink::{ChunkSink, FrameCollector};
pub use tunnel::Tunnel;
