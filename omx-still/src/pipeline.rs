// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Still capture pipeline orchestration.
//!
//! This module provides [`StillPipeline`], which builds the four component
//! graph, runs bounded bursts through it and tears it down again:
//!
//! ```text
//!            71 ┌──────────┐ 251    340 ┌─────────┐ 341
//! camera ──────►│ splitter │───────────►│ encoder │────► output buffer ──► ChunkSink
//!   │           └──────────┘            └─────────┘
//!   │ 70                240 ┌───────────┐
//!   └──────────────────────►│ null_sink │
//!                           └───────────┘
//! ```
//!
//! Every step is fail-fast: the first error is returned as is and nothing
//! already done is undone.

use tracing::{debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::{
    CaptureConfig, Component, Error, EventFlags, FrameDemuxer, Result,
    backend::{Backend, BufferHeader, ComponentState, Config, Parameter},
    component::Role,
    port::{
        CAMERA_CAPTURE, CAMERA_PREVIEW, CAMERA_STILL, ColorFormat, ENCODER_OUTPUT, ImageCoding,
        SPLITTER_OUTPUT, VideoCoding, VideoFormat, round_up,
    },
    settings::SensorConfig,
    sink::ChunkSink,
    tunnel::Tunnel,
};

/// Camera outputs whose frame sizes are logged once the graph is executing.
const FRAME_SIZE_PORTS: [u32; 3] = [CAMERA_PREVIEW, CAMERA_CAPTURE, CAMERA_STILL];

/// Ports whose definitions are logged once the graph is executing.
const DIAGNOSTIC_PORTS: [(Role, u32); 7] = [
    (Role::Camera, CAMERA_PREVIEW),
    (Role::Camera, CAMERA_CAPTURE),
    (Role::NullSink, crate::port::NULL_SINK_INPUT),
    (Role::Splitter, crate::port::SPLITTER_INPUT),
    (Role::Splitter, SPLITTER_OUTPUT),
    (Role::Encoder, crate::port::ENCODER_INPUT),
    (Role::Encoder, ENCODER_OUTPUT),
];

/// Where the pipeline is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Nothing is allocated. Only [`StillPipeline::open`] is allowed.
    Closed,
    /// All four components are executing. Shots may be taken.
    Executing,
    /// An open, shoot or close failed part way. Only [`StillPipeline::close`] is allowed.
    Partial,
}

/// Outcome of one burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotSummary {
    pub frames_requested: u32,
    /// Images found by the boundary detection.
    pub images: u32,
    /// Filled buffers handed to the sink.
    pub buffers: u64,
    pub bytes: u64,
}

/// The camera → splitter → encoder graph, plus the preview → null sink branch.
///
/// # Examples
///
/// ```
/// use omx_still::{CaptureConfig, FrameCollector, StillPipeline, sim::Simulator};
///
/// # fn main() -> Result<(), omx_still::Error> {
/// let simulator = Simulator::new();
/// simulator.queue_images(2, 4096);
///
/// let mut pipeline = StillPipeline::new(simulator);
/// pipeline.open(&CaptureConfig::default())?;
///
/// let mut collector = FrameCollector::new();
/// let summary = pipeline.shoot(2, &mut collector)?;
/// pipeline.close()?;
///
/// assert_eq!(summary.images, 2);
/// assert_eq!(collector.frames().len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct StillPipeline<B: Backend> {
    id: Uuid,
    backend: B,
    stage: PipelineStage,
    components: [Option<Component<B>>; 4],
    output_buffer: Option<B::Buffer>,
}

impl<B: Backend> StillPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            stage: PipelineStage::Closed,
            components: [None, None, None, None],
            output_buffer: None,
        }
    }

    /// Identifier recorded in the tracing span of every call.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the live component for `role`, if it was created.
    pub fn component(&self, role: Role) -> Option<&Component<B>> {
        self.components[role.index()].as_ref()
    }

    /// Builds the graph and brings every component to `Executing`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `config` fails validation (nothing is touched)
    /// - [`Error::InvalidState`] if the pipeline is not closed
    /// - any backend or component error, after which the pipeline is
    ///   [`PipelineStage::Partial`]
    pub fn open(&mut self, config: &CaptureConfig) -> Result<()> {
        let span = info_span!("open", pipeline = %self.id);
        let _enter = span.enter();

        if self.stage != PipelineStage::Closed {
            return Err(Error::InvalidState(format!(
                "open called while {:?}",
                self.stage
            )));
        }
        config.validate()?;
        self.stage = PipelineStage::Partial;

        self.backend.init()?;

        for role in Role::ALL {
            let component = Component::create(&mut self.backend, role)?;
            self.components[role.index()] = Some(component);
        }

        self.init_camera(config)?;
        self.init_encoder(config)?;

        debug!("configuring tunnels");
        self.setup_tunnel(&Tunnel::VIDEO)?;
        // The splitter renegotiates its output once its input is tunneled.
        self.component_ref(Role::Splitter)?
            .wait(EventFlags::PORT_SETTINGS_CHANGED)?;
        self.init_splitter(&config.sensor)?;
        self.setup_tunnel(&Tunnel::ENCODE)?;
        self.setup_tunnel(&Tunnel::PREVIEW)?;

        self.change_state_all(ComponentState::Idle)?;

        for tunnel in Tunnel::ALL {
            let (backend, output, input) = self.tunnel_parts(&tunnel)?;
            tunnel.enable(backend, output, input)?;
        }

        let (backend, encoder) = self.parts(Role::Encoder)?;
        let buffer = encoder.enable_port_with_buffer(backend, ENCODER_OUTPUT)?;
        self.output_buffer = Some(buffer);

        self.change_state_all(ComponentState::Executing)?;
        self.log_port_definitions()?;

        self.stage = PipelineStage::Executing;
        info!("pipeline open");
        Ok(())
    }

    /// Captures `frames` stills and streams the encoder output into `sink`.
    ///
    /// `sink` is called once per filled buffer with the frame index assigned by
    /// [`FrameDemuxer`]. The burst ends when the encoder reports end of stream
    /// together with the last fill.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the pipeline is executing, and
    /// [`Error::InvalidConfig`] for a zero frame count. Chunks already given
    /// to `sink` before a failure stay delivered.
    pub fn shoot<S: ChunkSink>(&mut self, frames: u32, sink: &mut S) -> Result<ShotSummary> {
        let span = info_span!("shoot", pipeline = %self.id, frames);
        let _enter = span.enter();

        if self.stage != PipelineStage::Executing {
            return Err(Error::InvalidState(format!(
                "shoot called while {:?}",
                self.stage
            )));
        }
        if frames == 0 {
            return Err(Error::InvalidConfig("a burst needs at least one frame".into()));
        }
        self.stage = PipelineStage::Partial;

        let (backend, splitter) = self.parts(Role::Splitter)?;
        debug!(component = %Role::Splitter, frames, "single step mode");
        splitter.set_config(
            backend,
            &Config::SingleStep {
                port: SPLITTER_OUTPUT,
                steps: frames,
            },
        )?;

        self.set_capturing(true)?;

        let mut demuxer = FrameDemuxer::new();
        let mut bytes = 0u64;
        loop {
            let Self {
                backend,
                components,
                output_buffer,
                ..
            } = self;
            let encoder = components[Role::Encoder.index()]
                .as_ref()
                .ok_or(Error::NotInitialized(Role::Encoder))?;
            let buffer = output_buffer
                .as_mut()
                .ok_or_else(|| Error::InvalidState("no output buffer".into()))?;

            encoder.fill_buffer(backend, buffer)?;
            let retrieved = encoder.wait(EventFlags::FILL_BUFFER_DONE)?;

            let chunk = buffer.filled();
            let frame = demuxer.classify(chunk);
            trace!(
                len = chunk.len(),
                capacity = buffer.capacity(),
                flags = buffer.flags(),
                frame,
                ?retrieved,
                "buffer filled"
            );
            bytes += chunk.len() as u64;
            sink.accept(frame, chunk);

            if retrieved.contains(EventFlags::BUFFER_FLAG | EventFlags::FILL_BUFFER_DONE) {
                // Drain the end-of-stream notification on both components.
                components[Role::Splitter.index()]
                    .as_ref()
                    .ok_or(Error::NotInitialized(Role::Splitter))?
                    .wait(EventFlags::BUFFER_FLAG)?;
                encoder.wait(EventFlags::BUFFER_FLAG)?;
                break;
            }
        }

        self.set_capturing(false)?;

        let summary = ShotSummary {
            frames_requested: frames,
            images: demuxer.images(),
            buffers: demuxer.chunks(),
            bytes,
        };
        if summary.images != frames {
            warn!(
                requested = frames,
                detected = summary.images,
                "burst produced a different number of images than requested"
            );
        }
        info!(
            images = summary.images,
            buffers = summary.buffers,
            bytes = summary.bytes,
            "burst complete"
        );
        self.stage = PipelineStage::Executing;
        Ok(summary)
    }

    /// Tears the graph down and deinitializes the media subsystem.
    ///
    /// After a failed [`StillPipeline::open`] the same sequence is attempted.
    /// It stops at the first step that cannot be done, typically with
    /// [`Error::NotInitialized`] for a component that was never created.
    pub fn close(&mut self) -> Result<()> {
        let span = info_span!("close", pipeline = %self.id);
        let _enter = span.enter();

        match self.stage {
            PipelineStage::Closed => {
                return Err(Error::InvalidState("close called while Closed".into()));
            }
            PipelineStage::Partial => warn!("closing a partially initialized pipeline"),
            PipelineStage::Executing => {}
        }
        self.stage = PipelineStage::Partial;

        self.change_state_all(ComponentState::Idle)?;

        for tunnel in Tunnel::ALL {
            let (backend, output, input) = self.tunnel_parts(&tunnel)?;
            tunnel.disable(backend, output, input)?;
        }

        let Some(buffer) = self.output_buffer.take() else {
            return Err(Error::InvalidState("no output buffer to free".into()));
        };
        let (backend, encoder) = self.parts(Role::Encoder)?;
        encoder.disable_port_free_buffer(backend, ENCODER_OUTPUT, buffer)?;

        self.change_state_all(ComponentState::Loaded)?;

        for role in Role::ALL {
            let component = self.components[role.index()]
                .take()
                .ok_or(Error::NotInitialized(role))?;
            component.destroy(&mut self.backend)?;
        }

        self.backend.deinit()?;

        self.stage = PipelineStage::Closed;
        info!("pipeline closed");
        Ok(())
    }

    fn init_camera(&mut self, config: &CaptureConfig) -> Result<()> {
        let sensor = &config.sensor;
        let (backend, camera) = self.parts(Role::Camera)?;

        camera.load_drivers(backend)?;

        let width = round_up(sensor.width, 32)?;
        let height = round_up(sensor.height, 16)?;
        for port in [CAMERA_PREVIEW, CAMERA_CAPTURE] {
            camera.set_parameter(
                backend,
                &Parameter::MaxFrameSize {
                    port,
                    width,
                    height,
                },
            )?;
        }

        debug!(component = %Role::Camera, "configuring capture port definition");
        camera.update_port_definition(backend, CAMERA_CAPTURE, |definition| {
            let video = definition.video_mut()?;
            set_raw_video_format(video, sensor)?;
            video.framerate = sensor.framerate << 16;
            Ok(())
        })?;

        // An unthrottled preview port lifts the limit on the shutter speed.
        debug!(component = %Role::Camera, "configuring preview port definition");
        camera.update_port_definition(backend, CAMERA_PREVIEW, |definition| {
            let video = definition.video_mut()?;
            set_raw_video_format(video, sensor)?;
            video.framerate = 0;
            Ok(())
        })?;
        camera.set_config(
            backend,
            &Config::Rotation {
                port: CAMERA_PREVIEW,
                degrees: sensor.rotation,
            },
        )?;

        debug!(component = %Role::Camera, "configuring settings");
        for setting in config.camera_configs() {
            camera.set_config(backend, &setting)?;
        }
        Ok(())
    }

    fn init_encoder(&mut self, config: &CaptureConfig) -> Result<()> {
        let sensor = &config.sensor;
        let (backend, encoder) = self.parts(Role::Encoder)?;

        debug!(component = %Role::Encoder, "configuring output port definition");
        encoder.update_port_definition(backend, ENCODER_OUTPUT, |definition| {
            let image = definition.image_mut()?;
            image.frame_width = sensor.width;
            image.frame_height = sensor.height;
            image.slice_height = round_up(sensor.height, 16)?;
            image.compression = ImageCoding::Jpeg;
            image.color = ColorFormat::Unused;
            Ok(())
        })?;

        debug!(component = %Role::Encoder, "configuring settings");
        for parameter in config.encoder_parameters() {
            encoder.set_parameter(backend, &parameter)?;
        }
        for setting in config.encoder_configs() {
            encoder.set_config(backend, &setting)?;
        }
        Ok(())
    }

    /// Only valid after the splitter reported its renegotiated output.
    fn init_splitter(&mut self, sensor: &SensorConfig) -> Result<()> {
        let (backend, splitter) = self.parts(Role::Splitter)?;

        debug!(component = %Role::Splitter, "configuring output port definition");
        splitter.update_port_definition(backend, SPLITTER_OUTPUT, |definition| {
            set_raw_video_format(definition.video_mut()?, sensor)
        })?;
        splitter.set_parameter(
            backend,
            &Parameter::DisableProprietaryTunnels {
                port: SPLITTER_OUTPUT,
                use_buffers: false,
            },
        )
    }

    fn set_capturing(&mut self, capturing: bool) -> Result<()> {
        let (backend, camera) = self.parts(Role::Camera)?;
        debug!(component = %Role::Camera, capturing, "capture port");
        camera.set_config(
            backend,
            &Config::PortCapturing {
                port: CAMERA_CAPTURE,
                capturing,
            },
        )
    }

    fn setup_tunnel(&mut self, tunnel: &Tunnel) -> Result<()> {
        let (backend, output, input) = self.tunnel_parts(tunnel)?;
        tunnel.setup(backend, output, input)
    }

    /// Moves every component to `state`, one at a time in [`Role::ALL`] order.
    fn change_state_all(&mut self, state: ComponentState) -> Result<()> {
        for role in Role::ALL {
            let Self {
                backend,
                components,
                ..
            } = self;
            components[role.index()]
                .as_mut()
                .ok_or(Error::NotInitialized(role))?
                .change_state(backend, state)?;
        }
        Ok(())
    }

    fn log_port_definitions(&mut self) -> Result<()> {
        for (role, port) in DIAGNOSTIC_PORTS {
            let (backend, component) = self.parts(role)?;
            let definition = component.port_definition(backend, port)?;
            debug!(component = %role, port, ?definition, "port definition");
        }

        let (backend, camera) = self.parts(Role::Camera)?;
        for port in FRAME_SIZE_PORTS {
            match camera.port_definition(backend, port)?.geometry() {
                Some((width, height, stride, slice_height)) => debug!(
                    component = %Role::Camera,
                    port,
                    width,
                    height,
                    stride,
                    slice_height,
                    "frame size"
                ),
                None => debug!(component = %Role::Camera, port, "no frame size"),
            }
        }
        Ok(())
    }

    fn component_ref(&self, role: Role) -> Result<&Component<B>> {
        self.component(role).ok_or(Error::NotInitialized(role))
    }

    fn parts(&mut self, role: Role) -> Result<(&mut B, &Component<B>)> {
        let component = self.components[role.index()]
            .as_ref()
            .ok_or(Error::NotInitialized(role))?;
        Ok((&mut self.backend, component))
    }

    fn tunnel_parts(&mut self, tunnel: &Tunnel) -> Result<(&mut B, &Component<B>, &Component<B>)> {
        let (output_role, _) = tunnel.output;
        let (input_role, _) = tunnel.input;
        let output = self.components[output_role.index()]
            .as_ref()
            .ok_or(Error::NotInitialized(output_role))?;
        let input = self.components[input_role.index()]
            .as_ref()
            .ok_or(Error::NotInitialized(input_role))?;
        Ok((&mut self.backend, output, input))
    }

    fn report_unclosed(&self) {
        if self.stage != PipelineStage::Closed {
            error!(
                pipeline = %self.id,
                stage = ?self.stage,
                "pipeline released without a successful close, components are left allocated"
            );
        }
    }
}

impl<B: Backend> Drop for StillPipeline<B> {
    fn drop(&mut self) {
        self.report_unclosed();
    }
}

/// Uncompressed YUV 4:2:0 at the sensor frame size.
fn set_raw_video_format(video: &mut VideoFormat, sensor: &SensorConfig) -> Result<()> {
    let stride = round_up(sensor.width, 32)?;
    video.frame_width = sensor.width;
    video.frame_height = sensor.height;
    video.compression = VideoCoding::Unused;
    video.color = ColorFormat::Yuv420PackedPlanar;
    video.stride = i32::try_from(stride)
        .map_err(|_| Error::InvalidConfig(format!("stride {stride} does not fit the port definition")))?;
    video.slice_height = round_up(sensor.height, 16)?;
    Ok(())
}
