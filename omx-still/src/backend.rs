// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The media subsystem seen from the pipeline.
//!
//! [`Backend`] is the seam between orchestration and the OpenMAX IL core. The
//! pipeline only speaks in the typed values of this module; each backend maps
//! them to its own representation. Two backends ship with the crate:
//! [`crate::sim::Simulator`] and, with the `hardware` feature,
//! `crate::hardware::OmxCore`.

use std::{fmt::Debug, sync::Arc};

use crate::{
    EventChannel, Result,
    port::PortDefinition,
    settings::{DynamicRange, ExposureControl, ImageFilter, Metering, Mirror, WhiteBalance},
};

/// Component states the pipeline moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Loaded,
    Idle,
    Executing,
}

/// Asynchronous commands. Each completes with an event on the component's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StateSet(ComponentState),
    PortEnable(u32),
    PortDisable(u32),
}

/// Parameters the pipeline can ask to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackIndex {
    CameraDeviceNumber,
}

/// Parameters, which may only change while a port or component is not running.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    CameraDeviceNumber {
        port: u32,
        device: u32,
    },
    /// Largest frame the sensor mode must support on `port`.
    MaxFrameSize {
        port: u32,
        width: u32,
        height: u32,
    },
    QFactor {
        port: u32,
        quality: u32,
    },
    DisableExif(bool),
    IjgScaling {
        port: u32,
        enabled: bool,
    },
    Thumbnail {
        enabled: bool,
        use_preview: bool,
        width: u32,
        height: u32,
    },
    /// Read-modify-write of the proprietary tunnel setting on `port`.
    DisableProprietaryTunnels {
        port: u32,
        use_buffers: bool,
    },
}

/// Configs, which may change at any time.
///
/// Fields suffixed `_q16` are fixed point with 16 fractional bits.
#[derive(Debug, Clone, PartialEq)]
pub enum Config {
    RequestCallback {
        port: u32,
        index: CallbackIndex,
        enable: bool,
    },
    Sharpness {
        port: u32,
        value: i32,
    },
    Contrast {
        port: u32,
        value: i32,
    },
    Saturation {
        port: u32,
        value: i32,
    },
    Brightness {
        port: u32,
        value: u32,
    },
    ExposureValue {
        port: u32,
        metering: Metering,
        compensation_q16: i32,
        shutter_speed_us: u32,
        auto_shutter: bool,
        iso: u32,
        auto_iso: bool,
    },
    Exposure {
        port: u32,
        control: ExposureControl,
    },
    FrameStabilisation {
        port: u32,
        enabled: bool,
    },
    WhiteBalance {
        port: u32,
        mode: WhiteBalance,
    },
    WhiteBalanceGains {
        red_q16: u32,
        blue_q16: u32,
    },
    ImageFilter {
        port: u32,
        filter: ImageFilter,
    },
    Mirror {
        port: u32,
        mirror: Mirror,
    },
    Rotation {
        port: u32,
        degrees: i32,
    },
    ColorEnhancement {
        port: u32,
        enabled: bool,
        u: u8,
        v: u8,
    },
    StillDenoise(bool),
    InputCrop {
        port: u32,
        left_q16: u32,
        top_q16: u32,
        width_q16: u32,
        height_q16: u32,
    },
    DynamicRangeExpansion(DynamicRange),
    /// Port-level metadata item, written into the EXIF block by the encoder.
    MetadataItem {
        port: u32,
        key: String,
        value: String,
    },
    /// Lets `steps` frames through `port`, then pauses it.
    SingleStep {
        port: u32,
        steps: u32,
    },
    PortCapturing {
        port: u32,
        capturing: bool,
    },
}

/// View of a buffer header after a fill completed.
pub trait BufferHeader {
    /// Valid payload only, from the buffer offset for the filled length.
    fn filled(&self) -> &[u8];

    /// Raw `nFlags` of the last fill.
    fn flags(&self) -> u32;

    /// Allocated payload size.
    fn capacity(&self) -> u32;
}

/// Operations the pipeline needs from the media subsystem.
///
/// Commands and fills complete asynchronously by signalling the
/// [`EventChannel`] passed to [`Backend::create_component`]; every other call
/// is synchronous.
pub trait Backend {
    /// Opaque component handle.
    type Handle: Copy + Debug;
    /// Buffer header owned by the caller between fills.
    type Buffer: BufferHeader;

    /// Brings up the media subsystem. Called once before any component exists.
    fn init(&mut self) -> Result<()>;

    fn deinit(&mut self) -> Result<()>;

    fn create_component(&mut self, name: &str, events: Arc<EventChannel>) -> Result<Self::Handle>;

    fn destroy_component(&mut self, handle: Self::Handle) -> Result<()>;

    /// Every port index the component exposes, across all domains.
    fn ports(&mut self, handle: Self::Handle) -> Result<Vec<u32>>;

    fn port_definition(&mut self, handle: Self::Handle, port: u32) -> Result<PortDefinition>;

    fn set_port_definition(&mut self, handle: Self::Handle, definition: &PortDefinition)
    -> Result<()>;

    fn set_parameter(&mut self, handle: Self::Handle, parameter: &Parameter) -> Result<()>;

    fn set_config(&mut self, handle: Self::Handle, config: &Config) -> Result<()>;

    fn setup_tunnel(
        &mut self,
        output: Self::Handle,
        output_port: u32,
        input: Self::Handle,
        input_port: u32,
    ) -> Result<()>;

    fn send_command(&mut self, handle: Self::Handle, command: Command) -> Result<()>;

    fn allocate_buffer(&mut self, handle: Self::Handle, port: u32, size: u32)
    -> Result<Self::Buffer>;

    fn free_buffer(&mut self, handle: Self::Handle, port: u32, buffer: Self::Buffer) -> Result<()>;

    /// Hands `buffer` to the component. Completion is `FILL_BUFFER_DONE`.
    fn fill_buffer(&mut self, handle: Self::Handle, buffer: &mut Self::Buffer) -> Result<()>;
}
