// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Port indices and port definitions.
//!
//! A [`PortDefinition`] is always fetched, mutated and written back as a whole
//! (see [`crate::Component::update_port_definition`]).

use crate::{Error, Result};

/// Camera preview output, tunneled to the null sink.
pub const CAMERA_PREVIEW: u32 = 70;
/// Camera video/capture output, tunneled to the splitter.
pub const CAMERA_CAPTURE: u32 = 71;
/// Camera still output. Not used for capture, only reported in diagnostics.
pub const CAMERA_STILL: u32 = 72;
pub const NULL_SINK_INPUT: u32 = 240;
pub const SPLITTER_INPUT: u32 = 250;
pub const SPLITTER_OUTPUT: u32 = 251;
pub const ENCODER_INPUT: u32 = 340;
/// Encoder output, the only port with an application-owned buffer.
pub const ENCODER_OUTPUT: u32 = 341;
/// Addresses every port of a component (`OMX_ALL`).
pub const ALL: u32 = 0xFFFF_FFFF;

/// Rounds `value` up to the next multiple of `multiple`.
///
/// ```
/// use omx_still::port::round_up;
///
/// assert_eq!(round_up(2464, 32).unwrap(), 2464);
/// assert_eq!(round_up(3280, 16).unwrap(), 3280);
/// assert_eq!(round_up(1080, 16).unwrap(), 1088);
/// assert!(round_up(u32::MAX - 1, 32).is_err());
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if `multiple` is zero or the result does
/// not fit in a `u32`.
pub fn round_up(value: u32, multiple: u32) -> Result<u32> {
    if multiple == 0 {
        return Err(Error::InvalidConfig("cannot round up to a multiple of 0".into()));
    }
    value
        .div_ceil(multiple)
        .checked_mul(multiple)
        .ok_or_else(|| Error::InvalidConfig(format!("{value} rounded up to {multiple} overflows")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Uncompressed pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    Unused,
    Yuv420PackedPlanar,
    /// A layout this crate does not name, kept verbatim.
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCoding {
    Unused,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCoding {
    Unused,
    Jpeg,
    Other(u32),
}

/// Video domain format of a port.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormat {
    pub frame_width: u32,
    pub frame_height: u32,
    pub stride: i32,
    pub slice_height: u32,
    pub bitrate: u32,
    /// Frames per second in Q16 fixed point. Zero leaves the port unthrottled.
    pub framerate: u32,
    pub compression: VideoCoding,
    pub color: ColorFormat,
}

/// Image domain format of a port.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFormat {
    pub frame_width: u32,
    pub frame_height: u32,
    pub stride: i32,
    pub slice_height: u32,
    pub compression: ImageCoding,
    pub color: ColorFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortFormat {
    Video(VideoFormat),
    Image(ImageFormat),
    /// Audio or other domains, which the capture pipeline never configures.
    Other,
}

/// Complete definition of one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDefinition {
    pub port: u32,
    pub direction: Direction,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: u32,
    pub buffer_alignment: u32,
    pub format: PortFormat,
}

impl PortDefinition {
    /// Returns the video format, failing if the port is in another domain.
    pub fn video_mut(&mut self) -> Result<&mut VideoFormat> {
        match &mut self.format {
            PortFormat::Video(video) => Ok(video),
            _ => Err(Error::Other(format!("port {} is not a video port", self.port))),
        }
    }

    /// Returns the image format, failing if the port is in another domain.
    pub fn image_mut(&mut self) -> Result<&mut ImageFormat> {
        match &mut self.format {
            PortFormat::Image(image) => Ok(image),
            _ => Err(Error::Other(format!("port {} is not an image port", self.port))),
        }
    }

    /// Frame size and stride, whatever the domain.
    pub fn geometry(&self) -> Option<(u32, u32, i32, u32)> {
        match &self.format {
            PortFormat::Video(v) => Some((v.frame_width, v.frame_height, v.stride, v.slice_height)),
            PortFormat::Image(i) => Some((i.frame_width, i.frame_height, i.stride, i.slice_height)),
            PortFormat::Other => None,
        }
    }
}
