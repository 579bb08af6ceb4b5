// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Capture configuration.
//!
//! [`CaptureConfig`] holds the per-shot settings plus the sensor and JPEG
//! details that rarely change. It can be loaded from JSON; every field is
//! optional and defaults to the values below.
//!
//! ```
//! use omx_still::{CaptureConfig, WhiteBalance};
//!
//! let config = CaptureConfig::from_json_str(r#"{ "quality": 90, "white_balance": "off" }"#)?;
//! assert_eq!(config.quality, 90);
//! assert_eq!(config.white_balance, WhiteBalance::Off);
//! assert_eq!(config.shutter_speed, 16000);
//! # Ok::<(), omx_still::Error>(())
//! ```

use std::{ops::RangeInclusive, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    backend::{Config, Parameter},
    port::{self, CAMERA_CAPTURE, ENCODER_OUTPUT},
};

/// Largest accepted frame width or height, above the biggest sensor mode.
pub const MAX_FRAME_EDGE: u32 = 4096;
/// Largest accepted capture port frame rate.
pub const MAX_FRAMERATE: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhiteBalance {
    /// Manual gains from [`CaptureConfig::red_gain`] and [`CaptureConfig::blue_gain`].
    Off,
    Auto,
    SunLight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicRange {
    Off,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metering {
    Average,
    Spot,
    Matrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureControl {
    Off,
    Auto,
    Night,
    BackLight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    LargeAperture,
    SmallAperture,
    VeryLong,
    FixedFps,
    NightWithPreview,
    Antishake,
    Fireworks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mirror {
    None,
    Horizontal,
    Vertical,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFilter {
    None,
    Emboss,
    Negative,
    Sketch,
    OilPaint,
    Hatch,
    Gpen,
    Solarize,
    Watercolor,
    Pastel,
    Film,
    Blur,
    ColourSwap,
    WashedOut,
    ColourPoint,
    Posterise,
    ColourBalance,
    Cartoon,
}

/// Fixed U/V chroma override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorEnhancement {
    pub enabled: bool,
    pub u: u8,
    pub v: u8,
}

impl Default for ColorEnhancement {
    fn default() -> Self {
        Self {
            enabled: false,
            u: 128,
            v: 128,
        }
    }
}

/// Sensor crop, in percent of the full frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 100,
            height: 100,
        }
    }
}

/// Sensor mode and the camera settings that are not changed per shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Frame width after rotation.
    pub width: u32,
    pub height: u32,
    /// Capture port frame rate in frames per second.
    pub framerate: u32,
    /// Degrees, one of 0, 90, 180 or 270.
    pub rotation: i32,
    pub mirror: Mirror,
    pub metering: Metering,
    pub exposure: ExposureControl,
    /// EV compensation in sixths of a stop.
    pub exposure_compensation: i32,
    pub auto_shutter: bool,
    pub auto_iso: bool,
    pub image_filter: ImageFilter,
    pub color_enhancement: ColorEnhancement,
    pub noise_reduction: bool,
    pub frame_stabilisation: bool,
    pub roi: RegionOfInterest,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: 2464,
            height: 3280,
            framerate: 15,
            rotation: 90,
            mirror: Mirror::None,
            metering: Metering::Average,
            exposure: ExposureControl::Off,
            exposure_compensation: 0,
            auto_shutter: false,
            auto_iso: false,
            image_filter: ImageFilter::None,
            color_enhancement: ColorEnhancement::default(),
            noise_reduction: false,
            frame_stabilisation: false,
            roi: RegionOfInterest::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    /// Build the thumbnail from the preview port instead of scaling the capture.
    pub use_preview: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_preview: false,
            width: 64,
            height: 48,
        }
    }
}

/// Encoder options besides the quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JpegConfig {
    pub exif: bool,
    pub ijg_scaling: bool,
    pub thumbnail: ThumbnailConfig,
    /// Value of the `IFD0.Make` EXIF tag.
    pub make: String,
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            exif: true,
            ijg_scaling: false,
            thumbnail: ThumbnailConfig::default(),
            make: "Raspberry Pi".to_string(),
        }
    }
}

/// Settings for one burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Exposure time in microseconds.
    pub shutter_speed: u32,
    pub iso: u32,
    /// Red gain, 1000 is unity. Only used with [`WhiteBalance::Off`].
    pub red_gain: u32,
    /// Blue gain, 1000 is unity. Only used with [`WhiteBalance::Off`].
    pub blue_gain: u32,
    /// JPEG quality, 1 to 100.
    pub quality: u32,
    pub sharpness: i32,
    pub contrast: i32,
    pub brightness: u32,
    pub saturation: i32,
    pub dynamic_range: DynamicRange,
    pub white_balance: WhiteBalance,
    pub sensor: SensorConfig,
    pub jpeg: JpegConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            shutter_speed: 16000,
            iso: 100,
            red_gain: 1000,
            blue_gain: 1000,
            quality: 75,
            sharpness: 0,
            contrast: 0,
            brightness: 50,
            saturation: 0,
            dynamic_range: DynamicRange::Off,
            white_balance: WhiteBalance::Auto,
            sensor: SensorConfig::default(),
            jpeg: JpegConfig::default(),
        }
    }
}

fn check_range<T>(name: &str, value: T, range: RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} = {value} is outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

/// `value * 65536 / divisor`, saturating at the top of the Q16 range.
fn to_q16(value: u32, divisor: u32) -> u32 {
    u32::try_from((u64::from(value) << 16) / u64::from(divisor)).unwrap_or(u32::MAX)
}

impl CaptureConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CaptureConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Range-checks every field the hardware would otherwise reject or clamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_range("quality", self.quality, 1..=100)?;
        check_range("sharpness", self.sharpness, -100..=100)?;
        check_range("contrast", self.contrast, -100..=100)?;
        check_range("saturation", self.saturation, -100..=100)?;
        check_range("brightness", self.brightness, 0..=100)?;
        check_range("shutter_speed", self.shutter_speed, 1..=u32::MAX)?;

        let sensor = &self.sensor;
        check_range("sensor.width", sensor.width, 1..=MAX_FRAME_EDGE)?;
        check_range("sensor.height", sensor.height, 1..=MAX_FRAME_EDGE)?;
        check_range("sensor.framerate", sensor.framerate, 0..=MAX_FRAMERATE)?;
        check_range(
            "sensor.exposure_compensation",
            sensor.exposure_compensation,
            -24..=24,
        )?;
        if ![0, 90, 180, 270].contains(&sensor.rotation) {
            return Err(Error::InvalidConfig(format!(
                "sensor.rotation = {} is not one of 0, 90, 180, 270",
                sensor.rotation
            )));
        }
        check_range("sensor.roi.left", sensor.roi.left, 0..=100)?;
        check_range("sensor.roi.top", sensor.roi.top, 0..=100)?;
        check_range("sensor.roi.width", sensor.roi.width, 0..=100)?;
        check_range("sensor.roi.height", sensor.roi.height, 0..=100)?;

        check_range("jpeg.thumbnail.width", self.jpeg.thumbnail.width, 0..=1024)?;
        check_range("jpeg.thumbnail.height", self.jpeg.thumbnail.height, 0..=1024)?;
        Ok(())
    }

    /// Camera configs in the order they are applied.
    ///
    /// Manual white balance gains are only included when white balance is off.
    pub fn camera_configs(&self) -> Vec<Config> {
        let sensor = &self.sensor;
        let mut configs = vec![
            Config::Sharpness {
                port: port::ALL,
                value: self.sharpness,
            },
            Config::Contrast {
                port: port::ALL,
                value: self.contrast,
            },
            Config::Saturation {
                port: port::ALL,
                value: self.saturation,
            },
            Config::Brightness {
                port: port::ALL,
                value: self.brightness,
            },
            Config::ExposureValue {
                port: port::ALL,
                metering: sensor.metering,
                compensation_q16: (sensor.exposure_compensation << 16) / 6,
                shutter_speed_us: self.shutter_speed,
                auto_shutter: sensor.auto_shutter,
                iso: self.iso,
                auto_iso: sensor.auto_iso,
            },
            Config::Exposure {
                port: port::ALL,
                control: sensor.exposure,
            },
            Config::FrameStabilisation {
                port: port::ALL,
                enabled: sensor.frame_stabilisation,
            },
            Config::WhiteBalance {
                port: port::ALL,
                mode: self.white_balance,
            },
        ];
        if self.white_balance == WhiteBalance::Off {
            configs.push(Config::WhiteBalanceGains {
                red_q16: to_q16(self.red_gain, 1000),
                blue_q16: to_q16(self.blue_gain, 1000),
            });
        }
        configs.extend([
            Config::ImageFilter {
                port: port::ALL,
                filter: sensor.image_filter,
            },
            Config::Mirror {
                port: CAMERA_CAPTURE,
                mirror: sensor.mirror,
            },
            Config::Rotation {
                port: CAMERA_CAPTURE,
                degrees: sensor.rotation,
            },
            Config::ColorEnhancement {
                port: port::ALL,
                enabled: sensor.color_enhancement.enabled,
                u: sensor.color_enhancement.u,
                v: sensor.color_enhancement.v,
            },
            Config::StillDenoise(sensor.noise_reduction),
            Config::InputCrop {
                port: port::ALL,
                left_q16: to_q16(sensor.roi.left, 100),
                top_q16: to_q16(sensor.roi.top, 100),
                width_q16: to_q16(sensor.roi.width, 100),
                height_q16: to_q16(sensor.roi.height, 100),
            },
            Config::DynamicRangeExpansion(self.dynamic_range),
        ]);
        configs
    }

    /// Encoder parameters, applied before [`CaptureConfig::encoder_configs`].
    pub fn encoder_parameters(&self) -> Vec<Parameter> {
        let thumbnail = &self.jpeg.thumbnail;
        vec![
            Parameter::QFactor {
                port: ENCODER_OUTPUT,
                quality: self.quality,
            },
            Parameter::DisableExif(!self.jpeg.exif),
            Parameter::IjgScaling {
                port: ENCODER_OUTPUT,
                enabled: self.jpeg.ijg_scaling,
            },
            Parameter::Thumbnail {
                enabled: thumbnail.enabled,
                use_preview: thumbnail.use_preview,
                width: thumbnail.width,
                height: thumbnail.height,
            },
        ]
    }

    /// EXIF tags written by the encoder.
    pub fn encoder_configs(&self) -> Vec<Config> {
        vec![Config::MetadataItem {
            port: ENCODER_OUTPUT,
            key: "IFD0.Make".to_string(),
            value: self.jpeg.make.clone(),
        }]
    }
}
