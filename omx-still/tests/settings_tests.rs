// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Capture configuration loading, validation and translation into component settings.

use omx_still::{
    CaptureConfig, DynamicRange, Error, ExposureControl, Mirror, WhiteBalance,
    backend::{Config, Parameter},
    port::{ALL, CAMERA_CAPTURE, ENCODER_OUTPUT, round_up},
    settings::{MAX_FRAME_EDGE, MAX_FRAMERATE},
};

/// Temporary JSON file removed on drop.
struct TempConfigFile {
    path: std::path::PathBuf,
}

impl TempConfigFile {
    fn new(contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!("omx_still_config_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        Self { path }
    }
}

impl Drop for TempConfigFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn empty_json_gives_the_defaults() {
    let config = CaptureConfig::from_json_str("{}").unwrap();
    assert_eq!(config, CaptureConfig::default());
    assert_eq!(config.sensor.width, 2464);
    assert_eq!(config.sensor.height, 3280);
    assert_eq!(config.sensor.rotation, 90);
    assert!(config.jpeg.exif);
}

#[test]
fn nested_sections_are_partially_overridable() {
    let config = CaptureConfig::from_json_str(
        r#"{
            "iso": 400,
            "dynamic_range": "high",
            "sensor": { "rotation": 180, "mirror": "both", "exposure": "night_with_preview" },
            "jpeg": { "thumbnail": { "enabled": true } }
        }"#,
    )
    .unwrap();

    assert_eq!(config.iso, 400);
    assert_eq!(config.dynamic_range, DynamicRange::High);
    assert_eq!(config.sensor.rotation, 180);
    assert_eq!(config.sensor.mirror, Mirror::Both);
    assert_eq!(config.sensor.exposure, ExposureControl::NightWithPreview);
    assert_eq!(config.sensor.framerate, 15);
    assert!(config.jpeg.thumbnail.enabled);
    assert_eq!(config.jpeg.thumbnail.width, 64);
}

#[test]
fn unknown_enum_value_is_a_json_error() {
    let result = CaptureConfig::from_json_str(r#"{ "white_balance": "purple" }"#);
    assert!(matches!(result, Err(Error::Json(_))));
}

#[test]
fn out_of_range_values_are_rejected() {
    for json in [
        r#"{ "quality": 101 }"#,
        r#"{ "sharpness": -101 }"#,
        r#"{ "brightness": 150 }"#,
        r#"{ "shutter_speed": 0 }"#,
        r#"{ "sensor": { "rotation": 45 } }"#,
        r#"{ "sensor": { "roi": { "width": 120 } } }"#,
        r#"{ "sensor": { "exposure_compensation": 30 } }"#,
    ] {
        match CaptureConfig::from_json_str(json) {
            Err(Error::InvalidConfig(_)) => {}
            other => panic!("{json} gave {other:?}"),
        }
    }
}

#[test]
fn frame_size_is_bounded_by_the_largest_sensor_mode() {
    let mut config = CaptureConfig::default();
    config.sensor.width = MAX_FRAME_EDGE;
    config.sensor.height = MAX_FRAME_EDGE;
    config.sensor.framerate = MAX_FRAMERATE;
    assert!(config.validate().is_ok());

    for (width, height) in [
        (MAX_FRAME_EDGE + 1, 3280),
        (2464, MAX_FRAME_EDGE + 1),
        (u32::MAX - 1, 3280),
        (0, 3280),
    ] {
        config.sensor.width = width;
        config.sensor.height = height;
        assert!(
            matches!(config.validate(), Err(Error::InvalidConfig(_))),
            "{width}x{height} was accepted"
        );
    }

    let result = CaptureConfig::from_json_str(r#"{ "sensor": { "framerate": 121 } }"#);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn rounding_up_reports_overflow() {
    assert_eq!(round_up(MAX_FRAME_EDGE, 32).unwrap(), MAX_FRAME_EDGE);
    assert_eq!(round_up(1000, 32).unwrap(), 1024);
    assert_eq!(round_up(1000, 16).unwrap(), 1008);
    assert!(matches!(round_up(u32::MAX - 1, 32), Err(Error::InvalidConfig(_))));
    assert!(matches!(round_up(10, 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn config_file_is_read_and_validated() {
    let file = TempConfigFile::new(r#"{ "quality": 95, "white_balance": "cloudy" }"#);
    let config = CaptureConfig::from_file(&file.path).unwrap();
    assert_eq!(config.quality, 95);
    assert_eq!(config.white_balance, WhiteBalance::Cloudy);

    let invalid = TempConfigFile::new(r#"{ "quality": 0 }"#);
    assert!(matches!(
        CaptureConfig::from_file(&invalid.path),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let path = std::env::temp_dir().join(format!("omx_still_missing_{}.json", uuid::Uuid::new_v4()));
    assert!(matches!(CaptureConfig::from_file(path), Err(Error::Io(_))));
}

#[test]
fn camera_configs_are_converted_to_fixed_point() {
    let mut config = CaptureConfig::default();
    config.sensor.exposure_compensation = 3;
    config.sensor.roi.left = 25;
    config.sensor.roi.width = 50;

    let configs = config.camera_configs();
    assert!(configs.iter().any(|setting| matches!(
        setting,
        Config::ExposureValue {
            port: ALL,
            compensation_q16: 32768,
            shutter_speed_us: 16000,
            iso: 100,
            ..
        }
    )));
    assert!(configs.contains(&Config::InputCrop {
        port: ALL,
        left_q16: 16384,
        top_q16: 0,
        width_q16: 32768,
        height_q16: 65536,
    }));
}

#[test]
fn camera_configs_keep_their_order() {
    let configs = CaptureConfig::default().camera_configs();
    let names: Vec<&str> = configs
        .iter()
        .map(|setting| match setting {
            Config::Sharpness { .. } => "sharpness",
            Config::Contrast { .. } => "contrast",
            Config::Saturation { .. } => "saturation",
            Config::Brightness { .. } => "brightness",
            Config::ExposureValue { .. } => "exposure_value",
            Config::Exposure { .. } => "exposure",
            Config::FrameStabilisation { .. } => "stabilisation",
            Config::WhiteBalance { .. } => "white_balance",
            Config::WhiteBalanceGains { .. } => "gains",
            Config::ImageFilter { .. } => "filter",
            Config::Mirror { .. } => "mirror",
            Config::Rotation { .. } => "rotation",
            Config::ColorEnhancement { .. } => "color",
            Config::StillDenoise(_) => "denoise",
            Config::InputCrop { .. } => "crop",
            Config::DynamicRangeExpansion(_) => "drc",
            other => panic!("unexpected camera config {other:?}"),
        })
        .collect();
    assert_eq!(
        names,
        [
            "sharpness",
            "contrast",
            "saturation",
            "brightness",
            "exposure_value",
            "exposure",
            "stabilisation",
            "white_balance",
            "filter",
            "mirror",
            "rotation",
            "color",
            "denoise",
            "crop",
            "drc",
        ]
    );
    // Mirror and rotation only apply to the capture port.
    assert!(configs.contains(&Config::Rotation {
        port: CAMERA_CAPTURE,
        degrees: 90
    }));
}

#[test]
fn encoder_settings_follow_the_jpeg_section() {
    let mut config = CaptureConfig::default();
    config.quality = 90;
    config.jpeg.exif = false;
    config.jpeg.make = "Test Rig".to_string();

    assert_eq!(
        config.encoder_parameters()[..2],
        [
            Parameter::QFactor {
                port: ENCODER_OUTPUT,
                quality: 90
            },
            Parameter::DisableExif(true),
        ]
    );
    assert_eq!(
        config.encoder_configs(),
        vec![Config::MetadataItem {
            port: ENCODER_OUTPUT,
            key: "IFD0.Make".to_string(),
            value: "Test Rig".to_string(),
        }]
    );
}
