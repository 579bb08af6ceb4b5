// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Mapping between the crate's typed values and the raw IL structures.

use omx_sys::*;

use crate::{
    ComponentState,
    port::{
        ColorFormat, Direction, ImageCoding, ImageFormat, PortDefinition, PortFormat,
        VideoCoding, VideoFormat,
    },
    settings::{DynamicRange, ExposureControl, ImageFilter, Metering, Mirror, WhiteBalance},
};

/// A zeroed IL structure with `nSize` and `nVersion` filled in.
macro_rules! omx_struct {
    ($ty:ty) => {{
        let mut value: $ty = Default::default();
        value.nSize = std::mem::size_of::<$ty>() as _;
        value.nVersion.nVersion = omx_sys::OMX_VERSION;
        value
    }};
}
pub(crate) use omx_struct;

pub(crate) fn omx_bool(value: bool) -> OMX_BOOL {
    if value { OMX_TRUE } else { OMX_FALSE }
}

pub(crate) fn from_omx_bool(value: OMX_BOOL) -> bool {
    value != OMX_FALSE
}

pub(crate) fn state(state: ComponentState) -> OMX_STATETYPE {
    match state {
        ComponentState::Loaded => OMX_StateLoaded,
        ComponentState::Idle => OMX_StateIdle,
        ComponentState::Executing => OMX_StateExecuting,
    }
}

fn color_format(raw: OMX_COLOR_FORMATTYPE) -> ColorFormat {
    match raw {
        OMX_COLOR_FormatUnused => ColorFormat::Unused,
        OMX_COLOR_FormatYUV420PackedPlanar => ColorFormat::Yuv420PackedPlanar,
        other => ColorFormat::Other(other as u32),
    }
}

fn raw_color_format(format: ColorFormat) -> OMX_COLOR_FORMATTYPE {
    match format {
        ColorFormat::Unused => OMX_COLOR_FormatUnused,
        ColorFormat::Yuv420PackedPlanar => OMX_COLOR_FormatYUV420PackedPlanar,
        ColorFormat::Other(other) => other as _,
    }
}

fn video_coding(raw: OMX_VIDEO_CODINGTYPE) -> VideoCoding {
    match raw {
        OMX_VIDEO_CodingUnused => VideoCoding::Unused,
        other => VideoCoding::Other(other as u32),
    }
}

fn raw_video_coding(coding: VideoCoding) -> OMX_VIDEO_CODINGTYPE {
    match coding {
        VideoCoding::Unused => OMX_VIDEO_CodingUnused,
        VideoCoding::Other(other) => other as _,
    }
}

fn image_coding(raw: OMX_IMAGE_CODINGTYPE) -> ImageCoding {
    match raw {
        OMX_IMAGE_CodingUnused => ImageCoding::Unused,
        OMX_IMAGE_CodingJPEG => ImageCoding::Jpeg,
        other => ImageCoding::Other(other as u32),
    }
}

fn raw_image_coding(coding: ImageCoding) -> OMX_IMAGE_CODINGTYPE {
    match coding {
        ImageCoding::Unused => OMX_IMAGE_CodingUnused,
        ImageCoding::Jpeg => OMX_IMAGE_CodingJPEG,
        ImageCoding::Other(other) => other as _,
    }
}

/// Reads the typed definition out of a raw one.
pub(crate) fn port_definition(raw: &OMX_PARAM_PORTDEFINITIONTYPE) -> PortDefinition {
    // Safety: `eDomain` selects the active member of the format union.
    let format = unsafe {
        match raw.eDomain {
            OMX_PortDomainVideo => {
                let video = &raw.format.video;
                PortFormat::Video(VideoFormat {
                    frame_width: video.nFrameWidth as u32,
                    frame_height: video.nFrameHeight as u32,
                    stride: video.nStride as i32,
                    slice_height: video.nSliceHeight as u32,
                    bitrate: video.nBitrate as u32,
                    framerate: video.xFramerate as u32,
                    compression: video_coding(video.eCompressionFormat),
                    color: color_format(video.eColorFormat),
                })
            }
            OMX_PortDomainImage => {
                let image = &raw.format.image;
                PortFormat::Image(ImageFormat {
                    frame_width: image.nFrameWidth as u32,
                    frame_height: image.nFrameHeight as u32,
                    stride: image.nStride as i32,
                    slice_height: image.nSliceHeight as u32,
                    compression: image_coding(image.eCompressionFormat),
                    color: color_format(image.eColorFormat),
                })
            }
            _ => PortFormat::Other,
        }
    };

    PortDefinition {
        port: raw.nPortIndex as u32,
        direction: if raw.eDir == OMX_DirInput {
            Direction::Input
        } else {
            Direction::Output
        },
        enabled: from_omx_bool(raw.bEnabled),
        populated: from_omx_bool(raw.bPopulated),
        buffer_count_actual: raw.nBufferCountActual as u32,
        buffer_count_min: raw.nBufferCountMin as u32,
        buffer_size: raw.nBufferSize as u32,
        buffer_alignment: raw.nBufferAlignment as u32,
        format,
    }
}

/// Writes the settable fields of `definition` over a raw definition fetched from the component.
///
/// Fields the typed definition does not carry (MIME type, native handles) keep
/// the component's values. Read-only fields are left alone.
pub(crate) fn apply_port_definition(
    raw: &mut OMX_PARAM_PORTDEFINITIONTYPE,
    definition: &PortDefinition,
) {
    raw.nBufferCountActual = definition.buffer_count_actual as _;
    match &definition.format {
        PortFormat::Video(format) => {
            // Safety: writing plain-old-data union members.
            let video = unsafe { &mut raw.format.video };
            video.nFrameWidth = format.frame_width as _;
            video.nFrameHeight = format.frame_height as _;
            video.nStride = format.stride as _;
            video.nSliceHeight = format.slice_height as _;
            video.nBitrate = format.bitrate as _;
            video.xFramerate = format.framerate as _;
            video.eCompressionFormat = raw_video_coding(format.compression);
            video.eColorFormat = raw_color_format(format.color);
        }
        PortFormat::Image(format) => {
            let image = unsafe { &mut raw.format.image };
            image.nFrameWidth = format.frame_width as _;
            image.nFrameHeight = format.frame_height as _;
            image.nStride = format.stride as _;
            image.nSliceHeight = format.slice_height as _;
            image.eCompressionFormat = raw_image_coding(format.compression);
            image.eColorFormat = raw_color_format(format.color);
        }
        PortFormat::Other => {}
    }
}

pub(crate) fn white_balance(mode: WhiteBalance) -> OMX_WHITEBALCONTROLTYPE {
    match mode {
        WhiteBalance::Off => OMX_WhiteBalControlOff,
        WhiteBalance::Auto => OMX_WhiteBalControlAuto,
        WhiteBalance::SunLight => OMX_WhiteBalControlSunLight,
        WhiteBalance::Cloudy => OMX_WhiteBalControlCloudy,
        WhiteBalance::Shade => OMX_WhiteBalControlShade,
        WhiteBalance::Tungsten => OMX_WhiteBalControlTungsten,
        WhiteBalance::Fluorescent => OMX_WhiteBalControlFluorescent,
        WhiteBalance::Incandescent => OMX_WhiteBalControlIncandescent,
        WhiteBalance::Flash => OMX_WhiteBalControlFlash,
        WhiteBalance::Horizon => OMX_WhiteBalControlHorizon,
    }
}

pub(crate) fn dynamic_range(mode: DynamicRange) -> OMX_DYNAMICRANGEEXPANSIONMODETYPE {
    match mode {
        DynamicRange::Off => OMX_DynRangeExpOff,
        DynamicRange::Low => OMX_DynRangeExpLow,
        DynamicRange::Medium => OMX_DynRangeExpMedium,
        DynamicRange::High => OMX_DynRangeExpHigh,
    }
}

pub(crate) fn metering(mode: Metering) -> OMX_METERINGTYPE {
    match mode {
        Metering::Average => OMX_MeteringModeAverage,
        Metering::Spot => OMX_MeteringModeSpot,
        Metering::Matrix => OMX_MeteringModeMatrix,
    }
}

pub(crate) fn exposure_control(control: ExposureControl) -> OMX_EXPOSURECONTROLTYPE {
    match control {
        ExposureControl::Off => OMX_ExposureControlOff,
        ExposureControl::Auto => OMX_ExposureControlAuto,
        ExposureControl::Night => OMX_ExposureControlNight,
        ExposureControl::BackLight => OMX_ExposureControlBackLight,
        ExposureControl::Spotlight => OMX_ExposureControlSpotLight,
        ExposureControl::Sports => OMX_ExposureControlSports,
        ExposureControl::Snow => OMX_ExposureControlSnow,
        ExposureControl::Beach => OMX_ExposureControlBeach,
        ExposureControl::LargeAperture => OMX_ExposureControlLargeAperture,
        ExposureControl::SmallAperture => OMX_ExposureControlSmallAperture,
        ExposureControl::VeryLong => OMX_ExposureControlVeryLong,
        ExposureControl::FixedFps => OMX_ExposureControlFixedFps,
        ExposureControl::NightWithPreview => OMX_ExposureControlNightWithPreview,
        ExposureControl::Antishake => OMX_ExposureControlAntishake,
        ExposureControl::Fireworks => OMX_ExposureControlFireworks,
    }
}

pub(crate) fn mirror(mirror: Mirror) -> OMX_MIRRORTYPE {
    match mirror {
        Mirror::None => OMX_MirrorNone,
        Mirror::Horizontal => OMX_MirrorHorizontal,
        Mirror::Vertical => OMX_MirrorVertical,
        Mirror::Both => OMX_MirrorBoth,
    }
}

pub(crate) fn image_filter(filter: ImageFilter) -> OMX_IMAGEFILTERTYPE {
    match filter {
        ImageFilter::None => OMX_ImageFilterNone,
        ImageFilter::Emboss => OMX_ImageFilterEmboss,
        ImageFilter::Negative => OMX_ImageFilterNegative,
        ImageFilter::Sketch => OMX_ImageFilterSketch,
        ImageFilter::OilPaint => OMX_ImageFilterOilPaint,
        ImageFilter::Hatch => OMX_ImageFilterHatch,
        ImageFilter::Gpen => OMX_ImageFilterGpen,
        ImageFilter::Solarize => OMX_ImageFilterSolarize,
        ImageFilter::Watercolor => OMX_ImageFilterWatercolor,
        ImageFilter::Pastel => OMX_ImageFilterPastel,
        ImageFilter::Film => OMX_ImageFilterFilm,
        ImageFilter::Blur => OMX_ImageFilterBlur,
        ImageFilter::ColourSwap => OMX_ImageFilterColourSwap,
        ImageFilter::WashedOut => OMX_ImageFilterWashedOut,
        ImageFilter::ColourPoint => OMX_ImageFilterColourPoint,
        ImageFilter::Posterise => OMX_ImageFilterPosterise,
        ImageFilter::ColourBalance => OMX_ImageFilterColourBalance,
        ImageFilter::Cartoon => OMX_ImageFilterCartoon,
    }
}
