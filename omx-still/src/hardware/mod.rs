// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! OpenMAX IL backend for the VideoCore.
//!
//! [`OmxCore`] loads `libopenmaxil.so` and `libbcm_host.so` at runtime and
//! implements [`Backend`] on top of the raw IL calls. Component callbacks are
//! delivered on VideoCore threads; each one carries the component's
//! [`EventChannel`] as its application data and only signals it.

mod api;
mod convert;

use std::{ffi::CString, ptr::NonNull, sync::Arc};

use omx_sys::*;
use tracing::{debug, error, trace};

pub use api::{BcmHostHandle, OmxApiHandle, load_api, load_bcm_host};
use convert::{omx_bool, omx_struct};

use crate::{
    Error, EventChannel, EventFlags, Result,
    backend::{Backend, BufferHeader, CallbackIndex, Command, Config, Parameter},
    config,
    port::PortDefinition,
};

/// Calls a method of the component vtable behind a handle.
macro_rules! component_call {
    ($handle:expr, $method:ident $(, $arg:expr)* $(,)?) => {{
        let raw = $handle.0;
        let component = raw as *mut OMX_COMPONENTTYPE;
        // Safety: `raw` is a live handle returned by OMX_GetHandle, which
        // points at an OMX_COMPONENTTYPE.
        match unsafe { (*component).$method } {
            Some(method) => Error::from_status(unsafe { method(raw $(, $arg)*) } as u32),
            None => Err(Error::NotImplemented),
        }
    }};
}

/// Opaque IL component handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmxHandle(OMX_HANDLETYPE);

/// A buffer header allocated by a component.
#[derive(Debug)]
pub struct OmxBuffer(NonNull<OMX_BUFFERHEADERTYPE>);

impl BufferHeader for OmxBuffer {
    fn filled(&self) -> &[u8] {
        // Safety: the header stays valid until it is handed back to
        // FreeBuffer, which consumes `self`.
        unsafe {
            let header = self.0.as_ref();
            if header.pBuffer.is_null() || header.nFilledLen == 0 {
                return &[];
            }
            std::slice::from_raw_parts(
                header.pBuffer.add(header.nOffset as usize),
                header.nFilledLen as usize,
            )
        }
    }

    fn flags(&self) -> u32 {
        unsafe { self.0.as_ref().nFlags as u32 }
    }

    fn capacity(&self) -> u32 {
        unsafe { self.0.as_ref().nAllocLen as u32 }
    }
}

struct Registration {
    handle: OmxHandle,
    events: Arc<EventChannel>,
    // Must outlive the handle: the core keeps a pointer to it.
    _callbacks: Box<OMX_CALLBACKTYPE>,
}

/// The VideoCore IL core.
pub struct OmxCore {
    api: OmxApiHandle,
    host: BcmHostHandle,
    initialized: bool,
    registry: Vec<Registration>,
}

impl OmxCore {
    /// Loads both libraries from explicit paths.
    pub fn load(
        openmaxil_path: impl AsRef<std::ffi::OsStr>,
        bcm_host_path: impl AsRef<std::ffi::OsStr>,
    ) -> Result<Self> {
        Ok(Self {
            api: load_api(openmaxil_path)?,
            host: load_bcm_host(bcm_host_path)?,
            initialized: false,
            registry: Vec::new(),
        })
    }

    /// Loads both libraries from the VideoCore library directory.
    ///
    /// The directory is the `VC_LIB_DIR` the crate was built with.
    pub fn load_default() -> Result<Self> {
        Self::load(
            config::get_openmaxil_so_path(),
            config::get_bcm_host_so_path(),
        )
    }

    fn registration(&self, handle: OmxHandle) -> Result<&Registration> {
        self.registry
            .iter()
            .find(|registration| registration.handle == handle)
            .ok_or_else(|| Error::Other(format!("unknown component handle {handle:?}")))
    }

    fn get_parameter<T>(&self, handle: OmxHandle, index: OMX_INDEXTYPE, value: &mut T) -> Result<()> {
        component_call!(handle, GetParameter, index, value as *mut T as OMX_PTR)
    }

    fn set_parameter_raw<T>(&self, handle: OmxHandle, index: OMX_INDEXTYPE, value: &mut T) -> Result<()> {
        component_call!(handle, SetParameter, index, value as *mut T as OMX_PTR)
    }

    fn set_config_raw<T>(&self, handle: OmxHandle, index: OMX_INDEXTYPE, value: &mut T) -> Result<()> {
        component_call!(handle, SetConfig, index, value as *mut T as OMX_PTR)
    }

    fn port_ranges(&self, handle: OmxHandle) -> Result<Vec<u32>> {
        let mut ports = Vec::new();
        for index in [
            OMX_IndexParamAudioInit,
            OMX_IndexParamVideoInit,
            OMX_IndexParamImageInit,
            OMX_IndexParamOtherInit,
        ] {
            let mut param = omx_struct!(OMX_PORT_PARAM_TYPE);
            self.get_parameter(handle, index, &mut param)?;
            let start = param.nStartPortNumber as u32;
            ports.extend(start..start + param.nPorts as u32);
        }
        Ok(ports)
    }

    fn set_metadata_item(&self, handle: OmxHandle, port: u32, key: &str, value: &str) -> Result<()> {
        let mut item = omx_struct!(OMX_CONFIG_METADATAITEMTYPE);
        if key.len() >= item.nKey.len() {
            return Err(Error::InvalidConfig(format!("metadata key {key:?} too long")));
        }

        // The value is a trailing variable-length array; `nValue` holds its first byte.
        let value_len = value.len() + 1;
        let size = std::mem::size_of::<OMX_CONFIG_METADATAITEMTYPE>() + value_len;
        let words = size.div_ceil(std::mem::size_of::<u64>());
        let mut storage = vec![0u64; words];

        item.nSize = size as _;
        item.eScopeMode = OMX_MetadataScopePortLevel;
        item.nScopeSpecifier = port as _;
        item.eKeyCharset = OMX_MetadataCharsetASCII;
        item.nKeySizeUsed = key.len() as _;
        for (dst, src) in item.nKey.iter_mut().zip(key.bytes()) {
            *dst = src as _;
        }
        item.nValueMaxSize = value_len as _;
        item.nValueSizeUsed = value.len() as _;

        let raw = storage.as_mut_ptr() as *mut OMX_CONFIG_METADATAITEMTYPE;
        // Safety: `storage` is zeroed, 8-byte aligned and large enough for the
        // header plus `value_len` trailing bytes.
        unsafe {
            raw.write(item);
            let value_ptr = std::ptr::addr_of_mut!((*raw).nValue) as *mut u8;
            std::ptr::copy_nonoverlapping(value.as_ptr(), value_ptr, value.len());
        }
        component_call!(handle, SetConfig, OMX_IndexConfigMetadataItem, raw as OMX_PTR)
    }
}

impl Backend for OmxCore {
    type Handle = OmxHandle;
    type Buffer = OmxBuffer;

    fn init(&mut self) -> Result<()> {
        unsafe { self.host.bcm_host_init() };
        Error::from_status(unsafe { self.api.init() } as u32)?;
        self.initialized = true;
        debug!("IL core initialized");
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.initialized = false;
        Error::from_status(unsafe { self.api.deinit() } as u32)?;
        unsafe { self.host.bcm_host_deinit() };
        debug!("IL core deinitialized");
        Ok(())
    }

    fn create_component(&mut self, name: &str, events: Arc<EventChannel>) -> Result<OmxHandle> {
        let c_name = CString::new(name)?;
        let mut callbacks = Box::new(OMX_CALLBACKTYPE {
            EventHandler: Some(event_handler),
            EmptyBufferDone: Some(empty_buffer_done),
            FillBufferDone: Some(fill_buffer_done),
        });
        let mut raw: OMX_HANDLETYPE = std::ptr::null_mut();
        let app_data = Arc::as_ptr(&events) as OMX_PTR;

        Error::from_status(unsafe {
            self.api.get_handle(
                &mut raw,
                c_name.as_ptr() as OMX_STRING,
                app_data,
                callbacks.as_mut() as *mut OMX_CALLBACKTYPE,
            )
        } as u32)?;
        if raw.is_null() {
            return Err(Error::ComponentNotFound);
        }

        let handle = OmxHandle(raw);
        self.registry.push(Registration {
            handle,
            events,
            _callbacks: callbacks,
        });
        Ok(handle)
    }

    fn destroy_component(&mut self, handle: OmxHandle) -> Result<()> {
        let name = self.registration(handle)?.events.name().to_string();
        debug!(component = %name, "freeing handle");
        Error::from_status(unsafe { self.api.free_handle(handle.0) } as u32)?;
        self.registry.retain(|registration| registration.handle != handle);
        Ok(())
    }

    fn ports(&mut self, handle: OmxHandle) -> Result<Vec<u32>> {
        self.port_ranges(handle)
    }

    fn port_definition(&mut self, handle: OmxHandle, port: u32) -> Result<PortDefinition> {
        let mut raw = omx_struct!(OMX_PARAM_PORTDEFINITIONTYPE);
        raw.nPortIndex = port as _;
        self.get_parameter(handle, OMX_IndexParamPortDefinition, &mut raw)?;
        Ok(convert::port_definition(&raw))
    }

    fn set_port_definition(&mut self, handle: OmxHandle, definition: &PortDefinition) -> Result<()> {
        let mut raw = omx_struct!(OMX_PARAM_PORTDEFINITIONTYPE);
        raw.nPortIndex = definition.port as _;
        self.get_parameter(handle, OMX_IndexParamPortDefinition, &mut raw)?;
        convert::apply_port_definition(&mut raw, definition);
        self.set_parameter_raw(handle, OMX_IndexParamPortDefinition, &mut raw)
    }

    fn set_parameter(&mut self, handle: OmxHandle, parameter: &Parameter) -> Result<()> {
        match *parameter {
            Parameter::CameraDeviceNumber { port, device } => {
                let mut value = omx_struct!(OMX_PARAM_U32TYPE);
                value.nPortIndex = port as _;
                value.nU32 = device as _;
                self.set_parameter_raw(handle, OMX_IndexParamCameraDeviceNumber, &mut value)
            }
            Parameter::MaxFrameSize {
                port,
                width,
                height,
            } => {
                let mut value = omx_struct!(OMX_FRAMESIZETYPE);
                value.nPortIndex = port as _;
                value.nWidth = width as _;
                value.nHeight = height as _;
                self.set_parameter_raw(handle, OMX_IndexParamCommonMaxFrameSize, &mut value)
            }
            Parameter::QFactor { port, quality } => {
                let mut value = omx_struct!(OMX_IMAGE_PARAM_QFACTORTYPE);
                value.nPortIndex = port as _;
                value.nQFactor = quality as _;
                self.set_parameter_raw(handle, OMX_IndexParamQFactor, &mut value)
            }
            Parameter::DisableExif(disabled) => {
                let mut value = omx_struct!(OMX_CONFIG_BOOLEANTYPE);
                value.bEnabled = omx_bool(disabled);
                self.set_parameter_raw(handle, OMX_IndexParamBrcmDisableEXIF, &mut value)
            }
            Parameter::IjgScaling { port, enabled } => {
                let mut value = omx_struct!(OMX_PARAM_IJGSCALINGTYPE);
                value.nPortIndex = port as _;
                value.bEnabled = omx_bool(enabled);
                self.set_parameter_raw(handle, OMX_IndexParamBrcmEnableIJGTableScaling, &mut value)
            }
            Parameter::Thumbnail {
                enabled,
                use_preview,
                width,
                height,
            } => {
                let mut value = omx_struct!(OMX_PARAM_BRCMTHUMBNAILTYPE);
                value.bEnable = omx_bool(enabled);
                value.bUsePreview = omx_bool(use_preview);
                value.nWidth = width as _;
                value.nHeight = height as _;
                self.set_parameter_raw(handle, OMX_IndexParamBrcmThumbnail, &mut value)
            }
            Parameter::DisableProprietaryTunnels { port, use_buffers } => {
                let mut value = omx_struct!(OMX_PARAM_BRCMDISABLEPROPRIETARYTUNNELSTYPE);
                value.nPortIndex = port as _;
                self.get_parameter(handle, OMX_IndexParamBrcmDisableProprietaryTunnels, &mut value)?;
                value.bUseBuffers = omx_bool(use_buffers);
                self.set_parameter_raw(handle, OMX_IndexParamBrcmDisableProprietaryTunnels, &mut value)
            }
        }
    }

    fn set_config(&mut self, handle: OmxHandle, config: &Config) -> Result<()> {
        match config {
            Config::RequestCallback {
                port,
                index,
                enable,
            } => {
                let mut value = omx_struct!(OMX_CONFIG_REQUESTCALLBACKTYPE);
                value.nPortIndex = *port as _;
                value.nIndex = match index {
                    CallbackIndex::CameraDeviceNumber => OMX_IndexParamCameraDeviceNumber,
                };
                value.bEnable = omx_bool(*enable);
                self.set_config_raw(handle, OMX_IndexConfigRequestCallback, &mut value)
            }
            Config::Sharpness { port, value: level } => {
                let mut value = omx_struct!(OMX_CONFIG_SHARPNESSTYPE);
                value.nPortIndex = *port as _;
                value.nSharpness = *level as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonSharpness, &mut value)
            }
            Config::Contrast { port, value: level } => {
                let mut value = omx_struct!(OMX_CONFIG_CONTRASTTYPE);
                value.nPortIndex = *port as _;
                value.nContrast = *level as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonContrast, &mut value)
            }
            Config::Saturation { port, value: level } => {
                let mut value = omx_struct!(OMX_CONFIG_SATURATIONTYPE);
                value.nPortIndex = *port as _;
                value.nSaturation = *level as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonSaturation, &mut value)
            }
            Config::Brightness { port, value: level } => {
                let mut value = omx_struct!(OMX_CONFIG_BRIGHTNESSTYPE);
                value.nPortIndex = *port as _;
                value.nBrightness = *level as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonBrightness, &mut value)
            }
            Config::ExposureValue {
                port,
                metering,
                compensation_q16,
                shutter_speed_us,
                auto_shutter,
                iso,
                auto_iso,
            } => {
                let mut value = omx_struct!(OMX_CONFIG_EXPOSUREVALUETYPE);
                value.nPortIndex = *port as _;
                value.eMetering = convert::metering(*metering);
                value.xEVCompensation = *compensation_q16 as _;
                value.nApertureFNumber = 0;
                value.bAutoAperture = OMX_FALSE;
                value.nShutterSpeedMsec = *shutter_speed_us as _;
                value.bAutoShutterSpeed = omx_bool(*auto_shutter);
                value.nSensitivity = *iso as _;
                value.bAutoSensitivity = omx_bool(*auto_iso);
                self.set_config_raw(handle, OMX_IndexConfigCommonExposureValue, &mut value)
            }
            Config::Exposure { port, control } => {
                let mut value = omx_struct!(OMX_CONFIG_EXPOSURECONTROLTYPE);
                value.nPortIndex = *port as _;
                value.eExposureControl = convert::exposure_control(*control);
                self.set_config_raw(handle, OMX_IndexConfigCommonExposure, &mut value)
            }
            Config::FrameStabilisation { port, enabled } => {
                let mut value = omx_struct!(OMX_CONFIG_FRAMESTABTYPE);
                value.nPortIndex = *port as _;
                value.bStab = omx_bool(*enabled);
                self.set_config_raw(handle, OMX_IndexConfigCommonFrameStabilisation, &mut value)
            }
            Config::WhiteBalance { port, mode } => {
                let mut value = omx_struct!(OMX_CONFIG_WHITEBALCONTROLTYPE);
                value.nPortIndex = *port as _;
                value.eWhiteBalControl = convert::white_balance(*mode);
                self.set_config_raw(handle, OMX_IndexConfigCommonWhiteBalance, &mut value)
            }
            Config::WhiteBalanceGains { red_q16, blue_q16 } => {
                let mut value = omx_struct!(OMX_CONFIG_CUSTOMAWBGAINSTYPE);
                value.xGainR = *red_q16 as _;
                value.xGainB = *blue_q16 as _;
                self.set_config_raw(handle, OMX_IndexConfigCustomAwbGains, &mut value)
            }
            Config::ImageFilter { port, filter } => {
                let mut value = omx_struct!(OMX_CONFIG_IMAGEFILTERTYPE);
                value.nPortIndex = *port as _;
                value.eImageFilter = convert::image_filter(*filter);
                self.set_config_raw(handle, OMX_IndexConfigCommonImageFilter, &mut value)
            }
            Config::Mirror { port, mirror } => {
                let mut value = omx_struct!(OMX_CONFIG_MIRRORTYPE);
                value.nPortIndex = *port as _;
                value.eMirror = convert::mirror(*mirror);
                self.set_config_raw(handle, OMX_IndexConfigCommonMirror, &mut value)
            }
            Config::Rotation { port, degrees } => {
                let mut value = omx_struct!(OMX_CONFIG_ROTATIONTYPE);
                value.nPortIndex = *port as _;
                value.nRotation = *degrees as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonRotate, &mut value)
            }
            Config::ColorEnhancement {
                port,
                enabled,
                u,
                v,
            } => {
                let mut value = omx_struct!(OMX_CONFIG_COLORENHANCEMENTTYPE);
                value.nPortIndex = *port as _;
                value.bColorEnhancement = omx_bool(*enabled);
                value.nCustomizedU = *u as _;
                value.nCustomizedV = *v as _;
                self.set_config_raw(handle, OMX_IndexConfigCommonColorEnhancement, &mut value)
            }
            Config::StillDenoise(enabled) => {
                let mut value = omx_struct!(OMX_CONFIG_BOOLEANTYPE);
                value.bEnabled = omx_bool(*enabled);
                self.set_config_raw(handle, OMX_IndexConfigStillColourDenoiseEnable, &mut value)
            }
            Config::InputCrop {
                port,
                left_q16,
                top_q16,
                width_q16,
                height_q16,
            } => {
                let mut value = omx_struct!(OMX_CONFIG_INPUTCROPTYPE);
                value.nPortIndex = *port as _;
                value.xLeft = *left_q16 as _;
                value.xTop = *top_q16 as _;
                value.xWidth = *width_q16 as _;
                value.xHeight = *height_q16 as _;
                self.set_config_raw(handle, OMX_IndexConfigInputCropPercentages, &mut value)
            }
            Config::DynamicRangeExpansion(mode) => {
                let mut value = omx_struct!(OMX_CONFIG_DYNAMICRANGEEXPANSIONTYPE);
                value.eMode = convert::dynamic_range(*mode);
                self.set_config_raw(handle, OMX_IndexConfigDynamicRangeExpansion, &mut value)
            }
            Config::MetadataItem { port, key, value } => {
                self.set_metadata_item(handle, *port, key, value)
            }
            Config::SingleStep { port, steps } => {
                let mut value = omx_struct!(OMX_PARAM_U32TYPE);
                value.nPortIndex = *port as _;
                value.nU32 = *steps as _;
                self.set_config_raw(handle, OMX_IndexConfigSingleStep, &mut value)
            }
            Config::PortCapturing { port, capturing } => {
                let mut value = omx_struct!(OMX_CONFIG_PORTBOOLEANTYPE);
                value.nPortIndex = *port as _;
                value.bEnabled = omx_bool(*capturing);
                self.set_config_raw(handle, OMX_IndexConfigPortCapturing, &mut value)
            }
        }
    }

    fn setup_tunnel(
        &mut self,
        output: OmxHandle,
        output_port: u32,
        input: OmxHandle,
        input_port: u32,
    ) -> Result<()> {
        Error::from_status(unsafe {
            self.api
                .setup_tunnel(output.0, output_port as _, input.0, input_port as _)
        } as u32)
    }

    fn send_command(&mut self, handle: OmxHandle, command: Command) -> Result<()> {
        let (raw_command, param) = match command {
            Command::StateSet(state) => (OMX_CommandStateSet, convert::state(state) as u32),
            Command::PortEnable(port) => (OMX_CommandPortEnable, port),
            Command::PortDisable(port) => (OMX_CommandPortDisable, port),
        };
        component_call!(
            handle,
            SendCommand,
            raw_command,
            param as _,
            std::ptr::null_mut()
        )
    }

    fn allocate_buffer(&mut self, handle: OmxHandle, port: u32, size: u32) -> Result<OmxBuffer> {
        let mut header: *mut OMX_BUFFERHEADERTYPE = std::ptr::null_mut();
        component_call!(
            handle,
            AllocateBuffer,
            &mut header,
            port as _,
            std::ptr::null_mut(),
            size as _
        )?;
        NonNull::new(header)
            .map(OmxBuffer)
            .ok_or(Error::InsufficientResources)
    }

    fn free_buffer(&mut self, handle: OmxHandle, port: u32, buffer: OmxBuffer) -> Result<()> {
        component_call!(handle, FreeBuffer, port as _, buffer.0.as_ptr())
    }

    fn fill_buffer(&mut self, handle: OmxHandle, buffer: &mut OmxBuffer) -> Result<()> {
        component_call!(handle, FillThisBuffer, buffer.0.as_ptr())
    }
}

impl std::fmt::Debug for OmxCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmxCore")
            .field("initialized", &self.initialized)
            .field("components", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for OmxCore {
    fn drop(&mut self) {
        for registration in self.registry.drain(..) {
            error!(
                component = registration.events.name(),
                "component still loaded at teardown, freeing handle"
            );
            let status = unsafe { self.api.free_handle(registration.handle.0) } as u32;
            if let Err(err) = Error::from_status(status) {
                error!("failed to free component handle: {err}");
            }
        }
        if self.initialized {
            unsafe {
                self.api.deinit();
                self.host.bcm_host_deinit();
            }
        }
    }
}

/// Recovers the channel registered as application data.
///
/// # Safety
///
/// `app_data` must be the pointer passed to OMX_GetHandle, whose
/// registration is still alive.
unsafe fn channel<'a>(app_data: OMX_PTR) -> Option<&'a EventChannel> {
    unsafe { (app_data as *const EventChannel).as_ref() }
}

unsafe extern "C" fn event_handler(
    _component: OMX_HANDLETYPE,
    app_data: OMX_PTR,
    event: OMX_EVENTTYPE,
    data1: OMX_U32,
    data2: OMX_U32,
    _event_data: OMX_PTR,
) -> OMX_ERRORTYPE {
    let Some(events) = (unsafe { channel(app_data) }) else {
        return OMX_ErrorNone;
    };
    trace!(
        component = events.name(),
        event = event as u32,
        data1 = data1 as u32,
        data2 = data2 as u32,
        "event"
    );

    match event {
        OMX_EventCmdComplete => match data1 as OMX_COMMANDTYPE {
            OMX_CommandStateSet => events.signal(EventFlags::STATE_SET),
            OMX_CommandPortEnable => events.signal(EventFlags::PORT_ENABLE),
            OMX_CommandPortDisable => events.signal(EventFlags::PORT_DISABLE),
            _ => {}
        },
        OMX_EventError => events.signal_error(data1 as u32),
        OMX_EventPortSettingsChanged => events.signal(EventFlags::PORT_SETTINGS_CHANGED),
        OMX_EventParamOrConfigChanged => events.signal(EventFlags::PARAM_OR_CONFIG_CHANGED),
        OMX_EventBufferFlag => events.signal(EventFlags::BUFFER_FLAG),
        _ => {}
    }
    OMX_ErrorNone
}

unsafe extern "C" fn fill_buffer_done(
    _component: OMX_HANDLETYPE,
    app_data: OMX_PTR,
    _buffer: *mut OMX_BUFFERHEADERTYPE,
) -> OMX_ERRORTYPE {
    if let Some(events) = unsafe { channel(app_data) } {
        events.signal(EventFlags::FILL_BUFFER_DONE);
    }
    OMX_ErrorNone
}

unsafe extern "C" fn empty_buffer_done(
    _component: OMX_HANDLETYPE,
    app_data: OMX_PTR,
    _buffer: *mut OMX_BUFFERHEADERTYPE,
) -> OMX_ERRORTYPE {
    if let Some(events) = unsafe { channel(app_data) } {
        events.signal(EventFlags::EMPTY_BUFFER_DONE);
    }
    OMX_ErrorNone
}
