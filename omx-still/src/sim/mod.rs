// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-process simulation of the four capture components.
//!
//! [`Simulator`] implements [`Backend`] without any hardware. It enforces the
//! IL rules the pipeline relies on (adjacent state transitions, tunneled ports
//! completing only once both ends agree, buffers freed before `Loaded`),
//! journals every call, keeps resource accounting for leak checks, plays back
//! scripted encoder output and can inject failures.
//!
//! Clones share the same state, so a test can keep a clone for inspection
//! while the pipeline owns another.

pub mod jpeg;

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::trace;

use crate::{
    Error, EventChannel, EventFlags, Result,
    backend::{Backend, BufferHeader, CallbackIndex, Command, ComponentState, Config, Parameter},
    component::Role,
    port::{
        self, ColorFormat, Direction, ImageCoding, ImageFormat, PortDefinition, PortFormat,
        VideoCoding, VideoFormat,
    },
};

/// `OMX_BUFFERFLAG_EOS`.
pub const BUFFER_FLAG_EOS: u32 = 0x0000_0001;
/// `OMX_BUFFERFLAG_ENDOFFRAME`.
pub const BUFFER_FLAG_END_OF_FRAME: u32 = 0x0000_0010;

/// Default size of the encoder output buffer.
pub const ENCODER_BUFFER_SIZE: u32 = 81920;

/// Handle to a simulated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimHandle(u32);

/// Buffer header handed out by [`Simulator::allocate_buffer`](Backend::allocate_buffer).
#[derive(Debug)]
pub struct SimBuffer {
    id: u32,
    data: Vec<u8>,
    filled_len: usize,
    flags: u32,
}

impl BufferHeader for SimBuffer {
    fn filled(&self) -> &[u8] {
        &self.data[..self.filled_len]
    }

    fn flags(&self) -> u32 {
        self.flags
    }

    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Backend calls, as recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init,
    Deinit,
    CreateComponent(Role),
    DestroyComponent(Role),
    SetPortDefinition {
        component: Role,
        port: u32,
    },
    SetParameter {
        component: Role,
        parameter: Parameter,
    },
    SetConfig {
        component: Role,
        config: Config,
    },
    SetupTunnel {
        output: (Role, u32),
        input: (Role, u32),
    },
    SendCommand {
        component: Role,
        command: Command,
    },
    AllocateBuffer {
        component: Role,
        port: u32,
        size: u32,
    },
    FreeBuffer {
        component: Role,
        port: u32,
    },
    FillBuffer {
        component: Role,
    },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Init => Operation::Init,
            Call::Deinit => Operation::Deinit,
            Call::CreateComponent(_) => Operation::CreateComponent,
            Call::DestroyComponent(_) => Operation::DestroyComponent,
            Call::SetPortDefinition { .. } => Operation::SetPortDefinition,
            Call::SetParameter { .. } => Operation::SetParameter,
            Call::SetConfig { .. } => Operation::SetConfig,
            Call::SetupTunnel { .. } => Operation::SetupTunnel,
            Call::SendCommand { .. } => Operation::SendCommand,
            Call::AllocateBuffer { .. } => Operation::AllocateBuffer,
            Call::FreeBuffer { .. } => Operation::FreeBuffer,
            Call::FillBuffer { .. } => Operation::FillBuffer,
        }
    }

    /// The component the call was made on, if any.
    pub fn component(&self) -> Option<Role> {
        match self {
            Call::Init | Call::Deinit => None,
            Call::CreateComponent(role) | Call::DestroyComponent(role) => Some(*role),
            Call::SetupTunnel { output, .. } => Some(output.0),
            Call::SetPortDefinition { component, .. }
            | Call::SetParameter { component, .. }
            | Call::SetConfig { component, .. }
            | Call::SendCommand { component, .. }
            | Call::AllocateBuffer { component, .. }
            | Call::FreeBuffer { component, .. }
            | Call::FillBuffer { component } => Some(*component),
        }
    }
}

/// Kinds of backend call, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    Deinit,
    CreateComponent,
    DestroyComponent,
    SetPortDefinition,
    SetParameter,
    SetConfig,
    SetupTunnel,
    SendCommand,
    AllocateBuffer,
    FreeBuffer,
    FillBuffer,
}

#[derive(Debug, Clone, Copy)]
enum FaultKind {
    /// The call returns this status.
    Status(u32),
    /// The call succeeds, then the component raises an error event.
    ErrorEvent(u32),
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    operation: Operation,
    nth: usize,
    kind: FaultKind,
}

/// Snapshot of what the simulator currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub initialized: bool,
    pub live_components: usize,
    pub allocated_buffers: usize,
    /// Tunnels whose two ends are both still alive.
    pub tunnels: usize,
    pub states: Vec<(Role, ComponentState)>,
    pub enabled_ports: Vec<(Role, u32)>,
    pub capturing: bool,
}

impl ResourceReport {
    /// Nothing left behind.
    pub fn is_clean(&self) -> bool {
        !self.initialized
            && self.live_components == 0
            && self.allocated_buffers == 0
            && self.tunnels == 0
    }
}

#[derive(Debug)]
struct SimPort {
    definition: PortDefinition,
    peer: Option<(SimHandle, u32)>,
    buffer: Option<u32>,
    /// Enable or disable command whose completion has not been signalled yet.
    transition_pending: bool,
}

#[derive(Debug)]
struct SimComponent {
    role: Role,
    events: Arc<EventChannel>,
    state: ComponentState,
    ports: BTreeMap<u32, SimPort>,
    device_callback: bool,
    output_negotiated: bool,
}

#[derive(Debug, Default)]
struct SimState {
    init_count: usize,
    next_handle: u32,
    next_buffer: u32,
    components: BTreeMap<SimHandle, SimComponent>,
    bursts: VecDeque<VecDeque<Vec<u8>>>,
    capturing: bool,
    journal: Vec<Call>,
    counters: HashMap<Operation, usize>,
    faults: Vec<Fault>,
}

/// Simulated media subsystem.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

fn video_port(port: u32, direction: Direction) -> PortDefinition {
    PortDefinition {
        port,
        direction,
        enabled: true,
        populated: false,
        buffer_count_actual: 1,
        buffer_count_min: 1,
        buffer_size: DEFAULT_RAW_FRAME_SIZE,
        buffer_alignment: 16,
        format: PortFormat::Video(VideoFormat {
            frame_width: 1920,
            frame_height: 1080,
            stride: 1920,
            slice_height: 1088,
            bitrate: 0,
            framerate: 30 << 16,
            compression: VideoCoding::Unused,
            color: ColorFormat::Yuv420PackedPlanar,
        }),
    }
}

fn image_port(port: u32, direction: Direction, compression: ImageCoding) -> PortDefinition {
    PortDefinition {
        port,
        direction,
        enabled: true,
        populated: false,
        buffer_count_actual: 1,
        buffer_count_min: 1,
        buffer_size: ENCODER_BUFFER_SIZE,
        buffer_alignment: 16,
        format: PortFormat::Image(ImageFormat {
            frame_width: 1920,
            frame_height: 1080,
            stride: 1920,
            slice_height: 1088,
            compression,
            color: match compression {
                ImageCoding::Unused => ColorFormat::Yuv420PackedPlanar,
                _ => ColorFormat::Unused,
            },
        }),
    }
}

fn other_port(port: u32, direction: Direction) -> PortDefinition {
    PortDefinition {
        port,
        direction,
        enabled: true,
        populated: false,
        buffer_count_actual: 1,
        buffer_count_min: 1,
        buffer_size: 64,
        buffer_alignment: 4,
        format: PortFormat::Other,
    }
}

const DEFAULT_RAW_FRAME_SIZE: u32 = 1920 * 1088 * 3 / 2;

/// YUV 4:2:0 buffer size, `None` if it does not fit a `u32`.
fn raw_frame_size(stride: u32, slice_height: u32) -> Option<u32> {
    let size = u64::from(stride) * u64::from(slice_height) * 3 / 2;
    u32::try_from(size).ok()
}

fn default_ports(role: Role) -> Vec<PortDefinition> {
    match role {
        Role::Camera => vec![
            video_port(port::CAMERA_PREVIEW, Direction::Output),
            video_port(port::CAMERA_CAPTURE, Direction::Output),
            video_port(port::CAMERA_STILL, Direction::Output),
            other_port(73, Direction::Input),
        ],
        Role::NullSink => vec![video_port(port::NULL_SINK_INPUT, Direction::Input)],
        Role::Splitter => {
            let mut ports = vec![video_port(port::SPLITTER_INPUT, Direction::Input)];
            ports.extend((251..=255).map(|port| video_port(port, Direction::Output)));
            ports
        }
        Role::Encoder => vec![
            image_port(port::ENCODER_INPUT, Direction::Input, ImageCoding::Unused),
            image_port(port::ENCODER_OUTPUT, Direction::Output, ImageCoding::Jpeg),
        ],
    }
}

fn role_from_name(name: &str) -> Option<Role> {
    Role::ALL
        .into_iter()
        .find(|role| role.component_name() == name)
}

fn incorrect(message: String) -> Error {
    trace!("simulator rejected call: {message}");
    Error::IncorrectStateOperation
}

impl SimState {
    fn component(&self, handle: SimHandle) -> Result<&SimComponent> {
        self.components
            .get(&handle)
            .ok_or_else(|| Error::Other(format!("unknown component handle {handle:?}")))
    }

    fn component_mut(&mut self, handle: SimHandle) -> Result<&mut SimComponent> {
        self.components
            .get_mut(&handle)
            .ok_or_else(|| Error::Other(format!("unknown component handle {handle:?}")))
    }

    fn port_mut(&mut self, handle: SimHandle, port: u32) -> Result<&mut SimPort> {
        self.component_mut(handle)?
            .ports
            .get_mut(&port)
            .ok_or(Error::BadPortIndex)
    }

    fn handle_of(&self, role: Role) -> Option<SimHandle> {
        self.components
            .iter()
            .find(|(_, component)| component.role == role)
            .map(|(handle, _)| *handle)
    }

    fn role_of(&self, handle: SimHandle) -> Result<Role> {
        Ok(self.component(handle)?.role)
    }

    fn signal(&self, handle: SimHandle, flags: EventFlags) -> Result<()> {
        self.component(handle)?.events.signal(flags);
        Ok(())
    }

    /// Journals `call` and applies any fault registered for this occurrence.
    fn begin(&mut self, call: Call, handle: Option<SimHandle>) -> Result<Option<(SimHandle, u32)>> {
        let operation = call.operation();
        self.journal.push(call);
        let count = self.counters.entry(operation).or_insert(0);
        *count += 1;
        let count = *count;

        let Some(index) = self
            .faults
            .iter()
            .position(|fault| fault.operation == operation && fault.nth == count)
        else {
            return Ok(None);
        };
        let fault = self.faults.remove(index);
        match fault.kind {
            FaultKind::Status(code) => {
                Error::from_status(code)?;
                Err(Error::Other(format!("injected status {code:#x} is not an error")))
            }
            FaultKind::ErrorEvent(code) => Ok(handle.map(|handle| (handle, code))),
        }
    }

    fn raise(&self, pending: Option<(SimHandle, u32)>) -> Result<()> {
        if let Some((handle, code)) = pending {
            self.component(handle)?.events.signal_error(code);
        }
        Ok(())
    }

    /// Signals `kind` for a port enable or disable once it can complete.
    fn complete_port_transition(&mut self, handle: SimHandle, port: u32, kind: EventFlags) -> Result<()> {
        let enabling = kind == EventFlags::PORT_ENABLE;
        let state = self.component(handle)?.state;
        let (peer, has_buffer) = {
            let sim_port = self.port_mut(handle, port)?;
            (sim_port.peer, sim_port.buffer.is_some())
        };

        match peer {
            Some((peer_handle, peer_port)) => {
                let peer_sim_port = self.port_mut(peer_handle, peer_port)?;
                let peer_ready =
                    peer_sim_port.definition.enabled == enabling && peer_sim_port.transition_pending;
                if peer_ready {
                    peer_sim_port.transition_pending = false;
                    self.port_mut(handle, port)?.transition_pending = false;
                    self.signal(handle, kind)?;
                    self.signal(peer_handle, kind)?;
                }
            }
            None => {
                // A port in Idle or Executing only completes once its buffer is
                // allocated (enable) or freed (disable).
                let waits_for_buffer = if enabling {
                    state != ComponentState::Loaded && !has_buffer
                } else {
                    has_buffer
                };
                if !waits_for_buffer {
                    self.port_mut(handle, port)?.transition_pending = false;
                    self.signal(handle, kind)?;
                }
            }
        }
        Ok(())
    }

    fn set_port_enabled(&mut self, handle: SimHandle, port: u32, enabled: bool) -> Result<()> {
        let sim_port = self.port_mut(handle, port)?;
        if sim_port.definition.enabled == enabled {
            return Err(incorrect(format!(
                "port {port} is already {}",
                if enabled { "enabled" } else { "disabled" }
            )));
        }
        sim_port.definition.enabled = enabled;
        sim_port.transition_pending = true;
        let kind = if enabled {
            EventFlags::PORT_ENABLE
        } else {
            EventFlags::PORT_DISABLE
        };
        self.complete_port_transition(handle, port, kind)
    }

    fn change_state(&mut self, handle: SimHandle, target: ComponentState) -> Result<()> {
        use ComponentState::*;

        let component = self.component(handle)?;
        let adjacent = matches!(
            (component.state, target),
            (Loaded, Idle) | (Idle, Loaded) | (Idle, Executing) | (Executing, Idle)
        );
        if component.state == target {
            return Err(Error::SameState);
        }
        if !adjacent {
            return Err(Error::IncorrectStateTransition);
        }
        for sim_port in component.ports.values() {
            let port = sim_port.definition.port;
            match (component.state, target) {
                (Loaded, Idle) => {
                    if sim_port.definition.enabled && sim_port.peer.is_none() && sim_port.buffer.is_none() {
                        return Err(incorrect(format!(
                            "{} port {port} is enabled without a buffer",
                            component.role
                        )));
                    }
                }
                (Idle, Loaded) => {
                    if sim_port.buffer.is_some() {
                        return Err(incorrect(format!(
                            "{} port {port} still holds a buffer",
                            component.role
                        )));
                    }
                }
                _ => {}
            }
        }

        self.component_mut(handle)?.state = target;
        self.signal(handle, EventFlags::STATE_SET)
    }

    fn next_chunk(&mut self, capacity: usize) -> Result<(Vec<u8>, bool)> {
        let burst = self
            .bursts
            .front_mut()
            .ok_or_else(|| Error::Other("simulator has no queued encoder output".into()))?;
        let mut chunk = burst
            .pop_front()
            .ok_or_else(|| Error::Other("simulator burst is empty".into()))?;
        if chunk.len() > capacity {
            let rest = chunk.split_off(capacity);
            burst.push_front(rest);
        }
        let end_of_stream = burst.is_empty();
        if end_of_stream {
            self.bursts.pop_front();
        }
        Ok((chunk, end_of_stream))
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("simulator state poisoned".into()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Queues one burst made of `chunks`, delivered one fill each.
    ///
    /// Chunks larger than the output buffer are split at its capacity. The
    /// last chunk carries the end-of-stream flag.
    pub fn queue_chunks<I>(&self, chunks: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let burst: VecDeque<Vec<u8>> = chunks.into_iter().collect();
        if !burst.is_empty() {
            self.with_state(|state| state.bursts.push_back(burst));
        }
    }

    /// Queues one burst of `images` synthetic Exif JPEGs, each delivered in
    /// chunks of at most `chunk_size` bytes.
    pub fn queue_images(&self, images: u32, chunk_size: usize) {
        let chunk_size = chunk_size.max(1);
        let chunks = (0..images)
            .flat_map(|index| {
                let image = jpeg::exif_jpeg(index, 3 * chunk_size + 17);
                image
                    .chunks(chunk_size)
                    .map(<[u8]>::to_vec)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        self.queue_chunks(chunks);
    }

    /// Makes the `nth` (from 1) call of `operation` fail with the IL `status`.
    pub fn fail_on(&self, operation: Operation, nth: usize, status: u32) {
        self.with_state(|state| {
            state.faults.push(Fault {
                operation,
                nth,
                kind: FaultKind::Status(status),
            })
        });
    }

    /// Lets the `nth` call of `operation` succeed, then raises error event `code`
    /// on the component it targeted.
    pub fn raise_error_after(&self, operation: Operation, nth: usize, code: u32) {
        self.with_state(|state| {
            state.faults.push(Fault {
                operation,
                nth,
                kind: FaultKind::ErrorEvent(code),
            })
        });
    }

    /// Every call made so far, in order.
    pub fn journal(&self) -> Vec<Call> {
        self.with_state(|state| state.journal.clone())
    }

    pub fn clear_journal(&self) {
        self.with_state(|state| state.journal.clear());
    }

    /// Current state of `role`, if such a component is alive.
    pub fn component_state(&self, role: Role) -> Option<ComponentState> {
        self.with_state(|state| {
            let handle = state.handle_of(role)?;
            state.components.get(&handle).map(|component| component.state)
        })
    }

    /// Current definition of `port` on `role`.
    pub fn port_definition_of(&self, role: Role, port: u32) -> Option<PortDefinition> {
        self.with_state(|state| {
            let handle = state.handle_of(role)?;
            let component = state.components.get(&handle)?;
            component.ports.get(&port).map(|p| p.definition.clone())
        })
    }

    pub fn report(&self) -> ResourceReport {
        self.with_state(|state| {
            let live = |handle: &SimHandle| state.components.contains_key(handle);
            let mut states = Vec::new();
            let mut enabled_ports = Vec::new();
            let mut allocated_buffers = 0;
            let mut tunnels = 0;
            for component in state.components.values() {
                states.push((component.role, component.state));
                for (index, sim_port) in &component.ports {
                    if sim_port.definition.enabled {
                        enabled_ports.push((component.role, *index));
                    }
                    if sim_port.buffer.is_some() {
                        allocated_buffers += 1;
                    }
                    if sim_port.definition.direction == Direction::Output
                        && sim_port.peer.is_some_and(|(peer, _)| live(&peer))
                    {
                        tunnels += 1;
                    }
                }
            }
            ResourceReport {
                initialized: state.init_count > 0,
                live_components: state.components.len(),
                allocated_buffers,
                tunnels,
                states,
                enabled_ports,
                capturing: state.capturing,
            }
        })
    }
}

impl Backend for Simulator {
    type Handle = SimHandle;
    type Buffer = SimBuffer;

    fn init(&mut self) -> Result<()> {
        let mut state = self.lock()?;
        state.begin(Call::Init, None)?;
        state.init_count += 1;
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        let mut state = self.lock()?;
        state.begin(Call::Deinit, None)?;
        if state.init_count == 0 {
            return Err(incorrect("deinit without init".into()));
        }
        state.init_count -= 1;
        Ok(())
    }

    fn create_component(&mut self, name: &str, events: Arc<EventChannel>) -> Result<SimHandle> {
        let mut state = self.lock()?;
        let role = role_from_name(name).ok_or(Error::ComponentNotFound)?;
        state.begin(Call::CreateComponent(role), None)?;
        if state.init_count == 0 {
            return Err(incorrect("component created before init".into()));
        }

        state.next_handle += 1;
        let handle = SimHandle(state.next_handle);
        let ports = default_ports(role)
            .into_iter()
            .map(|definition| {
                (
                    definition.port,
                    SimPort {
                        definition,
                        peer: None,
                        buffer: None,
                        transition_pending: false,
                    },
                )
            })
            .collect();
        state.components.insert(
            handle,
            SimComponent {
                role,
                events,
                state: ComponentState::Loaded,
                ports,
                device_callback: false,
                output_negotiated: false,
            },
        );
        Ok(handle)
    }

    fn destroy_component(&mut self, handle: SimHandle) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(Call::DestroyComponent(role), Some(handle))?;
        let component = state.component(handle)?;
        if component.state != ComponentState::Loaded {
            return Err(incorrect(format!("{role} destroyed in {:?}", component.state)));
        }
        if component.ports.values().any(|p| p.buffer.is_some()) {
            return Err(incorrect(format!("{role} destroyed with a buffer allocated")));
        }
        state.raise(pending)?;
        state.components.remove(&handle);
        Ok(())
    }

    fn ports(&mut self, handle: SimHandle) -> Result<Vec<u32>> {
        let state = self.lock()?;
        Ok(state.component(handle)?.ports.keys().copied().collect())
    }

    fn port_definition(&mut self, handle: SimHandle, port: u32) -> Result<PortDefinition> {
        let mut state = self.lock()?;
        Ok(state.port_mut(handle, port)?.definition.clone())
    }

    fn set_port_definition(&mut self, handle: SimHandle, definition: &PortDefinition) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(
            Call::SetPortDefinition {
                component: role,
                port: definition.port,
            },
            Some(handle),
        )?;

        let component = state.component(handle)?;
        if role == Role::Splitter
            && definition.port != port::SPLITTER_INPUT
            && !component.output_negotiated
        {
            return Err(incorrect("splitter output configured before its input was tunneled".into()));
        }
        let component_state = component.state;
        let sim_port = state.port_mut(handle, definition.port)?;
        if sim_port.definition.enabled && component_state != ComponentState::Loaded {
            return Err(incorrect(format!("{role} port {} is enabled", definition.port)));
        }
        if sim_port.definition.direction != definition.direction {
            return Err(Error::BadParameter);
        }

        let mut updated = definition.clone();
        updated.enabled = sim_port.definition.enabled;
        updated.populated = sim_port.definition.populated;
        if let PortFormat::Video(video) = &updated.format {
            updated.buffer_size = raw_frame_size(video.stride.unsigned_abs(), video.slice_height)
                .ok_or(Error::BadParameter)?;
        }
        sim_port.definition = updated;
        state.raise(pending)
    }

    fn set_parameter(&mut self, handle: SimHandle, parameter: &Parameter) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(
            Call::SetParameter {
                component: role,
                parameter: parameter.clone(),
            },
            Some(handle),
        )?;

        let target = match parameter {
            Parameter::CameraDeviceNumber { port, .. }
            | Parameter::MaxFrameSize { port, .. }
            | Parameter::QFactor { port, .. }
            | Parameter::IjgScaling { port, .. }
            | Parameter::DisableProprietaryTunnels { port, .. } => Some(*port),
            Parameter::DisableExif(_) | Parameter::Thumbnail { .. } => None,
        };
        if let Some(index) = target.filter(|&index| index != port::ALL) {
            state.port_mut(handle, index)?;
        }

        match parameter {
            Parameter::QFactor { quality, .. } if !(1..=100).contains(quality) => {
                return Err(Error::BadParameter);
            }
            Parameter::CameraDeviceNumber { .. } => {
                if role != Role::Camera {
                    return Err(Error::UnsupportedIndex);
                }
                if state.component(handle)?.device_callback {
                    state.signal(handle, EventFlags::PARAM_OR_CONFIG_CHANGED)?;
                }
            }
            _ => {}
        }
        state.raise(pending)
    }

    fn set_config(&mut self, handle: SimHandle, config: &Config) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(
            Call::SetConfig {
                component: role,
                config: config.clone(),
            },
            Some(handle),
        )?;

        let executing = state.component(handle)?.state == ComponentState::Executing;
        match config {
            Config::RequestCallback {
                index: CallbackIndex::CameraDeviceNumber,
                enable,
                ..
            } => state.component_mut(handle)?.device_callback = *enable,
            Config::SingleStep { port, .. } => {
                state.port_mut(handle, *port)?;
                if !executing {
                    return Err(incorrect(format!("{role} single step outside Executing")));
                }
            }
            Config::PortCapturing { port, capturing } => {
                state.port_mut(handle, *port)?;
                if !executing {
                    return Err(incorrect(format!("{role} capture outside Executing")));
                }
                state.capturing = *capturing;
            }
            _ => {}
        }
        state.raise(pending)
    }

    fn setup_tunnel(
        &mut self,
        output: SimHandle,
        output_port: u32,
        input: SimHandle,
        input_port: u32,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let output_role = state.role_of(output)?;
        let input_role = state.role_of(input)?;
        let pending = state.begin(
            Call::SetupTunnel {
                output: (output_role, output_port),
                input: (input_role, input_port),
            },
            Some(output),
        )?;

        for (handle, port, direction) in [
            (output, output_port, Direction::Output),
            (input, input_port, Direction::Input),
        ] {
            let loaded = state.component(handle)?.state == ComponentState::Loaded;
            let sim_port = state.port_mut(handle, port)?;
            if sim_port.definition.direction != direction {
                return Err(Error::PortsNotCompatible);
            }
            if sim_port.definition.enabled && !loaded {
                return Err(incorrect(format!("port {port} is enabled")));
            }
        }

        let source = state.port_mut(output, output_port)?.definition.clone();
        state.port_mut(output, output_port)?.peer = Some((input, input_port));
        state.port_mut(input, input_port)?.peer = Some((output, output_port));

        // The splitter takes its output geometry from whatever feeds its input.
        if input_role == Role::Splitter && input_port == port::SPLITTER_INPUT {
            let splitter = state.component_mut(input)?;
            for sim_port in splitter.ports.values_mut() {
                if sim_port.definition.direction == Direction::Output {
                    sim_port.definition.format = source.format.clone();
                    sim_port.definition.buffer_size = source.buffer_size;
                }
            }
            splitter.output_negotiated = true;
            state.signal(input, EventFlags::PORT_SETTINGS_CHANGED)?;
        }
        state.raise(pending)
    }

    fn send_command(&mut self, handle: SimHandle, command: Command) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(
            Call::SendCommand {
                component: role,
                command,
            },
            Some(handle),
        )?;
        match command {
            Command::StateSet(target) => state.change_state(handle, target)?,
            Command::PortEnable(port) => state.set_port_enabled(handle, port, true)?,
            Command::PortDisable(port) => state.set_port_enabled(handle, port, false)?,
        }
        state.raise(pending)
    }

    fn allocate_buffer(&mut self, handle: SimHandle, port: u32, size: u32) -> Result<SimBuffer> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(
            Call::AllocateBuffer {
                component: role,
                port,
                size,
            },
            Some(handle),
        )?;

        state.next_buffer += 1;
        let id = state.next_buffer;
        let sim_port = state.port_mut(handle, port)?;
        if sim_port.peer.is_some() {
            return Err(incorrect(format!("port {port} is tunneled")));
        }
        if sim_port.buffer.is_some() {
            return Err(Error::InsufficientResources);
        }
        if !sim_port.definition.enabled {
            return Err(incorrect(format!("port {port} is disabled")));
        }
        if size < sim_port.definition.buffer_size {
            return Err(Error::BadParameter);
        }
        sim_port.buffer = Some(id);
        sim_port.definition.populated = true;
        let completes = sim_port.transition_pending;
        if completes {
            sim_port.transition_pending = false;
            state.signal(handle, EventFlags::PORT_ENABLE)?;
        }
        state.raise(pending)?;

        Ok(SimBuffer {
            id,
            data: vec![0; size as usize],
            filled_len: 0,
            flags: 0,
        })
    }

    fn free_buffer(&mut self, handle: SimHandle, port: u32, buffer: SimBuffer) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(Call::FreeBuffer { component: role, port }, Some(handle))?;

        let sim_port = state.port_mut(handle, port)?;
        if sim_port.buffer != Some(buffer.id) {
            return Err(Error::BadParameter);
        }
        sim_port.buffer = None;
        sim_port.definition.populated = false;
        let completes = sim_port.transition_pending && !sim_port.definition.enabled;
        if completes {
            sim_port.transition_pending = false;
            state.signal(handle, EventFlags::PORT_DISABLE)?;
        }
        state.raise(pending)
    }

    fn fill_buffer(&mut self, handle: SimHandle, buffer: &mut SimBuffer) -> Result<()> {
        let mut state = self.lock()?;
        let role = state.role_of(handle)?;
        let pending = state.begin(Call::FillBuffer { component: role }, Some(handle))?;

        let component = state.component(handle)?;
        if component.state != ComponentState::Executing {
            return Err(incorrect(format!("{role} filled in {:?}", component.state)));
        }
        if component.events.pending()?.contains(EventFlags::FILL_BUFFER_DONE) {
            return Err(incorrect("previous fill still outstanding".into()));
        }
        if !component
            .ports
            .values()
            .any(|sim_port| sim_port.buffer == Some(buffer.id))
        {
            return Err(Error::BadParameter);
        }
        if !state.capturing {
            return Err(incorrect("fill requested while the camera is not capturing".into()));
        }

        let (chunk, end_of_stream) = state.next_chunk(buffer.data.len())?;
        buffer.data[..chunk.len()].copy_from_slice(&chunk);
        buffer.filled_len = chunk.len();
        buffer.flags = 0;
        if chunk.ends_with(&[0xFF, 0xD9]) {
            buffer.flags |= BUFFER_FLAG_END_OF_FRAME;
        }

        if end_of_stream {
            buffer.flags |= BUFFER_FLAG_EOS;
            if let Some(splitter) = state.handle_of(Role::Splitter) {
                state.signal(splitter, EventFlags::BUFFER_FLAG)?;
            }
            state.signal(handle, EventFlags::BUFFER_FLAG | EventFlags::FILL_BUFFER_DONE)?;
        } else {
            state.signal(handle, EventFlags::FILL_BUFFER_DONE)?;
        }
        state.raise(pending)
    }
}
