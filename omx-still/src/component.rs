// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Component handles and the port primitives built on them.
//!
//! A [`Component`] pairs a backend handle with the [`EventChannel`] its
//! callbacks signal. Every asynchronous primitive here is split into the
//! command and the wait so that callers can enable both ends of a tunnel
//! before waiting on either.

use std::{fmt, sync::Arc};

use tracing::{debug, trace};

use crate::{
    EventChannel, EventFlags, Result,
    backend::{Backend, CallbackIndex, Command, ComponentState, Config, Parameter},
    port::{self, PortDefinition},
};

/// The four components of the still pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Camera,
    NullSink,
    Splitter,
    Encoder,
}

impl Role {
    /// Creation, state-change and destruction order.
    pub const ALL: [Role; 4] = [Role::Camera, Role::NullSink, Role::Splitter, Role::Encoder];

    /// Name the component is registered under in the IL core.
    pub const fn component_name(self) -> &'static str {
        match self {
            Role::Camera => "OMX.broadcom.camera",
            Role::NullSink => "OMX.broadcom.null_sink",
            Role::Splitter => "OMX.broadcom.video_splitter",
            Role::Encoder => "OMX.broadcom.image_encode",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Role::Camera => 0,
            Role::NullSink => 1,
            Role::Splitter => 2,
            Role::Encoder => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Camera => "camera",
            Role::NullSink => "null_sink",
            Role::Splitter => "splitter",
            Role::Encoder => "encoder",
        })
    }
}

/// One live component.
pub struct Component<B: Backend> {
    role: Role,
    handle: B::Handle,
    events: Arc<EventChannel>,
    state: ComponentState,
}

impl<B: Backend> Component<B> {
    /// Creates the component for `role` and disables every one of its ports.
    ///
    /// Ports are disabled one at a time, each confirmed before the next, so
    /// that no stale `PORT_DISABLE` is left pending on the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot create the component or rejects
    /// one of the disable commands.
    pub fn create(backend: &mut B, role: Role) -> Result<Self> {
        let events = Arc::new(EventChannel::new(role.to_string()));
        let handle = backend.create_component(role.component_name(), Arc::clone(&events))?;
        debug!(component = %role, ?handle, "created");

        let component = Self {
            role,
            handle,
            events,
            state: ComponentState::Loaded,
        };
        for port in backend.ports(handle)? {
            component.disable_port(backend, port)?;
            component.wait(EventFlags::PORT_DISABLE)?;
        }
        Ok(component)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn handle(&self) -> B::Handle {
        self.handle
    }

    /// Last state confirmed by the component.
    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    /// Blocks until any of `kinds` is signalled. See [`EventChannel::wait`].
    pub fn wait(&self, kinds: EventFlags) -> Result<EventFlags> {
        trace!(component = %self.role, ?kinds, "waiting");
        self.events.wait(kinds)
    }

    /// Makes the camera load its sensor driver.
    ///
    /// Asks for a callback on the device number, selects device 0 and waits
    /// until the component reports the change.
    pub fn load_drivers(&self, backend: &mut B) -> Result<()> {
        debug!(component = %self.role, "loading drivers");
        backend.set_config(
            self.handle,
            &Config::RequestCallback {
                port: port::ALL,
                index: CallbackIndex::CameraDeviceNumber,
                enable: true,
            },
        )?;
        backend.set_parameter(
            self.handle,
            &Parameter::CameraDeviceNumber {
                port: port::ALL,
                device: 0,
            },
        )?;
        self.wait(EventFlags::PARAM_OR_CONFIG_CHANGED)?;
        Ok(())
    }

    /// Requests `state` and waits for the confirmation.
    pub fn change_state(&mut self, backend: &mut B, state: ComponentState) -> Result<()> {
        debug!(component = %self.role, from = ?self.state, to = ?state, "changing state");
        backend.send_command(self.handle, Command::StateSet(state))?;
        self.wait(EventFlags::STATE_SET)?;
        self.state = state;
        Ok(())
    }

    /// Sends the enable command only.
    pub fn enable_port(&self, backend: &mut B, port: u32) -> Result<()> {
        debug!(component = %self.role, port, "enabling port");
        backend.send_command(self.handle, Command::PortEnable(port))
    }

    /// Sends the disable command only.
    pub fn disable_port(&self, backend: &mut B, port: u32) -> Result<()> {
        debug!(component = %self.role, port, "disabling port");
        backend.send_command(self.handle, Command::PortDisable(port))
    }

    /// Enables a non-tunneled `port` and allocates its single buffer.
    ///
    /// The buffer size comes from the port definition. The enable only
    /// completes once the port is populated, so the wait comes last.
    pub fn enable_port_with_buffer(&self, backend: &mut B, port: u32) -> Result<B::Buffer> {
        self.enable_port(backend, port)?;
        let definition = backend.port_definition(self.handle, port)?;
        debug!(component = %self.role, port, size = definition.buffer_size, "allocating buffer");
        let buffer = backend.allocate_buffer(self.handle, port, definition.buffer_size)?;
        self.wait(EventFlags::PORT_ENABLE)?;
        Ok(buffer)
    }

    /// Disables `port` and frees its buffer, then waits for the confirmation.
    pub fn disable_port_free_buffer(&self, backend: &mut B, port: u32, buffer: B::Buffer) -> Result<()> {
        self.disable_port(backend, port)?;
        debug!(component = %self.role, port, "freeing buffer");
        backend.free_buffer(self.handle, port, buffer)?;
        self.wait(EventFlags::PORT_DISABLE)?;
        Ok(())
    }

    pub fn port_definition(&self, backend: &mut B, port: u32) -> Result<PortDefinition> {
        backend.port_definition(self.handle, port)
    }

    /// Fetches the definition of `port`, lets `update` change it and writes it back whole.
    pub fn update_port_definition<F>(&self, backend: &mut B, port: u32, update: F) -> Result<()>
    where
        F: FnOnce(&mut PortDefinition) -> Result<()>,
    {
        let mut definition = backend.port_definition(self.handle, port)?;
        update(&mut definition)?;
        debug!(component = %self.role, port, format = ?definition.format, "setting port definition");
        backend.set_port_definition(self.handle, &definition)
    }

    pub fn set_parameter(&self, backend: &mut B, parameter: &Parameter) -> Result<()> {
        trace!(component = %self.role, ?parameter, "set parameter");
        backend.set_parameter(self.handle, parameter)
    }

    pub fn set_config(&self, backend: &mut B, config: &Config) -> Result<()> {
        trace!(component = %self.role, ?config, "set config");
        backend.set_config(self.handle, config)
    }

    /// Hands `buffer` to the component for filling. Completion is `FILL_BUFFER_DONE`.
    pub fn fill_buffer(&self, backend: &mut B, buffer: &mut B::Buffer) -> Result<()> {
        backend.fill_buffer(self.handle, buffer)
    }

    /// Releases the component handle.
    pub fn destroy(self, backend: &mut B) -> Result<()> {
        debug!(component = %self.role, "destroying");
        backend.destroy_component(self.handle)
    }
}

impl<B: Backend> fmt::Debug for Component<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("role", &self.role)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}
