// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Port wiring between components.

use tracing::debug;

use crate::{
    Component, Error, EventFlags, Result,
    backend::Backend,
    component::Role,
    port::{
        CAMERA_CAPTURE, CAMERA_PREVIEW, ENCODER_INPUT, NULL_SINK_INPUT, SPLITTER_INPUT,
        SPLITTER_OUTPUT,
    },
};

/// A directed connection from an output port to an input port.
///
/// Both ends are enabled and disabled together: the command goes to both
/// components before either confirmation is awaited, since neither end can
/// complete while its peer is still in the other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunnel {
    pub output: (Role, u32),
    pub input: (Role, u32),
}

impl Tunnel {
    /// Camera capture output into the splitter.
    pub const VIDEO: Tunnel = Tunnel {
        output: (Role::Camera, CAMERA_CAPTURE),
        input: (Role::Splitter, SPLITTER_INPUT),
    };

    /// Camera preview output into the null sink.
    pub const PREVIEW: Tunnel = Tunnel {
        output: (Role::Camera, CAMERA_PREVIEW),
        input: (Role::NullSink, NULL_SINK_INPUT),
    };

    /// Splitter output into the encoder.
    pub const ENCODE: Tunnel = Tunnel {
        output: (Role::Splitter, SPLITTER_OUTPUT),
        input: (Role::Encoder, ENCODER_INPUT),
    };

    /// Port enable order used by the pipeline.
    pub const ALL: [Tunnel; 3] = [Tunnel::VIDEO, Tunnel::PREVIEW, Tunnel::ENCODE];

    pub fn setup<B: Backend>(
        &self,
        backend: &mut B,
        output: &Component<B>,
        input: &Component<B>,
    ) -> Result<()> {
        self.check(output, input)?;
        debug!(tunnel = %self, "setting up tunnel");
        backend.setup_tunnel(output.handle(), self.output.1, input.handle(), self.input.1)
    }

    /// Enables both ports, then waits for both confirmations.
    pub fn enable<B: Backend>(
        &self,
        backend: &mut B,
        output: &Component<B>,
        input: &Component<B>,
    ) -> Result<()> {
        self.check(output, input)?;
        output.enable_port(backend, self.output.1)?;
        input.enable_port(backend, self.input.1)?;
        output.wait(EventFlags::PORT_ENABLE)?;
        input.wait(EventFlags::PORT_ENABLE)?;
        Ok(())
    }

    /// Disables both ports, then waits for both confirmations.
    pub fn disable<B: Backend>(
        &self,
        backend: &mut B,
        output: &Component<B>,
        input: &Component<B>,
    ) -> Result<()> {
        self.check(output, input)?;
        output.disable_port(backend, self.output.1)?;
        input.disable_port(backend, self.input.1)?;
        output.wait(EventFlags::PORT_DISABLE)?;
        input.wait(EventFlags::PORT_DISABLE)?;
        Ok(())
    }

    fn check<B: Backend>(&self, output: &Component<B>, input: &Component<B>) -> Result<()> {
        if output.role() != self.output.0 || input.role() != self.input.0 {
            return Err(Error::Other(format!(
                "tunnel {self} given {} -> {}",
                output.role(),
                input.role()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.output.0, self.output.1, self.input.0, self.input.1
        )
    }
}
