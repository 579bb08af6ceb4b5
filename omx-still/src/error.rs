// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for still capture operations.
//!
//! This module defines the error types returned by pipeline, component and
//! backend calls, mapping OpenMAX IL status codes to idiomatic Rust error enums.

use crate::component::Role;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Raw OpenMAX IL status codes (`OMX_ERRORTYPE`).
///
/// The values are fixed by the IL 1.1.2 standard and shared by every backend.
pub mod status {
    pub const NONE: u32 = 0;
    pub const INSUFFICIENT_RESOURCES: u32 = 0x8000_1000;
    pub const UNDEFINED: u32 = 0x8000_1001;
    pub const COMPONENT_NOT_FOUND: u32 = 0x8000_1003;
    pub const BAD_PARAMETER: u32 = 0x8000_1005;
    pub const NOT_IMPLEMENTED: u32 = 0x8000_1006;
    pub const HARDWARE: u32 = 0x8000_1009;
    pub const INVALID_STATE: u32 = 0x8000_100A;
    pub const PORTS_NOT_COMPATIBLE: u32 = 0x8000_100C;
    pub const SAME_STATE: u32 = 0x8000_1011;
    pub const INCORRECT_STATE_TRANSITION: u32 = 0x8000_1017;
    pub const INCORRECT_STATE_OPERATION: u32 = 0x8000_1018;
    pub const UNSUPPORTED_INDEX: u32 = 0x8000_101A;
    pub const BAD_PORT_INDEX: u32 = 0x8000_101B;
}

/// Errors that can occur while driving the capture pipeline.
///
/// The first group mirrors OpenMAX IL status codes. The remaining variants
/// cover Rust-level failures (configuration, misuse of the pipeline, loading
/// the dynamic libraries).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unknown or unrecognized IL status code.
    #[error("Unknown error: {0:#010x}")]
    Unknown(u32),

    /// The component could not obtain the memory or hardware it needs.
    #[error("Insufficient resources")]
    InsufficientResources,

    /// No component with the requested name exists.
    #[error("Component not found")]
    ComponentNotFound,

    /// A parameter or config structure was rejected.
    #[error("Bad parameter")]
    BadParameter,

    /// The requested feature is not implemented by the component.
    #[error("Not implemented")]
    NotImplemented,

    /// The component reported a hardware failure.
    #[error("Hardware error")]
    Hardware,

    /// The component has entered the IL `Invalid` state.
    #[error("Component is in an invalid state")]
    ComponentInvalidState,

    /// The two ports of a tunnel cannot be connected.
    #[error("Ports not compatible")]
    PortsNotCompatible,

    /// The component is already in the requested state.
    #[error("Same state")]
    SameState,

    /// The requested state is not adjacent to the current one.
    #[error("Incorrect state transition")]
    IncorrectStateTransition,

    /// The call is not allowed in the component's current state.
    #[error("Incorrect state operation")]
    IncorrectStateOperation,

    /// The parameter or config index is not supported by the component.
    #[error("Unsupported index")]
    UnsupportedIndex,

    /// The port index does not exist on the component.
    #[error("Bad port index")]
    BadPortIndex,

    /// The component raised an error event while a wait was pending.
    #[error("Component {component} raised error event {code:#010x}")]
    ComponentEvent { component: String, code: u32 },

    /// The pipeline tried to use a component that was never created.
    #[error("Component {0} is not initialized")]
    NotInitialized(Role),

    /// A pipeline operation was called out of order.
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// The capture configuration is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A generic error for Rust-level failures not directly mapped to IL errors.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to parse a JSON capture configuration.
    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read a configuration file.
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or interact with the VideoCore dynamic libraries.
    #[cfg(feature = "hardware")]
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts an IL status code to a Rust [`Result`].
    ///
    /// # Arguments
    ///
    /// * `status` - The raw `OMX_ERRORTYPE` value returned by a core or component call
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status == OMX_ErrorNone`
    /// - `Err(Error::...)` for any error status code
    ///
    /// # Examples
    ///
    /// ```
    /// use omx_still::Error;
    ///
    /// assert!(Error::from_status(0).is_ok());
    /// assert!(matches!(Error::from_status(0x8000_101B), Err(Error::BadPortIndex)));
    /// ```
    pub fn from_status(status: u32) -> Result<()> {
        match status {
            status::NONE => Ok(()),
            status::INSUFFICIENT_RESOURCES => Err(Error::InsufficientResources),
            status::COMPONENT_NOT_FOUND => Err(Error::ComponentNotFound),
            status::BAD_PARAMETER => Err(Error::BadParameter),
            status::NOT_IMPLEMENTED => Err(Error::NotImplemented),
            status::HARDWARE => Err(Error::Hardware),
            status::INVALID_STATE => Err(Error::ComponentInvalidState),
            status::PORTS_NOT_COMPATIBLE => Err(Error::PortsNotCompatible),
            status::SAME_STATE => Err(Error::SameState),
            status::INCORRECT_STATE_TRANSITION => Err(Error::IncorrectStateTransition),
            status::INCORRECT_STATE_OPERATION => Err(Error::IncorrectStateOperation),
            status::UNSUPPORTED_INDEX => Err(Error::UnsupportedIndex),
            status::BAD_PORT_INDEX => Err(Error::BadPortIndex),
            other => Err(Error::Unknown(other)),
        }
    }
}
