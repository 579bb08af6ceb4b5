// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # omx-sys: Raw FFI bindings to the VideoCore OpenMAX IL
//!
//! This crate provides low-level, unsafe Rust bindings to the Broadcom VideoCore
//! implementation of OpenMAX IL (`libopenmaxil.so`) and to the host bootstrap
//! library (`libbcm_host.so`). It is auto-generated using `bindgen` and loaded at
//! runtime through `libloading`.
//!
//! ## Overview
//!
//! `omx-sys` exposes:
//! - Raw IL types (`OMX_PARAM_PORTDEFINITIONTYPE`, `OMX_BUFFERHEADERTYPE`, ...)
//! - The component vtable (`OMX_COMPONENTTYPE`) through which `GetParameter`,
//!   `SendCommand`, `FillThisBuffer` and friends are called
//! - Index, event, state and error constants, including the Broadcom vendor range
//! - [`libopenmaxil`]: core functions (`OMX_Init` → `init`, `OMX_GetHandle` → `get_handle`, ...)
//! - [`libbcm_host`]: `bcm_host_init` / `bcm_host_deinit`
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the `omx-still` crate
//! with its `hardware` feature instead, which provides component lifecycle
//! management, event handling and `Result`-based error propagation.
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold the
//! IL invariants:
//! - `bcm_host_init` and `OMX_Init` must run before any component is created
//! - Every structure passed to a component must have `nSize` and `nVersion` set
//! - Callbacks run on a VideoCore service thread, not on the caller's thread
//!
//! ## Build Process
//!
//! The headers are looked up in `VC_INCLUDE_DIR` (default `/opt/vc/include`).

// Suppress expected warnings from bindgen-generated code.
// See https://github.com/rust-lang/rust-bindgen/issues/1651.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]
#![allow(rustdoc::invalid_html_tags)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(deref_nullptr)]
#![allow(clippy::missing_safety_doc)]

extern crate libloading;

// Include bindgen-generated FFI bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
include!(concat!(env!("OUT_DIR"), "/bcm_host.rs"));

/// The IL version every structure header must carry.
pub const OMX_VERSION: OMX_U32 = ((OMX_VERSION_STEP << 24)
    | (OMX_VERSION_REVISION << 16)
    | (OMX_VERSION_MINOR << 8)
    | OMX_VERSION_MAJOR) as OMX_U32;
