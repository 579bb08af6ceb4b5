// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Simple smoke test to verify bindgen code generation.

/// Verifies that bindgen successfully generated Rust bindings.
///
/// This test constructs a port definition structure to ensure the FFI types
/// are accessible and have the expected fields.
#[test]
fn there_is_bindgen_generated_code() {
    let port_def = omx_sys::OMX_PARAM_PORTDEFINITIONTYPE {
        nSize: std::mem::size_of::<omx_sys::OMX_PARAM_PORTDEFINITIONTYPE>() as _,
        nPortIndex: 341,
        ..Default::default()
    };

    println!("port_def: {:?}", port_def.nPortIndex);
    assert_eq!(omx_sys::OMX_VERSION as u32 & 0xff, omx_sys::OMX_VERSION_MAJOR);
}
