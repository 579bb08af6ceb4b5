// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime loading of the VideoCore shared libraries.

use std::{ffi::OsStr, sync::Arc};

use crate::Result;

/// Shared handle to the loaded OpenMAX IL core.
pub type OmxApiHandle = Arc<omx_sys::libopenmaxil>;

/// Shared handle to the loaded host bootstrap library.
pub type BcmHostHandle = Arc<omx_sys::libbcm_host>;

/// Loads `libopenmaxil.so` from `path`.
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library or one of its symbols
/// cannot be found.
pub fn load_api(path: impl AsRef<OsStr>) -> Result<OmxApiHandle> {
    // Safety: loading runs the library initializers, which have no
    // preconditions for libopenmaxil.
    let api = unsafe { omx_sys::libopenmaxil::new(path.as_ref())? };
    Ok(Arc::new(api))
}

/// Loads `libbcm_host.so` from `path`.
pub fn load_bcm_host(path: impl AsRef<OsStr>) -> Result<BcmHostHandle> {
    let host = unsafe { omx_sys::libbcm_host::new(path.as_ref())? };
    Ok(Arc::new(host))
}
