// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build-time configuration and path resolution for the VideoCore libraries.
//!
//! The library directory is fixed when the crate is built (`VC_LIB_DIR`, default
//! `/opt/vc/lib`). The hardware backend loads both shared objects from there.

use std::path::PathBuf;

// Build script generates constants.rs with VC_LIB_DIR
include!(concat!(env!("OUT_DIR"), "/constants.rs"));

/// Returns the directory holding the VideoCore userland libraries.
pub fn get_vc_lib_dir() -> PathBuf {
    PathBuf::from(VC_LIB_DIR)
}

/// Returns the path to the OpenMAX IL shared library (`libopenmaxil.so`).
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "hardware")]
/// # fn main() -> Result<(), omx_still::Error> {
/// use omx_still::config::{get_bcm_host_so_path, get_openmaxil_so_path};
/// use omx_still::hardware::OmxCore;
///
/// let core = OmxCore::load(get_openmaxil_so_path(), get_bcm_host_so_path())?;
/// # Ok(())
/// # }
/// # #[cfg(not(feature = "hardware"))]
/// # fn main() {}
/// ```
pub fn get_openmaxil_so_path() -> PathBuf {
    get_vc_lib_dir().join("libopenmaxil.so")
}

/// Returns the path to the VideoCore host bootstrap library (`libbcm_host.so`).
pub fn get_bcm_host_so_path() -> PathBuf {
    get_vc_lib_dir().join("libbcm_host.so")
}
