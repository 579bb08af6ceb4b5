// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `omx-still` crate.
//!
//! This script generates `constants.rs` containing the compile-time location of
//! the VideoCore userland libraries. The path is used by the configuration
//! module to locate `libopenmaxil.so` and `libbcm_host.so` at runtime.

use std::env;
use std::path::PathBuf;

/// Default install location of the VideoCore userland libraries.
const DEFAULT_VC_LIB_DIR: &str = "/opt/vc/lib";

fn main() {
    println!("cargo:rerun-if-env-changed=VC_LIB_DIR");
    let lib_dir = env::var("VC_LIB_DIR").unwrap_or_else(|_| DEFAULT_VC_LIB_DIR.to_string());

    // Generate constants.rs in the build output directory
    let out_path = PathBuf::from(env::var("OUT_DIR").expect("failed to get output directory"))
        .join("constants.rs");

    let data = format!("pub const VC_LIB_DIR: &str = {lib_dir:?};\n");
    std::fs::write(out_path, data).expect("Unable to write file");
}
