// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for `omx-sys` FFI crate.
//!
//! This script:
//! 1. Locates the VideoCore OpenMAX IL headers (`VC_INCLUDE_DIR`, default `/opt/vc/include`)
//! 2. Generates Rust FFI bindings for the IL core and the Broadcom extensions using `bindgen`
//! 3. Configures dynamic library loading via `libloading` for `libopenmaxil` and `libbcm_host`

use bindgen::callbacks::ParseCallbacks;
use std::env;
use std::path::PathBuf;

/// Default install location of the VideoCore userland headers.
const DEFAULT_VC_INCLUDE_DIR: &str = "/opt/vc/include";

/// Preprocessor definitions the VideoCore headers expect (same as the userland samples).
const DEFINES: &[&str] = &[
    "-DSTANDALONE",
    "-D__STDC_CONSTANT_MACROS",
    "-D__STDC_LIMIT_MACROS",
    "-DTARGET_POSIX",
    "-D_LINUX",
    "-D_REENTRANT",
    "-DOMX",
    "-DOMX_SKIP64BIT",
    "-DUSE_EXTERNAL_OMX",
    "-DHAVE_LIBBCM_HOST",
    "-DUSE_EXTERNAL_LIBBCM_HOST",
    "-DUSE_VCHIQ_ARM",
];

/// Include directories for the VideoCore headers.
fn include_dirs() -> Vec<String> {
    println!("cargo:rerun-if-env-changed=VC_INCLUDE_DIR");
    let root = PathBuf::from(
        env::var("VC_INCLUDE_DIR").unwrap_or_else(|_| DEFAULT_VC_INCLUDE_DIR.to_string()),
    );
    vec![
        root.to_string_lossy().to_string(),
        root.join("interface")
            .join("vcos")
            .join("pthreads")
            .to_string_lossy()
            .to_string(),
        root.join("interface")
            .join("vmcs_host")
            .join("linux")
            .to_string_lossy()
            .to_string(),
    ]
}

/// Creates a bindgen builder preconfigured with include directories and defines.
fn builder(includes_dirs: &[String], header: &str) -> bindgen::Builder {
    println!("cargo:rerun-if-changed={header}");
    bindgen::builder()
        .clang_args(includes_dirs.iter().map(|dir| format!("-I{dir}")))
        .clang_args(DEFINES.iter().copied())
        .header(header)
        .derive_default(true)
        .derive_debug(true)
        .prepend_enum_name(false)
        .dynamic_link_require_all(true)
        .parse_callbacks(Box::new(CB))
}

/// Main build entry point.
fn main() {
    let includes_dirs = include_dirs();
    // Emit include directories for downstream crates
    for include_dir in &includes_dirs {
        println!("cargo:include={include_dir}");
    }

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());

    // IL core, component vtable and Broadcom extension indices/structures
    let bindings = builder(&includes_dirs, "wrapper.h")
        .allowlist_type("OMX_.*")
        .allowlist_var("OMX_.*")
        .allowlist_function("OMX_(Init|Deinit|GetHandle|FreeHandle|SetupTunnel)")
        .dynamic_library_name("libopenmaxil")
        .generate()
        .unwrap();
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Could not write bindings");

    // VideoCore host bootstrap, which lives in a separate shared object
    let bcm_host = builder(&includes_dirs, "bcm_host_wrapper.h")
        .allowlist_function("bcm_host_(init|deinit)")
        .dynamic_library_name("libbcm_host")
        .generate()
        .unwrap();
    bcm_host
        .write_to_file(out_path.join("bcm_host.rs"))
        .expect("Could not write bcm_host bindings");
}

/// Custom bindgen callback for name transformations.
#[derive(Debug)]
struct CB;

impl ParseCallbacks for CB {
    /// Transforms C function names to idiomatic Rust names.
    ///
    /// - `OMX_GetHandle` → `get_handle`
    /// - `bcm_host_init` → `bcm_host_init`
    fn item_name(&self, item_info: bindgen::callbacks::ItemInfo) -> Option<String> {
        match item_info.kind {
            bindgen::callbacks::ItemKind::Function => {
                Some(to_snake_case(item_info.name.trim_start_matches("OMX_")))
            }

            _ => None,
        }
    }
}

/// Converts CamelCase to snake_case for function names.
///
/// Example: `SetupTunnel` → `setup_tunnel`
fn to_snake_case(s: &str) -> String {
    let mut out = String::new();

    for c in s.chars() {
        if c.is_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
