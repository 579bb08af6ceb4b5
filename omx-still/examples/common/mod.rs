// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Common utilities shared across examples.

use std::path::Path;

use omx_still::FrameCollector;
use tracing::info;

/// Initializes tracing subscriber for examples.
///
/// Logs to stdout at INFO unless `RUST_LOG` says otherwise.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Writes each collected frame to `<dir>/<n>.jpg`, numbered from 1.
pub fn write_frames(dir: &Path, collector: FrameCollector) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for (index, frame) in collector.into_frames().into_iter().enumerate() {
        let path = dir.join(format!("{}.jpg", index + 1));
        std::fs::write(&path, &frame)?;
        info!(path = %path.display(), bytes = frame.len(), "wrote image");
    }
    Ok(())
}
