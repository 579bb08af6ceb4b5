// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Consumers of the encoder output.

use tracing::warn;

/// Receives the encoder output, one call per filled buffer, in stream order.
///
/// `chunk` borrows the pipeline's output buffer and is only valid for the
/// duration of the call.
pub trait ChunkSink {
    fn accept(&mut self, frame: u32, chunk: &[u8]);
}

impl<F> ChunkSink for F
where
    F: FnMut(u32, &[u8]),
{
    fn accept(&mut self, frame: u32, chunk: &[u8]) {
        self(frame, chunk)
    }
}

/// Assembles chunks into one byte vector per frame.
#[derive(Debug, Default, Clone)]
pub struct FrameCollector {
    frames: Vec<Vec<u8>>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Vec<u8>> {
        self.frames
    }
}

impl ChunkSink for FrameCollector {
    fn accept(&mut self, frame: u32, chunk: &[u8]) {
        let index = frame as usize;
        if index > self.frames.len() {
            // Frame indices only grow by one at a time.
            warn!(frame, collected = self.frames.len(), "frame index skipped ahead");
        }
        if index >= self.frames.len() {
            self.frames.resize_with(index + 1, Vec::new);
        }
        self.frames[index].extend_from_slice(chunk);
    }
}
