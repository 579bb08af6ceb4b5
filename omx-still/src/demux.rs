// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Frame boundary detection in the encoder output stream.
//!
//! The encoder hands back one JPEG after another through the same buffer,
//! split wherever the buffer fills up. A new image is assumed to start when a
//! chunk ending with the end-of-image marker is followed by a chunk starting
//! with the SOI + APP1 "Exif" header. A chunk that happens to end on `FF D9`
//! in the middle of an image is not told apart from a real image end; the
//! heuristic only relies on the next chunk not starting with an Exif header.

const EXIF_START_LEN: usize = 10;

/// Returns `true` if `chunk` begins with `FF D8 FF E1 ?? ?? 'E' 'x' 'i' 'f'`.
///
/// The two bytes after the APP1 marker hold the segment length and are not checked.
pub fn starts_exif_image(chunk: &[u8]) -> bool {
    chunk.len() >= EXIF_START_LEN
        && chunk[..4] == [0xFF, 0xD8, 0xFF, 0xE1]
        && &chunk[6..10] == b"Exif"
}

/// Returns `true` if `chunk` ends with the end-of-image marker `FF D9`.
pub fn ends_image(chunk: &[u8]) -> bool {
    chunk.ends_with(&[0xFF, 0xD9])
}

/// Assigns a frame index to each chunk of a burst.
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    frame: u32,
    previous_ends_image: bool,
    chunks: u64,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the frame index for `chunk`, which must be the next chunk of the stream.
    pub fn classify(&mut self, chunk: &[u8]) -> u32 {
        if self.previous_ends_image && starts_exif_image(chunk) {
            self.frame += 1;
        }
        self.previous_ends_image = ends_image(chunk);
        self.chunks += 1;
        self.frame
    }

    /// Number of images seen so far.
    pub fn images(&self) -> u32 {
        if self.chunks == 0 { 0 } else { self.frame + 1 }
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXIF: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE1, 0x12, 0x34, b'E', b'x', b'i', b'f', 0, 0];

    fn ending(tail: &[u8]) -> Vec<u8> {
        let mut chunk = vec![0x11; 16];
        chunk.extend_from_slice(tail);
        chunk
    }

    #[test]
    fn exif_pattern_ignores_segment_length() {
        assert!(starts_exif_image(&EXIF));
        let mut other_len = EXIF;
        other_len[4] = 0xFF;
        other_len[5] = 0x00;
        assert!(starts_exif_image(&other_len));
    }

    #[test]
    fn exif_pattern_needs_ten_bytes() {
        assert!(starts_exif_image(&EXIF[..10]));
        assert!(!starts_exif_image(&EXIF[..9]));
        assert!(!starts_exif_image(&[]));
    }

    #[test]
    fn jfif_header_is_not_an_exif_start() {
        let jfif = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert!(!starts_exif_image(&jfif));
    }

    #[test]
    fn end_marker_needs_two_bytes() {
        assert!(ends_image(&[0xFF, 0xD9]));
        assert!(!ends_image(&[0xD9]));
        assert!(!ends_image(&[0xD9, 0xFF]));
    }

    #[test]
    fn increments_only_on_end_then_exif() {
        let cases = [
            (ending(&[0xFF, 0xD9]), EXIF.to_vec(), 1),
            (ending(&[0xFF, 0xD9]), vec![0x22; 12], 0),
            (ending(&[0x00, 0x00]), EXIF.to_vec(), 0),
            (ending(&[0x00, 0x00]), vec![0x22; 12], 0),
        ];
        for (first, second, expected) in cases {
            let mut demuxer = FrameDemuxer::new();
            assert_eq!(demuxer.classify(&first), 0);
            assert_eq!(demuxer.classify(&second), expected);
        }
    }

    #[test]
    fn first_chunk_is_frame_zero_even_after_nothing() {
        let mut demuxer = FrameDemuxer::new();
        assert_eq!(demuxer.images(), 0);
        assert_eq!(demuxer.classify(&EXIF), 0);
        assert_eq!(demuxer.images(), 1);
    }

    #[test]
    fn single_image_in_three_chunks() {
        let mut demuxer = FrameDemuxer::new();
        let frames: Vec<u32> = [EXIF.to_vec(), vec![0x33; 20], ending(&[0xFF, 0xD9])]
            .iter()
            .map(|chunk| demuxer.classify(chunk))
            .collect();
        assert_eq!(frames, [0, 0, 0]);
        assert_eq!(demuxer.images(), 1);
        assert_eq!(demuxer.chunks(), 3);
    }

    #[test]
    fn two_images_split_at_the_boundary() {
        let mut demuxer = FrameDemuxer::new();
        let frames: Vec<u32> = [
            EXIF.to_vec(),
            ending(&[0xFF, 0xD9]),
            EXIF.to_vec(),
            ending(&[0xFF, 0xD9]),
        ]
        .iter()
        .map(|chunk| demuxer.classify(chunk))
        .collect();
        assert_eq!(frames, [0, 0, 1, 1]);
        assert_eq!(demuxer.images(), 2);
    }
}
