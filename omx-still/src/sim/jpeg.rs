// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Synthetic encoder output.

/// Builds a minimal Exif JPEG: SOI, an APP1 "Exif" segment, `payload_len`
/// bytes of entropy-coded-looking data and EOI.
///
/// The payload never contains `0xFF`, so the only markers are the framing ones.
/// Different `seed`s give different payloads.
pub fn exif_jpeg(seed: u32, payload_len: usize) -> Vec<u8> {
    const TIFF_HEADER: [u8; 8] = [b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];

    let app1_len = 2 + 6 + TIFF_HEADER.len();
    let mut image = Vec::with_capacity(4 + app1_len + payload_len + 2);
    image.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
    image.extend_from_slice(&(app1_len as u16).to_be_bytes());
    image.extend_from_slice(b"Exif\0\0");
    image.extend_from_slice(&TIFF_HEADER);
    image.extend((0..payload_len).map(|i| ((i as u64 * 31 + u64::from(seed) * 7) % 251) as u8));
    image.extend_from_slice(&[0xFF, 0xD9]);
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::{ends_image, starts_exif_image};

    #[test]
    fn framing_is_recognised() {
        let image = exif_jpeg(3, 100);
        assert!(starts_exif_image(&image));
        assert!(ends_image(&image));
        assert_eq!(image.iter().filter(|&&b| b == 0xFF).count(), 3);
    }

    #[test]
    fn seeds_differ() {
        assert_ne!(exif_jpeg(0, 64), exif_jpeg(1, 64));
    }
}
