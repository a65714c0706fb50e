//! Camera-less frame source producing a moving test pattern.
//!
//! Lets the roll, packaging and trigger paths run on hardware without a
//! camera, and keeps the photo tests hermetic.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, ExtendedColorType};

use super::FrameGrabber;
use crate::error::{LookbackError, Result};

const JPEG_QUALITY: u8 = 80;

/// Generates solid-colour JPEG frames whose hue advances every grab, so
/// consecutive photos are visually distinct.
pub struct TestPatternGrabber {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl TestPatternGrabber {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }
}

impl Default for TestPatternGrabber {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl FrameGrabber for TestPatternGrabber {
    fn grab_frame(&mut self) -> Result<Vec<u8>> {
        let shade = (self.frame_index % 256) as u8;
        self.frame_index += 1;

        let pixels: Vec<u8> = (0..self.width * self.height)
            .flat_map(|_| [shade, 255 - shade, 128])
            .collect();

        let mut jpeg = Vec::new();
        let mut cursor = Cursor::new(&mut jpeg);
        let mut encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        encoder
            .encode(&pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| LookbackError::Photo(format!("jpeg encode failed: {e}")))?;
        Ok(jpeg)
    }
}
