//! Capture-source seam over camera hardware
//!
//! Real deployments implement [`CaptureSourceFactory`] over their video
//! backend; tests inject scripted sources.

use anyhow::{Context, Result};
use facewatch_core::FaceError;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// One captured frame, RGB24 pixels in row-major order
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Encode to JPEG bytes, the format the extractor expects
    pub fn to_jpeg(&self) -> Result<Vec<u8>> {
        let image = RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .context("Frame pixel buffer does not match its dimensions")?;
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Jpeg)
            .context("Failed to encode frame as JPEG")?;
        Ok(buf.into_inner())
    }
}

/// An open capture device
///
/// The device is released when the source is dropped.
pub trait CaptureSource: Send {
    /// Pull the next frame
    ///
    /// `Ok(None)` means no frame was available (end of stream or a
    /// transient glitch); the loop backs off briefly and retries.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens capture devices by index
pub trait CaptureSourceFactory: Send + Sync {
    /// Open the device, or fail with [`FaceError::DeviceUnavailable`]
    fn open(&self, device_index: u32) -> Result<Box<dyn CaptureSource>, FaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_jpeg() {
        let frame = Frame {
            width: 2,
            height: 2,
            pixels: vec![255; 12],
        };
        let bytes = frame.to_jpeg().unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_frame_with_wrong_buffer_size_fails() {
        let frame = Frame {
            width: 2,
            height: 2,
            pixels: vec![255; 5],
        };
        assert!(frame.to_jpeg().is_err());
    }
}
