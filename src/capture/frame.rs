//! Preview frame delivered to a [`PreviewSink`](crate::platform::PreviewSink).

use super::LensFacing;
use std::time::Instant;

/// A single preview frame from the bound camera.
///
/// Pixels are packed RGB (three bytes per pixel), row-major.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number assigned by the backend.
    sequence: u64,
    /// Camera that produced the frame.
    lens: LensFacing,
}

impl Frame {
    /// Bytes per pixel of the packed RGB layout.
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64, lens: LensFacing) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
            lens,
        }
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// When the frame was produced.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Position in the stream, starting at 1.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Lens the frame came from.
    #[inline]
    pub fn lens(&self) -> LensFacing {
        self.lens
    }

    /// Expected buffer length for the frame dimensions.
    #[inline]
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * Self::BYTES_PER_PIXEL
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.expected_len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("lens", &self.lens)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let pixels = vec![0u8; 640 * 480 * 3];
        let frame = Frame::new(pixels, 640, 480, 1, LensFacing::Back);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.lens(), LensFacing::Back);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let pixels = vec![0u8; 640 * 480]; // grayscale-sized buffer
        let frame = Frame::new(pixels, 640, 480, 1, LensFacing::Front);

        assert!(!frame.is_valid());
    }
}
