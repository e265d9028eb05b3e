//! Frame type representing a converted image with capture metadata.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// A single converted frame, ready for display.
///
/// The raster is shared behind an `Arc`: cloning a frame never copies
/// pixels, and nothing can mutate it after construction.
#[derive(Clone)]
pub struct Frame {
    /// RGBA8 raster.
    image: Arc<RgbaImage>,
    /// Monotonic capture timestamp.
    timestamp: Instant,
    /// Wall-clock capture time.
    captured_at: DateTime<Utc>,
    /// Monotonic sequence number.
    sequence: u64,
}

impl Frame {
    /// Wraps an RGBA raster as a frame.
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp: Instant::now(),
            captured_at: Utc::now(),
            sequence,
        }
    }

    /// Builds a frame from packed RGBA bytes.
    ///
    /// Returns `None` if the buffer length does not match `width * height * 4`.
    pub fn from_rgba(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(|image| Self::new(image, sequence))
    }

    /// Returns the RGBA raster.
    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Returns the packed RGBA bytes.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns the monotonic capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the wall-clock capture time.
    #[inline]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if both handles refer to the same raster.
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
