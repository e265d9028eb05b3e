//! Raw sensor buffer to displayable RGBA conversion.
//!
//! Every format is expanded to packed RGBA8 with opaque alpha. YUV formats
//! use BT.601 coefficients:
//! - R = Y + 1.402 * (V - 128)
//! - G = Y - 0.344 * (U - 128) - 0.714 * (V - 128)
//! - B = Y + 1.772 * (U - 128)

use super::Frame;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel layout of a hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Packed YUV 4:2:2, `[Y0, U, Y1, V]` per pixel pair.
    Yuyv,
    /// Planar Y followed by interleaved UV at quarter resolution.
    Nv12,
    /// One luma byte per pixel.
    Gray8,
    /// Packed `[R, G, B]`.
    Rgb24,
    /// Packed `[B, G, R, A]`.
    Bgra32,
    /// Motion JPEG; dimensions come from the JPEG header.
    Mjpeg,
}

impl PixelFormat {
    /// Minimum byte length for an uncompressed buffer of the given size.
    ///
    /// `None` for MJPEG, or when the length does not fit in `usize`.
    pub fn expected_len(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            Self::Yuyv => pixels.checked_mul(2),
            Self::Nv12 => pixels.checked_add(pixels / 2),
            Self::Gray8 => Some(pixels),
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Bgra32 => pixels.checked_mul(4),
            Self::Mjpeg => None,
        }
    }
}

/// Byte length of a packed RGBA8 raster, `None` on overflow.
fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

/// One buffer as delivered by a device, before conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct RawBuffer {
    /// Buffer bytes as delivered.
    pub data: Vec<u8>,
    /// Width in pixels reported by the device.
    pub width: u32,
    /// Height in pixels reported by the device.
    pub height: u32,
    /// Pixel layout of `data`.
    pub format: PixelFormat,
}

impl RawBuffer {
    /// Wraps device bytes without validating them.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }
}

impl std::fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Reasons a buffer could not be turned into a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ConversionError {
    /// Width or height is zero.
    #[error("empty frame dimensions {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    /// Fewer bytes than the format and dimensions require.
    #[error("{format:?} buffer too short: got {got} bytes, need {need}")]
    BufferTooShort {
        format: PixelFormat,
        got: usize,
        need: usize,
    },
    /// Chroma subsampling needs even dimensions.
    #[error("{format:?} requires even dimensions, got {width}x{height}")]
    OddDimensions {
        format: PixelFormat,
        width: u32,
        height: u32,
    },
    /// The frame's byte size overflows `usize`.
    #[error("frame dimensions {width}x{height} exceed addressable memory")]
    TooLarge { width: u32, height: u32 },
    /// The JPEG decoder rejected the buffer.
    #[error("failed to decode MJPEG buffer: {0}")]
    Decode(String),
}

/// Converts a raw buffer into a frame carrying the given sequence number.
pub fn convert(buffer: &RawBuffer, sequence: u64) -> Result<Frame, ConversionError> {
    let (pixels, width, height) = to_rgba(buffer)?;
    let need = rgba_len(width, height).ok_or(ConversionError::TooLarge { width, height })?;
    let got = pixels.len();
    Frame::from_rgba(pixels, width, height, sequence).ok_or(ConversionError::BufferTooShort {
        format: buffer.format,
        got,
        need,
    })
}

/// Converts a raw buffer to packed RGBA8, returning the pixels and dimensions.
pub fn to_rgba(buffer: &RawBuffer) -> Result<(Vec<u8>, u32, u32), ConversionError> {
    if buffer.format == PixelFormat::Mjpeg {
        return decode_mjpeg(&buffer.data);
    }

    let RawBuffer {
        data,
        width,
        height,
        format,
    } = buffer;
    let (width, height, format) = (*width, *height, *format);

    if width == 0 || height == 0 {
        return Err(ConversionError::EmptyDimensions { width, height });
    }
    if matches!(format, PixelFormat::Yuyv | PixelFormat::Nv12)
        && (width % 2 != 0 || (format == PixelFormat::Nv12 && height % 2 != 0))
    {
        return Err(ConversionError::OddDimensions {
            format,
            width,
            height,
        });
    }

    // The RGBA output is the largest buffer involved, so bounding it bounds the input too.
    let too_large = ConversionError::TooLarge { width, height };
    if rgba_len(width, height).is_none() {
        return Err(too_large);
    }
    let need = format.expected_len(width, height).ok_or(too_large)?;
    if data.len() < need {
        return Err(ConversionError::BufferTooShort {
            format,
            got: data.len(),
            need,
        });
    }

    let pixels = match format {
        PixelFormat::Yuyv => yuyv_to_rgba(&data[..need]),
        PixelFormat::Nv12 => nv12_to_rgba(&data[..need], width as usize, height as usize),
        PixelFormat::Gray8 => data[..need].iter().flat_map(|&y| [y, y, y, 255]).collect(),
        PixelFormat::Rgb24 => data[..need]
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        PixelFormat::Bgra32 => data[..need]
            .chunks_exact(4)
            .flat_map(|c| [c[2], c[1], c[0], c[3]])
            .collect(),
        PixelFormat::Mjpeg => return decode_mjpeg(data),
    };

    Ok((pixels, width, height))
}

fn decode_mjpeg(data: &[u8]) -> Result<(Vec<u8>, u32, u32), ConversionError> {
    let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| ConversionError::Decode(e.to_string()))?
        .into_rgba8();
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(ConversionError::EmptyDimensions { width, height });
    }
    Ok((decoded.into_raw(), width, height))
}

#[inline]
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    [r, g, b, 255]
}

fn yuyv_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(data.len() * 2);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgba.extend_from_slice(&yuv_to_rgba(y0, u, v));
        rgba.extend_from_slice(&yuv_to_rgba(y1, u, v));
    }
    rgba
}

fn nv12_to_rgba(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let (luma, chroma) = data.split_at(width * height);
    let mut rgba = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        let uv_row = &chroma[(row / 2) * width..(row / 2 + 1) * width];
        for col in 0..width {
            let y = luma[row * width + col];
            let u = uv_row[col & !1];
            let v = uv_row[(col & !1) + 1];
            rgba.extend_from_slice(&yuv_to_rgba(y, u, v));
        }
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        let buffer = RawBuffer::new(vec![100, 128, 200, 128], 2, 1, PixelFormat::Yuyv);
        let (pixels, w, h) = to_rgba(&buffer).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(pixels, vec![100, 100, 100, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // V well above 128 pushes red up and green down.
        let buffer = RawBuffer::new(vec![128, 128, 128, 228], 2, 1, PixelFormat::Yuyv);
        let (pixels, _, _) = to_rgba(&buffer).unwrap();
        assert!(pixels[0] > 200);
        assert!(pixels[1] < 128);
        assert_eq!(pixels[2], 128);
    }

    #[test]
    fn test_nv12_neutral_chroma_is_gray() {
        // 2x2 luma plane followed by one UV pair.
        let data = vec![10, 20, 30, 40, 128, 128];
        let buffer = RawBuffer::new(data, 2, 2, PixelFormat::Nv12);
        let (pixels, _, _) = to_rgba(&buffer).unwrap();
        let reds: Vec<u8> = pixels.chunks_exact(4).map(|p| p[0]).collect();
        assert_eq!(reds, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_gray_and_rgb_expand_to_rgba() {
        let gray = RawBuffer::new(vec![5, 6], 2, 1, PixelFormat::Gray8);
        assert_eq!(to_rgba(&gray).unwrap().0, vec![5, 5, 5, 255, 6, 6, 6, 255]);

        let rgb = RawBuffer::new(vec![1, 2, 3], 1, 1, PixelFormat::Rgb24);
        assert_eq!(to_rgba(&rgb).unwrap().0, vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_bgra_swizzles_channels() {
        let bgra = RawBuffer::new(vec![1, 2, 3, 4], 1, 1, PixelFormat::Bgra32);
        assert_eq!(to_rgba(&bgra).unwrap().0, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_oversized_header_rejected() {
        let buffer = RawBuffer::new(vec![0u8; 16], u32::MAX, u32::MAX, PixelFormat::Bgra32);
        assert_eq!(
            to_rgba(&buffer),
            Err(ConversionError::TooLarge {
                width: u32::MAX,
                height: u32::MAX,
            })
        );
        assert!(matches!(
            convert(&buffer, 1),
            Err(ConversionError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_expected_len_overflow_is_none() {
        assert_eq!(PixelFormat::Rgb24.expected_len(u32::MAX, u32::MAX), None);
        assert_eq!(PixelFormat::Yuyv.expected_len(4, 4), Some(32));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let buffer = RawBuffer::new(vec![0u8; 10], 4, 4, PixelFormat::Yuyv);
        assert_eq!(
            to_rgba(&buffer),
            Err(ConversionError::BufferTooShort {
                format: PixelFormat::Yuyv,
                got: 10,
                need: 32,
            })
        );
    }

    #[test]
    fn test_odd_width_yuyv_rejected() {
        let buffer = RawBuffer::new(vec![0u8; 6], 3, 1, PixelFormat::Yuyv);
        assert!(matches!(
            to_rgba(&buffer),
            Err(ConversionError::OddDimensions { .. })
        ));
    }

    #[test]
    fn test_empty_dimensions_rejected() {
        let buffer = RawBuffer::new(Vec::new(), 0, 10, PixelFormat::Gray8);
        assert!(matches!(
            to_rgba(&buffer),
            Err(ConversionError::EmptyDimensions { .. })
        ));
    }

    #[test]
    fn test_garbage_mjpeg_rejected() {
        let buffer = RawBuffer::new(vec![0xAB; 64], 8, 8, PixelFormat::Mjpeg);
        assert!(matches!(to_rgba(&buffer), Err(ConversionError::Decode(_))));
    }

    #[test]
    fn test_mjpeg_roundtrip_dimensions() {
        let source = image::RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&source)
            .unwrap();

        let frame = convert(&RawBuffer::new(jpeg, 0, 0, PixelFormat::Mjpeg), 9).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 4));
        assert_eq!(frame.sequence(), 9);
    }

    #[test]
    fn test_convert_keeps_sequence() {
        let buffer = RawBuffer::new(vec![0u8; 16], 4, 2, PixelFormat::Yuyv);
        let frame = convert(&buffer, 42).unwrap();
        assert_eq!(frame.sequence(), 42);
        assert_eq!(frame.pixels().len(), 4 * 2 * 4);
    }
}
