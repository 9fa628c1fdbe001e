use serde::{Deserialize, Serialize};

use crate::pipeline::Timestamped;

/// Pixel formats reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar 4:2:0, limited range
    Yuv420p,
    /// Planar 4:2:0, full (JPEG) range
    Yuvj420p,
    Nv12,
    Rgb24,
    /// Anything else the decoder can emit, by its native tag
    Other(i32),
}

impl PixelFormat {
    /// Only the planar 4:2:0 layouts can be converted.
    pub fn is_planar_yuv420(self) -> bool {
        matches!(self, PixelFormat::Yuv420p | PixelFormat::Yuvj420p)
    }
}

/// Borrowed view of the decoder's reusable output frame.
#[derive(Debug, Clone, Copy)]
pub struct PlanarFrame<'a> {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    /// Y, U, V planes
    pub planes: [&'a [u8]; 3],
    /// Row stride in bytes for each plane
    pub strides: [usize; 3],
    /// Best-effort presentation time in microseconds, if the stream carries one
    pub pts_us: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Packed 8-bit RGB image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rgb24Buffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Rgb24Buffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn element(&self, row: usize, col: usize) -> Rgb {
        let idx = (row * self.width + col) * 3;
        Rgb::new(self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    #[inline]
    pub fn set_element(&mut self, row: usize, col: usize, color: Rgb) {
        let idx = (row * self.width + col) * 3;
        self.data[idx] = color.r;
        self.data[idx + 1] = color.g;
        self.data[idx + 2] = color.b;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy into an `image` buffer for encoding to disk.
    pub fn to_image(&self) -> Option<image::RgbImage> {
        let width = u32::try_from(self.width).ok()?;
        let height = u32::try_from(self.height).ok()?;
        image::RgbImage::from_raw(width, height, self.data.clone())
    }
}

/// Single-channel 12-bit image stored in `u16`, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct G12Buffer {
    width: usize,
    height: usize,
    data: Vec<u16>,
}

impl G12Buffer {
    pub const MAX_VALUE: u16 = 0x0FFF;

    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn element(&self, row: usize, col: usize) -> u16 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set_element(&mut self, row: usize, col: usize, value: u16) {
        self.data[row * self.width + col] = value & Self::MAX_VALUE;
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.data
    }
}

/// One side of a frame pair: color plus reduced-precision luma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffers {
    pub rgb: Rgb24Buffer,
    pub gray: G12Buffer,
}

impl ImageBuffers {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            rgb: Rgb24Buffer::new(width, height),
            gray: G12Buffer::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.rgb.width(), self.rgb.height())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("stereo sides differ in size: left {left:?}, right {right:?}")]
pub struct GeometryMismatch {
    pub left: (usize, usize),
    pub right: (usize, usize),
}

/// The unit handed from the producer to the consumer.
///
/// Stereo sources fill both sides; mono capture duplicates one image into
/// both sides with independent storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    pub left: ImageBuffers,
    pub right: ImageBuffers,
    /// Microseconds
    pub left_timestamp: u64,
    /// Microseconds
    pub right_timestamp: u64,
}

impl FramePair {
    pub fn mono(image: ImageBuffers, timestamp: u64) -> Self {
        Self {
            right: image.clone(),
            left: image,
            left_timestamp: timestamp,
            right_timestamp: timestamp,
        }
    }

    pub fn stereo(
        left: ImageBuffers,
        right: ImageBuffers,
        left_timestamp: u64,
        right_timestamp: u64,
    ) -> Result<Self, GeometryMismatch> {
        if left.dimensions() != right.dimensions() {
            return Err(GeometryMismatch {
                left: left.dimensions(),
                right: right.dimensions(),
            });
        }
        Ok(Self {
            left,
            right,
            left_timestamp,
            right_timestamp,
        })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.left.dimensions()
    }
}

impl Timestamped for FramePair {
    fn timestamp(&self) -> u64 {
        self.left_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_sides_are_equal_but_independent() {
        let mut image = ImageBuffers::new(4, 2);
        image.rgb.set_element(1, 3, Rgb::new(10, 20, 30));
        image.gray.set_element(1, 3, 0x0ABC);

        let mut pair = FramePair::mono(image, 42);
        assert_eq!(pair.left, pair.right);
        assert_eq!(pair.left_timestamp, 42);
        assert_eq!(pair.right_timestamp, 42);

        pair.right.rgb.set_element(1, 3, Rgb::new(0, 0, 0));
        pair.right.gray.set_element(0, 0, 1);
        assert_eq!(pair.left.rgb.element(1, 3), Rgb::new(10, 20, 30));
        assert_eq!(pair.left.gray.element(0, 0), 0);
    }

    #[test]
    fn stereo_rejects_mismatched_sides() {
        let err = FramePair::stereo(ImageBuffers::new(4, 4), ImageBuffers::new(2, 2), 1, 1)
            .unwrap_err();
        assert_eq!(err.left, (4, 4));
        assert_eq!(err.right, (2, 2));
    }

    #[test]
    fn gray_values_mask_to_twelve_bits() {
        let mut gray = G12Buffer::new(1, 1);
        gray.set_element(0, 0, 0xFFFF);
        assert_eq!(gray.element(0, 0), G12Buffer::MAX_VALUE);
    }

    #[test]
    fn rgb_buffer_exports_image() {
        let mut rgb = Rgb24Buffer::new(2, 1);
        rgb.set_element(0, 1, Rgb::new(1, 2, 3));
        let img = rgb.to_image().unwrap();
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.get_pixel(1, 0).0, [1, 2, 3]);
    }

    #[test]
    fn only_planar_420_is_convertible() {
        assert!(PixelFormat::Yuv420p.is_planar_yuv420());
        assert!(PixelFormat::Yuvj420p.is_planar_yuv420());
        assert!(!PixelFormat::Nv12.is_planar_yuv420());
        assert!(!PixelFormat::Other(99).is_planar_yuv420());
    }
}
