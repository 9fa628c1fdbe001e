//! Planar YUV 4:2:0 to RGB24 + 12-bit luma conversion
//!
//! Chroma is sampled at `(row / 2, col / 2)`, the top-left sample of each
//! 2x2 block, with no interpolation. The gray output is the luma sample
//! shifted from 8 into 12 bits.

use thiserror::Error;

use super::frame::{ImageBuffers, PixelFormat, PlanarFrame, Rgb};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("plane {plane} holds {actual} bytes, {required} required")]
    PlaneTooSmall {
        plane: usize,
        required: usize,
        actual: usize,
    },
    #[error("plane {plane} stride {stride} is narrower than {width} samples")]
    StrideTooSmall {
        plane: usize,
        stride: usize,
        width: usize,
    },
}

/// Bits the 8-bit luma is shifted by to fill the 12-bit gray range.
pub const GRAY_SHIFT: u32 = 4;

/// Convert a decoded 4:2:0 frame into a color and a gray buffer.
pub fn yuv420_to_buffers(frame: &PlanarFrame<'_>) -> Result<ImageBuffers, ConvertError> {
    if !frame.format.is_planar_yuv420() {
        return Err(ConvertError::UnsupportedFormat(frame.format));
    }
    check_planes(frame)?;

    let [y_plane, u_plane, v_plane] = frame.planes;
    let [y_stride, u_stride, v_stride] = frame.strides;
    let mut out = ImageBuffers::new(frame.width, frame.height);

    for i in 0..frame.height {
        let y_row = i * y_stride;
        let u_row = (i / 2) * u_stride;
        let v_row = (i / 2) * v_stride;

        for j in 0..frame.width {
            let y = y_plane[y_row + j];
            let u = u_plane[u_row + j / 2];
            let v = v_plane[v_row + j / 2];

            out.rgb.set_element(i, j, yuv_to_rgb(y, u, v));
            out.gray.set_element(i, j, u16::from(y) << GRAY_SHIFT);
        }
    }

    Ok(out)
}

fn check_planes(frame: &PlanarFrame<'_>) -> Result<(), ConvertError> {
    if frame.width == 0 || frame.height == 0 {
        return Ok(());
    }

    let chroma_width = frame.width.div_ceil(2);
    let chroma_height = frame.height.div_ceil(2);
    let geometry = [
        (frame.width, frame.height),
        (chroma_width, chroma_height),
        (chroma_width, chroma_height),
    ];

    for (plane, &(width, rows)) in geometry.iter().enumerate() {
        let stride = frame.strides[plane];
        if stride < width {
            return Err(ConvertError::StrideTooSmall {
                plane,
                stride,
                width,
            });
        }
        // The last row may be unpadded.
        let required = (rows - 1) * stride + width;
        let actual = frame.planes[plane].len();
        if actual < required {
            return Err(ConvertError::PlaneTooSmall {
                plane,
                required,
                actual,
            });
        }
    }

    Ok(())
}

/// Convert a single YUV sample to RGB
///
/// Full-range BT.601 in 8.8 fixed point:
/// R = Y + 1.402(V-128)
/// G = Y - 0.344(U-128) - 0.714(V-128)
/// B = Y + 1.772(U-128)
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb {
    const V_TO_R: i32 = 359; // 1.402 * 256
    const U_TO_G: i32 = 88; // 0.344 * 256
    const V_TO_G: i32 = 183; // 0.714 * 256
    const U_TO_B: i32 = 454; // 1.772 * 256

    let y = i32::from(y) << 8;
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;

    let r = (y + V_TO_R * v + 128) >> 8;
    let g = (y - U_TO_G * u - V_TO_G * v + 128) >> 8;
    let b = (y + U_TO_B * u + 128) >> 8;

    Rgb::new(clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
