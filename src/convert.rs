//! Pixel format conversion.
//!
//! Any [`PixelFormat`] converts to any other through an RGBA `f32`
//! intermediate. Widening fills missing channels: `R` becomes `(r, r, r, 1)`,
//! `RG` becomes `(r, g, 0, 1)`, `RGB` gains opaque alpha. Narrowing keeps the
//! leading channels. Integer samples map to `[0, 1]`; float samples are clamped
//! to that range when stored as integers, rounding to the nearest step.

use half::f16;

use crate::error::CodecError;
use crate::pixel::{BitDepth, ChannelLayout, NumericKind, PixelFormat};

/// Convert a tightly packed `width` x `height` image between pixel formats.
///
/// `dst` must hold at least `dst_format.buffer_size(width, height)` bytes;
/// only that prefix is written.
pub fn convert(
    src: &[u8],
    src_format: PixelFormat,
    dst: &mut [u8],
    dst_format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<(), CodecError> {
    let src_len = required(src_format, width, height, src.len())?;
    let dst_len = required(dst_format, width, height, dst.len())?;
    let src = &src[..src_len];
    let dst = &mut dst[..dst_len];

    if src_format == dst_format {
        dst.copy_from_slice(src);
        return Ok(());
    }

    let src_bpp = src_format.bytes_per_pixel();
    let dst_bpp = dst_format.bytes_per_pixel();
    for (input, output) in src.chunks_exact(src_bpp).zip(dst.chunks_exact_mut(dst_bpp)) {
        let rgba = load(input, src_format);
        store(&rgba, output, dst_format);
    }
    Ok(())
}

/// Convert into a newly allocated buffer.
pub fn convert_to_vec(
    src: &[u8],
    src_format: PixelFormat,
    dst_format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CodecError> {
    let len = dst_format
        .buffer_size(width, height)
        .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
    let mut out = vec![0u8; len];
    convert(src, src_format, &mut out, dst_format, width, height)?;
    Ok(out)
}

fn required(format: PixelFormat, width: u32, height: u32, actual: usize) -> Result<usize, CodecError> {
    let required = format
        .buffer_size(width, height)
        .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
    if actual < required {
        return Err(CodecError::BufferTooSmall { required, actual });
    }
    Ok(required)
}

fn read_sample(bytes: &[u8], sample: (BitDepth, NumericKind), index: usize) -> f32 {
    match sample {
        (BitDepth::Eight, _) => f32::from(bytes[index]) / 255.0,
        (BitDepth::Sixteen, NumericKind::Integer) => {
            let at = index * 2;
            f32::from(u16::from_ne_bytes([bytes[at], bytes[at + 1]])) / 65535.0
        }
        (BitDepth::Sixteen, NumericKind::Float) => {
            let at = index * 2;
            f16::from_ne_bytes([bytes[at], bytes[at + 1]]).to_f32()
        }
        (BitDepth::ThirtyTwo, _) => {
            let at = index * 4;
            f32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        }
    }
}

fn write_sample(bytes: &mut [u8], sample: (BitDepth, NumericKind), index: usize, value: f32) {
    match sample {
        (BitDepth::Eight, _) => bytes[index] = quantize(value, 255.0) as u8,
        (BitDepth::Sixteen, NumericKind::Integer) => {
            let at = index * 2;
            let v = quantize(value, 65535.0) as u16;
            bytes[at..at + 2].copy_from_slice(&v.to_ne_bytes());
        }
        (BitDepth::Sixteen, NumericKind::Float) => {
            let at = index * 2;
            bytes[at..at + 2].copy_from_slice(&f16::from_f32(value).to_ne_bytes());
        }
        (BitDepth::ThirtyTwo, _) => {
            let at = index * 4;
            bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }
}

/// Scale a float sample to an integer range. NaN maps to zero.
fn quantize(value: f32, max: f32) -> u32 {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    (v * max).round() as u32
}

fn load(pixel: &[u8], format: PixelFormat) -> [f32; 4] {
    let sample = (format.bit_depth(), format.numeric_kind());
    let s = |i| read_sample(pixel, sample, i);
    match format.layout() {
        ChannelLayout::R => {
            let r = s(0);
            [r, r, r, 1.0]
        }
        ChannelLayout::Rg => [s(0), s(1), 0.0, 1.0],
        ChannelLayout::Rgb => [s(0), s(1), s(2), 1.0],
        ChannelLayout::Rgba => [s(0), s(1), s(2), s(3)],
    }
}

fn store(rgba: &[f32; 4], pixel: &mut [u8], format: PixelFormat) {
    let sample = (format.bit_depth(), format.numeric_kind());
    for (i, &value) in rgba.iter().take(format.num_channels()).enumerate() {
        write_sample(pixel, sample, i, value);
    }
}
