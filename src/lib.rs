//! # imgstream
//!
//! Image decode/encode engine over caller-supplied seekable byte streams.
//!
//! Codecs are feature-gated. Enable only what you need:
//!
//! ```toml
//! [dependencies]
//! imgstream = { version = "0.1", default-features = false, features = ["png", "jpeg"] }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use imgstream::{EncodeRequest, FileFormat, PixelFormat};
//! use imgstream::stream::{MemoryStream, SliceStream};
//!
//! // Open, inspect, decode
//! let data: &[u8] = &[]; // your image bytes
//! let mut session = imgstream::open(SliceStream::new(data))?;
//! let info = session.info()?.clone();
//! let mut pixels = vec![0u8; session.required_buffer_size(Some(PixelFormat::Rgb8U))?];
//! session.decode_as(&mut pixels, PixelFormat::Rgb8U)?;
//! session.close();
//!
//! // Re-encode, carrying the colour profile along
//! let mut out = MemoryStream::new();
//! EncodeRequest::new(FileFormat::Png)
//!     .with_colour_profile(&info.profile_name, &info.colour_profile)
//!     .encode(&pixels, info.width, info.height, PixelFormat::Rgb8U, &mut out)?;
//! # Ok::<(), imgstream::CodecError>(())
//! ```

#![forbid(unsafe_code)]

pub mod codecs;
mod config;
pub mod convert;
mod decode;
mod encode;
mod error;
mod format;
mod info;
mod limits;
mod pixel;
mod registry;
mod session;
pub mod stream;

pub use codecs::{Codec, DecoderContext, EncodeJob};
pub use config::{
    ChromaSubsampling, EncodeOptions, ExrCompression, ExrOptions, HdrOptions, JpegOptions, PngFilter,
    PngOptions, TgaOptions,
};
pub use decode::{ConversionPath, DecodeSession, DecodedVia, OpenOptions, SessionState, open};
pub use encode::{EncodeOutput, EncodeRequest, write_image};
pub use error::{CodecError, ErrorCategory};
pub use format::FileFormat;
pub use info::{DEFAULT_PROFILE_NAME, ImageInfo, MAX_PROFILE_NAME_LEN, resolve_profile_name};
pub use limits::Limits;
pub use pixel::{BitDepth, ChannelLayout, NumericKind, PixelFormat};
pub use registry::CodecRegistry;
pub use stream::{ByteStream, StreamCapabilities, Whence};

/// Identify the image at the stream's current position with the global
/// registry. The position is left unchanged.
pub fn detect(stream: &mut dyn ByteStream) -> Result<Option<FileFormat>, CodecError> {
    CodecRegistry::global().detect(stream)
}

/// Whether `pixel_format` can be written to `format` without conversion.
///
/// # Panics
///
/// If `format`'s codec is not compiled in.
pub fn is_format_supported(format: FileFormat, pixel_format: PixelFormat) -> bool {
    CodecRegistry::global().is_supported(format, pixel_format)
}

/// The pixel format [`write_image`] will store for `input` pixels when
/// `output` is requested.
///
/// # Panics
///
/// If `format`'s codec is not compiled in.
pub fn what_format_will_be_written(
    format: FileFormat,
    input: PixelFormat,
    output: PixelFormat,
) -> PixelFormat {
    CodecRegistry::global().resulting_pixel_format(format, input, output)
}

/// `format` with its bit depth replaced. Float formats stay float at 16 bits;
/// 8-bit formats are integer and 32-bit formats float.
pub fn change_bit_depth(format: PixelFormat, depth: BitDepth) -> PixelFormat {
    format.change_bit_depth(depth)
}

pub fn bit_depth(format: PixelFormat) -> BitDepth {
    format.bit_depth()
}
