//! Codec plugin interface and the built-in codecs.
//!
//! A [`Codec`] describes one file format: how to recognize it, which pixel
//! formats it can store, how to open a decoder over a stream, and how to
//! write an image. The engine owns validation, conversion and error mapping;
//! codecs only speak their container.

use crate::config::EncodeOptions;
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::ImageInfo;
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::stream::{StreamReader, StreamWriter};

#[cfg(feature = "png")]
pub(crate) mod png;

#[cfg(feature = "jpeg")]
pub(crate) mod jpeg;

#[cfg(feature = "hdr")]
pub(crate) mod hdr;

#[cfg(feature = "tga")]
pub(crate) mod tga;

#[cfg(feature = "exr")]
pub(crate) mod exr;

/// One file format's implementation.
pub trait Codec: Send + Sync {
    fn format(&self) -> FileFormat;

    /// Bytes of file header needed by [`matches_signature`](Self::matches_signature).
    fn signature_len(&self) -> usize;

    /// Whether `header` starts a file of this format. `header` may be shorter
    /// than [`signature_len`](Self::signature_len) for tiny streams.
    fn matches_signature(&self, header: &[u8]) -> bool;

    /// Whether images in `format` can be written without conversion.
    fn is_supported(&self, format: PixelFormat) -> bool;

    /// The pixel format that will actually be written when `input` pixels are
    /// encoded and `requested` was asked for. Always a supported format.
    fn resulting_pixel_format(&self, input: PixelFormat, requested: PixelFormat) -> PixelFormat;

    /// Parse the header at the reader's current position.
    fn open(&self, reader: &mut StreamReader<'_>) -> Result<Box<dyn DecoderContext>, CodecError>;

    /// Write `job` to the stream.
    fn encode(&self, job: &EncodeJob<'_>, writer: &mut StreamWriter<'_>) -> Result<(), CodecError>;

    fn default_options(&self) -> EncodeOptions {
        EncodeOptions::default_for(self.format())
    }

    fn validate_options(&self, options: &EncodeOptions) -> Result<(), CodecError> {
        options.validate_for(self.format())
    }

    /// Whether a colour profile describing `source` pixels still applies once
    /// they are stored as `written`.
    fn keeps_profile(&self, source: PixelFormat, written: PixelFormat) -> bool {
        self.format().supports_colour_profile() && source.num_channels() == written.num_channels()
    }
}

/// Per-session decoder state created by [`Codec::open`].
///
/// Before every decode call the engine seeks the stream back to the position
/// it had when the session was opened, so each call parses from the start of
/// the file and repeated decodes produce identical output.
pub trait DecoderContext: Send {
    fn info(&self) -> &ImageInfo;

    /// Decode into `dest`, which holds exactly one image in
    /// `info().pixel_format`. On error the contents of `dest` are unspecified.
    ///
    /// Any scratch buffer the codec allocates for the whole frame must first
    /// pass [`Limits::check_memory`].
    fn decode(&mut self, reader: &mut StreamReader<'_>, dest: &mut [u8], limits: &Limits) -> Result<(), CodecError>;

    /// Whether the codec can produce `format` directly.
    fn can_decode_as(&self, _format: PixelFormat) -> bool {
        false
    }

    /// Decode straight into `format`. Only called when
    /// [`can_decode_as`](Self::can_decode_as) returned true.
    fn decode_as(
        &mut self,
        _reader: &mut StreamReader<'_>,
        _dest: &mut [u8],
        format: PixelFormat,
        _limits: &Limits,
    ) -> Result<(), CodecError> {
        let info = self.info();
        Err(CodecError::UnsupportedConversion {
            format: info.file_format,
            from: info.pixel_format,
            to: format,
        })
    }

    /// Free codec resources. Called exactly once when the session closes.
    fn release(&mut self) {}
}

/// A validated image handed to [`Codec::encode`].
#[derive(Debug)]
#[non_exhaustive]
pub struct EncodeJob<'a> {
    /// Tightly packed pixels in `pixel_format`.
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// A format the codec reported as supported.
    pub pixel_format: PixelFormat,
    /// Pixel format the caller supplied, before conversion.
    pub source_format: PixelFormat,
    /// Never empty.
    pub profile_name: &'a str,
    /// `None` when there is no profile or it no longer applies.
    pub colour_profile: Option<&'a [u8]>,
    /// Already validated for this codec's format.
    pub options: &'a EncodeOptions,
}

/// Built-in codecs in detection order. TGA has no magic number and is probed last.
pub(crate) fn builtin() -> Vec<Box<dyn Codec>> {
    #[allow(unused_mut)]
    let mut codecs: Vec<Box<dyn Codec>> = Vec::new();
    #[cfg(feature = "png")]
    codecs.push(Box::new(png::PngCodec));
    #[cfg(feature = "jpeg")]
    codecs.push(Box::new(jpeg::JpegCodec));
    #[cfg(feature = "hdr")]
    codecs.push(Box::new(hdr::HdrCodec));
    #[cfg(feature = "exr")]
    codecs.push(Box::new(exr::ExrCodec));
    #[cfg(feature = "tga")]
    codecs.push(Box::new(tga::TgaCodec));
    codecs
}

/// Fallback target for 8-bit-only formats: `input` at 8 bits if storable,
/// otherwise RGBA or RGB.
#[cfg(any(feature = "jpeg", feature = "tga"))]
pub(crate) fn nearest_8bit(input: PixelFormat, supported: &[PixelFormat]) -> PixelFormat {
    use crate::pixel::{BitDepth, ChannelLayout};

    let eight = input.change_bit_depth(BitDepth::Eight);
    if supported.contains(&eight) {
        return eight;
    }
    let widened = match input.layout() {
        ChannelLayout::Rgba => PixelFormat::Rgba8U,
        _ => PixelFormat::Rgb8U,
    };
    if supported.contains(&widened) {
        return widened;
    }
    PixelFormat::Rgb8U
}

/// Profile rule for colour containers: the profile survives as long as the
/// colour channels do, so adding or dropping alpha on RGB keeps it.
#[cfg(any(feature = "png", feature = "jpeg"))]
pub(crate) fn same_colour_channels(source: PixelFormat, written: PixelFormat) -> bool {
    let (from, to) = (source.num_channels(), written.num_channels());
    from == to || (from.min(to) == 3 && from.max(to) == 4)
}

/// Swap 16-bit samples between big-endian file order and native order.
#[cfg(any(feature = "png", feature = "jpeg"))]
pub(crate) fn swap_be16_in_place(samples: &mut [u8]) {
    if cfg!(target_endian = "little") {
        for pair in samples.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }
}
