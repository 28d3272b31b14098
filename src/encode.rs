//! Image encoding.

use std::borrow::Cow;

use crate::codecs::EncodeJob;
use crate::config::EncodeOptions;
use crate::convert;
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::{resolve_profile_name, validate_profile_name};
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::registry::CodecRegistry;
use crate::stream::{ByteStream, StreamWriter};

/// What an encode produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOutput {
    pub file_format: FileFormat,
    /// The pixel format actually stored; may differ from the one requested.
    pub pixel_format: PixelFormat,
    pub bytes_written: u64,
    /// Whether the colour profile was embedded.
    pub profile_written: bool,
}

/// Image encode request builder.
///
/// # Example
///
/// ```no_run
/// use imgstream::{EncodeRequest, FileFormat, PixelFormat, PngOptions};
/// use imgstream::stream::MemoryStream;
///
/// let pixels = vec![0u8; 64 * 64 * 4];
/// let mut out = MemoryStream::new();
/// let written = EncodeRequest::new(FileFormat::Png)
///     .with_options(PngOptions::default().with_compression_level(9))
///     .encode(&pixels, 64, 64, PixelFormat::Rgba8U, &mut out)?;
/// assert_eq!(written.pixel_format, PixelFormat::Rgba8U);
/// # Ok::<(), imgstream::CodecError>(())
/// ```
#[derive(Clone, Copy, Debug)]
pub struct EncodeRequest<'a> {
    format: FileFormat,
    output_format: Option<PixelFormat>,
    profile_name: &'a str,
    colour_profile: Option<&'a [u8]>,
    options: Option<EncodeOptions>,
    registry: Option<&'a CodecRegistry>,
    limits: Option<&'a Limits>,
}

impl<'a> EncodeRequest<'a> {
    /// Encode to `format` with its default options, storing the input pixel
    /// format when possible.
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            output_format: None,
            profile_name: "",
            colour_profile: None,
            options: None,
            registry: None,
            limits: None,
        }
    }

    /// Pixel format to store. The codec may normalize it; see
    /// [`EncodeOutput::pixel_format`].
    pub fn with_output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Embed a colour profile. An empty `name` is stored as
    /// [`DEFAULT_PROFILE_NAME`](crate::DEFAULT_PROFILE_NAME); empty `data`
    /// means no profile.
    pub fn with_colour_profile(mut self, name: &'a str, data: &'a [u8]) -> Self {
        self.profile_name = name;
        self.colour_profile = Some(data);
        self
    }

    pub fn with_options(mut self, options: impl Into<EncodeOptions>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Use `registry` instead of [`CodecRegistry::global`].
    pub fn with_registry(mut self, registry: &'a CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Encode `width` x `height` tightly packed `input` pixels to `stream`.
    ///
    /// On failure the stream may hold a partial file and should be discarded.
    pub fn encode<S: ByteStream>(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        input: PixelFormat,
        mut stream: S,
    ) -> Result<EncodeOutput, CodecError> {
        stream.capabilities().require_encode()?;
        if width == 0 || height == 0 {
            let required = input
                .buffer_size(width.max(1), height.max(1))
                .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
            return Err(CodecError::BufferTooSmall { required, actual: 0 });
        }
        let default_limits = Limits::none();
        let limits = self.limits.unwrap_or(&default_limits);
        limits.check_dimensions(width, height)?;

        let required = input
            .buffer_size(width, height)
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
        if pixels.len() < required {
            return Err(CodecError::BufferTooSmall {
                required,
                actual: pixels.len(),
            });
        }
        let pixels = &pixels[..required];

        let profile_name = resolve_profile_name(self.profile_name);
        validate_profile_name(profile_name)?;

        let registry = self.registry.unwrap_or_else(|| CodecRegistry::global());
        let codec = registry.require(self.format)?;
        let options = self.options.unwrap_or_else(|| codec.default_options());
        codec.validate_options(&options)?;

        let written = codec.resulting_pixel_format(input, self.output_format.unwrap_or(input));
        let data = if written == input {
            Cow::Borrowed(pixels)
        } else {
            let len = written
                .buffer_size(width, height)
                .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
            limits.check_memory(len)?;
            Cow::Owned(convert::convert_to_vec(pixels, input, written, width, height)?)
        };
        if input.has_alpha() && !written.has_alpha() {
            log::warn!("encode: {} cannot store alpha; discarding it", self.format);
        }

        let profile = self.colour_profile.filter(|p| !p.is_empty());
        let colour_profile = profile.filter(|_| codec.keeps_profile(input, written));
        if profile.is_some() && colour_profile.is_none() {
            log::warn!(
                "encode: colour profile not stored in {} as {written:?}",
                self.format
            );
        }

        let job = EncodeJob {
            pixels: &data,
            width,
            height,
            pixel_format: written,
            source_format: input,
            profile_name,
            colour_profile,
            options: &options,
        };
        let mut writer = StreamWriter::new(&mut stream);
        codec.encode(&job, &mut writer)?;
        let bytes_written = writer.bytes_written();

        log::debug!(
            "encode: {} {width}x{height} {input:?} -> {written:?}, {bytes_written} bytes",
            self.format
        );
        Ok(EncodeOutput {
            file_format: self.format,
            pixel_format: written,
            bytes_written,
            profile_written: colour_profile.is_some(),
        })
    }
}

/// Encode in one call. `options` of `None` uses the format's defaults.
#[allow(clippy::too_many_arguments)]
pub fn write_image<S: ByteStream>(
    format: FileFormat,
    pixels: &[u8],
    width: u32,
    height: u32,
    input: PixelFormat,
    output: PixelFormat,
    profile_name: &str,
    colour_profile: &[u8],
    stream: S,
    options: Option<EncodeOptions>,
) -> Result<EncodeOutput, CodecError> {
    let mut request = EncodeRequest::new(format)
        .with_output_format(output)
        .with_colour_profile(profile_name, colour_profile);
    if let Some(options) = options {
        request = request.with_options(options);
    }
    request.encode(pixels, width, height, input, stream)
}
