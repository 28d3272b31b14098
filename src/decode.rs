//! Image decoding sessions.

use crate::convert;
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::info::ImageInfo;
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::registry::{self, CodecRegistry};
use crate::session::SessionResource;
use crate::stream::{ByteStream, StreamReader};

/// Where a decode session is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Header parsed; ready to decode.
    Opened,
    /// A decode call is running.
    Decoding,
    /// Released; every further operation fails with [`CodecError::UseAfterClose`].
    Closed,
}

/// How to reach a pixel format other than the file's native one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversionPath {
    /// The codec's own conversion when it offers one for the target,
    /// otherwise [`Utility`](Self::Utility).
    #[default]
    Auto,
    /// Only the codec's own conversion.
    Codec,
    /// Decode natively, then run the [`convert`](crate::convert) utility.
    Utility,
}

/// Which path a decode actually took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodedVia {
    /// The target was the native format.
    Native,
    Codec,
    Utility,
}

/// Decode session builder.
///
/// # Example
///
/// ```no_run
/// use imgstream::{Limits, OpenOptions, PixelFormat};
/// use imgstream::stream::SliceStream;
///
/// let data: &[u8] = &[]; // your image bytes
/// let limits = Limits::none().with_max_pixels(16_000_000);
/// let mut session = OpenOptions::new()
///     .with_limits(&limits)
///     .open(SliceStream::new(data))?;
/// let mut pixels = vec![0u8; session.required_buffer_size(Some(PixelFormat::Rgba8U))?];
/// session.decode_as(&mut pixels, PixelFormat::Rgba8U)?;
/// session.close();
/// # Ok::<(), imgstream::CodecError>(())
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions<'a> {
    format: Option<FileFormat>,
    limits: Option<&'a Limits>,
    registry: Option<&'a CodecRegistry>,
}

impl<'a> OpenOptions<'a> {
    /// Detect the format from the stream, no limits, global registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip detection and parse the stream as `format`.
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Limits checked against header dimensions and scratch buffers.
    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Use `registry` instead of [`CodecRegistry::global`].
    pub fn with_registry(mut self, registry: &'a CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Open a session over the image at the stream's current position.
    ///
    /// Pass `&mut stream` to keep ownership of the stream; pass it by value
    /// to have the session release it on close. On failure an owned stream
    /// is dropped.
    pub fn open<S: ByteStream>(&self, mut stream: S) -> Result<DecodeSession<S>, CodecError> {
        stream.capabilities().require_decode()?;
        let registry = self.registry.unwrap_or_else(|| CodecRegistry::global());
        let origin = stream.tell().map_err(CodecError::StreamRead)?;

        let format = match self.format {
            Some(format) => format,
            None => registry
                .detect(&mut stream)?
                .ok_or(CodecError::UnsupportedFormat(None))?,
        };
        let codec = registry.require(format)?;

        let context = {
            let mut reader = StreamReader::with_origin(&mut stream, origin);
            codec.open(&mut reader)?
        };
        let info = context.info();
        if info.width == 0 || info.height == 0 {
            return Err(CodecError::corrupt(format, "zero image dimensions"));
        }
        let limits = self.limits.cloned().unwrap_or_default();
        limits.check_dimensions(info.width, info.height)?;

        log::debug!(
            "open: {format} {}x{} {:?}, profile {:?} ({} bytes)",
            info.width,
            info.height,
            info.pixel_format,
            info.profile_name,
            info.colour_profile.len()
        );
        Ok(DecodeSession {
            resource: SessionResource::new(stream, context),
            origin,
            state: SessionState::Opened,
            limits,
        })
    }
}

/// Open a session with default options.
pub fn open<S: ByteStream>(stream: S) -> Result<DecodeSession<S>, CodecError> {
    OpenOptions::new().open(stream)
}

/// One open image.
///
/// Metadata is parsed eagerly at open; pixels are decoded only on request
/// and every decode re-reads the stream from where the image starts, so
/// repeated decodes give identical bytes. A session is not meant to be
/// shared between threads; separate sessions are independent.
pub struct DecodeSession<S> {
    resource: SessionResource<S>,
    origin: u64,
    state: SessionState,
    limits: Limits,
}

impl<S: ByteStream> DecodeSession<S> {
    pub fn info(&self) -> Result<&ImageInfo, CodecError> {
        Ok(self.resource.context()?.info())
    }

    pub fn format(&self) -> Result<FileFormat, CodecError> {
        Ok(self.info()?.file_format)
    }

    pub fn state(&self) -> SessionState {
        if self.resource.is_released() {
            SessionState::Closed
        } else {
            self.state
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Bytes needed to decode into `format`, or the native format for `None`.
    pub fn required_buffer_size(&self, format: Option<PixelFormat>) -> Result<usize, CodecError> {
        let info = self.info()?;
        info.buffer_size(format.unwrap_or(info.pixel_format))
    }

    /// Decode in the native pixel format.
    pub fn decode(&mut self, dest: &mut [u8]) -> Result<(), CodecError> {
        let native = self.info()?.pixel_format;
        self.decode_with(dest, native, ConversionPath::Auto)
            .map(|_| ())
    }

    /// Decode into `format`, converting if it differs from the native format.
    pub fn decode_as(&mut self, dest: &mut [u8], format: PixelFormat) -> Result<DecodedVia, CodecError> {
        self.decode_with(dest, format, ConversionPath::Auto)
    }

    /// Decode into `format` along an explicit conversion path.
    ///
    /// `dest` must hold at least
    /// [`required_buffer_size(Some(format))`](Self::required_buffer_size)
    /// bytes; nothing is written if it does not. Only that prefix is written.
    /// On error the written prefix holds no valid image.
    pub fn decode_with(
        &mut self,
        dest: &mut [u8],
        format: PixelFormat,
        path: ConversionPath,
    ) -> Result<DecodedVia, CodecError> {
        let (width, height, native, file_format, native_ok) = {
            let context = self.resource.context()?;
            let info = context.info();
            (
                info.width,
                info.height,
                info.pixel_format,
                info.file_format,
                context.can_decode_as(format),
            )
        };

        let required = format
            .buffer_size(width, height)
            .ok_or(CodecError::LimitExceeded("image dimensions overflow"))?;
        if dest.len() < required {
            return Err(CodecError::BufferTooSmall {
                required,
                actual: dest.len(),
            });
        }
        let dest = &mut dest[..required];

        let via = if format == native {
            DecodedVia::Native
        } else {
            match path {
                ConversionPath::Auto if native_ok => DecodedVia::Codec,
                ConversionPath::Auto | ConversionPath::Utility => DecodedVia::Utility,
                ConversionPath::Codec if native_ok => DecodedVia::Codec,
                ConversionPath::Codec => {
                    return Err(CodecError::UnsupportedConversion {
                        format: file_format,
                        from: native,
                        to: format,
                    });
                }
            }
        };

        self.state = SessionState::Decoding;
        let result = self.run(dest, format, via);
        self.state = SessionState::Opened;

        match &result {
            Ok(()) => log::debug!("decode: {file_format} {native:?} -> {format:?} via {via:?}"),
            Err(e) => log::debug!("decode: {file_format} failed: {e}"),
        }
        result.map(|()| via)
    }

    fn run(&mut self, dest: &mut [u8], format: PixelFormat, via: DecodedVia) -> Result<(), CodecError> {
        let origin = self.origin;
        let limits = &self.limits;
        let (stream, context) = self.resource.parts()?;
        registry::origin_seek(&mut *stream, origin)?;
        let mut reader = StreamReader::with_origin(stream, origin);

        match via {
            DecodedVia::Native => context.decode(&mut reader, dest, limits),
            DecodedVia::Codec => context.decode_as(&mut reader, dest, format, limits),
            DecodedVia::Utility => {
                let info = context.info();
                let (width, height, native) = (info.width, info.height, info.pixel_format);
                let len = info.buffer_size(native)?;
                limits.check_memory(len)?;
                let mut scratch = vec![0u8; len];
                context.decode(&mut reader, &mut scratch, limits)?;
                convert::convert(&scratch, native, dest, format, width, height)
            }
        }
    }

    /// Release the codec context and the stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        if !self.resource.is_released() {
            log::debug!("close: releasing session");
        }
        self.resource.release();
        self.state = SessionState::Closed;
    }

    /// Close the session and return the stream, or `None` if already closed.
    pub fn into_stream(mut self) -> Option<S> {
        self.state = SessionState::Closed;
        self.resource.take_stream()
    }
}
