//! Runtime codec registry: format detection and per-format capabilities.

use std::fmt;
use std::sync::LazyLock;

use crate::codecs::{self, Codec};
use crate::error::CodecError;
use crate::format::FileFormat;
use crate::pixel::PixelFormat;
use crate::stream::{self, ByteStream, Whence};

static GLOBAL: LazyLock<CodecRegistry> = LazyLock::new(CodecRegistry::builtin);

/// Ordered set of codecs.
///
/// Compile-time features decide which built-in codecs exist; a registry
/// decides which are used. Detection tries codecs in registration order and
/// the first signature match wins.
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl CodecRegistry {
    /// Shared registry with every compiled-in codec.
    pub fn global() -> &'static CodecRegistry {
        &GLOBAL
    }

    /// Every compiled-in codec.
    pub fn builtin() -> Self {
        Self {
            codecs: codecs::builtin(),
        }
    }

    /// No codecs. Callers opt in with [`with_codec`](Self::with_codec).
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Register a codec, replacing any existing codec for the same format in
    /// place. New formats are appended and so detected last.
    pub fn with_codec(mut self, codec: Box<dyn Codec>) -> Self {
        match self.codecs.iter().position(|c| c.format() == codec.format()) {
            Some(i) => self.codecs[i] = codec,
            None => self.codecs.push(codec),
        }
        self
    }

    /// Remove the codec for `format`, if any.
    pub fn without(mut self, format: FileFormat) -> Self {
        self.codecs.retain(|c| c.format() != format);
        self
    }

    pub fn get(&self, format: FileFormat) -> Option<&dyn Codec> {
        self.codecs
            .iter()
            .find(|c| c.format() == format)
            .map(|c| c.as_ref())
    }

    /// The codec for `format`.
    ///
    /// # Panics
    ///
    /// If `format` is not registered. Use [`get`](Self::get) to check first.
    pub fn codec(&self, format: FileFormat) -> &dyn Codec {
        match self.get(format) {
            Some(codec) => codec,
            None => panic!("no codec registered for {format}"),
        }
    }

    pub(crate) fn require(&self, format: FileFormat) -> Result<&dyn Codec, CodecError> {
        self.get(format)
            .ok_or(CodecError::UnsupportedFormat(Some(format)))
    }

    /// Registered formats in detection order.
    pub fn formats(&self) -> impl Iterator<Item = FileFormat> + '_ {
        self.codecs.iter().map(|c| c.format())
    }

    pub fn contains(&self, format: FileFormat) -> bool {
        self.get(format).is_some()
    }

    /// Whether `pixel_format` can be written to `format` without conversion.
    ///
    /// # Panics
    ///
    /// If `format` is not registered.
    pub fn is_supported(&self, format: FileFormat, pixel_format: PixelFormat) -> bool {
        self.codec(format).is_supported(pixel_format)
    }

    /// The pixel format an encode of `input` pixels into `format` will write
    /// when `requested` is asked for. Performs no I/O.
    ///
    /// # Panics
    ///
    /// If `format` is not registered.
    pub fn resulting_pixel_format(
        &self,
        format: FileFormat,
        input: PixelFormat,
        requested: PixelFormat,
    ) -> PixelFormat {
        self.codec(format).resulting_pixel_format(input, requested)
    }

    /// Identify the format of the image at the stream's current position.
    ///
    /// The stream position is restored before returning, even on error.
    /// Returns `Ok(None)` when no registered codec recognizes the header.
    pub fn detect(&self, stream: &mut dyn ByteStream) -> Result<Option<FileFormat>, CodecError> {
        stream.capabilities().require_decode()?;
        let start = stream.tell().map_err(CodecError::StreamRead)?;

        let len = self
            .codecs
            .iter()
            .map(|c| c.signature_len())
            .max()
            .unwrap_or(0)
            .max(1);
        let mut header = vec![0u8; len];
        let read = stream::read_up_to(stream, &mut header);
        let restore = seek_to(stream, start);

        let read = read.map_err(CodecError::StreamRead)?;
        restore.map_err(CodecError::StreamRead)?;
        if read == 0 {
            return Err(CodecError::EmptyInput);
        }
        let header = &header[..read];

        let found = self
            .codecs
            .iter()
            .find(|c| c.matches_signature(header))
            .map(|c| c.format());
        log::trace!("detect: {read} header bytes -> {found:?}");
        Ok(found)
    }
}

fn seek_to(stream: &mut dyn ByteStream, position: u64) -> std::io::Result<u64> {
    let offset = i64::try_from(position).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "stream position too large")
    })?;
    stream.seek(offset, Whence::Begin)
}

pub(crate) fn origin_seek(stream: &mut dyn ByteStream, origin: u64) -> Result<(), CodecError> {
    seek_to(stream, origin)
        .map(|_| ())
        .map_err(CodecError::StreamRead)
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.formats()).finish()
    }
}
