//! Unified error types for codec operations.

use std::io;

use crate::format::FileFormat;
use crate::pixel::PixelFormat;

/// Unified error type for stream, decode and encode operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The stream lacks a capability the operation needs.
    #[error("unusable stream: {0}")]
    UnusableStream(&'static str),
    /// The stream had no bytes at the current position.
    #[error("input stream is empty")]
    EmptyInput,
    /// `None` when no registered codec recognized the content; `Some` when the
    /// format is known but has no codec in the registry.
    #[error("{}", unsupported_message(.0))]
    UnsupportedFormat(Option<FileFormat>),
    /// Header or pixel data could not be parsed.
    #[error("corrupt {format} data: {detail}")]
    CorruptImage { format: FileFormat, detail: String },
    /// A pixel buffer is smaller than the image it should hold.
    ///
    /// Encoding an image with zero width or height also fails here: such an
    /// image describes no pixel data, so `actual` is 0 and `required` is the
    /// size once every zero dimension is raised to one.
    #[error("buffer too small: {required} bytes required, {actual} provided")]
    BufferTooSmall { required: usize, actual: usize },
    /// The codec cannot produce the requested pixel format natively.
    #[error("{format} codec cannot convert {from:?} to {to:?}")]
    UnsupportedConversion {
        format: FileFormat,
        from: PixelFormat,
        to: PixelFormat,
    },
    /// Writing to or seeking the destination stream failed during encode.
    #[error("writing {format} output failed: {source}")]
    EncodeIoFailure {
        format: FileFormat,
        #[source]
        source: io::Error,
    },
    /// Reading or seeking the source stream failed.
    #[error("stream read failed: {0}")]
    StreamRead(#[source] io::Error),
    /// The session was already closed.
    #[error("session has been closed")]
    UseAfterClose,
    /// Encode options are out of range or belong to another format.
    #[error("invalid encode options for {format}: {detail}")]
    InvalidEncodeOptions { format: FileFormat, detail: String },
    /// Input validation failed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource limit exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Underlying codec error.
    #[error("codec error ({format}): {source}")]
    Codec {
        format: FileFormat,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn unsupported_message(format: &Option<FileFormat>) -> String {
    match format {
        Some(format) => format!("format {format} has no registered codec"),
        None => "unrecognized image format".to_owned(),
    }
}

/// Coarse error classes, for callers that only need to know who is at fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller passed something invalid.
    InvalidInput,
    /// The file content is malformed.
    CorruptData,
    /// The stream itself failed.
    Stream,
    /// The operation or format is not available.
    Unsupported,
    /// The session was misused.
    Lifecycle,
}

impl CodecError {
    /// Wrap a codec-specific error.
    pub fn from_codec<E>(format: FileFormat, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CodecError::Codec {
            format,
            source: Box::new(error),
        }
    }

    pub(crate) fn corrupt(format: FileFormat, detail: impl Into<String>) -> Self {
        CodecError::CorruptImage {
            format,
            detail: detail.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CodecError::UnusableStream(_)
            | CodecError::BufferTooSmall { .. }
            | CodecError::InvalidEncodeOptions { .. }
            | CodecError::InvalidInput(_)
            | CodecError::LimitExceeded(_) => ErrorCategory::InvalidInput,
            CodecError::EmptyInput | CodecError::CorruptImage { .. } | CodecError::Codec { .. } => {
                ErrorCategory::CorruptData
            }
            CodecError::EncodeIoFailure { .. } | CodecError::StreamRead(_) => ErrorCategory::Stream,
            CodecError::UnsupportedFormat(_) | CodecError::UnsupportedConversion { .. } => {
                ErrorCategory::Unsupported
            }
            CodecError::UseAfterClose => ErrorCategory::Lifecycle,
        }
    }
}
