//! Byte stream abstraction.
//!
//! Codecs never see the caller's stream type directly. The engine hands them a
//! [`StreamReader`] or [`StreamWriter`], thin `std::io` bridges over a
//! [`ByteStream`] that record the first underlying failure so the engine can
//! tell a broken stream apart from a broken file.

use std::io::{self, Read, Seek, SeekFrom, Write};

mod callback;
mod io_adapter;
mod memory;

pub use callback::CallbackStream;
pub use io_adapter::{ReadStream, WriteStream};
pub use memory::{MemoryStream, SliceStream};

use crate::error::CodecError;
use crate::format::FileFormat;

/// Reference point for [`ByteStream::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Begin,
    Current,
    End,
}

/// What a stream can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StreamCapabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

impl StreamCapabilities {
    pub const READ_SEEK: Self = Self {
        readable: true,
        writable: false,
        seekable: true,
    };
    pub const WRITE_SEEK: Self = Self {
        readable: false,
        writable: true,
        seekable: true,
    };
    pub const ALL: Self = Self {
        readable: true,
        writable: true,
        seekable: true,
    };

    /// Decoding needs read and seek.
    pub fn require_decode(self) -> Result<(), CodecError> {
        if !self.readable {
            return Err(CodecError::UnusableStream("stream is not readable"));
        }
        if !self.seekable {
            return Err(CodecError::UnusableStream("stream is not seekable"));
        }
        Ok(())
    }

    /// Encoding needs write and seek.
    pub fn require_encode(self) -> Result<(), CodecError> {
        if !self.writable {
            return Err(CodecError::UnusableStream("stream is not writable"));
        }
        if !self.seekable {
            return Err(CodecError::UnusableStream("stream is not seekable"));
        }
        Ok(())
    }
}

/// A byte source and/or sink supplied by the caller.
///
/// `read` returns the number of bytes read; `0` means end of stream.
/// `write` returns the number of bytes accepted. `seek` returns the new
/// absolute position. Operations outside [`capabilities`](Self::capabilities)
/// should fail with [`io::ErrorKind::Unsupported`].
pub trait ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn tell(&mut self) -> io::Result<u64>;
    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64>;
    fn capabilities(&self) -> StreamCapabilities;
}

impl<T: ByteStream + ?Sized> ByteStream for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
    fn tell(&mut self) -> io::Result<u64> {
        (**self).tell()
    }
    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        (**self).seek(offset, whence)
    }
    fn capabilities(&self) -> StreamCapabilities {
        (**self).capabilities()
    }
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
    fn tell(&mut self) -> io::Result<u64> {
        (**self).tell()
    }
    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        (**self).seek(offset, whence)
    }
    fn capabilities(&self) -> StreamCapabilities {
        (**self).capabilities()
    }
}

pub(crate) fn unsupported(op: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, op)
}

/// Resolve a seek request against a stream of known length.
pub(crate) fn resolve_seek(pos: u64, len: u64, offset: i64, whence: Whence) -> io::Result<u64> {
    let base = match whence {
        Whence::Begin => 0,
        Whence::Current => pos,
        Whence::End => len,
    };
    base.checked_add_signed(offset).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek to a negative or overflowing position",
        )
    })
}

fn from_seek_from(pos: SeekFrom) -> io::Result<(i64, Whence)> {
    match pos {
        SeekFrom::Start(offset) => {
            let offset = i64::try_from(offset)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek offset too large"))?;
            Ok((offset, Whence::Begin))
        }
        SeekFrom::Current(offset) => Ok((offset, Whence::Current)),
        SeekFrom::End(offset) => Ok((offset, Whence::End)),
    }
}

/// `std::io` reader over a [`ByteStream`], handed to decoders.
///
/// Reads pass straight through to the stream; nothing is buffered here.
/// Positions are relative to an origin, the offset where the image starts,
/// so `SeekFrom::Start(0)` always lands on the first byte of the file.
pub struct StreamReader<'a> {
    inner: &'a mut dyn ByteStream,
    origin: u64,
    failure: Option<io::Error>,
}

impl<'a> StreamReader<'a> {
    /// Reader whose origin is absolute position zero.
    pub fn new(inner: &'a mut dyn ByteStream) -> Self {
        Self::with_origin(inner, 0)
    }

    pub fn with_origin(inner: &'a mut dyn ByteStream, origin: u64) -> Self {
        Self {
            inner,
            origin,
            failure: None,
        }
    }

    fn relative(&self, absolute: u64) -> io::Result<u64> {
        absolute.checked_sub(self.origin).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of image")
        })
    }

    /// Whether the underlying stream has reported an error.
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn record<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result
            && self.failure.is_none()
            && e.kind() != io::ErrorKind::Interrupted
        {
            self.failure = Some(io::Error::new(e.kind(), e.to_string()));
        }
        result
    }

    /// Turn a codec failure into an engine error.
    ///
    /// If the stream failed first the stream error wins; otherwise the file is
    /// treated as corrupt.
    pub fn classify(&mut self, format: FileFormat, detail: impl std::fmt::Display) -> CodecError {
        match self.failure.take() {
            Some(e) => CodecError::StreamRead(e),
            None => CodecError::corrupt(format, detail.to_string()),
        }
    }
}

impl Read for StreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        self.record(result)
    }
}

impl Seek for StreamReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let pos = match pos {
            SeekFrom::Start(offset) => SeekFrom::Start(self.origin.checked_add(offset).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "seek offset too large")
            })?),
            other => other,
        };
        let (offset, whence) = from_seek_from(pos)?;
        let result = self.inner.seek(offset, whence);
        let absolute = self.record(result)?;
        self.relative(absolute)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        let result = self.inner.tell();
        let absolute = self.record(result)?;
        self.relative(absolute)
    }
}

/// `std::io` writer over a [`ByteStream`], handed to encoders.
pub struct StreamWriter<'a> {
    inner: &'a mut dyn ByteStream,
    failure: Option<io::Error>,
    written: u64,
}

impl<'a> StreamWriter<'a> {
    pub fn new(inner: &'a mut dyn ByteStream) -> Self {
        Self {
            inner,
            failure: None,
            written: 0,
        }
    }

    /// Bytes accepted by the stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn record<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result
            && self.failure.is_none()
            && e.kind() != io::ErrorKind::Interrupted
        {
            self.failure = Some(io::Error::new(e.kind(), e.to_string()));
        }
        result
    }

    /// Turn an encoder failure into an engine error.
    ///
    /// A recorded stream failure becomes [`CodecError::EncodeIoFailure`];
    /// anything else is reported as a codec error.
    pub fn classify<E>(&mut self, format: FileFormat, error: E) -> CodecError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.failure.take() {
            Some(source) => CodecError::EncodeIoFailure { format, source },
            None => CodecError::from_codec(format, error),
        }
    }

    /// Map a direct `std::io` failure from a hand-written encoder.
    pub fn io_failure(&mut self, format: FileFormat, error: io::Error) -> CodecError {
        CodecError::EncodeIoFailure {
            format,
            source: self.failure.take().unwrap_or(error),
        }
    }
}

impl Write for StreamWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        let n = self.record(result)?;
        if n == 0 && !buf.is_empty() {
            let e = io::Error::new(io::ErrorKind::WriteZero, "stream accepted no bytes");
            return self.record(Err(e));
        }
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for StreamWriter<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = from_seek_from(pos)?;
        let result = self.inner.seek(offset, whence);
        self.record(result)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        let result = self.inner.tell();
        self.record(result)
    }
}

/// Fill `buf` as far as the stream allows; returns bytes read.
pub(crate) fn read_up_to(stream: &mut dyn ByteStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
