//! Streams over `std::io` types such as `File`.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::{ByteStream, StreamCapabilities, Whence, unsupported};

fn to_seek_from(offset: i64, whence: Whence) -> io::Result<SeekFrom> {
    match whence {
        Whence::Begin => u64::try_from(offset)
            .map(SeekFrom::Start)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative absolute seek")),
        Whence::Current => Ok(SeekFrom::Current(offset)),
        Whence::End => Ok(SeekFrom::End(offset)),
    }
}

/// Readable, seekable stream over any `Read + Seek`.
#[derive(Debug)]
pub struct ReadStream<R> {
    inner: R,
}

impl<R: Read + Seek> ReadStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteStream for ReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("stream was opened for reading"))
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        self.inner.seek(to_seek_from(offset, whence)?)
    }

    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::READ_SEEK
    }
}

/// Writable, seekable stream over any `Write + Seek`.
#[derive(Debug)]
pub struct WriteStream<W> {
    inner: W,
}

impl<W: Write + Seek> WriteStream<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Flush and return the wrapped writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> ByteStream for WriteStream<W> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("stream was opened for writing"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        self.inner.seek(to_seek_from(offset, whence)?)
    }

    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::WRITE_SEEK
    }
}
