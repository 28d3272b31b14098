//! In-memory streams.

use std::io;

use super::{ByteStream, StreamCapabilities, Whence, resolve_seek, unsupported};

/// Growable read/write stream over an owned `Vec<u8>`.
///
/// Writing past the end extends the buffer; seeking past the end and then
/// writing zero-fills the gap.
#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    pos: u64,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream over existing bytes, positioned at the start.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for MemoryStream {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

fn read_at(data: &[u8], pos: &mut u64, buf: &mut [u8]) -> usize {
    let start = usize::try_from(*pos).unwrap_or(usize::MAX).min(data.len());
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    *pos += n as u64;
    n
}

impl ByteStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_at(&self.data, &mut self.pos, buf))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "position beyond address space"))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "write overflows buffer"))?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.data.len() as u64, offset, whence)?;
        Ok(self.pos)
    }

    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::ALL
    }
}

/// Read-only stream over borrowed bytes.
#[derive(Clone, Debug)]
pub struct SliceStream<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> SliceStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteStream for SliceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_at(self.data, &mut self.pos, buf))
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("slice stream is read-only"))
    }

    fn tell(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        self.pos = resolve_seek(self.pos, self.data.len() as u64, offset, whence)?;
        Ok(self.pos)
    }

    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::READ_SEEK
    }
}
