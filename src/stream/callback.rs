//! Stream assembled from caller-supplied closures.

use std::io;

use super::{ByteStream, StreamCapabilities, Whence, unsupported};

type ReadFn<'a> = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send + 'a>;
type WriteFn<'a> = Box<dyn FnMut(&[u8]) -> io::Result<usize> + Send + 'a>;
type TellFn<'a> = Box<dyn FnMut() -> io::Result<u64> + Send + 'a>;
type SeekFn<'a> = Box<dyn FnMut(i64, Whence) -> io::Result<u64> + Send + 'a>;

/// A [`ByteStream`] whose operations are closures.
///
/// Capabilities follow from which closures are set: readable with a read
/// closure, writable with a write closure, seekable only with both tell and
/// seek closures.
///
/// ```
/// use imgstream::stream::{ByteStream, CallbackStream};
///
/// let mut sink = Vec::new();
/// let mut stream = CallbackStream::new().on_write(|buf| {
///     sink.extend_from_slice(buf);
///     Ok(buf.len())
/// });
/// assert!(stream.capabilities().writable);
/// assert!(!stream.capabilities().seekable);
/// stream.write(b"abc").unwrap();
/// drop(stream);
/// assert_eq!(sink, b"abc");
/// ```
#[derive(Default)]
pub struct CallbackStream<'a> {
    read: Option<ReadFn<'a>>,
    write: Option<WriteFn<'a>>,
    tell: Option<TellFn<'a>>,
    seek: Option<SeekFn<'a>>,
}

impl<'a> CallbackStream<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_read(mut self, f: impl FnMut(&mut [u8]) -> io::Result<usize> + Send + 'a) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    pub fn on_write(mut self, f: impl FnMut(&[u8]) -> io::Result<usize> + Send + 'a) -> Self {
        self.write = Some(Box::new(f));
        self
    }

    pub fn on_tell(mut self, f: impl FnMut() -> io::Result<u64> + Send + 'a) -> Self {
        self.tell = Some(Box::new(f));
        self
    }

    pub fn on_seek(mut self, f: impl FnMut(i64, Whence) -> io::Result<u64> + Send + 'a) -> Self {
        self.seek = Some(Box::new(f));
        self
    }
}

impl ByteStream for CallbackStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.read {
            Some(f) => f(buf),
            None => Err(unsupported("no read callback")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.write {
            Some(f) => f(buf),
            None => Err(unsupported("no write callback")),
        }
    }

    fn tell(&mut self) -> io::Result<u64> {
        match &mut self.tell {
            Some(f) => f(),
            None => Err(unsupported("no tell callback")),
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        match &mut self.seek {
            Some(f) => f(offset, whence),
            None => Err(unsupported("no seek callback")),
        }
    }

    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities {
            readable: self.read.is_some(),
            writable: self.write.is_some(),
            seekable: self.tell.is_some() && self.seek.is_some(),
        }
    }
}

impl std::fmt::Debug for CallbackStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackStream")
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
