//! Byte-stream collaborators.
//!
//! The graph never touches files. Raw frames come from a [`ByteSource`] and
//! filtered frames go to a [`ByteSink`]; adapters are provided for
//! `std::io` readers and writers, byte slices and `Vec<u8>`.

use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};

/// A supplier of raw frame bytes.
pub trait ByteSource {
    /// Fill `buf` completely.
    ///
    /// Fails with [`Error::ShortRead`] if the stream ends first; `got`
    /// reports how many bytes were placed at the front of `buf`.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// A consumer of filtered frame bytes.
pub trait ByteSink {
    /// Write all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// [`ByteSource`] over any [`std::io::Read`].
#[derive(Debug)]
pub struct ReadSource<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> ReadSource<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Total bytes delivered so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.bytes_read += filled as u64;

        if filled < buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len(),
                got: filled,
            });
        }
        Ok(())
    }
}

/// [`ByteSink`] over any [`std::io::Write`].
#[derive(Debug)]
pub struct WriteSink<W> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> WriteSink<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    /// Total bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteSink for WriteSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// A byte slice is consumed from the front.
impl ByteSource for &[u8] {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let data: &[u8] = *self;
        let n = buf.len().min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
        *self = &data[n..];
        if n < buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len(),
                got: n,
            });
        }
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}
