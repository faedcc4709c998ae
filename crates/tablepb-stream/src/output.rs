use crate::error::{Result, StreamError};
use crate::traits::Sink;

const PAD_CHUNK_SIZE: usize = 32;

/// A forward-only writer over a [`Sink`], bounded by `max_size`.
///
/// A stream created with [`OutputStream::sizing`] has no sink: it only
/// counts the bytes that would have been written and ignores `max_size`.
/// The encoder uses this to measure submessages before emitting their
/// length prefix.
pub struct OutputStream<'a> {
    sink: Option<&'a mut dyn Sink>,
    max_size: usize,
    bytes_written: usize,
}

impl<'a> OutputStream<'a> {
    /// Create a stream that writes at most `max_size` bytes to `sink`.
    pub fn new(sink: &'a mut dyn Sink, max_size: usize) -> Self {
        Self {
            sink: Some(sink),
            max_size,
            bytes_written: 0,
        }
    }

    /// Create a stream without a size limit.
    pub fn unbounded(sink: &'a mut dyn Sink) -> Self {
        Self::new(sink, usize::MAX)
    }

    /// Create a stream over a fixed buffer, bounded by its length.
    pub fn from_slice<'b: 'a>(buf: &'a mut &'b mut [u8]) -> Self {
        let max_size = buf.len();
        Self::new(buf, max_size)
    }

    /// Create a sizing stream that counts bytes without writing them.
    pub fn sizing() -> Self {
        Self {
            sink: None,
            max_size: usize::MAX,
            bytes_written: 0,
        }
    }

    /// Whether this stream only counts bytes.
    pub fn is_sizing(&self) -> bool {
        self.sink.is_none()
    }

    /// Total bytes written (or counted) so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Configured size limit.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes that can still be written before the limit is reached.
    pub fn remaining(&self) -> usize {
        self.max_size.saturating_sub(self.bytes_written)
    }

    /// Write all of `buf`.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let remaining = self.remaining();
        if let Some(sink) = self.sink.as_mut() {
            if buf.len() > remaining {
                return Err(StreamError::LimitExceeded {
                    requested: buf.len(),
                    remaining,
                });
            }
            sink.write(buf)?;
        }
        self.bytes_written += buf.len();
        Ok(())
    }

    /// Account for `count` bytes without supplying them.
    ///
    /// A sizing stream only bumps its counter; a writing stream emits zero
    /// padding.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        if self.is_sizing() {
            self.bytes_written += count;
            return Ok(());
        }
        let zeros = [0u8; PAD_CHUNK_SIZE];
        let mut left = count;
        while left > 0 {
            let chunk = left.min(PAD_CHUNK_SIZE);
            self.write(&zeros[..chunk])?;
            left -= chunk;
        }
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }

    /// Run `f` over a sub-stream limited to the next `len` bytes.
    ///
    /// The sub-stream shares this stream's sink (or is a sizing stream when
    /// this one is). Whatever `f` writes is charged to this stream
    /// afterwards, whether `f` succeeds or not.
    pub fn with_substream<T, E, F>(&mut self, len: usize, f: F) -> std::result::Result<T, E>
    where
        E: From<StreamError>,
        F: FnOnce(&mut OutputStream<'_>) -> std::result::Result<T, E>,
    {
        if !self.is_sizing() && len > self.remaining() {
            return Err(StreamError::LimitExceeded {
                requested: len,
                remaining: self.remaining(),
            }
            .into());
        }

        let mut sub = match self.sink.as_mut() {
            Some(sink) => {
                let sink: &mut dyn Sink = &mut **sink;
                OutputStream::new(sink, len)
            }
            None => OutputStream::sizing(),
        };
        let result = f(&mut sub);
        let written = sub.bytes_written;
        self.bytes_written += written;
        result
    }
}

impl std::fmt::Debug for OutputStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("sizing", &self.is_sizing())
            .field("max_size", &self.max_size)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}
