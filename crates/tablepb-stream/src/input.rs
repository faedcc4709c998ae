use crate::error::{Result, StreamError};
use crate::traits::Source;

/// A forward-only reader over a [`Source`], bounded by a byte limit.
///
/// Every read either delivers exactly the requested bytes or fails; there
/// are no short reads. `bytes_left` is the remaining budget: for a
/// top-level stream it is the caller's limit (or unbounded), for a
/// sub-stream it is the length of the enclosing length-delimited value.
pub struct InputStream<'a> {
    source: &'a mut dyn Source,
    bytes_left: usize,
    bytes_read: usize,
    bounded: bool,
}

impl<'a> InputStream<'a> {
    /// Create a stream that reads at most `limit` bytes from `source`.
    pub fn new(source: &'a mut dyn Source, limit: usize) -> Self {
        Self {
            source,
            bytes_left: limit,
            bytes_read: 0,
            bounded: true,
        }
    }

    /// Create a stream that reads until the source is exhausted.
    pub fn unbounded(source: &'a mut dyn Source) -> Self {
        Self {
            source,
            bytes_left: usize::MAX,
            bytes_read: 0,
            bounded: false,
        }
    }

    /// Create a stream over a byte slice, bounded by its length.
    ///
    /// The slice is advanced as bytes are consumed.
    pub fn from_slice<'b: 'a>(data: &'a mut &'b [u8]) -> Self {
        let limit = data.len();
        Self::new(data, limit)
    }

    /// Remaining byte budget.
    pub fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    /// Total bytes consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Whether the stream has an explicit limit.
    pub fn is_bounded(&self) -> bool {
        self.bounded
    }

    /// Whether the byte budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.bytes_left == 0
    }

    /// Fill `buf` completely.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() > self.bytes_left {
            return Err(StreamError::LimitExceeded {
                requested: buf.len(),
                remaining: self.bytes_left,
            });
        }

        let mut filled = 0usize;
        while filled < buf.len() {
            let read = self.source.read(&mut buf[filled..])?;
            if read == 0 {
                self.consume(filled);
                return Err(StreamError::EndOfStream {
                    requested: buf.len(),
                    available: filled,
                });
            }
            filled += read;
        }

        self.consume(filled);
        Ok(())
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(&mut byte)?;
        Ok(byte[0])
    }

    /// Read a single byte, or `None` if the stream ends cleanly first.
    ///
    /// The end is clean when the byte budget is spent or the source
    /// reports end of data.
    pub fn try_read_byte(&mut self) -> Result<Option<u8>> {
        if self.bytes_left == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        if self.source.read(&mut byte)? == 0 {
            return Ok(None);
        }
        self.consume(1);
        Ok(Some(byte[0]))
    }

    /// Consume `count` bytes without storing them.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        if count > self.bytes_left {
            return Err(StreamError::LimitExceeded {
                requested: count,
                remaining: self.bytes_left,
            });
        }
        let skipped = self.source.skip(count)?;
        self.consume(skipped);
        if skipped < count {
            return Err(StreamError::EndOfStream {
                requested: count,
                available: skipped,
            });
        }
        Ok(())
    }

    /// Run `f` over a sub-stream limited to the next `len` bytes.
    ///
    /// The sub-stream shares this stream's source. Whatever `f` consumes is
    /// charged to this stream afterwards, whether `f` succeeds or not. Bytes
    /// `f` leaves unread stay in the source.
    pub fn with_substream<T, E, F>(&mut self, len: usize, f: F) -> std::result::Result<T, E>
    where
        E: From<StreamError>,
        F: FnOnce(&mut InputStream<'_>) -> std::result::Result<T, E>,
    {
        if len > self.bytes_left {
            return Err(StreamError::LimitExceeded {
                requested: len,
                remaining: self.bytes_left,
            }
            .into());
        }

        let source: &mut dyn Source = &mut *self.source;
        let mut sub = InputStream::new(source, len);
        let result = f(&mut sub);
        let consumed = sub.bytes_read;
        self.consume(consumed);
        result
    }

    fn consume(&mut self, count: usize) {
        self.bytes_left -= count;
        self.bytes_read += count;
    }
}

impl std::fmt::Debug for InputStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("bytes_left", &self.bytes_left)
            .field("bytes_read", &self.bytes_read)
            .field("bounded", &self.bounded)
            .finish()
    }
}
