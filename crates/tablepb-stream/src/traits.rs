use crate::error::{Result, StreamError};

const SKIP_CHUNK_SIZE: usize = 64;

/// A source of bytes for an [`InputStream`](crate::InputStream).
///
/// This is the read half of the stream callback interface: any type that
/// can hand out bytes on request, plus whatever state it needs to do so.
pub trait Source {
    /// Read up to `buf.len()` bytes and return how many were read.
    ///
    /// `Ok(0)` for a non-empty `buf` signals the end of the source.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard up to `count` bytes and return how many were discarded.
    ///
    /// The default implementation reads into a small scratch buffer.
    fn skip(&mut self, count: usize) -> Result<usize> {
        let mut scratch = [0u8; SKIP_CHUNK_SIZE];
        let mut skipped = 0usize;
        while skipped < count {
            let chunk = (count - skipped).min(SKIP_CHUNK_SIZE);
            let read = self.read(&mut scratch[..chunk])?;
            if read == 0 {
                break;
            }
            skipped += read;
        }
        Ok(skipped)
    }
}

/// A destination for bytes written through an [`OutputStream`](crate::OutputStream).
pub trait Sink {
    /// Accept all of `buf` or fail.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Flush any buffering done by the sink.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<'a> Source for &'a [u8] {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data: &'a [u8] = *self;
        let n = buf.len().min(data.len());
        let (head, tail) = data.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        Ok(n)
    }

    fn skip(&mut self, count: usize) -> Result<usize> {
        let data: &'a [u8] = *self;
        let n = count.min(data.len());
        *self = &data[n..];
        Ok(n)
    }
}

/// Writes into the front of the slice and advances it, like `std::io::Write`
/// does for `&mut [u8]`.
impl<'a> Sink for &'a mut [u8] {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() > self.len() {
            return Err(StreamError::LimitExceeded {
                requested: buf.len(),
                remaining: self.len(),
            });
        }
        let (head, tail) = std::mem::take(self).split_at_mut(buf.len());
        head.copy_from_slice(buf);
        *self = tail;
        Ok(())
    }
}

impl Sink for Vec<u8> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// A [`Source`] backed by a closure; the closure's captures are its state.
pub struct FnSource<F>(pub F);

impl<F> Source for FnSource<F>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (self.0)(buf)
    }
}

/// A [`Sink`] backed by a closure; the closure's captures are its state.
pub struct FnSink<F>(pub F);

impl<F> Sink for FnSink<F>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (self.0)(buf)
    }
}
