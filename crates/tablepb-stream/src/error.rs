/// Errors that can occur while reading from or writing to a stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The underlying source or sink failed.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source ran dry before the requested bytes were read.
    #[error("unexpected end of stream ({requested} bytes requested, {available} available)")]
    EndOfStream { requested: usize, available: usize },

    /// The request would cross the stream's size limit.
    #[error("stream limit exceeded ({requested} bytes requested, {remaining} remaining)")]
    LimitExceeded { requested: usize, remaining: usize },
}

pub type Result<T> = std::result::Result<T, StreamError>;
