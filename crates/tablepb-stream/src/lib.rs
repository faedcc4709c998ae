//! Forward-only byte streams for the tablepb codec.
//!
//! This is the lowest layer of tablepb. A stream wraps a caller-supplied
//! [`Source`] or [`Sink`] and tracks how many bytes went through it,
//! enforcing an optional size limit:
//! - [`InputStream`] reads exactly the requested number of bytes or fails
//! - [`OutputStream`] writes to a sink, or only counts bytes when it has none
//!
//! Streams never seek and never buffer beyond what the source or sink does.

pub mod error;
pub mod input;
pub mod io;
pub mod output;
pub mod traits;

pub use error::{Result, StreamError};
pub use input::InputStream;
pub use io::{IoSink, IoSource};
pub use output::OutputStream;
pub use traits::{FnSink, FnSource, Sink, Source};
