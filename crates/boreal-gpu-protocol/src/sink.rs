//! The seam between the translator and the submission engine.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("command of {bytes} bytes cannot fit the channel (capacity {capacity})")]
    TooLarge { bytes: usize, capacity: usize },
    #[error("command channel is full and the device is idle with no progress")]
    ChannelFull,
    #[error("channel protocol violation: {0}")]
    Protocol(&'static str),
}

/// Consumer of encoded command records.
///
/// The ring engine is the production implementation; tests substitute
/// recording fakes. `submit` takes a complete framed record (or the raw fence
/// record) and delivers it atomically — the device never observes a partial
/// command.
pub trait CommandSink {
    fn submit(&mut self, encoded: &[u8]) -> Result<(), SubmitError>;

    /// Insert a fence into the stream and return its id (`0` when fences are
    /// unsupported, which reads as "already satisfied").
    fn insert_fence(&mut self) -> Result<u32, SubmitError>;
}
