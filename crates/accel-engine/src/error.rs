use accel_dma::DmaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SubmitError>;

/// Synchronous submission failures. Device-side outcomes (success, fault,
/// timeout) never appear here; they are delivered through the request
/// callback only.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("too many scatter/gather fragments: {count} (max {max})")]
    TooManyFragments { count: usize, max: usize },

    #[error("dma mapping failed")]
    DmaMapFailed(#[source] DmaError),

    #[error("failed to prepare request descriptor memory")]
    PrepareFailed(#[source] DmaError),

    #[error("no free pending-queue entry")]
    Busy,

    /// The command queue and pending queue are sized together, so the
    /// pending queue always fills first and this is not normally reachable.
    #[error("command queue full")]
    QueueFull,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Final outcome of a submitted request, delivered via its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    /// DMA or transport fault reported by the device.
    Fault,
    /// Microcode-reported software error, or an unrecognized completion code.
    SoftwareError,
    /// No completion within the configured window.
    TimedOut,
}
