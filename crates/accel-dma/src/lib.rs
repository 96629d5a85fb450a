//! Host-side model of device-visible (DMA) memory.
//!
//! The driver core never touches raw pointers: every buffer the accelerator
//! can see lives inside a [`DmaMemory`] arena and is addressed by its device
//! address (`u64`). Coherent allocations ([`DmaRegion`]) and streaming
//! mappings over client-owned bytes ([`DmaMapping`]) are owned handles that
//! unmap exactly once, in `Drop`, so a double unmap cannot be written.
//!
//! In production the arena would be backed by real DMA-coherent pages; in
//! tests the same arena doubles as the mock device's view of memory, which
//! lets integration tests drive the full submit/complete pipeline without
//! hardware.

mod arena;
mod bus;

pub use arena::{DmaMapping, DmaMemory, DmaRegion};
pub use bus::DmaBus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DmaError>;

/// Errors raised by the DMA memory model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DmaError {
    #[error("dma access out of bounds: addr={addr:#x} len={len}")]
    OutOfBounds { addr: u64, len: usize },

    #[error("dma mapping failed: addr={addr:#x} len={len}")]
    MapFailed { addr: u64, len: usize },

    #[error("dma arena exhausted: requested {requested} bytes")]
    Exhausted { requested: usize },
}
