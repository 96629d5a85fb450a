//! Request/completion pipeline for a hardware crypto accelerator.
//!
//! The pipeline accepts opaque encryption/decryption jobs, packs their
//! buffers into the device's scatter/gather wire format, streams fixed-size
//! instructions to the device through a chunked circular command queue, and
//! retires jobs by scanning device-written completion words.
//!
//! The only external inputs are a DMA memory model ([`accel_dma::DmaMemory`])
//! and a register/doorbell channel ([`DeviceChannel`]); everything above the
//! register boundary (PCI enumeration, firmware load, interrupt wiring,
//! cipher registration) lives elsewhere.
//!
//! Flow: [`RequestManager::submit`] maps the request's [`Fragment`] buffers
//! into a descriptor set, parks it in the pending queue, and pushes one
//! instruction to the command queue; the device executes asynchronously;
//! [`RequestManager::process_completions`] (called from a poller or an
//! interrupt bottom half) drains finished entries front-first and invokes
//! each request's callback exactly once.

mod channel;
mod clock;
mod cmdqueue;
mod config;
mod descriptor;
mod error;
mod manager;
mod pending;

pub use channel::{DeviceChannel, REG_QUEUE_BASE, REG_QUEUE_SIZE, REG_STATUS};
pub use clock::{Clock, FakeClock, StdClock};
pub use config::EngineConfig;
pub use descriptor::Fragment;
pub use error::{CompletionStatus, Result, SubmitError};
pub use manager::{CompletionCallback, RequestManager, SubmitRequest};
