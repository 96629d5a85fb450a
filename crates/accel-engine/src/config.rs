use std::time::Duration;

use crate::error::{Result, SubmitError};

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total instruction slots across the chunk ring; also the pending-queue
    /// capacity (one in-flight request per slot).
    pub queue_len: u32,
    /// Instruction slots per command-queue chunk.
    pub chunk_slots: u32,
    /// Upper bound on `input + output` fragments per request.
    pub max_sg_fragments: usize,
    /// Window after which an unresolved request is failed as timed out.
    pub command_timeout: Duration,
    /// Times the scanner may refresh a pending entry's deadline while the
    /// result blob still carries the init sentinel (engine not started).
    pub grace_rechecks: u32,
    /// Outstanding-request count above which `submit` runs an eager drain
    /// pass before acquiring a pending entry.
    pub scan_threshold: u64,
    /// Engine group stamped into every instruction's group-select word.
    pub group: u16,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            queue_len: 2048,
            chunk_slots: 1023,
            max_sg_fragments: 25,
            command_timeout: Duration::from_secs(4),
            grace_rechecks: 5,
            scan_threshold: 100,
            group: 1,
        }
    }
}

impl EngineConfig {
    /// Validate and normalize. When the queue spans multiple chunks its
    /// length must be a chunk multiple; round up and warn otherwise.
    pub(crate) fn normalize(mut self) -> Result<EngineConfig> {
        if self.queue_len == 0 || self.chunk_slots == 0 {
            return Err(SubmitError::InvalidState("queue sizes must be nonzero"));
        }
        if self.max_sg_fragments == 0 {
            return Err(SubmitError::InvalidState("fragment bound must be nonzero"));
        }
        if self.queue_len > self.chunk_slots && self.queue_len % self.chunk_slots != 0 {
            let rounded = self.queue_len + self.chunk_slots - self.queue_len % self.chunk_slots;
            tracing::warn!(
                queue_len = self.queue_len,
                rounded,
                "queue length is not a chunk multiple, rounding up"
            );
            self.queue_len = rounded;
        }
        Ok(self)
    }

    pub(crate) fn slots_per_chunk(&self) -> u32 {
        self.queue_len.min(self.chunk_slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_normalizes_to_a_chunk_multiple() {
        let cfg = EngineConfig::default().normalize().unwrap();
        // 2048 rounds up to the next multiple of the 1023-slot chunk.
        assert_eq!(cfg.queue_len, 3069);
        assert_eq!(cfg.queue_len % cfg.chunk_slots, 0);
    }

    #[test]
    fn uneven_queue_length_rounds_up_to_chunk_multiple() {
        let cfg = EngineConfig {
            queue_len: 10,
            chunk_slots: 4,
            ..EngineConfig::default()
        };
        let cfg = cfg.normalize().unwrap();
        assert_eq!(cfg.queue_len, 12);
    }

    #[test]
    fn single_chunk_queue_is_left_alone() {
        let cfg = EngineConfig {
            queue_len: 3,
            chunk_slots: 8,
            ..EngineConfig::default()
        };
        let cfg = cfg.normalize().unwrap();
        assert_eq!(cfg.queue_len, 3);
        assert_eq!(cfg.slots_per_chunk(), 3);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let cfg = EngineConfig {
            queue_len: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.normalize(),
            Err(SubmitError::InvalidState(_))
        ));
    }
}
