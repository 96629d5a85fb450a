use std::sync::Arc;

use accel_dma::DmaMemory;
use accel_wire::{CompletionCode, EngineCommand, Instruction};
use tracing::{debug, error, warn};

use crate::channel::{DeviceChannel, REG_STATUS};
use crate::clock::Clock;
use crate::cmdqueue::CommandQueue;
use crate::config::EngineConfig;
use crate::descriptor::{DescriptorSet, Fragment};
use crate::error::{CompletionStatus, Result, SubmitError};
use crate::pending::{InflightRequest, PendingQueue};

/// Invoked exactly once per submitted request, after the request's DMA
/// resources have been torn down and outside any queue lock.
pub type CompletionCallback = Box<dyn FnOnce(CompletionStatus) + Send>;

/// One encryption/decryption job: input buffers to gather, output buffers
/// to scatter, and the opaque command words the microcode interprets.
pub struct SubmitRequest {
    pub input: Vec<Fragment>,
    pub output: Vec<Fragment>,
    pub opcode: u16,
    pub param1: u16,
    pub param2: u16,
    pub callback: CompletionCallback,
}

/// Ties one command queue and one pending queue to a device channel and
/// drives requests through them. All methods take `&self`; the queues carry
/// their own locks, so submitters and the completion scanner may run
/// concurrently.
pub struct RequestManager {
    config: EngineConfig,
    dma: Arc<DmaMemory>,
    clock: Arc<dyn Clock>,
    cmd_queue: CommandQueue,
    pending: PendingQueue,
}

impl RequestManager {
    pub fn new(
        config: EngineConfig,
        dma: Arc<DmaMemory>,
        channel: Arc<dyn DeviceChannel>,
        clock: Arc<dyn Clock>,
    ) -> Result<RequestManager> {
        let config = config.normalize()?;
        if channel.read_register(REG_STATUS) == 0 {
            return Err(SubmitError::InvalidState("device not ready"));
        }
        let cmd_queue = CommandQueue::new(&config, &dma, channel)?;
        let pending = PendingQueue::new(config.queue_len);
        debug!(
            queue_len = config.queue_len,
            chunk_slots = config.chunk_slots,
            "engine queues initialized"
        );
        Ok(RequestManager {
            config,
            dma,
            clock,
            cmd_queue,
            pending,
        })
    }

    /// In-flight requests not yet resolved by the scanner.
    pub fn outstanding(&self) -> u64 {
        self.pending.outstanding()
    }

    /// Map the request's buffers, enqueue one instruction, and ring the
    /// doorbell. On success the request is owned by the pending queue until
    /// [`process_completions`](Self::process_completions) resolves it; on
    /// error every mapping made here has already been undone and the
    /// callback will never run.
    pub fn submit(&self, request: SubmitRequest) -> Result<()> {
        let descriptors =
            DescriptorSet::prepare(&self.dma, &self.config, &request.input, &request.output)?;

        // Opportunistic drain keeps a busy submitter from depending on an
        // external poller to free queue slots.
        if self.pending.outstanding() >= self.config.scan_threshold {
            self.process_completions();
        }

        let command = EngineCommand {
            opcode: request.opcode,
            param1: request.param1,
            param2: request.param2,
            dlen: descriptors.directive_len(),
        };
        let instr = Instruction {
            doneint: true,
            res_addr: descriptors.completion_addr(),
            tag: 0,
            tag_type: 0,
            grp: 0,
            wq_ptr: 0,
            ei0: command.to_word(),
            ei1: descriptors.dptr(),
            ei2: descriptors.rptr(),
            ei3: u64::from(self.config.group),
        };

        let mut inflight = InflightRequest {
            descriptors,
            callback: request.callback,
            submitted_at_ns: self.clock.now_ns(),
            grace_used: 0,
        };
        inflight = match self.enqueue(inflight, &instr)? {
            None => return Ok(()),
            Some(inflight) => inflight,
        };

        // The pending queue is full: drain once and retry before refusing.
        self.process_completions();
        inflight.submitted_at_ns = self.clock.now_ns();
        match self.enqueue(inflight, &instr)? {
            None => Ok(()),
            Some(inflight) => {
                error!("pending queue full, rejecting request");
                drop(inflight);
                Err(SubmitError::Busy)
            }
        }
    }

    /// Take a pending slot and push the instruction while still holding the
    /// pending lock, so a concurrent rollback can never free anyone else's
    /// slot and the command queue cannot run out from under an acquired
    /// entry. Returns the request back when the pending queue is full.
    fn enqueue(
        &self,
        inflight: InflightRequest,
        instr: &Instruction,
    ) -> Result<Option<InflightRequest>> {
        let mut st = self.pending.lock();
        match st.acquire(inflight) {
            Ok(()) => match self.cmd_queue.push(instr) {
                Ok(()) => {
                    drop(st);
                    self.cmd_queue.notify(1);
                    Ok(None)
                }
                Err(err) => {
                    // Nothing reached the device; unwind the slot we took.
                    drop(st.release_rear()?);
                    Err(err)
                }
            },
            Err(inflight) => Ok(Some(inflight)),
        }
    }

    /// Drain finished requests front-first, invoking each callback exactly
    /// once. Stops at the first entry that is genuinely still running;
    /// faulted, timed-out, and unrecognized entries are resolved in place so
    /// one bad request never wedges the queue. Returns the number of
    /// requests resolved.
    pub fn process_completions(&self) -> usize {
        let mut resolved = 0;
        loop {
            // Resolve under the lock, run the callback outside it.
            let (req, status) = {
                let mut st = self.pending.lock();
                let Some(req) = st.front_state_mut() else {
                    break;
                };
                let code = match req.descriptors.completion_code() {
                    Ok(code) => code,
                    Err(err) => {
                        error!(%err, "completion word unreadable, failing request");
                        CompletionCode::Fault
                    }
                };
                let verdict = match code {
                    CompletionCode::Success => Some(CompletionStatus::Success),
                    CompletionCode::Fault => Some(CompletionStatus::Fault),
                    CompletionCode::SoftwareError => Some(CompletionStatus::SoftwareError),
                    CompletionCode::Unknown(raw) => {
                        warn!(code = raw, "unrecognized completion code");
                        Some(CompletionStatus::SoftwareError)
                    }
                    CompletionCode::NotDone => self.judge_stalled(req),
                };
                let Some(status) = verdict else {
                    // Front is still running; nothing behind it can be older.
                    break;
                };
                let Some(req) = st.take_front() else {
                    break;
                };
                // Credit the command queue before the freed pending entry is
                // visible to submitters; otherwise a submitter at capacity
                // could take the entry and still find the command queue full.
                self.cmd_queue.retire(1);
                (req, status)
            };
            let InflightRequest {
                descriptors,
                callback,
                ..
            } = req;
            drop(descriptors);
            callback(status);
            resolved += 1;
        }
        resolved
    }

    /// Decide whether a still-pending front entry has timed out. While the
    /// result blob still carries its init sentinel the device may not have
    /// fetched the instruction yet (a reset window, for instance), so the
    /// entry earns a bounded number of fresh timeout windows before the
    /// verdict becomes final.
    fn judge_stalled(&self, req: &mut InflightRequest) -> Option<CompletionStatus> {
        let now = self.clock.now_ns();
        let deadline = req
            .submitted_at_ns
            .saturating_add(self.config.command_timeout.as_nanos() as u64);
        if now < deadline {
            return None;
        }
        let untouched = match req.descriptors.result_blob_untouched() {
            Ok(untouched) => untouched,
            Err(err) => {
                error!(%err, "result blob unreadable, failing request");
                return Some(CompletionStatus::Fault);
            }
        };
        if untouched && req.grace_used < self.config.grace_rechecks {
            req.grace_used += 1;
            req.submitted_at_ns = now;
            debug!(grace_used = req.grace_used, "extending stalled request");
            return None;
        }
        warn!("request timed out");
        Some(CompletionStatus::TimedOut)
    }
}
