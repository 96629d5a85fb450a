use std::sync::{Mutex, MutexGuard};

use crate::descriptor::DescriptorSet;
use crate::error::{CompletionStatus, Result, SubmitError};

pub(crate) type Callback = Box<dyn FnOnce(CompletionStatus) + Send>;

/// Everything the scanner needs to resolve one in-flight request. Moving
/// the state out of its entry is the release: cleanup and the callback can
/// then only happen once.
pub(crate) struct InflightRequest {
    pub(crate) descriptors: DescriptorSet,
    pub(crate) callback: Callback,
    pub(crate) submitted_at_ns: u64,
    pub(crate) grace_used: u32,
}

pub(crate) struct PendingEntry {
    busy: bool,
    state: Option<InflightRequest>,
}

pub(crate) struct PendingState {
    entries: Vec<PendingEntry>,
    /// Oldest live entry; the scanner resolves from here.
    front: usize,
    /// Next slot to hand out; allocation only ever advances this.
    rear: usize,
    /// Live entry count.
    live: u64,
}

impl PendingState {
    /// Claim the slot at `rear`. When that slot is still busy the queue is
    /// at capacity and the request state is handed back for the caller to
    /// retry (after draining completions) or fail.
    pub(crate) fn acquire(
        &mut self,
        request: InflightRequest,
    ) -> std::result::Result<(), InflightRequest> {
        let rear = self.rear;
        let capacity = self.entries.len();
        let entry = &mut self.entries[rear];
        if entry.busy {
            return Err(request);
        }
        entry.busy = true;
        entry.state = Some(request);
        self.rear = (rear + 1) % capacity;
        self.live += 1;
        Ok(())
    }

    /// Undo the most recent `acquire` (instruction push failed before the
    /// doorbell). Only sound while the caller still holds the queue lock it
    /// acquired under; returns the owned state for teardown.
    pub(crate) fn release_rear(&mut self) -> Result<InflightRequest> {
        let capacity = self.entries.len();
        let slot = (self.rear + capacity - 1) % capacity;
        let entry = &mut self.entries[slot];
        if !entry.busy {
            return Err(SubmitError::InvalidState("release of a non-busy entry"));
        }
        entry.busy = false;
        let state = entry
            .state
            .take()
            .ok_or(SubmitError::InvalidState("busy entry without state"))?;
        self.rear = slot;
        self.live -= 1;
        Ok(state)
    }

    /// The scanner's view of the oldest entry: `None` when the queue is
    /// drained.
    pub(crate) fn front_state_mut(&mut self) -> Option<&mut InflightRequest> {
        let front = self.front;
        let entry = &mut self.entries[front];
        if !entry.busy {
            return None;
        }
        entry.state.as_mut()
    }

    /// Scanner-side release: free the entry at `front` and advance. `None`
    /// when the entry is not busy (structural misuse; indices stay
    /// untouched).
    pub(crate) fn take_front(&mut self) -> Option<InflightRequest> {
        let front = self.front;
        let entry = &mut self.entries[front];
        if !entry.busy {
            return None;
        }
        entry.busy = false;
        let state = entry.state.take();
        self.front = (self.front + 1) % self.entries.len();
        self.live -= 1;
        state
    }

    pub(crate) fn live(&self) -> u64 {
        self.live
    }
}

/// Fixed-capacity circular array correlating in-flight instructions with
/// their completion state and callbacks. One lock per queue; acquire and
/// release paths serialize through it, while independent queues (one per
/// hardware sub-channel) never contend.
pub(crate) struct PendingQueue {
    state: Mutex<PendingState>,
}

impl PendingQueue {
    pub(crate) fn new(capacity: u32) -> PendingQueue {
        let entries = (0..capacity)
            .map(|_| PendingEntry {
                busy: false,
                state: None,
            })
            .collect();
        PendingQueue {
            state: Mutex::new(PendingState {
                entries,
                front: 0,
                rear: 0,
                live: 0,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn outstanding(&self) -> u64 {
        self.lock().live()
    }
}
