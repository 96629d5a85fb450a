use std::sync::atomic::{fence, Ordering};
use std::sync::{Arc, Mutex};

use accel_dma::{DmaMemory, DmaRegion};
use accel_wire::{Instruction, INSTRUCTION_SIZE, INSTRUCTION_WORDS, NEXT_CHUNK_PTR_SIZE};

use crate::channel::{DeviceChannel, REG_QUEUE_BASE, REG_QUEUE_SIZE};
use crate::config::EngineConfig;
use crate::error::{Result, SubmitError};

/// Command-queue chunks must be 128-byte aligned for the device's fetcher.
const CHUNK_ALIGN: usize = 128;

struct Chunk {
    region: DmaRegion,
    slots: u32,
}

struct QueueState {
    chunks: Vec<Chunk>,
    /// Circular successor table: `next[i]` is the chunk the writer (and the
    /// device) moves to after exhausting chunk `i`. Host bookkeeping is by
    /// index; the device follows the raw trailing pointer in each chunk.
    next: Vec<usize>,
    /// Chunk currently being filled.
    cur: usize,
    /// Next free slot within the current chunk.
    slot: u32,
    /// Slots pushed but not yet retired by the completion scanner.
    inflight: u32,
}

/// The chunked circular instruction queue feeding the device.
///
/// The writer appends fixed-size instructions slot by slot, hopping to the
/// next chunk in ring order when the current one is exhausted; the device
/// consumes autonomously by following each chunk's trailing next pointer,
/// so the host tracks no read index.
pub(crate) struct CommandQueue {
    channel: Arc<dyn DeviceChannel>,
    state: Mutex<QueueState>,
    capacity: u32,
}

impl CommandQueue {
    /// Allocate the chunk ring, link it (including last back to first), and
    /// program the device's base/size registers.
    pub(crate) fn new(
        config: &EngineConfig,
        dma: &Arc<DmaMemory>,
        channel: Arc<dyn DeviceChannel>,
    ) -> Result<CommandQueue> {
        let slots_per_chunk = config.slots_per_chunk();
        let mut chunks = Vec::new();
        let mut remaining = config.queue_len;
        while remaining > 0 {
            let slots = remaining.min(slots_per_chunk);
            let bytes = slots as usize * INSTRUCTION_SIZE + NEXT_CHUNK_PTR_SIZE;
            let region = dma
                .alloc_coherent(bytes, CHUNK_ALIGN)
                .map_err(SubmitError::PrepareFailed)?;
            chunks.push(Chunk { region, slots });
            remaining -= slots;
        }

        let next: Vec<usize> = (0..chunks.len()).map(|i| (i + 1) % chunks.len()).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let ptr_offset = chunk.slots as usize * INSTRUCTION_SIZE;
            let next_addr = chunks[next[i]].region.device_addr();
            chunk
                .region
                .write_u64(ptr_offset, next_addr)
                .map_err(SubmitError::PrepareFailed)?;
        }

        channel.write_register(REG_QUEUE_BASE, chunks[0].region.device_addr());
        channel.write_register(
            REG_QUEUE_SIZE,
            u64::from(slots_per_chunk) * u64::from(INSTRUCTION_WORDS) + 1,
        );

        Ok(CommandQueue {
            channel,
            state: Mutex::new(QueueState {
                chunks,
                next,
                cur: 0,
                slot: 0,
                inflight: 0,
            }),
            capacity: config.queue_len,
        })
    }

    /// Copy one instruction into the current write slot and advance.
    ///
    /// Sizing makes `QueueFull` unreachable in practice: the pending queue
    /// holds at most `capacity` live requests, and every retired entry
    /// returns its slot credit.
    pub(crate) fn push(&self, instr: &Instruction) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.inflight == self.capacity {
            return Err(SubmitError::QueueFull);
        }

        let cur = st.cur;
        let chunk = &st.chunks[cur];
        let offset = st.slot as usize * INSTRUCTION_SIZE;
        chunk
            .region
            .write(offset, &instr.encode())
            .map_err(SubmitError::PrepareFailed)?;

        st.slot += 1;
        if st.slot == st.chunks[cur].slots {
            st.cur = st.next[cur];
            st.slot = 0;
        }
        st.inflight += 1;

        // The instruction must be visible before any doorbell write.
        fence(Ordering::Release);
        Ok(())
    }

    /// Ring the doorbell for `n_instructions` freshly pushed instructions.
    /// Called exactly once per logical batch (one instruction per request).
    pub(crate) fn notify(&self, n_instructions: u32) {
        self.channel
            .ring_doorbell(n_instructions * INSTRUCTION_WORDS);
    }

    /// Return slot credits for entries the scanner has retired.
    pub(crate) fn retire(&self, n: u32) {
        let mut st = self.state.lock().unwrap();
        debug_assert!(st.inflight >= n);
        st.inflight -= n;
    }
}
