//! A scripted mock accelerator for integration tests. It discovers the
//! command queue through the base/size registers, walks the chunk ring via
//! the trailing next pointers, and executes instructions by parsing the
//! scatter/gather directive out of DMA memory, exactly as the hardware
//! would.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use accel_dma::{DmaBus, DmaMemory, DmaRegion};
use accel_engine::{
    CompletionStatus, DeviceChannel, REG_QUEUE_BASE, REG_QUEUE_SIZE, REG_STATUS,
};
use accel_wire::{
    parse_directive, CompletionCode, EngineCommand, Instruction, ResultWord, INSTRUCTION_SIZE,
    INSTRUCTION_WORDS,
};

/// What the device does with one fetched instruction.
#[derive(Clone, Copy)]
pub enum Outcome {
    /// Move the data, touch the result blob, write the completion word.
    Complete(CompletionCode),
    /// Fetch the instruction but leave the completion word untouched.
    /// With `touch_blob` the device still moves data and writes the result
    /// blob, mimicking an engine that started but never finished.
    Stall { touch_blob: bool },
}

/// Bookkeeping for a fetched instruction so a test can complete it later.
pub struct ExecutedSlot {
    pub res_addr: u64,
    pub rptr: u64,
    pub doneint: bool,
}

struct Cursor {
    chunk_addr: u64,
    slot: u32,
    slots_per_chunk: u32,
}

pub struct MockDevice {
    mem: Arc<DmaMemory>,
    regs: Mutex<HashMap<u64, u64>>,
    doorbell_words: AtomicU64,
    /// Instructions rung in but not yet fetched.
    backlog: AtomicU64,
    cursor: Mutex<Option<Cursor>>,
    script: Mutex<VecDeque<Outcome>>,
    executed: Mutex<Vec<ExecutedSlot>>,
    auto: std::sync::atomic::AtomicBool,
}

impl MockDevice {
    pub fn new(mem: Arc<DmaMemory>) -> Arc<MockDevice> {
        Arc::new(MockDevice {
            mem,
            regs: Mutex::new(HashMap::new()),
            doorbell_words: AtomicU64::new(0),
            backlog: AtomicU64::new(0),
            cursor: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            auto: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Execute every doorbell'd instruction as soon as it is rung in.
    pub fn set_auto_complete(&self, on: bool) {
        self.auto.store(on, Ordering::SeqCst);
    }

    /// Queue per-instruction outcomes; instructions beyond the script
    /// complete successfully.
    pub fn push_outcomes(&self, outcomes: &[Outcome]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn doorbell_words(&self) -> u64 {
        self.doorbell_words.load(Ordering::SeqCst)
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    /// Fetch and execute up to `n` backlogged instructions.
    pub fn process(&self, n: u64) {
        for _ in 0..n {
            if self
                .backlog
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
                .is_err()
            {
                break;
            }
            self.execute_one();
        }
    }

    pub fn process_all(&self) {
        self.process(u64::MAX);
    }

    /// Write the completion word for a previously fetched instruction.
    pub fn finish(&self, index: usize, code: CompletionCode) {
        let executed = self.executed.lock().unwrap();
        let slot = &executed[index];
        self.mem.write_u64(slot.rptr, 0).unwrap();
        let word = ResultWord {
            code,
            doneint: slot.doneint,
        };
        self.mem.write(slot.res_addr, &word.encode()).unwrap();
    }

    fn execute_one(&self) {
        let mut cursor = self.cursor.lock().unwrap();
        let cursor = cursor.get_or_insert_with(|| {
            let regs = self.regs.lock().unwrap();
            let base = *regs.get(&REG_QUEUE_BASE).expect("queue base programmed");
            let size = *regs.get(&REG_QUEUE_SIZE).expect("queue size programmed");
            Cursor {
                chunk_addr: base,
                slot: 0,
                slots_per_chunk: ((size - 1) / u64::from(INSTRUCTION_WORDS)) as u32,
            }
        });

        let mut bytes = [0u8; INSTRUCTION_SIZE];
        let addr = cursor.chunk_addr + u64::from(cursor.slot) * INSTRUCTION_SIZE as u64;
        self.mem.read(addr, &mut bytes).unwrap();
        let instr = Instruction::decode(&bytes);

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Complete(CompletionCode::Success));

        let run_engine = !matches!(outcome, Outcome::Stall { touch_blob: false });
        if run_engine {
            self.run_engine(&instr);
        }
        if let Outcome::Complete(code) = outcome {
            let word = ResultWord {
                code,
                doneint: instr.doneint,
            };
            self.mem.write(instr.res_addr, &word.encode()).unwrap();
        }
        self.executed.lock().unwrap().push(ExecutedSlot {
            res_addr: instr.res_addr,
            rptr: instr.ei2,
            doneint: instr.doneint,
        });

        cursor.slot += 1;
        if cursor.slot == cursor.slots_per_chunk {
            let next_off = u64::from(cursor.slots_per_chunk) * INSTRUCTION_SIZE as u64;
            cursor.chunk_addr = self.mem.read_u64(cursor.chunk_addr + next_off).unwrap();
            cursor.slot = 0;
        }
    }

    /// Gather the input fragments, copy the bytes across the scatter
    /// fragments in order, and touch the result blob.
    fn run_engine(&self, instr: &Instruction) {
        let cmd = EngineCommand::from_word(instr.ei0);
        let mut directive = vec![0u8; usize::from(cmd.dlen)];
        self.mem.read(instr.ei1, &mut directive).unwrap();
        let (gather, scatter) = parse_directive(&directive).expect("well-formed directive");

        let mut data = Vec::new();
        for frag in &gather {
            let mut buf = vec![0u8; usize::from(frag.len)];
            self.mem.read(frag.addr, &mut buf).unwrap();
            data.extend_from_slice(&buf);
        }
        let mut off = 0;
        for frag in &scatter {
            let take = usize::from(frag.len).min(data.len() - off);
            self.mem.write(frag.addr, &data[off..off + take]).unwrap();
            off += take;
            if off == data.len() {
                break;
            }
        }

        self.mem.write_u64(instr.ei2, 0).unwrap();
    }
}

impl DeviceChannel for MockDevice {
    fn write_register(&self, offset: u64, value: u64) {
        self.regs.lock().unwrap().insert(offset, value);
    }

    fn read_register(&self, offset: u64) -> u64 {
        if offset == REG_STATUS {
            return 1;
        }
        *self.regs.lock().unwrap().get(&offset).unwrap_or(&0)
    }

    fn ring_doorbell(&self, words: u32) {
        assert_eq!(words % INSTRUCTION_WORDS, 0, "doorbell not word-aligned");
        self.doorbell_words
            .fetch_add(u64::from(words), Ordering::SeqCst);
        self.backlog
            .fetch_add(u64::from(words / INSTRUCTION_WORDS), Ordering::SeqCst);
        if self.auto.load(Ordering::SeqCst) {
            self.process_all();
        }
    }
}

pub struct Harness {
    pub mem: Arc<DmaMemory>,
    pub device: Arc<MockDevice>,
    pub clock: Arc<accel_engine::FakeClock>,
    pub manager: accel_engine::RequestManager,
}

/// A small queue (two chunks of four slots) so ring behavior is cheap to
/// exercise.
pub fn small_config() -> accel_engine::EngineConfig {
    accel_engine::EngineConfig {
        queue_len: 8,
        chunk_slots: 4,
        ..Default::default()
    }
}

pub fn setup(config: accel_engine::EngineConfig) -> Harness {
    let mem = DmaMemory::new(1 << 20);
    let device = MockDevice::new(Arc::clone(&mem));
    let clock = Arc::new(accel_engine::FakeClock::new());
    let channel: Arc<dyn DeviceChannel> = device.clone();
    let clock_dyn: Arc<dyn accel_engine::Clock> = clock.clone();
    let manager =
        accel_engine::RequestManager::new(config, Arc::clone(&mem), channel, clock_dyn).unwrap();
    Harness {
        mem,
        device,
        clock,
        manager,
    }
}

/// A client-owned DMA buffer plus its fragment view, for building requests.
pub struct TestBuffer {
    pub region: DmaRegion,
}

impl TestBuffer {
    pub fn filled(mem: &Arc<DmaMemory>, bytes: &[u8]) -> TestBuffer {
        let region = mem.alloc_coherent(bytes.len().max(1), 8).unwrap();
        region.write(0, bytes).unwrap();
        TestBuffer { region }
    }

    pub fn zeroed(mem: &Arc<DmaMemory>, len: usize) -> TestBuffer {
        TestBuffer {
            region: mem.alloc_coherent(len, 8).unwrap(),
        }
    }

    pub fn fragment(&self) -> accel_engine::Fragment {
        accel_engine::Fragment {
            addr: self.region.device_addr(),
            len: self.region.len() as u16,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.region.len()];
        self.region.read(0, &mut buf).unwrap();
        buf
    }
}

/// Shared callback sink recording statuses in completion order.
#[derive(Default)]
pub struct StatusLog {
    statuses: Mutex<Vec<CompletionStatus>>,
    fired: AtomicUsize,
}

impl StatusLog {
    pub fn new() -> Arc<StatusLog> {
        Arc::new(StatusLog::default())
    }

    pub fn callback(self: &Arc<Self>) -> Box<dyn FnOnce(CompletionStatus) + Send> {
        let log = Arc::clone(self);
        Box::new(move |status| {
            log.statuses.lock().unwrap().push(status);
            log.fired.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<CompletionStatus> {
        self.statuses.lock().unwrap().clone()
    }
}
