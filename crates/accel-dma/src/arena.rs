use std::sync::{Arc, Mutex};

use crate::bus::DmaBus;
use crate::{DmaError, Result};

/// Device addresses start above zero so a zero address can mean "none"
/// (the hardware treats a zero result address as "do not write a result").
const DMA_BASE: u64 = 0x1000;

/// Allocation granule. Every region is aligned to this, which satisfies the
/// strictest alignment the pipeline needs (command chunks, 128 bytes) and
/// keeps the free list reusable without per-entry alignment bookkeeping.
const GRANULE: usize = 128;

struct Inner {
    bytes: Vec<u8>,
    /// Bump pointer past the highest allocation ever made (arena offset).
    high: usize,
    /// Freed blocks available for reuse: (offset, len), len granule-rounded.
    free: Vec<(usize, usize)>,
    /// Live mapping count: one per coherent region + one per streaming map.
    mappings: usize,
    /// Fault injection: number of further mappings allowed to succeed.
    map_budget: Option<usize>,
}

/// Fixed-size arena standing in for the device-visible address space.
///
/// Coherent allocations and streaming mappings are tracked so tests can
/// assert that a completed or failed request leaves no mapping behind.
pub struct DmaMemory {
    inner: Mutex<Inner>,
}

impl DmaMemory {
    pub fn new(size: usize) -> Arc<DmaMemory> {
        Arc::new(DmaMemory {
            inner: Mutex::new(Inner {
                bytes: vec![0u8; size],
                high: 0,
                free: Vec::new(),
                mappings: 0,
                map_budget: None,
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().bytes.len()
    }

    /// Number of live DMA mappings (coherent regions + streaming mappings).
    pub fn active_mappings(&self) -> usize {
        self.inner.lock().unwrap().mappings
    }

    /// Allow `successes` more mappings to succeed, then fail every mapping
    /// attempt until [`DmaMemory::clear_map_faults`] is called.
    pub fn fail_maps_after(&self, successes: usize) {
        self.inner.lock().unwrap().map_budget = Some(successes);
    }

    pub fn clear_map_faults(&self) {
        self.inner.lock().unwrap().map_budget = None;
    }

    /// Allocate a zeroed, device-visible region. `align` must be a power of
    /// two no larger than the arena granule.
    pub fn alloc_coherent(self: &Arc<Self>, len: usize, align: usize) -> Result<DmaRegion> {
        assert!(align.is_power_of_two() && align <= GRANULE);
        let rounded = round_up(len.max(1), GRANULE);
        let mut inner = self.inner.lock().unwrap();

        inner.charge_mapping(DMA_BASE, len)?;

        let offset = match inner.take_free(rounded) {
            Some(offset) => offset,
            None => {
                let offset = inner.high;
                if offset + rounded > inner.bytes.len() {
                    inner.mappings -= 1;
                    return Err(DmaError::Exhausted { requested: len });
                }
                inner.high = offset + rounded;
                offset
            }
        };
        inner.bytes[offset..offset + rounded].fill(0);

        Ok(DmaRegion {
            mem: Arc::clone(self),
            offset,
            rounded,
            len,
        })
    }

    /// Register a streaming (bidirectional) mapping over `len` bytes of
    /// client-owned memory already inside the arena's address space.
    pub fn map_region(self: &Arc<Self>, addr: u64, len: usize) -> Result<DmaMapping> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_range(addr, len)?;
        inner.charge_mapping(addr, len)?;
        Ok(DmaMapping {
            mem: Arc::clone(self),
            addr,
            len,
        })
    }
}

impl Inner {
    fn check_range(&self, addr: u64, len: usize) -> Result<()> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(DmaError::OutOfBounds { addr, len })?;
        if addr < DMA_BASE || end > DMA_BASE + self.bytes.len() as u64 {
            return Err(DmaError::OutOfBounds { addr, len });
        }
        Ok(())
    }

    fn charge_mapping(&mut self, addr: u64, len: usize) -> Result<()> {
        match self.map_budget {
            Some(0) => Err(DmaError::MapFailed { addr, len }),
            Some(ref mut n) => {
                *n -= 1;
                self.mappings += 1;
                Ok(())
            }
            None => {
                self.mappings += 1;
                Ok(())
            }
        }
    }

    fn take_free(&mut self, rounded: usize) -> Option<usize> {
        let idx = self.free.iter().position(|&(_, len)| len >= rounded)?;
        let (offset, len) = self.free.swap_remove(idx);
        if len > rounded {
            self.free.push((offset + rounded, len - rounded));
        }
        Some(offset)
    }

    fn release(&mut self, offset: usize, rounded: usize) {
        // Freed request memory is scrubbed before reuse.
        self.bytes[offset..offset + rounded].fill(0);
        self.free.push((offset, rounded));
        self.mappings -= 1;
    }
}

impl DmaBus for DmaMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        inner.check_range(addr, buf.len())?;
        let start = (addr - DMA_BASE) as usize;
        buf.copy_from_slice(&inner.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_range(addr, buf.len())?;
        let start = (addr - DMA_BASE) as usize;
        inner.bytes[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

/// An owned, device-visible coherent allocation. Freed (and unmapped,
/// exactly once) on drop.
pub struct DmaRegion {
    mem: Arc<DmaMemory>,
    offset: usize,
    rounded: usize,
    len: usize,
}

impl DmaRegion {
    pub fn device_addr(&self) -> u64 {
        DMA_BASE + self.offset as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write(&self, offset: usize, buf: &[u8]) -> Result<()> {
        assert!(offset + buf.len() <= self.len);
        self.mem.write(self.device_addr() + offset as u64, buf)
    }

    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        assert!(offset + buf.len() <= self.len);
        self.mem.read(self.device_addr() + offset as u64, buf)
    }

    pub fn write_u64(&self, offset: usize, val: u64) -> Result<()> {
        self.write(offset, &val.to_le_bytes())
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        self.mem
            .inner
            .lock()
            .unwrap()
            .release(self.offset, self.rounded);
    }
}

/// A streaming DMA mapping over client-owned bytes. Unmapped exactly once,
/// on drop; the underlying bytes stay owned by the client.
pub struct DmaMapping {
    mem: Arc<DmaMemory>,
    addr: u64,
    len: usize,
}

impl DmaMapping {
    pub fn device_addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for DmaMapping {
    fn drop(&mut self) {
        self.mem.inner.lock().unwrap().mappings -= 1;
    }
}

fn round_up(val: usize, to: usize) -> usize {
    (val + to - 1) / to * to
}
