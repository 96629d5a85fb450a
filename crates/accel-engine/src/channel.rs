/// Device address of the first command-queue chunk.
pub const REG_QUEUE_BASE: u64 = 0x00;

/// Queue geometry: 64-bit words per chunk, plus one for the trailing
/// next-chunk pointer.
pub const REG_QUEUE_SIZE: u64 = 0x08;

/// Nonzero when the device is out of reset and accepting work.
pub const REG_STATUS: u64 = 0x10;

/// Opaque side-effecting channel to the device's register file.
///
/// Register offsets are symbolic; the concrete MMIO layout belongs to the
/// bus/platform layer that implements this trait. The doorbell is counted
/// in 64-bit instruction words.
pub trait DeviceChannel: Send + Sync {
    fn write_register(&self, offset: u64, value: u64);
    fn read_register(&self, offset: u64) -> u64;
    fn ring_doorbell(&self, words: u32);
}
