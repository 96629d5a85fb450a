use crate::Result;

/// Device-address memory access shared by the driver core and the device.
///
/// Reads and writes take `&self`; implementations are expected to use
/// interior mutability so submit paths, the completion scanner, and a mock
/// device can all hold the same bus.
pub trait DmaBus: Send + Sync {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&self, addr: u64, buf: &[u8]) -> Result<()>;

    fn read_u16(&self, addr: u64) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read(addr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&self, addr: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&self, addr: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u16(&self, addr: u64, val: u16) -> Result<()> {
        self.write(addr, &val.to_le_bytes())
    }

    fn write_u32(&self, addr: u64, val: u32) -> Result<()> {
        self.write(addr, &val.to_le_bytes())
    }

    fn write_u64(&self, addr: u64, val: u64) -> Result<()> {
        self.write(addr, &val.to_le_bytes())
    }
}
