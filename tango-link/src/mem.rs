use byteorder::ByteOrder;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("address {0:#010x} is out of range")]
    OutOfRange(u32),

    #[error("code offset {0:#08x} is out of range")]
    CodeOutOfRange(u32),
}

/// Access to the simulator's memory, as provided by the host emulator.
///
/// Addresses are absolute bus addresses. Code offsets given to [`Memory::patch_bytes`] are relative to the start of
/// the loaded program image.
pub trait Memory {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError>;
    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError>;
    fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryError>;

    fn write_u8(&mut self, addr: u32, v: u8) -> Result<(), MemoryError>;
    fn write_u16(&mut self, addr: u32, v: u16) -> Result<(), MemoryError>;
    fn write_u32(&mut self, addr: u32, v: u32) -> Result<(), MemoryError>;

    /// Overwrites code at `offset` and returns the bytes that were there before.
    fn patch_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<Vec<u8>, MemoryError>;

    fn read_range(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        for (i, v) in buf.iter_mut().enumerate() {
            *v = self.read_u8(addr + i as u32)?;
        }
        Ok(())
    }

    fn write_range(&mut self, addr: u32, buf: &[u8]) -> Result<(), MemoryError> {
        for (i, v) in buf.iter().enumerate() {
            self.write_u8(addr + i as u32, *v)?;
        }
        Ok(())
    }
}

pub const EWRAM_BASE: u32 = 0x02000000;
pub const EWRAM_SIZE: usize = 0x40000;
pub const IWRAM_BASE: u32 = 0x03000000;
pub const IWRAM_SIZE: usize = 0x8000;
pub const ROM_BASE: u32 = 0x08000000;

struct Region {
    base: u32,
    data: Vec<u8>,
    writable: bool,
}

impl Region {
    fn contains(&self, addr: u32, len: usize) -> bool {
        addr >= self.base && (addr - self.base) as usize + len <= self.data.len()
    }
}

/// An owned copy of the simulator's address space.
///
/// Work RAM is writable through the ordinary write calls; the program image can only be changed through
/// [`Memory::patch_bytes`].
pub struct MemoryImage {
    regions: Vec<Region>,
}

impl MemoryImage {
    pub fn new(rom: &[u8]) -> Self {
        Self {
            regions: vec![
                Region {
                    base: EWRAM_BASE,
                    data: vec![0u8; EWRAM_SIZE],
                    writable: true,
                },
                Region {
                    base: IWRAM_BASE,
                    data: vec![0u8; IWRAM_SIZE],
                    writable: true,
                },
                Region {
                    base: ROM_BASE,
                    data: rom.to_vec(),
                    writable: false,
                },
            ],
        }
    }

    pub fn rom(&self) -> &[u8] {
        &self.regions[2].data
    }

    fn slice(&self, addr: u32, len: usize) -> Result<&[u8], MemoryError> {
        let region = self
            .regions
            .iter()
            .find(|r| r.contains(addr, len))
            .ok_or(MemoryError::OutOfRange(addr))?;
        let start = (addr - region.base) as usize;
        Ok(&region.data[start..start + len])
    }

    fn slice_mut(&mut self, addr: u32, len: usize) -> Result<&mut [u8], MemoryError> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.writable && r.contains(addr, len))
            .ok_or(MemoryError::OutOfRange(addr))?;
        let start = (addr - region.base) as usize;
        Ok(&mut region.data[start..start + len])
    }
}

impl Memory for MemoryImage {
    fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError> {
        Ok(self.slice(addr, 1)?[0])
    }

    fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError> {
        Ok(byteorder::LittleEndian::read_u16(self.slice(addr, 2)?))
    }

    fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryError> {
        Ok(byteorder::LittleEndian::read_u32(self.slice(addr, 4)?))
    }

    fn write_u8(&mut self, addr: u32, v: u8) -> Result<(), MemoryError> {
        self.slice_mut(addr, 1)?[0] = v;
        Ok(())
    }

    fn write_u16(&mut self, addr: u32, v: u16) -> Result<(), MemoryError> {
        byteorder::LittleEndian::write_u16(self.slice_mut(addr, 2)?, v);
        Ok(())
    }

    fn write_u32(&mut self, addr: u32, v: u32) -> Result<(), MemoryError> {
        byteorder::LittleEndian::write_u32(self.slice_mut(addr, 4)?, v);
        Ok(())
    }

    fn patch_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<Vec<u8>, MemoryError> {
        let rom = &mut self.regions[2].data;
        let start = offset as usize;
        if start + bytes.len() > rom.len() {
            return Err(MemoryError::CodeOutOfRange(offset));
        }
        let original = rom[start..start + bytes.len()].to_vec();
        rom[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(original)
    }

    fn read_range(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        buf.copy_from_slice(self.slice(addr, buf.len())?);
        Ok(())
    }

    fn write_range(&mut self, addr: u32, buf: &[u8]) -> Result<(), MemoryError> {
        self.slice_mut(addr, buf.len())?.copy_from_slice(buf);
        Ok(())
    }
}
