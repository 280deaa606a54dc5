use crate::mem::{Memory, MemoryError};

/// Globals that qualify what a pending controller command means.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextVars {
    pub attacker: u8,
    pub target: u8,
    pub effect_battler: u8,
    pub absent_flags: u8,
}

/// Writes context variables at most once per command cycle and slot.
///
/// The simulator is free to change these mid-command (e.g. while iterating the targets of a spread move), so they
/// must never be re-asserted on later ticks.
pub struct Synchronizer {
    written_cycle: [Option<u32>; crate::MAX_BATTLERS],
}

impl Synchronizer {
    pub fn new() -> Self {
        Self {
            written_cycle: [None; crate::MAX_BATTLERS],
        }
    }

    pub fn reset(&mut self) {
        self.written_cycle = [None; crate::MAX_BATTLERS];
    }

    pub fn has_written(&self, slot: usize, cycle: u32) -> bool {
        self.written_cycle[slot] == Some(cycle)
    }

    /// Binds an authoritative command to the simulator: context first, then Buffer A.
    ///
    /// Returns false without touching memory if this cycle was already bound.
    pub fn bind_command(
        &mut self,
        core: &mut dyn Memory,
        munger: &crate::munger::Munger,
        slot: usize,
        cycle: u32,
        context: &ContextVars,
        buffer_a: &[u8],
    ) -> Result<bool, MemoryError> {
        if self.has_written(slot, cycle) {
            return Ok(false);
        }
        munger.set_context_vars(core, context)?;
        munger.set_buffer_a(core, slot, buffer_a)?;
        self.written_cycle[slot] = Some(cycle);
        log::debug!(
            "bound command for slot {} cycle {}: attacker = {}, target = {}",
            slot,
            cycle,
            context.attacker,
            context.target
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryImage;

    /// Records the order of writes so we can check context lands before the buffer.
    struct Recorder {
        inner: MemoryImage,
        writes: Vec<u32>,
    }

    impl Memory for Recorder {
        fn read_u8(&mut self, addr: u32) -> Result<u8, MemoryError> {
            self.inner.read_u8(addr)
        }
        fn read_u16(&mut self, addr: u32) -> Result<u16, MemoryError> {
            self.inner.read_u16(addr)
        }
        fn read_u32(&mut self, addr: u32) -> Result<u32, MemoryError> {
            self.inner.read_u32(addr)
        }
        fn write_u8(&mut self, addr: u32, v: u8) -> Result<(), MemoryError> {
            self.writes.push(addr);
            self.inner.write_u8(addr, v)
        }
        fn write_u16(&mut self, addr: u32, v: u16) -> Result<(), MemoryError> {
            self.writes.push(addr);
            self.inner.write_u16(addr, v)
        }
        fn write_u32(&mut self, addr: u32, v: u32) -> Result<(), MemoryError> {
            self.writes.push(addr);
            self.inner.write_u32(addr, v)
        }
        fn patch_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<Vec<u8>, MemoryError> {
            self.inner.patch_bytes(offset, bytes)
        }
    }

    #[test]
    fn test_context_written_before_buffer_a_once_per_cycle() {
        let munger = crate::munger::Munger {
            offsets: &crate::offsets::BPEE_00,
        };
        let mut core = Recorder {
            inner: MemoryImage::new(&[]),
            writes: vec![],
        };
        let mut sync = Synchronizer::new();
        let context = ContextVars {
            attacker: 0,
            target: 1,
            effect_battler: 1,
            absent_flags: 0,
        };

        assert!(sync.bind_command(&mut core, &munger, 1, 1, &context, &[0x0a; 4]).unwrap());

        let ewram = &crate::offsets::BPEE_00.ewram;
        let buffer_a = ewram.battle_buffers_a + crate::BUFFER_SIZE as u32;
        let first_buffer_write = core.writes.iter().position(|&a| a == buffer_a).unwrap();
        let last_context_write = core
            .writes
            .iter()
            .rposition(|&a| a == ewram.battler_attacker || a == ewram.battler_target)
            .unwrap();
        assert!(last_context_write < first_buffer_write);

        let n = core.writes.len();
        assert!(!sync.bind_command(&mut core, &munger, 1, 1, &context, &[0x0a; 4]).unwrap());
        assert_eq!(core.writes.len(), n);

        assert!(sync.bind_command(&mut core, &munger, 1, 2, &context, &[0x0b; 4]).unwrap());
    }
}
