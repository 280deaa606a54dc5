use crate::mem::{Memory, MemoryError};

#[derive(Clone, Copy)]
pub struct Munger {
    pub offsets: &'static crate::offsets::Offsets,
}

impl Munger {
    pub fn exec_flags(&self, core: &mut dyn Memory) -> Result<u32, MemoryError> {
        core.read_u32(self.offsets.ewram.exec_flags)
    }

    pub fn set_exec_flags(&self, core: &mut dyn Memory, v: u32) -> Result<(), MemoryError> {
        core.write_u32(self.offsets.ewram.exec_flags, v)
    }

    pub fn clear_exec_bit(&self, core: &mut dyn Memory, slot: usize) -> Result<(), MemoryError> {
        let flags = self.exec_flags(core)?;
        self.set_exec_flags(core, flags & !(1 << slot))
    }

    pub fn set_exec_bit(&self, core: &mut dyn Memory, slot: usize) -> Result<(), MemoryError> {
        let flags = self.exec_flags(core)?;
        self.set_exec_flags(core, flags | (1 << slot))
    }

    fn buffer_addr(base: u32, slot: usize) -> u32 {
        base + (slot * crate::BUFFER_SIZE) as u32
    }

    pub fn buffer_a(&self, core: &mut dyn Memory, slot: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; crate::BUFFER_SIZE];
        core.read_range(Self::buffer_addr(self.offsets.ewram.battle_buffers_a, slot), &mut buf)?;
        Ok(buf)
    }

    pub fn set_buffer_a(&self, core: &mut dyn Memory, slot: usize, buf: &[u8]) -> Result<(), MemoryError> {
        core.write_range(
            Self::buffer_addr(self.offsets.ewram.battle_buffers_a, slot),
            &buf[..buf.len().min(crate::BUFFER_SIZE)],
        )
    }

    pub fn buffer_b(&self, core: &mut dyn Memory, slot: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; crate::BUFFER_SIZE];
        core.read_range(Self::buffer_addr(self.offsets.ewram.battle_buffers_b, slot), &mut buf)?;
        Ok(buf)
    }

    pub fn set_buffer_b(&self, core: &mut dyn Memory, slot: usize, buf: &[u8]) -> Result<(), MemoryError> {
        core.write_range(
            Self::buffer_addr(self.offsets.ewram.battle_buffers_b, slot),
            &buf[..buf.len().min(crate::BUFFER_SIZE)],
        )
    }

    pub fn context_vars(&self, core: &mut dyn Memory) -> Result<crate::context::ContextVars, MemoryError> {
        Ok(crate::context::ContextVars {
            attacker: core.read_u8(self.offsets.ewram.battler_attacker)?,
            target: core.read_u8(self.offsets.ewram.battler_target)?,
            effect_battler: core.read_u8(self.offsets.ewram.effect_battler)?,
            absent_flags: core.read_u8(self.offsets.ewram.absent_battler_flags)?,
        })
    }

    pub fn set_context_vars(
        &self,
        core: &mut dyn Memory,
        context: &crate::context::ContextVars,
    ) -> Result<(), MemoryError> {
        core.write_u8(self.offsets.ewram.battler_attacker, context.attacker)?;
        core.write_u8(self.offsets.ewram.battler_target, context.target)?;
        core.write_u8(self.offsets.ewram.effect_battler, context.effect_battler)?;
        core.write_u8(self.offsets.ewram.absent_battler_flags, context.absent_flags)?;
        Ok(())
    }

    pub fn player_party(&self, core: &mut dyn Memory) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; self.offsets.team_size];
        core.read_range(self.offsets.ewram.player_party, &mut buf)?;
        Ok(buf)
    }

    pub fn enemy_party(&self, core: &mut dyn Memory) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; self.offsets.team_size];
        core.read_range(self.offsets.ewram.enemy_party, &mut buf)?;
        Ok(buf)
    }

    pub fn set_enemy_party(&self, core: &mut dyn Memory, buf: &[u8]) -> Result<(), MemoryError> {
        core.write_range(self.offsets.ewram.enemy_party, buf)
    }

    pub fn battle_type_flags(&self, core: &mut dyn Memory) -> Result<u32, MemoryError> {
        core.read_u32(self.offsets.ewram.battle_type_flags)
    }

    pub fn set_battle_type_flags(&self, core: &mut dyn Memory, v: u32) -> Result<(), MemoryError> {
        core.write_u32(self.offsets.ewram.battle_type_flags, v)
    }

    /// Battle type flags for a link trainer battle in `format`, as seen by `role`, keeping any unrelated bits of
    /// `flags`.
    pub fn link_battle_type(&self, flags: u32, role: crate::role::Role, format: crate::role::BattleFormat) -> u32 {
        let bits = &self.offsets.battle_type;
        let mut flags = (flags & !(bits.double | bits.is_master)) | bits.link | bits.trainer;
        if role == crate::role::Role::Master {
            flags |= bits.is_master;
        }
        if format == crate::role::BattleFormat::Doubles {
            flags |= bits.double;
        }
        flags
    }

    pub fn setup_state(&self, core: &mut dyn Memory) -> Result<u8, MemoryError> {
        core.read_u8(self.offsets.ewram.battle_communication)
    }

    pub fn set_setup_state(&self, core: &mut dyn Memory, v: u8) -> Result<(), MemoryError> {
        core.write_u8(self.offsets.ewram.battle_communication, v)
    }

    pub fn battle_active(&self, core: &mut dyn Memory) -> Result<bool, MemoryError> {
        Ok(core.read_u8(self.offsets.iwram.main_flags)? & self.offsets.iwram.in_battle_mask != 0)
    }

    pub fn battle_outcome(&self, core: &mut dyn Memory) -> Result<u8, MemoryError> {
        core.read_u8(self.offsets.ewram.battle_outcome)
    }
}
