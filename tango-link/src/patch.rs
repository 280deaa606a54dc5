use crate::mem::Memory;

/// `movs r0, #imm; bx lr`
fn thumb_return(imm: u8) -> Vec<u8> {
    vec![imm, 0x20, 0x70, 0x47]
}

/// Two `nop`s, the width of a `bl`.
fn thumb_nop_call() -> Vec<u8> {
    vec![0xc0, 0x46, 0xc0, 0x46]
}

/// Units that a block is reported as received from.
const ALL_UNITS_RECEIVED: u8 = 0x03;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchRecord {
    pub offset: u32,
    pub patched: Vec<u8>,
    pub original: Vec<u8>,
    pub applied: bool,
}

/// The code patches needed to run a link battle without link hardware, as (code offset, bytes).
pub fn link_patches(
    offsets: &crate::offsets::Offsets,
    role: crate::role::Role,
) -> Result<Vec<(u32, Vec<u8>)>, crate::Error> {
    let rom = &offsets.rom;
    [
        (rom.is_link_connected, thumb_return(1)),
        (rom.get_multiplayer_id, thumb_return(role.multiplayer_id())),
        (rom.send_block, thumb_return(1)),
        (rom.is_link_task_finished, thumb_return(1)),
        (rom.get_block_received_status, thumb_return(ALL_UNITS_RECEIVED)),
        (rom.enemy_party_recv_copy_call, thumb_nop_call()),
    ]
    .into_iter()
    .map(|(addr, bytes)| {
        let offset = addr.checked_sub(crate::mem::ROM_BASE).ok_or(crate::Error::PatchApply {
            offset: addr,
            reason: "not a code address",
        })?;
        Ok((offset, bytes))
    })
    .collect()
}

/// The set of patches currently installed into one simulator.
pub struct Patches {
    records: Vec<PatchRecord>,
    active: bool,
}

impl Patches {
    pub fn new() -> Self {
        Self {
            records: vec![],
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// Installs the link patches for `role`.
    ///
    /// The returned guard reverts everything if it is dropped without [`PatchedGuard::commit`] being called, so a
    /// failure anywhere later in setup cannot leave the code patched. If installing any single patch fails, the ones
    /// before it are reverted before the error is returned.
    pub fn apply<'a>(
        &'a mut self,
        core: &'a mut dyn Memory,
        offsets: &crate::offsets::Offsets,
        role: crate::role::Role,
    ) -> Result<PatchedGuard<'a>, crate::Error> {
        if self.active {
            return Err(crate::Error::PatchApply {
                offset: self.records.first().map(|r| r.offset).unwrap_or(0),
                reason: "patches are already applied",
            });
        }
        let patches = link_patches(offsets, role)?;

        self.active = true;
        let mut guard = PatchedGuard {
            patches: self,
            core,
            armed: true,
        };
        for (offset, bytes) in patches {
            guard.install(offset, bytes)?;
        }
        log::info!("applied {} link patches for {:?}", guard.patches.records.len(), role);
        Ok(guard)
    }

    fn install(&mut self, core: &mut dyn Memory, offset: u32, bytes: Vec<u8>) -> Result<(), crate::Error> {
        let end = offset + bytes.len() as u32;
        if self
            .records
            .iter()
            .any(|r| r.applied && offset < r.offset + r.patched.len() as u32 && r.offset < end)
        {
            return Err(crate::Error::PatchApply {
                offset,
                reason: "offset is already patched",
            });
        }

        let original = core.patch_bytes(offset, &bytes).map_err(|e| {
            log::error!("failed to patch {:#08x}: {}", offset, e);
            crate::Error::PatchApply {
                offset,
                reason: "offset is out of range",
            }
        })?;
        log::debug!("patched {:#08x}: {:02x?} -> {:02x?}", offset, original, bytes);
        self.records.push(PatchRecord {
            offset,
            patched: bytes,
            original,
            applied: true,
        });
        Ok(())
    }

    /// Restores every applied patch, most recent first, and forgets them.
    ///
    /// Reverting when no patches are applied is an error: it means revert was called twice for one apply.
    pub fn revert(&mut self, core: &mut dyn Memory) -> Result<(), crate::Error> {
        if !self.active {
            return Err(crate::Error::NotPatched);
        }
        self.active = false;

        let mut first_err = None;
        let n = self.records.len();
        for record in self.records.drain(..).rev() {
            if !record.applied {
                continue;
            }
            if let Err(e) = core.patch_bytes(record.offset, &record.original) {
                log::error!("failed to revert patch at {:#08x}: {}", record.offset, e);
                first_err.get_or_insert(e);
            }
        }
        log::info!("reverted {} link patches", n);

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Holds freshly applied patches until setup has finished.
pub struct PatchedGuard<'a> {
    patches: &'a mut Patches,
    core: &'a mut dyn Memory,
    armed: bool,
}

impl<'a> PatchedGuard<'a> {
    fn install(&mut self, offset: u32, bytes: Vec<u8>) -> Result<(), crate::Error> {
        self.patches.install(&mut *self.core, offset, bytes)
    }

    pub fn core(&mut self) -> &mut dyn Memory {
        &mut *self.core
    }

    /// Keeps the patches in place. They must be reverted later with [`Patches::revert`].
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for PatchedGuard<'a> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::warn!("setup did not complete, reverting link patches");
        if let Err(e) = self.patches.revert(&mut *self.core) {
            log::error!("failed to revert link patches: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemoryImage, ROM_BASE};

    fn rom() -> Vec<u8> {
        (0..0x40000u32).map(|i| (i * 7) as u8).collect()
    }

    #[test]
    fn test_apply_revert_restores_rom() {
        for role in [crate::role::Role::Master, crate::role::Role::Slave] {
            let original = rom();
            let mut core = MemoryImage::new(&original);
            let mut patches = Patches::new();
            patches.apply(&mut core, &crate::offsets::BPEE_00, role).unwrap().commit();
            assert!(patches.is_active());
            assert_ne!(core.rom(), &original[..]);
            patches.revert(&mut core).unwrap();
            assert_eq!(core.rom(), &original[..]);
            assert!(patches.records().is_empty());
        }
    }

    #[test]
    fn test_multiplayer_id_depends_on_role() {
        let mut core = MemoryImage::new(&rom());
        let mut patches = Patches::new();
        patches
            .apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Slave)
            .unwrap()
            .commit();
        let offset = crate::offsets::BPEE_00.rom.get_multiplayer_id - ROM_BASE;
        assert_eq!(&core.rom()[offset as usize..offset as usize + 4], &[0x01, 0x20, 0x70, 0x47]);
    }

    #[test]
    fn test_double_revert_is_error() {
        let mut core = MemoryImage::new(&rom());
        let mut patches = Patches::new();
        patches
            .apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Master)
            .unwrap()
            .commit();
        patches.revert(&mut core).unwrap();
        assert!(matches!(patches.revert(&mut core), Err(crate::Error::NotPatched)));
    }

    #[test]
    fn test_double_apply_is_error() {
        let mut core = MemoryImage::new(&rom());
        let mut patches = Patches::new();
        patches
            .apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Master)
            .unwrap()
            .commit();
        assert!(matches!(
            patches.apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Master),
            Err(crate::Error::PatchApply { .. })
        ));
    }

    #[test]
    fn test_dropped_guard_reverts() {
        let original = rom();
        let mut core = MemoryImage::new(&original);
        let mut patches = Patches::new();
        drop(patches.apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Master).unwrap());
        assert!(!patches.is_active());
        assert_eq!(core.rom(), &original[..]);
    }

    #[test]
    fn test_out_of_range_rolls_back() {
        // Too small for the last patch.
        let original = vec![0x55u8; 0x3787a];
        let mut core = MemoryImage::new(&original);
        let mut patches = Patches::new();
        assert!(matches!(
            patches.apply(&mut core, &crate::offsets::BPEE_00, crate::role::Role::Master),
            Err(crate::Error::PatchApply { .. })
        ));
        assert!(!patches.is_active());
        assert_eq!(core.rom(), &original[..]);
    }
}
