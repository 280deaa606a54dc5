#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Runs the authoritative simulation: its RNG and turn order are ground truth.
    Master,
    Slave,
}

impl Role {
    /// What the patched host identity query reports.
    pub fn multiplayer_id(self) -> u8 {
        match self {
            Role::Master => 0,
            Role::Slave => 1,
        }
    }

    /// Whether a newly issued command for a slot of the given role is sent to the remote.
    ///
    /// The master sends every relayed battler's commands, because the slave's copies are only valid if they match the
    /// master's. The slave only sends its own battlers' commands, so the two sides never both author one battler.
    pub fn forwards_command(self, slot_role: SlotRole) -> bool {
        match (self, slot_role) {
            (_, SlotRole::LocalAiBypassed) => false,
            (Role::Master, _) => true,
            (Role::Slave, SlotRole::LocalHuman) => true,
            (Role::Slave, SlotRole::RemoteRelayed) => false,
        }
    }

    /// Whether commands received from the remote overwrite our own Buffer A.
    pub fn accepts_remote_commands(self) -> bool {
        self == Role::Slave
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BattleFormat {
    #[default]
    Singles,
    Doubles,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRole {
    LocalHuman,
    /// Driven by the local simulator alone. The relay never touches it.
    LocalAiBypassed,
    RemoteRelayed,
}

/// Assignment of every battler slot for one battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotTable {
    slots: [SlotRole; crate::MAX_BATTLERS],
}

impl SlotTable {
    pub fn new(role: Role, format: BattleFormat) -> Self {
        let mut slots = [SlotRole::LocalAiBypassed; crate::MAX_BATTLERS];

        let in_use = match format {
            BattleFormat::Singles => 2,
            BattleFormat::Doubles => 4,
        };

        // Even slots belong to multiplayer id 0, odd slots to multiplayer id 1.
        for (i, slot) in slots.iter_mut().take(in_use).enumerate() {
            *slot = if i % 2 == role.multiplayer_id() as usize {
                SlotRole::LocalHuman
            } else {
                SlotRole::RemoteRelayed
            };
        }

        Self { slots }
    }

    pub fn role(&self, slot: usize) -> SlotRole {
        self.slots[slot]
    }

    pub fn slots_with_role(&self, role: SlotRole) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| **s == role)
            .map(|(i, _)| i)
    }
}
