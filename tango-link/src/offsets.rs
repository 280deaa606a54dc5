#[derive(Clone, Copy, Debug)]
pub struct EWRAMOffsets {
    /// Battle type flags. The link bit must be set for the link controllers to be installed.
    pub battle_type_flags: u32,

    /// Buffer A for battler 0. Buffers for the other battlers follow at `BUFFER_SIZE` strides.
    pub battle_buffers_a: u32,

    /// Buffer B for battler 0.
    pub battle_buffers_b: u32,

    /// Controller exec flags, one bit per battler in the low nibble.
    pub exec_flags: u32,

    pub absent_battler_flags: u32,
    pub battler_attacker: u32,
    pub battler_target: u32,
    pub effect_battler: u32,

    /// Nonzero once the battle has been decided.
    pub battle_outcome: u32,

    /// Battle setup state machine control. The first byte is the setup state.
    pub battle_communication: u32,

    /// The local party. This is copied to the opponent verbatim.
    pub player_party: u32,

    /// The opposing party. The remote party is injected here.
    pub enemy_party: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct IWRAMOffsets {
    /// Main state flags. `in_battle_mask` is set for as long as the battle callbacks are running.
    pub main_flags: u32,
    pub in_battle_mask: u8,
}

/// Code addresses of the routines the link patches replace. These are bus addresses.
#[derive(Clone, Copy, Debug)]
pub struct ROMOffsets {
    /// Checks whether a link partner is attached. Forced to report success.
    pub is_link_connected: u32,

    /// Returns this unit's multiplayer id. Forced to 0 on the master and 1 on the slave.
    pub get_multiplayer_id: u32,

    /// Starts a block transfer over the link.
    pub send_block: u32,

    /// Polls whether the link task has drained.
    pub is_link_task_finished: u32,

    /// Returns the bitmask of units a block has been received from.
    pub get_block_received_status: u32,

    /// Call that copies the receive buffer over the enemy party during setup.
    ///
    /// With no hardware attached the receive buffer is garbage, so this call is removed.
    pub enemy_party_recv_copy_call: u32,
}

/// The battle setup states that would normally wait on link traffic.
#[derive(Clone, Copy, Debug)]
pub struct Handshake {
    /// First setup state after the hardware check.
    pub entry_state: u8,

    /// Pairs of (waiting state, state to advance to).
    pub wait_states: &'static [(u8, u8)],

    /// Once the setup state reaches this value, the battle main loop is running.
    pub terminal_state: u8,

    /// Setup states during which the simulator may copy over the enemy party.
    pub team_reinject_states: &'static [u8],
}

/// Bits of the battle type flags the engine sets up.
#[derive(Clone, Copy, Debug)]
pub struct BattleTypeBits {
    pub double: u32,
    pub link: u32,
    /// Set on the unit with multiplayer id 0.
    pub is_master: u32,
    pub trainer: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Offsets {
    pub ewram: EWRAMOffsets,
    pub iwram: IWRAMOffsets,
    pub rom: ROMOffsets,
    pub handshake: Handshake,
    pub battle_type: BattleTypeBits,
    pub team_size: usize,
}

#[rustfmt::skip]
pub static BPEE_00: Offsets = Offsets {
    ewram: EWRAMOffsets {
        battle_type_flags:          0x02022fec,
        battle_buffers_a:           0x02023064,
        battle_buffers_b:           0x02023864,
        exec_flags:                 0x02024068,
        absent_battler_flags:       0x0202420a,
        battler_attacker:           0x0202420b,
        battler_target:             0x0202420c,
        effect_battler:             0x0202420f,
        battle_outcome:             0x0202433a,
        battle_communication:       0x02024332,
        player_party:               0x020244ec,
        enemy_party:                0x02024744,
    },
    iwram: IWRAMOffsets {
        main_flags:                 0x030026f9,
        in_battle_mask:             0x02,
    },
    rom: ROMOffsets {
        is_link_connected:          0x0800bba4,
        get_multiplayer_id:         0x0800a4b0,
        send_block:                 0x0800a448,
        is_link_task_finished:      0x0800a568,
        get_block_received_status:  0x0800a550,
        enemy_party_recv_copy_call: 0x080378d4,
    },
    handshake: Handshake {
        entry_state:                2,
        wait_states:                &[(2, 3), (4, 5), (6, 7), (10, 11)],
        terminal_state:             15,
        team_reinject_states:       &[3, 4, 5, 6, 7],
    },
    battle_type: BattleTypeBits {
        double:                     1 << 0,
        link:                       1 << 1,
        is_master:                  1 << 2,
        trainer:                    1 << 3,
    },
    team_size: 600,
};

/// Finds the offsets table for a ROM by its game code and revision.
pub fn find(game_code: &str, revision: u8) -> Option<&'static Offsets> {
    match (game_code, revision) {
        ("BPEE", 0x00) => Some(&BPEE_00),
        _ => None,
    }
}

/// Finds the offsets table by its profile key, e.g. `BPEE_00`.
pub fn find_by_key(key: &str) -> Option<&'static Offsets> {
    let (game_code, revision) = key.split_once('_')?;
    find(game_code, u8::from_str_radix(revision, 16).ok()?)
}
