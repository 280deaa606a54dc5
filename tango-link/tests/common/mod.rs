#![allow(dead_code)]

use tango_link::battle::{Battle, Tick};
use tango_link::config::Config;
use tango_link::mem::{Memory, MemoryImage};
use tango_link::munger::Munger;
use tango_link::offsets::BPEE_00;
use tango_link::protocol::Packet;
use tango_link::role::Role;
use tango_link::stage::LinkStage;

pub const TEAM_SIZE: usize = 600;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn munger() -> Munger {
    Munger { offsets: &BPEE_00 }
}

pub fn rom() -> Vec<u8> {
    (0..0x40000u32).map(|i| (i ^ (i >> 8)) as u8).collect()
}

/// A simulator that is in a battle, with `party_fill` as every byte of its own party.
pub fn core(party_fill: u8) -> MemoryImage {
    let mut core = MemoryImage::new(&rom());
    core.write_range(BPEE_00.ewram.player_party, &[party_fill; TEAM_SIZE])
        .unwrap();
    core.write_u8(BPEE_00.iwram.main_flags, BPEE_00.iwram.in_battle_mask)
        .unwrap();
    core
}

/// Moves the battle setup routine on by one state, unless it is waiting on the link or has not started.
pub fn step_setup(core: &mut dyn Memory) {
    let m = munger();
    let handshake = BPEE_00.handshake;
    let state = m.setup_state(core).unwrap();
    if state == 0 || state >= handshake.terminal_state || handshake.wait_states.iter().any(|(w, _)| *w == state) {
        return;
    }
    m.set_setup_state(core, state + 1).unwrap();
}

/// Has the battle engine issue `command` to `slot`.
pub fn issue(core: &mut dyn Memory, slot: usize, command: &[u8]) {
    let m = munger();
    m.set_buffer_a(core, slot, command).unwrap();
    m.set_exec_bit(core, slot).unwrap();
}

/// Has the local controller of `slot` answer with `response`.
pub fn answer(core: &mut dyn Memory, slot: usize, response: &[u8]) {
    let m = munger();
    m.set_buffer_b(core, slot, response).unwrap();
    m.clear_exec_bit(core, slot).unwrap();
}

pub fn end_battle(core: &mut dyn Memory, outcome: u8) {
    core.write_u8(BPEE_00.ewram.battle_outcome, outcome).unwrap();
    core.write_u8(BPEE_00.iwram.main_flags, 0).unwrap();
}

/// Puts the simulator back into a battle, as for a rematch.
pub fn start_battle(core: &mut dyn Memory) {
    core.write_u8(BPEE_00.ewram.battle_outcome, 0).unwrap();
    core.write_u8(BPEE_00.iwram.main_flags, BPEE_00.iwram.in_battle_mask)
        .unwrap();
}

pub fn ping() -> Packet {
    Packet::Ping(tango_link::protocol::Ping {
        ts: std::time::SystemTime::now(),
    })
}

pub fn stage_transitions(packets: &[Packet]) -> Vec<LinkStage> {
    packets
        .iter()
        .filter_map(|p| match p {
            Packet::StageTransition(t) => Some(t.stage),
            _ => None,
        })
        .collect()
}

pub struct Sim {
    pub core: MemoryImage,
    pub battle: Battle,
    pub sent: Vec<Packet>,
}

impl Sim {
    pub fn new(role: Role, config: &Config, party_fill: u8) -> Self {
        Self {
            core: core(party_fill),
            battle: Battle::new(&BPEE_00, role, config),
            sent: vec![],
        }
    }

    pub fn tick(&mut self, inbound: Vec<Packet>) -> Tick {
        step_setup(&mut self.core);
        let tick = self.battle.tick(&mut self.core, inbound);
        self.sent.extend(tick.outbound.iter().cloned());
        tick
    }
}

/// Two simulators wired back to back, with packets delivered on the tick after they were sent.
pub struct Pair {
    pub master: Sim,
    pub slave: Sim,
    pub to_master: Vec<Packet>,
    pub to_slave: Vec<Packet>,
}

impl Pair {
    pub fn new(config: &Config) -> Self {
        let mut master = Sim::new(Role::Master, config, 0xaa);
        let mut slave = Sim::new(Role::Slave, config, 0x55);
        let master_team = master.battle.read_local_team(&mut master.core).unwrap();
        let slave_team = slave.battle.read_local_team(&mut slave.core).unwrap();
        master.battle.begin(&mut master.core, slave_team).unwrap();
        slave.battle.begin(&mut slave.core, master_team).unwrap();
        Self {
            master,
            slave,
            to_master: vec![],
            to_slave: vec![],
        }
    }

    pub fn tick(&mut self) -> (Tick, Tick) {
        let master = self.master.tick(std::mem::take(&mut self.to_master));
        self.to_slave.extend(master.outbound.iter().cloned());
        let slave = self.slave.tick(std::mem::take(&mut self.to_slave));
        self.to_master.extend(slave.outbound.iter().cloned());
        (master, slave)
    }

    /// Like [`Pair::run_until_main_loop`], but both sides also hear a ping every tick.
    pub fn run_until_main_loop_with_pings(&mut self) {
        for _ in 0..64 {
            if self.master.battle.stage() == LinkStage::MainLoop && self.slave.battle.stage() == LinkStage::MainLoop {
                return;
            }
            self.to_master.push(ping());
            self.to_slave.push(ping());
            self.tick();
        }
        panic!("stuck before main loop");
    }

    pub fn run_until_main_loop(&mut self) {
        for _ in 0..64 {
            if self.master.battle.stage() == LinkStage::MainLoop && self.slave.battle.stage() == LinkStage::MainLoop {
                return;
            }
            self.tick();
        }
        panic!(
            "stuck before main loop: master {:?}, slave {:?}",
            self.master.battle.stage(),
            self.slave.battle.stage()
        );
    }
}
