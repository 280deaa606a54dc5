use crate::mem::Memory;
use crate::protocol::{self, Packet};
use crate::role::Role;
use crate::stage::LinkStage;
use crate::watchdog::AbortReason;

#[derive(serde_repr::Serialize_repr, serde_repr::Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy)]
#[repr(u8)]
pub enum BattleOutcome {
    Win = 1,
    Loss = 2,
    Draw = 3,
    Forfeit = 4,
    Aborted = 0xff,
}

impl BattleOutcome {
    /// Decodes the simulator's outcome byte.
    pub fn from_simulator(v: u8) -> Option<Self> {
        match v {
            1 => Some(BattleOutcome::Win),
            2 => Some(BattleOutcome::Loss),
            3 => Some(BattleOutcome::Draw),
            4 | 9 => Some(BattleOutcome::Forfeit),
            _ => None,
        }
    }

    /// Turns an outcome reported by the remote into ours.
    pub fn flip(self) -> Self {
        match self {
            BattleOutcome::Win => BattleOutcome::Loss,
            BattleOutcome::Loss => BattleOutcome::Win,
            outcome => outcome,
        }
    }
}

#[derive(Default, Debug)]
pub struct Tick {
    pub outbound: Vec<Packet>,
    /// Set on the tick the battle returned to idle.
    pub ended: Option<BattleOutcome>,
}

/// One link battle against one remote simulator.
///
/// Call [`Battle::begin`] once both sides have exchanged teams, then [`Battle::tick`] once per host frame with the
/// packets received since the last frame. Everything that touches simulator memory happens inside those two calls.
pub struct Battle {
    munger: crate::munger::Munger,
    role: Role,
    format: crate::role::BattleFormat,
    team: crate::team::TeamExchange,
    patches: crate::patch::Patches,
    stage: crate::stage::StageTracker,
    relay: crate::relay::Relay,
    watchdogs: crate::watchdog::Watchdogs,
    terminator: crate::watchdog::Terminator,
    remote_team: Vec<u8>,
    remote_stage: LinkStage,
    remote_outcome: Option<BattleOutcome>,
    disconnected: bool,
    aborted: Option<AbortReason>,
    saved_battle_type: Option<u32>,
    safety_ticks: u32,
    exit_wait: u32,
    last_setup_state: Option<u8>,
    outbox: Vec<Packet>,
}

impl Battle {
    pub fn new(offsets: &'static crate::offsets::Offsets, role: Role, config: &crate::config::Config) -> Self {
        let munger = crate::munger::Munger { offsets };
        let table = crate::role::SlotTable::new(role, config.format);
        Self {
            munger,
            role,
            format: config.format,
            team: crate::team::TeamExchange::new(munger),
            patches: crate::patch::Patches::new(),
            stage: crate::stage::StageTracker::new(),
            relay: crate::relay::Relay::new(munger, role, table),
            watchdogs: crate::watchdog::Watchdogs::new(config.thresholds()),
            terminator: crate::watchdog::Terminator::new(
                munger,
                table,
                config.termination_ticks,
                config.retreat_command.clone(),
                config.forfeit_response.clone(),
            ),
            remote_team: vec![],
            remote_stage: LinkStage::Idle,
            remote_outcome: None,
            disconnected: false,
            aborted: None,
            saved_battle_type: None,
            safety_ticks: config.thresholds().safety_ticks,
            exit_wait: 0,
            last_setup_state: None,
            outbox: vec![],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stage(&self) -> LinkStage {
        self.stage.current()
    }

    pub fn remote_stage(&self) -> LinkStage {
        self.remote_stage
    }

    pub fn patches(&self) -> &crate::patch::Patches {
        &self.patches
    }

    pub fn relay(&self) -> &crate::relay::Relay {
        &self.relay
    }

    /// Why the current or last battle was cut short, if it was.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.aborted.or_else(|| self.terminator.reason())
    }

    pub fn read_local_team(&self, core: &mut dyn Memory) -> Result<Vec<u8>, crate::Error> {
        self.team.read_local_team(core)
    }

    fn advance(&mut self, stage: LinkStage) -> Result<(), crate::Error> {
        self.stage.advance(stage)?;
        self.outbox
            .push(Packet::StageTransition(protocol::StageTransition { stage }));
        Ok(())
    }

    /// Starts a battle: patches the simulator for `role` and injects the remote team.
    ///
    /// On error nothing is left patched and the battle stays idle.
    pub fn begin(&mut self, core: &mut dyn Memory, remote_team: Vec<u8>) -> Result<(), crate::Error> {
        if self.stage.current() != LinkStage::Idle {
            return Err(crate::Error::InvalidStage {
                action: "begin battle",
                stage: self.stage.current(),
            });
        }

        self.relay.reset();
        self.watchdogs.reset();
        self.terminator.reset();
        self.remote_outcome = None;
        self.disconnected = false;
        self.aborted = None;
        self.exit_wait = 0;
        self.last_setup_state = None;
        self.outbox.clear();

        self.advance(LinkStage::Preparing)?;
        log::info!("beginning link battle as {:?}", self.role);

        if let Err(e) = self.team.validate(&remote_team) {
            self.stage.abandon_setup();
            self.outbox.clear();
            return Err(e);
        }

        let mut guard = match self.patches.apply(core, self.munger.offsets, self.role) {
            Ok(guard) => guard,
            Err(e) => {
                self.stage.abandon_setup();
                self.outbox.clear();
                return Err(e);
            }
        };
        let saved_battle_type = match prepare_simulator(
            &self.team,
            &self.munger,
            self.role,
            self.format,
            guard.core(),
            &remote_team,
        ) {
            Ok(saved_battle_type) => saved_battle_type,
            Err(e) => {
                drop(guard);
                self.stage.abandon_setup();
                self.outbox.clear();
                return Err(e);
            }
        };
        guard.commit();

        self.saved_battle_type = Some(saved_battle_type);
        self.remote_team = remote_team;
        self.advance(LinkStage::Patched)?;
        Ok(())
    }

    /// Marks the connection as gone. The battle is ended on the next tick.
    pub fn disconnected(&mut self) {
        log::warn!("remote disconnected during {:?}", self.stage.current());
        self.disconnected = true;
    }

    /// Ends the battle right away from whatever stage it is in.
    pub fn cancel(&mut self, core: &mut dyn Memory) -> Tick {
        let mut tick = Tick::default();
        if self.stage.current() != LinkStage::Idle {
            log::info!("cancelling link battle during {:?}", self.stage.current());
            self.aborted = Some(AbortReason::Cancelled);
            tick.ended = Some(self.finish(core, BattleOutcome::Aborted, true));
        }
        tick.outbound = std::mem::take(&mut self.outbox);
        tick
    }

    /// Runs one host frame.
    pub fn tick(&mut self, core: &mut dyn Memory, inbound: impl IntoIterator<Item = Packet>) -> Tick {
        for packet in inbound {
            self.handle_packet(packet);
        }

        let mut tick = Tick::default();
        match self.tick_stage(core) {
            Ok(ended) => {
                tick.ended = ended;
            }
            Err(e) => {
                log::error!("link battle failed during {:?}: {}", self.stage.current(), e);
                if self.stage.current() != LinkStage::Idle {
                    self.aborted = Some(AbortReason::MemoryFault);
                    tick.ended = Some(self.finish(core, BattleOutcome::Aborted, true));
                }
            }
        }
        tick.outbound = std::mem::take(&mut self.outbox);
        tick
    }

    fn handle_packet(&mut self, packet: Packet) {
        // The remote may begin before we do, so its stage is tracked even while idle.
        if let Packet::StageTransition(transition) = &packet {
            // Idle and Preparing start over: the remote finished its battle or began a new one.
            let restart = matches!(transition.stage, LinkStage::Idle | LinkStage::Preparing);
            if transition.stage < self.remote_stage && !restart {
                log::warn!(
                    "remote stage went backwards: {:?} -> {:?}",
                    self.remote_stage,
                    transition.stage
                );
            } else {
                log::info!("remote link stage: {:?}", transition.stage);
                self.remote_stage = transition.stage;
            }
        }

        if self.stage.current() == LinkStage::Idle {
            if !matches!(packet, Packet::StageTransition(_)) {
                log::debug!("dropping packet while idle: {:?}", packet);
            }
            return;
        }
        self.watchdogs.note_inbound();

        match packet {
            Packet::BufferCommand(msg) => {
                if self.relay.receive(msg) {
                    self.watchdogs.note_relay();
                }
            }
            Packet::StageTransition(_) => {}
            Packet::BattleEnd(battle_end) => {
                log::info!("remote ended the battle: {:?}", battle_end.outcome);
                self.remote_outcome = Some(battle_end.outcome.flip());
            }
            Packet::Ping(ping) => {
                self.outbox.push(Packet::Pong(protocol::Pong { ts: ping.ts }));
            }
            Packet::Pong(_) => {}
            packet @ (Packet::PlayerInfo(_) | Packet::TeamData(_) | Packet::Ready(_)) => {
                log::warn!("dropping unexpected packet during battle: {:?}", packet);
            }
        }
    }

    fn tick_stage(&mut self, core: &mut dyn Memory) -> Result<Option<BattleOutcome>, crate::Error> {
        match self.stage.current() {
            LinkStage::Idle => Ok(None),
            LinkStage::Preparing => Err(crate::Error::InvalidStage {
                action: "tick",
                stage: LinkStage::Preparing,
            }),
            LinkStage::Patched => {
                if self.disconnected {
                    self.aborted = Some(AbortReason::MidBattleDisconnect);
                    return Ok(Some(self.finish(core, BattleOutcome::Aborted, false)));
                }
                self.munger
                    .set_setup_state(core, self.munger.offsets.handshake.entry_state)?;
                self.advance(LinkStage::Handshaking(0))?;
                Ok(None)
            }
            LinkStage::Handshaking(n) => self.tick_handshake(core, n),
            LinkStage::MainLoop => self.tick_main_loop(core),
            LinkStage::Ending => Ok(Some(self.finish(core, BattleOutcome::Aborted, true))),
        }
    }

    fn tick_handshake(&mut self, core: &mut dyn Memory, n: u8) -> Result<Option<BattleOutcome>, crate::Error> {
        if self.disconnected {
            self.aborted = Some(AbortReason::MidBattleDisconnect);
            return Ok(Some(self.finish(core, BattleOutcome::Aborted, false)));
        }
        if let Some(outcome) = self.remote_outcome {
            return Ok(Some(self.finish(core, outcome, false)));
        }

        let handshake = self.munger.offsets.handshake;
        let report = self.relay.handshake_tick(core)?;
        if report.progressed {
            self.watchdogs.note_progress();
        }

        let state = self.munger.setup_state(core)?;
        if self.last_setup_state != Some(state) {
            log::debug!("setup state: {:?} -> {}", self.last_setup_state, state);
            self.last_setup_state = Some(state);
            self.watchdogs.note_progress();
        }

        if handshake.team_reinject_states.contains(&state) {
            self.team
                .inject_opposing_team(core, self.stage.current(), &self.remote_team)?;
        }

        if state >= handshake.terminal_state {
            self.advance(LinkStage::MainLoop)?;
            self.relay.enter_main_loop();
            self.watchdogs.reset();
            return Ok(None);
        }

        if let Some(i) = handshake.wait_states.iter().position(|(wait, _)| *wait == state) {
            let is_last = i + 1 == handshake.wait_states.len();
            // Both sides must be at the last wait state before either enters the main loop.
            if is_last && self.remote_stage < LinkStage::Handshaking(n) {
                log::debug!("holding setup state {} until remote catches up", state);
            } else {
                self.munger.set_setup_state(core, handshake.wait_states[i].1)?;
                self.advance(LinkStage::Handshaking(n + 1))?;
            }
        }

        if let Some(reason) = self.watchdogs.tick(false) {
            log::error!("link battle stuck in handshake: {:?}", reason);
            self.aborted = Some(reason);
            return Ok(Some(self.finish(core, BattleOutcome::Aborted, true)));
        }
        Ok(None)
    }

    fn tick_main_loop(&mut self, core: &mut dyn Memory) -> Result<Option<BattleOutcome>, crate::Error> {
        if self.terminator.is_terminating() {
            // The simulator has to leave through its own end of battle path before the patches can come out.
            if !self.munger.battle_active(core)? {
                return Ok(Some(self.finish(core, BattleOutcome::Aborted, true)));
            }
            if self.terminator.tick(core)? {
                self.exit_wait += 1;
                if self.exit_wait > self.safety_ticks {
                    log::error!(
                        "simulator still in battle {} ticks after retreating, ending anyway",
                        self.exit_wait
                    );
                    return Ok(Some(self.finish(core, BattleOutcome::Aborted, true)));
                }
            }
            return Ok(None);
        }

        if let Some(outcome) = self.remote_outcome {
            return Ok(Some(self.finish(core, outcome, false)));
        }

        if self.disconnected {
            self.terminator.begin(AbortReason::MidBattleDisconnect);
            self.terminator.tick(core)?;
            return Ok(None);
        }

        let report = self.relay.tick(core)?;
        if report.relayed {
            self.watchdogs.note_relay();
        }
        if report.progressed {
            self.watchdogs.note_progress();
        }
        self.outbox
            .extend(report.outbound.into_iter().map(Packet::BufferCommand));

        if !self.munger.battle_active(core)? {
            let raw = self.munger.battle_outcome(core)?;
            let outcome = BattleOutcome::from_simulator(raw).unwrap_or_else(|| {
                log::warn!("unknown battle outcome {:#04x}", raw);
                BattleOutcome::Aborted
            });
            return Ok(Some(self.finish(core, outcome, true)));
        }

        if let Some(reason) = self.watchdogs.tick(self.relay.awaiting_remote()) {
            self.terminator.begin(reason);
            self.terminator.tick(core)?;
        }
        Ok(None)
    }

    /// Moves through Ending back to Idle. Patches are always reverted here.
    fn finish(&mut self, core: &mut dyn Memory, outcome: BattleOutcome, announce: bool) -> BattleOutcome {
        if self.stage.current() != LinkStage::Ending {
            if let Err(e) = self.advance(LinkStage::Ending) {
                log::error!("could not enter ending: {}", e);
            }
        }
        if announce {
            self.outbox
                .push(Packet::BattleEnd(protocol::BattleEnd { outcome }));
        }

        if let Some(flags) = self.saved_battle_type.take() {
            if let Err(e) = self.munger.set_battle_type_flags(core, flags) {
                log::error!("failed to restore battle type flags: {}", e);
            }
        }
        if self.patches.is_active() {
            if let Err(e) = self.patches.revert(core) {
                log::error!("failed to revert link patches: {}", e);
            }
        }
        self.relay.reset();
        self.remote_team.clear();

        if let Err(e) = self.advance(LinkStage::Idle) {
            log::error!("could not return to idle: {}", e);
        }
        log::info!("link battle ended: {:?}", outcome);
        outcome
    }
}

/// Puts the remote team and the link battle type in place. Returns the battle type flags to restore afterwards.
fn prepare_simulator(
    team: &crate::team::TeamExchange,
    munger: &crate::munger::Munger,
    role: Role,
    format: crate::role::BattleFormat,
    core: &mut dyn Memory,
    remote_team: &[u8],
) -> Result<u32, crate::Error> {
    team.inject_opposing_team(core, LinkStage::Preparing, remote_team)?;
    let saved = munger.battle_type_flags(core)?;
    munger.set_battle_type_flags(core, munger.link_battle_type(saved, role, format))?;
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_flip() {
        assert_eq!(BattleOutcome::Win.flip(), BattleOutcome::Loss);
        assert_eq!(BattleOutcome::Draw.flip(), BattleOutcome::Draw);
        assert_eq!(BattleOutcome::Aborted.flip(), BattleOutcome::Aborted);
    }

    #[test]
    fn test_outcome_from_simulator() {
        assert_eq!(BattleOutcome::from_simulator(1), Some(BattleOutcome::Win));
        assert_eq!(BattleOutcome::from_simulator(9), Some(BattleOutcome::Forfeit));
        assert_eq!(BattleOutcome::from_simulator(0), None);
    }

    fn battle(role: Role) -> Battle {
        Battle::new(&crate::offsets::BPEE_00, role, &crate::config::Config::default())
    }

    fn rom() -> Vec<u8> {
        (0..0x40000u32).map(|i| (i * 7) as u8).collect()
    }

    #[test]
    fn test_begin_rejects_bad_team_without_patching() {
        let rom = rom();
        let mut core = crate::mem::MemoryImage::new(&rom);
        let mut b = battle(Role::Master);
        assert!(matches!(
            b.begin(&mut core, vec![0; 10]),
            Err(crate::Error::Validation { expected: 600, actual: 10 })
        ));
        assert_eq!(b.stage(), LinkStage::Idle);
        assert!(!b.patches().is_active());
        assert_eq!(core.rom(), &rom[..]);
    }

    #[test]
    fn test_begin_patches_and_injects() {
        let mut core = crate::mem::MemoryImage::new(&rom());
        let mut b = battle(Role::Slave);
        b.begin(&mut core, vec![0x5a; 600]).unwrap();
        assert_eq!(b.stage(), LinkStage::Patched);
        assert!(b.patches().is_active());
        let m = crate::munger::Munger {
            offsets: &crate::offsets::BPEE_00,
        };
        assert_eq!(m.enemy_party(&mut core).unwrap(), vec![0x5a; 600]);

        assert!(matches!(
            b.begin(&mut core, vec![0x5a; 600]),
            Err(crate::Error::InvalidStage { .. })
        ));
    }

    #[test]
    fn test_begin_fails_cleanly_on_short_rom() {
        let mut core = crate::mem::MemoryImage::new(&[0; 0x1000]);
        let mut b = battle(Role::Master);
        assert!(matches!(
            b.begin(&mut core, vec![0; 600]),
            Err(crate::Error::PatchApply { .. })
        ));
        assert_eq!(b.stage(), LinkStage::Idle);
        assert!(!b.patches().is_active());
    }

    #[test]
    fn test_cancel_reverts() {
        let rom = rom();
        let mut core = crate::mem::MemoryImage::new(&rom);
        let mut b = battle(Role::Master);
        b.begin(&mut core, vec![0; 600]).unwrap();
        let tick = b.cancel(&mut core);
        assert_eq!(tick.ended, Some(BattleOutcome::Aborted));
        assert!(tick.outbound.contains(&Packet::BattleEnd(protocol::BattleEnd {
            outcome: BattleOutcome::Aborted
        })));
        assert_eq!(b.stage(), LinkStage::Idle);
        assert_eq!(core.rom(), &rom[..]);
    }

    #[test]
    fn test_battle_type_restored_and_idle_announced() {
        let mut core = crate::mem::MemoryImage::new(&rom());
        let m = crate::munger::Munger {
            offsets: &crate::offsets::BPEE_00,
        };
        let bits = crate::offsets::BPEE_00.battle_type;
        m.set_battle_type_flags(&mut core, bits.double).unwrap();

        let mut b = battle(Role::Master);
        b.begin(&mut core, vec![0; 600]).unwrap();
        assert_eq!(
            m.battle_type_flags(&mut core).unwrap(),
            bits.link | bits.trainer | bits.is_master
        );

        let tick = b.cancel(&mut core);
        assert_eq!(m.battle_type_flags(&mut core).unwrap(), bits.double);
        assert_eq!(
            tick.outbound.last(),
            Some(&Packet::StageTransition(protocol::StageTransition {
                stage: LinkStage::Idle
            }))
        );
    }

    #[test]
    fn test_ping_is_answered() {
        let mut core = crate::mem::MemoryImage::new(&rom());
        let mut b = battle(Role::Master);
        b.begin(&mut core, vec![0; 600]).unwrap();
        let ts = std::time::SystemTime::UNIX_EPOCH;
        let tick = b.tick(&mut core, vec![Packet::Ping(protocol::Ping { ts })]);
        assert!(tick.outbound.contains(&Packet::Pong(protocol::Pong { ts })));
    }

    #[test]
    fn test_outcome_wire_is_byte() {
        let buf = Packet::BattleEnd(protocol::BattleEnd {
            outcome: BattleOutcome::Aborted,
        })
        .serialize()
        .unwrap();
        assert_eq!(buf.last(), Some(&0xff));
    }
}
