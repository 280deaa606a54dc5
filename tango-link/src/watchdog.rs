use crate::mem::{Memory, MemoryError};
use crate::role::{SlotRole, SlotTable};

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// Nothing was relayed in either direction while we were waiting on the remote.
    RelayTimeout,
    /// Nothing at all arrived from the remote.
    HeartbeatTimeout,
    /// No battler made progress, whatever the traffic looked like.
    SafetyTimeout,
    MidBattleDisconnect,
    Cancelled,
    /// Simulator memory could not be accessed mid-battle.
    MemoryFault,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub relay_ticks: u32,
    pub heartbeat_ticks: u32,
    pub safety_ticks: u32,
}

#[derive(Default)]
struct Counter {
    idle: u32,
    seen: bool,
}

impl Counter {
    fn step(&mut self) -> u32 {
        if std::mem::take(&mut self.seen) {
            self.idle = 0;
        } else {
            self.idle += 1;
        }
        self.idle
    }
}

/// The three watchdogs, counted in ticks.
///
/// Activity noted during a tick resets the corresponding counter at the end of that tick, so a watchdog with
/// threshold `n` fires on the `n + 1`th quiet tick.
pub struct Watchdogs {
    thresholds: Thresholds,
    relay: Counter,
    heartbeat: Counter,
    safety: Counter,
}

impl Watchdogs {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            relay: Counter::default(),
            heartbeat: Counter::default(),
            safety: Counter::default(),
        }
    }

    pub fn reset(&mut self) {
        self.relay = Counter::default();
        self.heartbeat = Counter::default();
        self.safety = Counter::default();
    }

    pub fn note_relay(&mut self) {
        self.relay.seen = true;
    }

    pub fn note_inbound(&mut self) {
        self.heartbeat.seen = true;
    }

    pub fn note_progress(&mut self) {
        self.safety.seen = true;
    }

    /// Ends a tick. The relay watchdog only runs while a remote battler owes us an answer.
    pub fn tick(&mut self, awaiting_remote: bool) -> Option<AbortReason> {
        if !awaiting_remote {
            self.relay.seen = true;
        }
        let relay_idle = self.relay.step();
        let heartbeat_idle = self.heartbeat.step();
        let safety_idle = self.safety.step();

        if relay_idle > self.thresholds.relay_ticks {
            Some(AbortReason::RelayTimeout)
        } else if heartbeat_idle > self.thresholds.heartbeat_ticks {
            Some(AbortReason::HeartbeatTimeout)
        } else if safety_idle > self.thresholds.safety_ticks {
            Some(AbortReason::SafetyTimeout)
        } else {
            None
        }
    }
}

struct Termination {
    reason: AbortReason,
    elapsed: u32,
}

/// Ends a stuck battle through the simulator's own exit path.
///
/// The retreat command is written into each local battler's Buffer A on every tick of the termination window, since a
/// single write can be sampled over. Remote battlers still owing an answer get the forfeit response.
pub struct Terminator {
    munger: crate::munger::Munger,
    table: SlotTable,
    ticks: u32,
    retreat_command: Vec<u8>,
    forfeit_response: Vec<u8>,
    termination: Option<Termination>,
}

impl Terminator {
    pub fn new(
        munger: crate::munger::Munger,
        table: SlotTable,
        ticks: u32,
        retreat_command: Vec<u8>,
        forfeit_response: Vec<u8>,
    ) -> Self {
        Self {
            munger,
            table,
            ticks,
            retreat_command,
            forfeit_response,
            termination: None,
        }
    }

    pub fn reset(&mut self) {
        self.termination = None;
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.termination.as_ref().map(|t| t.reason)
    }

    pub fn is_terminating(&self) -> bool {
        self.termination.is_some()
    }

    pub fn begin(&mut self, reason: AbortReason) {
        if let Some(termination) = self.termination.as_ref() {
            log::warn!(
                "already terminating because of {:?}, ignoring {:?}",
                termination.reason,
                reason
            );
            return;
        }
        log::error!("forcing battle termination: {:?}", reason);
        self.termination = Some(Termination { reason, elapsed: 0 });
    }

    /// Runs one tick of termination. Returns true once the retreat window is over.
    ///
    /// Remote slots keep being answered with the forfeit after the window, until the simulator leaves the battle.
    pub fn tick(&mut self, core: &mut dyn Memory) -> Result<bool, MemoryError> {
        let termination = match self.termination.as_mut() {
            Some(termination) => termination,
            None => {
                return Ok(false);
            }
        };

        if termination.elapsed < self.ticks {
            for slot in self.table.slots_with_role(SlotRole::LocalHuman) {
                self.munger.set_buffer_a(core, slot, &self.retreat_command)?;
                if termination.elapsed == 0 {
                    self.munger.set_exec_bit(core, slot)?;
                }
            }
            termination.elapsed += 1;
        }

        let flags = self.munger.exec_flags(core)?;
        for slot in self.table.slots_with_role(SlotRole::RemoteRelayed) {
            if flags & (1 << slot) != 0 {
                self.munger.set_buffer_b(core, slot, &self.forfeit_response)?;
                self.munger.clear_exec_bit(core, slot)?;
            }
        }

        Ok(termination.elapsed >= self.ticks)
    }
}
