use crate::battle::{Battle, BattleOutcome};
use crate::mem::Memory;
use crate::negotiation::Negotiation;
use crate::net::Transport;
use crate::protocol::{self, Packet};
use crate::stage::LinkStage;

enum Mode {
    Negotiating(Negotiation),
    InBattle,
    Done(BattleOutcome),
}

/// Drives one link battle from the host's frame callback: negotiation first, then the battle itself.
pub struct Session<T: Transport> {
    transport: T,
    battle: Battle,
    mode: Mode,
    ping_interval: u32,
    frames_since_ping: u32,
    disconnect_reported: bool,
}

impl<T: Transport> Session<T> {
    /// Starts negotiating: our player info and local team are sent right away.
    pub fn new(
        mut transport: T,
        battle: Battle,
        config: &crate::config::Config,
        core: &mut dyn Memory,
        name: &str,
    ) -> anyhow::Result<Self> {
        let local_team = battle.read_local_team(core)?;
        let team_size = local_team.len();
        for packet in Negotiation::hello(name, local_team) {
            transport.send(&packet)?;
        }
        Ok(Self {
            transport,
            battle,
            mode: Mode::Negotiating(Negotiation::new(team_size)),
            ping_interval: config.fps.round().max(1.0) as u32,
            frames_since_ping: 0,
            disconnect_reported: false,
        })
    }

    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    pub fn outcome(&self) -> Option<BattleOutcome> {
        match self.mode {
            Mode::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_negotiating(&self) -> bool {
        matches!(self.mode, Mode::Negotiating(_))
    }

    /// Call once per host frame. Returns the outcome on the frame the battle ends.
    pub fn on_frame(&mut self, core: &mut dyn Memory) -> anyhow::Result<Option<BattleOutcome>> {
        let mut inbound = self.transport.poll().into_iter();

        if let Mode::Negotiating(negotiation) = &mut self.mode {
            for packet in inbound.by_ref() {
                negotiation.receive(packet).map_err(crate::Error::from)?;
                if negotiation.is_ready() {
                    break;
                }
            }
            let remote_team = match negotiation.take_remote_team() {
                Some(remote_team) => remote_team,
                None => {
                    if !self.transport.is_connected() {
                        anyhow::bail!("remote disconnected during negotiation");
                    }
                    return Ok(None);
                }
            };
            self.battle.begin(core, remote_team)?;
            self.mode = Mode::InBattle;
        }

        if !matches!(self.mode, Mode::InBattle) {
            return Ok(None);
        }

        if !self.transport.is_connected() && !self.disconnect_reported {
            self.disconnect_reported = true;
            self.battle.disconnected();
        }

        let tick = self.battle.tick(core, inbound);
        for packet in tick.outbound.iter() {
            self.send(packet);
        }

        self.frames_since_ping += 1;
        if self.frames_since_ping >= self.ping_interval && self.battle.stage() != LinkStage::Idle {
            self.frames_since_ping = 0;
            self.send(&Packet::Ping(protocol::Ping {
                ts: std::time::SystemTime::now(),
            }));
        }

        if let Some(outcome) = tick.ended {
            self.mode = Mode::Done(outcome);
        }
        Ok(tick.ended)
    }

    /// Gives up on the battle from wherever it is.
    pub fn cancel(&mut self, core: &mut dyn Memory) -> Option<BattleOutcome> {
        let tick = self.battle.cancel(core);
        for packet in tick.outbound.iter() {
            self.send(packet);
        }
        let outcome = tick.ended.unwrap_or(BattleOutcome::Aborted);
        self.mode = Mode::Done(outcome);
        tick.ended
    }

    fn send(&mut self, packet: &Packet) {
        if let Err(e) = self.transport.send(packet) {
            log::warn!("failed to send packet: {}", e);
        }
    }
}
