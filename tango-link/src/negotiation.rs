use crate::protocol::{self, Packet};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected player info, got {0}")]
    ExpectedPlayerInfo(&'static str),

    #[error("protocol version mismatch: ours is {ours:#04x}, theirs is {theirs:#04x}")]
    ProtocolVersionMismatch { ours: u8, theirs: u8 },

    #[error("received {0} twice")]
    Duplicate(&'static str),

    #[error("ready before team data")]
    ReadyWithoutTeam,

    #[error("team data is {actual} bytes, expected {expected}")]
    InvalidTeam { expected: usize, actual: usize },
}

fn packet_name(packet: &Packet) -> &'static str {
    match packet {
        Packet::PlayerInfo(_) => "player info",
        Packet::TeamData(_) => "team data",
        Packet::Ready(_) => "ready",
        Packet::Ping(_) => "ping",
        Packet::Pong(_) => "pong",
        Packet::BufferCommand(_) => "buffer command",
        Packet::StageTransition(_) => "stage transition",
        Packet::BattleEnd(_) => "battle end",
    }
}

/// Exchange that has to finish before a battle can begin: player info, then the team, then ready.
pub struct Negotiation {
    team_size: usize,
    remote_info: Option<protocol::PlayerInfo>,
    remote_team: Option<Vec<u8>>,
    remote_ready: bool,
}

impl Negotiation {
    pub fn new(team_size: usize) -> Self {
        Self {
            team_size,
            remote_info: None,
            remote_team: None,
            remote_ready: false,
        }
    }

    /// Packets to send to the remote, in order.
    pub fn hello(name: &str, local_team: Vec<u8>) -> Vec<Packet> {
        vec![
            Packet::PlayerInfo(protocol::PlayerInfo {
                name: name.to_owned(),
                version: protocol::VERSION,
            }),
            Packet::TeamData(protocol::TeamData { bytes: local_team }),
            Packet::Ready(protocol::Ready {}),
        ]
    }

    pub fn receive(&mut self, packet: Packet) -> Result<(), Error> {
        if let Packet::Ping(_) | Packet::Pong(_) = packet {
            return Ok(());
        }

        let info = match (&self.remote_info, packet) {
            (None, Packet::PlayerInfo(info)) => info,
            (None, packet) => {
                return Err(Error::ExpectedPlayerInfo(packet_name(&packet)));
            }
            (Some(_), Packet::PlayerInfo(_)) => {
                return Err(Error::Duplicate("player info"));
            }
            (Some(_), Packet::TeamData(team)) => {
                if self.remote_team.is_some() {
                    return Err(Error::Duplicate("team data"));
                }
                if team.bytes.len() != self.team_size {
                    return Err(Error::InvalidTeam {
                        expected: self.team_size,
                        actual: team.bytes.len(),
                    });
                }
                log::info!("received remote team");
                self.remote_team = Some(team.bytes);
                return Ok(());
            }
            (Some(_), Packet::Ready(_)) => {
                if self.remote_team.is_none() {
                    return Err(Error::ReadyWithoutTeam);
                }
                log::info!("remote is ready");
                self.remote_ready = true;
                return Ok(());
            }
            (Some(_), packet) => {
                log::warn!("ignoring {} during negotiation", packet_name(&packet));
                return Ok(());
            }
        };

        if info.version != protocol::VERSION {
            return Err(Error::ProtocolVersionMismatch {
                ours: protocol::VERSION,
                theirs: info.version,
            });
        }
        log::info!("negotiating with {}", info.name);
        self.remote_info = Some(info);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.remote_ready
    }

    pub fn remote_info(&self) -> Option<&protocol::PlayerInfo> {
        self.remote_info.as_ref()
    }

    /// Takes the remote team once the remote is ready.
    pub fn take_remote_team(&mut self) -> Option<Vec<u8>> {
        if !self.remote_ready {
            return None;
        }
        self.remote_team.take()
    }
}
