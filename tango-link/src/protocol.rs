use bincode::Options;

pub const VERSION: u8 = 0x02;

lazy_static! {
    static ref BINCODE_OPTIONS: bincode::config::WithOtherLimit<
        bincode::config::WithOtherIntEncoding<bincode::config::DefaultOptions, bincode::config::VarintEncoding>,
        bincode::config::Bounded,
    > = bincode::DefaultOptions::new()
        .with_varint_encoding()
        .with_limit(64 * 1024);
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub enum Packet {
    // Pre-battle.
    PlayerInfo(PlayerInfo),
    TeamData(TeamData),
    Ready(Ready),

    // Ping.
    Ping(Ping),
    Pong(Pong),

    // In battle.
    BufferCommand(RelayMessage),
    StageTransition(StageTransition),
    BattleEnd(BattleEnd),
}

impl Packet {
    pub fn serialize(&self) -> bincode::Result<Vec<u8>> {
        BINCODE_OPTIONS.serialize(self)
    }

    pub fn deserialize(d: &[u8]) -> bincode::Result<Self> {
        BINCODE_OPTIONS.deserialize(d)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub version: u8,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct TeamData {
    pub bytes: Vec<u8>,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Ready {}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Ping {
    pub ts: std::time::SystemTime,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Pong {
    pub ts: std::time::SystemTime,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayKind {
    /// Buffer A, as issued by the sender's battle engine.
    Command,
    /// Buffer B, as written by the sender's own controller.
    Response,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct RelayMessage {
    pub kind: RelayKind,
    pub slot: u8,
    pub stage: crate::stage::LinkStage,
    /// Command cycle of `slot` this message belongs to, starting from 1.
    pub cycle: u32,
    pub bytes: Vec<u8>,
    pub context: Option<crate::context::ContextVars>,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct StageTransition {
    pub stage: crate::stage::LinkStage,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct BattleEnd {
    /// From the sender's point of view.
    pub outcome: crate::battle::BattleOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_message_wire() {
        let packet = Packet::BufferCommand(RelayMessage {
            kind: RelayKind::Command,
            slot: 1,
            stage: crate::stage::LinkStage::MainLoop,
            cycle: 3,
            bytes: vec![0x12, 0x02, 0x01],
            context: Some(crate::context::ContextVars {
                attacker: 0,
                target: 1,
                effect_battler: 0,
                absent_flags: 0,
            }),
        });
        let buf = packet.serialize().unwrap();
        assert_eq!(Packet::deserialize(&buf).unwrap(), packet);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Packet::deserialize(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_oversized_is_rejected() {
        let packet = Packet::TeamData(TeamData {
            bytes: vec![0; 128 * 1024],
        });
        assert!(packet.serialize().is_err());
    }
}
