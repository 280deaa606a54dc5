use crate::mem::Memory;
use crate::stage::LinkStage;

/// Copies parties between the two simulators.
///
/// A party is handled as an opaque blob: the simulator encrypts and checksums it itself, so it must arrive
/// byte-for-byte.
#[derive(Clone, Copy)]
pub struct TeamExchange {
    munger: crate::munger::Munger,
}

impl TeamExchange {
    pub fn new(munger: crate::munger::Munger) -> Self {
        Self { munger }
    }

    pub fn team_size(&self) -> usize {
        self.munger.offsets.team_size
    }

    pub fn read_local_team(&self, core: &mut dyn Memory) -> Result<Vec<u8>, crate::Error> {
        Ok(self.munger.player_party(core)?)
    }

    pub fn validate(&self, team: &[u8]) -> Result<(), crate::Error> {
        if team.len() != self.team_size() {
            return Err(crate::Error::Validation {
                expected: self.team_size(),
                actual: team.len(),
            });
        }
        Ok(())
    }

    /// Writes the remote party over the opposing party.
    ///
    /// Only valid while preparing, before the simulator's own setup can overwrite it, or during the handshake when
    /// it is being re-applied.
    pub fn inject_opposing_team(
        &self,
        core: &mut dyn Memory,
        stage: LinkStage,
        team: &[u8],
    ) -> Result<(), crate::Error> {
        if !matches!(stage, LinkStage::Preparing | LinkStage::Handshaking(_)) {
            return Err(crate::Error::InvalidStage {
                action: "inject opposing team",
                stage,
            });
        }
        self.validate(team)?;
        self.munger.set_enemy_party(core, team)?;
        Ok(())
    }
}
