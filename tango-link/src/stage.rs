#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkStage {
    Idle,
    Preparing,
    Patched,
    /// Number of handshake wait states passed so far.
    Handshaking(u8),
    MainLoop,
    Ending,
}

impl LinkStage {
    pub fn can_advance_to(self, next: LinkStage) -> bool {
        match (self, next) {
            (LinkStage::Idle, LinkStage::Preparing) => true,
            (LinkStage::Preparing, LinkStage::Patched) => true,
            (LinkStage::Patched, LinkStage::Handshaking(0)) => true,
            (LinkStage::Handshaking(n), LinkStage::Handshaking(m)) => m == n + 1,
            (LinkStage::Handshaking(_), LinkStage::MainLoop) => true,
            (LinkStage::Ending, LinkStage::Idle) => true,
            (LinkStage::Idle, LinkStage::Ending) => false,
            (LinkStage::Ending, LinkStage::Ending) => false,
            (_, LinkStage::Ending) => true,
            _ => false,
        }
    }
}

/// The single active stage of a battle. Stages only ever move forward.
pub struct StageTracker {
    current: LinkStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: LinkStage::Idle,
        }
    }

    pub fn current(&self) -> LinkStage {
        self.current
    }

    pub fn advance(&mut self, next: LinkStage) -> Result<(), crate::Error> {
        if !self.current.can_advance_to(next) {
            return Err(crate::Error::InvalidStage {
                action: "advance",
                stage: self.current,
            });
        }
        log::info!("link stage: {:?} -> {:?}", self.current, next);
        self.current = next;
        Ok(())
    }

    /// Drops back to idle after a setup failure. Nothing was handed to the simulator yet.
    pub(crate) fn abandon_setup(&mut self) {
        log::info!("link stage: {:?} -> Idle (setup abandoned)", self.current);
        self.current = LinkStage::Idle;
    }
}
