#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not apply patch at {offset:#010x}: {reason}")]
    PatchApply { offset: u32, reason: &'static str },

    #[error("patches were reverted without being applied")]
    NotPatched,

    #[error("team data is {actual} bytes, expected {expected}")]
    Validation { expected: usize, actual: usize },

    #[error(transparent)]
    Memory(#[from] crate::mem::MemoryError),

    #[error("cannot {action} while in stage {stage:?}")]
    InvalidStage {
        action: &'static str,
        stage: crate::stage::LinkStage,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] bincode::Error),

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] crate::negotiation::Error),
}
