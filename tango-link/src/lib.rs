//! Link battle synchronization.
//!
//! Two copies of a link-cable battle simulator are made to play one battle over an ordinary network connection: the
//! hardware link checks are patched out and the per-battler controller buffers are relayed instead.

#[macro_use]
extern crate lazy_static;

pub mod battle;
pub mod config;
pub mod context;
mod error;
pub mod mem;
pub mod munger;
pub mod negotiation;
pub mod net;
pub mod offsets;
pub mod patch;
pub mod protocol;
pub mod relay;
pub mod role;
pub mod session;
pub mod stage;
pub mod team;
pub mod watchdog;

pub use error::Error;

/// Number of battler slots the simulator has.
pub const MAX_BATTLERS: usize = 4;

/// Capacity of each controller buffer, in bytes.
pub const BUFFER_SIZE: usize = 0x200;

/// Frame rate of the host, used to turn watchdog durations into ticks.
pub const EXPECTED_FPS: f32 = 16777216.0 / 280896.0;
