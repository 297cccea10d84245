//! Strategy driver: replays bars through the risk gate, the signal feed and
//! the account.

pub mod loop_runner;
pub mod state;

pub use loop_runner::Replay;
pub use state::{
    round_to, BarFault, EntryLevels, FaultStage, ReplayConfig, ReplayError, ReplayReport,
    StopMode,
};
