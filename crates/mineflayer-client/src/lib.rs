//! Everything the `mineflayer` binary needs around the script host:
//! the configuration file and a local game session implementing
//! [`mineflayer_events::Game`].

pub mod config;
pub mod offline;

pub use config::{ConfigLoadError, MineflayerConfig};
pub use offline::OfflineGame;
