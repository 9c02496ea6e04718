pub mod account_config;
pub mod mineflayer_config;
pub mod scripting_config;

pub use account_config::AccountConfig;
pub use mineflayer_config::{ConfigLoadError, MineflayerConfig, DEFAULT_USERNAME};
pub use scripting_config::ScriptingConfig;
