use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Physics step rate once logged in (default: 10)
    #[serde(default = "default_physics_fps")]
    pub physics_fps: u32,

    /// Also write logs to the data directory (default: false)
    #[serde(default)]
    pub log_to_file: bool,
}

fn default_physics_fps() -> u32 {
    10
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            physics_fps: default_physics_fps(),
            log_to_file: false,
        }
    }
}
