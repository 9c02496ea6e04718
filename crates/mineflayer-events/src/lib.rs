//! Shared types between the script host and the game layer
//!
//! The game layer (protocol client, world storage, physics) pushes
//! [`GameEvent`]s into the script host and answers the queries of the
//! [`Game`] trait. Nothing in here knows about the scripting engine.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

mod game;

pub use game::{EventSink, Game};

// ============================================================================
// Geometry and world state
// ============================================================================

/// Integer block coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3D {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Int3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Player position, velocity and look direction as tracked by the game
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

/// A single block in the world
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Item type id, see the `ItemType` enum resource
    pub item_type: i32,
}

impl Block {
    pub fn new(item_type: i32) -> Self {
        Self { item_type }
    }

    pub fn item_type(&self) -> i32 {
        self.item_type
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Outcome of a login attempt, reported by the game layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum LoginStatus {
    Connecting,
    WaitingForHandshakeResponse,
    WaitingForLoginResponse,
    Success,
    SocketError,
    Disconnected,
}

/// Movement controls a script can hold down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Control {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Crouch,
}

impl Control {
    pub const ALL: [Control; 6] = [
        Control::Forward,
        Control::Back,
        Control::Left,
        Control::Right,
        Control::Jump,
        Control::Crouch,
    ];

    /// Convert a script-provided discriminant into a control
    pub fn from_discriminant(value: i64) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn to_discriminant(self) -> i64 {
        self as i64
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events pushed from the game layer into the script host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A region of the world finished loading or changed
    ChunkUpdated { start: Int3D, size: Int3D },
    /// The player moved (server correction or local physics)
    PlayerPositionUpdated,
    /// Login progressed or failed
    LoginStatusUpdated(LoginStatus),
    /// Chat message received from the server
    ChatReceived { username: String, message: String },
    PlayerDied,
    PlayerHealthUpdated,
}
