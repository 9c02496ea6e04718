/// Host runtime for loading and executing JavaScript bot scripts
///
/// A script is evaluated inside a QuickJS context living on a dedicated
/// worker thread. The host installs the `mf` bridge object, relays game
/// events into script handlers, multiplexes script timers and drives the
/// physics tick once the session is logged in.
pub mod bridge;
pub mod context;
pub mod dispatcher;
pub mod enums;
pub mod error;
pub mod script_runner;
pub mod tick;
pub mod timer;

pub use bridge::{ArgKind, ArgumentError, Signature, BRIDGE_FUNCTIONS};
pub use context::{ScriptContext, TimedFunction};
pub use dispatcher::{raise_event, EventArg};
pub use enums::{EnumNamespace, EnumParseError};
pub use error::{HostError, ScriptError, ScriptFailure};
pub use script_runner::{HostExit, HostHandle, HostRequest, ScriptRunner, ScriptRunnerBuilder};
pub use tick::{TickDriver, PHYSICS_FPS};
pub use timer::{TimerId, TimerMultiplexer};

/// Name of the global object holding every bridge function
pub const BRIDGE_NAMESPACE: &str = "mf";

/// Message of the error thrown by `mf.exit`
pub const EXIT_SENTINEL: &str = "SystemExit";

/// Bootstrap expression producing the handler map
pub const CREATE_HANDLERS: &str = include_str!("resources/create_handlers.js");

/// Item type constants exposed as `mf.ItemType`
pub const ITEM_TYPE_ENUM: &str = include_str!("resources/ItemTypeEnum.h");
