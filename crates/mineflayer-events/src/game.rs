use tokio::sync::mpsc::UnboundedSender;

use crate::{Block, Control, EntityPosition, GameEvent, Int3D};

/// Channel the game layer pushes its events into
pub type EventSink = UnboundedSender<GameEvent>;

/// Operations the script host consumes from the game layer
///
/// Implementations are shared between the script host's worker thread
/// and whatever thread drives the network, so every method takes `&self`.
pub trait Game: Send + Sync + 'static {
    /// Register the channel that receives [`GameEvent`]s from now on
    fn subscribe(&self, sink: EventSink);

    /// Begin connecting to the server
    fn start(&self);

    /// Tear the session down; `code` becomes the process exit status
    fn shutdown(&self, code: i32);

    fn send_chat(&self, message: &str);

    fn player_health(&self) -> i32;

    fn block_at(&self, point: Int3D) -> Block;

    fn player_position(&self) -> EntityPosition;

    /// Maximum stack size for an item type
    fn item_stack_height(&self, item_type: i32) -> i32;

    fn set_control_activated(&self, control: Control, activated: bool);

    /// Advance the simulation by `elapsed_seconds` of wall-clock time
    fn do_physics(&self, elapsed_seconds: f32);
}
