use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use mineflayer_events::{
    Block, Control, EntityPosition, EventSink, Game, GameEvent, Int3D, LoginStatus,
};
use tracing::{debug, info, trace};

// Item type ids, see ItemTypeEnum.h
const AIR: i32 = 0;
const STONE: i32 = 1;
const GRASS: i32 = 2;
const DIRT: i32 = 3;
const BEDROCK: i32 = 7;

/// Height of the grass layer; the player stands on top of it
const SURFACE_Y: i32 = 63;
const GROUND_Y: f64 = (SURFACE_Y + 1) as f64;

const WALK_SPEED: f64 = 4.3;
const CROUCH_FACTOR: f64 = 0.3;
const JUMP_SPEED: f64 = 8.5;
const GRAVITY: f64 = 27.0;
const MAX_HEALTH: i32 = 20;

/// Tools and armour don't stack
const UNSTACKABLE_ITEMS: std::ops::RangeInclusive<i32> = 256..=317;

/// A single-player session on an endless flat world
///
/// Stands in for the network client so scripts can run without a server.
/// Login succeeds as soon as the session starts, chat is echoed back and
/// the player walks and jumps according to the active controls.
pub struct OfflineGame {
    username: String,
    state: Mutex<WorldState>,
}

struct WorldState {
    sink: Option<EventSink>,
    player: EntityPosition,
    controls: HashSet<Control>,
    health: i32,
}

impl WorldState {
    fn emit(&self, event: GameEvent) {
        if let Some(sink) = &self.sink {
            // The host may already be gone
            let _ = sink.send(event);
        }
    }
}

impl OfflineGame {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: Mutex::new(WorldState {
                sink: None,
                player: spawn_position(),
                controls: HashSet::new(),
                health: MAX_HEALTH,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        // Poisoning only means a panic elsewhere; the world is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn spawn_position() -> EntityPosition {
    EntityPosition {
        x: 0.5,
        y: GROUND_Y,
        z: 0.5,
        on_ground: true,
        ..Default::default()
    }
}

/// Block type of the flat world at `y`
fn column_block(y: i32) -> i32 {
    match y {
        y if y <= 0 => BEDROCK,
        y if y < 60 => STONE,
        y if y < SURFACE_Y => DIRT,
        SURFACE_Y => GRASS,
        _ => AIR,
    }
}

impl Game for OfflineGame {
    fn subscribe(&self, sink: EventSink) {
        self.state().sink = Some(sink);
    }

    fn start(&self) {
        info!("Starting offline session as {}", self.username);
        let state = self.state();
        state.emit(GameEvent::LoginStatusUpdated(LoginStatus::Success));
        state.emit(GameEvent::ChunkUpdated {
            start: Int3D::new(-16, 0, -16),
            size: Int3D::new(32, 128, 32),
        });
        state.emit(GameEvent::PlayerPositionUpdated);
    }

    fn shutdown(&self, code: i32) {
        info!("Offline session shutting down with status {}", code);
        let mut state = self.state();
        state.controls.clear();
        state.sink = None;
    }

    fn send_chat(&self, message: &str) {
        debug!("<{}> {}", self.username, message);
        self.state().emit(GameEvent::ChatReceived {
            username: self.username.clone(),
            message: message.to_string(),
        });
    }

    fn player_health(&self) -> i32 {
        self.state().health
    }

    fn block_at(&self, point: Int3D) -> Block {
        Block::new(column_block(point.y))
    }

    fn player_position(&self) -> EntityPosition {
        self.state().player
    }

    fn item_stack_height(&self, item_type: i32) -> i32 {
        if UNSTACKABLE_ITEMS.contains(&item_type) {
            1
        } else {
            64
        }
    }

    fn set_control_activated(&self, control: Control, activated: bool) {
        let mut state = self.state();
        if activated {
            state.controls.insert(control);
        } else {
            state.controls.remove(&control);
        }
    }

    fn do_physics(&self, elapsed_seconds: f32) {
        let mut state = self.state();
        let dt = elapsed_seconds as f64;
        let before = state.player;

        let axis = |positive: Control, negative: Control| {
            let held = |control| state.controls.contains(&control) as i32 as f64;
            held(positive) - held(negative)
        };
        let forward = axis(Control::Forward, Control::Back);
        let strafe = axis(Control::Right, Control::Left);
        let jumping = state.controls.contains(&Control::Jump);
        let crouching = state.controls.contains(&Control::Crouch);

        let mut speed = WALK_SPEED;
        if crouching {
            speed *= CROUCH_FACTOR;
        }
        let length = (forward * forward + strafe * strafe).sqrt();
        let (forward, strafe) = if length > 0.0 {
            (forward / length, strafe / length)
        } else {
            (0.0, 0.0)
        };

        // Yaw 0 faces +z, yaw 90 faces -x
        let yaw = (state.player.yaw as f64).to_radians();
        let (sin, cos) = yaw.sin_cos();
        let player = &mut state.player;
        player.dx = (forward * -sin + strafe * -cos) * speed;
        player.dz = (forward * cos + strafe * -sin) * speed;

        if player.on_ground && jumping {
            player.dy = JUMP_SPEED;
            player.on_ground = false;
        }
        if !player.on_ground {
            player.dy -= GRAVITY * dt;
        }

        player.x += player.dx * dt;
        player.y += player.dy * dt;
        player.z += player.dz * dt;

        if player.y <= GROUND_Y {
            player.y = GROUND_Y;
            player.dy = 0.0;
            player.on_ground = true;
        }

        let moved = player.x != before.x || player.y != before.y || player.z != before.z;
        if moved {
            trace!("Player at ({:.2}, {:.2}, {:.2})", player.x, player.y, player.z);
            state.emit(GameEvent::PlayerPositionUpdated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn subscribed() -> (OfflineGame, mpsc::UnboundedReceiver<GameEvent>) {
        let game = OfflineGame::new("steve");
        let (tx, rx) = mpsc::unbounded_channel();
        game.subscribe(tx);
        (game, rx)
    }

    #[test]
    fn test_flat_world_column() {
        let game = OfflineGame::new("steve");
        let block = |y| game.block_at(Int3D::new(12, y, -40)).item_type();
        assert_eq!(block(-3), BEDROCK);
        assert_eq!(block(0), BEDROCK);
        assert_eq!(block(1), STONE);
        assert_eq!(block(59), STONE);
        assert_eq!(block(60), DIRT);
        assert_eq!(block(62), DIRT);
        assert_eq!(block(63), GRASS);
        assert_eq!(block(64), AIR);
        assert_eq!(block(200), AIR);
    }

    #[test]
    fn test_item_stack_height() {
        let game = OfflineGame::new("steve");
        assert_eq!(game.item_stack_height(1), 64);
        assert_eq!(game.item_stack_height(256), 1);
        assert_eq!(game.item_stack_height(317), 1);
        assert_eq!(game.item_stack_height(318), 64);
    }

    #[test]
    fn test_start_reports_login_and_world() {
        let (game, mut rx) = subscribed();
        game.start();

        assert_eq!(
            rx.try_recv().unwrap(),
            GameEvent::LoginStatusUpdated(LoginStatus::Success)
        );
        assert!(matches!(rx.try_recv().unwrap(), GameEvent::ChunkUpdated { .. }));
        assert_eq!(rx.try_recv().unwrap(), GameEvent::PlayerPositionUpdated);
        assert!(rx.try_recv().is_err());
        assert_eq!(game.player_health(), MAX_HEALTH);
    }

    #[test]
    fn test_chat_is_echoed() {
        let (game, mut rx) = subscribed();
        game.send_chat("hello");
        assert_eq!(
            rx.try_recv().unwrap(),
            GameEvent::ChatReceived {
                username: "steve".to_string(),
                message: "hello".to_string(),
            }
        );
    }

    #[test]
    fn test_walking_forward() {
        let (game, mut rx) = subscribed();
        game.set_control_activated(Control::Forward, true);
        game.do_physics(1.0);

        let position = game.player_position();
        assert!((position.z - (0.5 + WALK_SPEED)).abs() < 1e-9);
        assert!((position.x - 0.5).abs() < 1e-9);
        assert_eq!(rx.try_recv().unwrap(), GameEvent::PlayerPositionUpdated);

        // Standing still emits nothing
        game.set_control_activated(Control::Forward, false);
        game.do_physics(1.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_jump_and_land() {
        let (game, _rx) = subscribed();
        game.set_control_activated(Control::Jump, true);
        game.do_physics(0.1);
        game.set_control_activated(Control::Jump, false);

        let airborne = game.player_position();
        assert!(!airborne.on_ground);
        assert!(airborne.y > GROUND_Y);

        for _ in 0..20 {
            game.do_physics(0.1);
        }
        let landed = game.player_position();
        assert!(landed.on_ground);
        assert_eq!(landed.y, GROUND_Y);
        assert_eq!(landed.dy, 0.0);
    }

    #[tokio::test]
    async fn test_shutdown_drops_sink() {
        let (game, mut rx) = subscribed();
        game.shutdown(0);
        assert_eq!(rx.recv().await, None);
    }
}
