use mineflayer_events::{GameEvent, Int3D};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, IntoJs, Object, Value};
use tracing::{trace, warn};

pub const ON_CHUNK_UPDATED: &str = "onChunkUpdated";
pub const ON_POSITION_UPDATED: &str = "onPositionUpdated";
pub const ON_HEALTH_CHANGED: &str = "onHealthChanged";
pub const ON_DEATH: &str = "onDeath";
pub const ON_CHAT: &str = "onChat";
pub const ON_CONNECTED: &str = "onConnected";

/// A handler argument, converted into a script value at dispatch time
#[derive(Debug, Clone, PartialEq)]
pub enum EventArg {
    Point(Int3D),
    Text(String),
}

impl<'js> IntoJs<'js> for EventArg {
    fn into_js(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            EventArg::Point(point) => Ok(int_point(ctx, point)?.into_value()),
            EventArg::Text(text) => text.into_js(ctx),
        }
    }
}

/// Map a game event onto the script event it raises, if any
///
/// Login status changes are handled by the host itself.
pub fn script_event(event: &GameEvent) -> Option<(&'static str, Vec<EventArg>)> {
    match event {
        GameEvent::ChunkUpdated { start, size } => Some((
            ON_CHUNK_UPDATED,
            vec![EventArg::Point(*start), EventArg::Point(*size)],
        )),
        GameEvent::PlayerPositionUpdated => Some((ON_POSITION_UPDATED, Vec::new())),
        GameEvent::PlayerHealthUpdated => Some((ON_HEALTH_CHANGED, Vec::new())),
        GameEvent::PlayerDied => Some((ON_DEATH, Vec::new())),
        GameEvent::ChatReceived { username, message } => Some((
            ON_CHAT,
            vec![
                EventArg::Text(username.clone()),
                EventArg::Text(message.clone()),
            ],
        )),
        GameEvent::LoginStatusUpdated(_) => None,
    }
}

/// Invoke every handler registered under `name`, in registration order
///
/// The handler list is copied before the first call, so handlers that
/// add or remove listeners only affect later raises. Dispatch stops at the
/// first handler that throws and the error is returned to the caller.
/// Returns the number of handlers invoked.
pub fn raise_event<'js>(
    ctx: &Ctx<'js>,
    handler_map: &Object<'js>,
    name: &str,
    args: Vec<EventArg>,
) -> rquickjs::Result<usize> {
    let handlers = snapshot(handler_map, name)?;
    if handlers.is_empty() {
        return Ok(0);
    }

    let args = args
        .into_iter()
        .map(|arg| arg.into_js(ctx))
        .collect::<rquickjs::Result<Vec<_>>>()?;

    trace!(target: "scripting", "Raising {} to {} handler(s)", name, handlers.len());
    for handler in &handlers {
        handler.call::<_, Value>((Rest(args.clone()),))?;
    }
    Ok(handlers.len())
}

/// Copy the current handler list for `name`
fn snapshot<'js>(handler_map: &Object<'js>, name: &str) -> rquickjs::Result<Vec<Function<'js>>> {
    let list: Value = handler_map.get(name)?;
    let Some(array) = list.as_array() else {
        return Ok(Vec::new());
    };

    let mut handlers = Vec::with_capacity(array.len());
    for index in 0..array.len() {
        let entry: Value = array.get(index)?;
        match entry.into_function() {
            Some(function) => handlers.push(function),
            None => warn!(target: "scripting", "Skipping non-function handler {} for {}", index, name),
        }
    }
    Ok(handlers)
}

/// `{x, y, z}` object for an integer coordinate
pub fn int_point<'js>(ctx: &Ctx<'js>, point: Int3D) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("x", point.x)?;
    obj.set("y", point.y)?;
    obj.set("z", point.z)?;
    Ok(obj)
}
