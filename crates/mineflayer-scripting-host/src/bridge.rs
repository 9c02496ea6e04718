use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use mineflayer_events::{Control, Int3D};
use rquickjs::function::Rest;
use rquickjs::{Coerced, Ctx, Exception, Function, IntoJs, Object, Persistent, Value};
use tracing::{debug, trace};

use crate::context::{ScriptContext, TimedFunction};
use crate::error::ScriptError;
use crate::timer::TimerId;
use crate::EXIT_SENTINEL;

/// Thrown by every bridge call once an included file has failed
pub const ABORTED: &str = "Script host is shutting down";

/// Kind of value a bridge argument must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Number,
    Boolean,
    Object,
    Function,
    Any,
}

impl ArgKind {
    pub fn matches(self, value: &Value<'_>) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Number => value.as_number().is_some(),
            ArgKind::Boolean => value.as_bool().is_some(),
            ArgKind::Object => value.as_object().is_some(),
            ArgKind::Function => value.is_function(),
            ArgKind::Any => true,
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ArgKind::String => "a string",
            ArgKind::Number => "a number",
            ArgKind::Boolean => "a boolean",
            ArgKind::Object => "an object",
            ArgKind::Function => "a function",
            ArgKind::Any => "a value",
        };
        f.write_str(text)
    }
}

/// A bridge call that was rejected before doing anything
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("{function}: {}, received {received}", expected_arity(*.min, *.max))]
    Arity {
        function: &'static str,
        min: usize,
        max: usize,
        received: usize,
    },

    #[error("{function}: argument {index} must be {expected}")]
    Kind {
        function: &'static str,
        index: usize,
        expected: ArgKind,
    },

    #[error("{function}: argument {index} must be {expected}")]
    Shape {
        function: &'static str,
        index: usize,
        expected: &'static str,
    },

    #[error("{function}: argument {index} is out of range: {value}")]
    OutOfRange {
        function: &'static str,
        index: usize,
        value: f64,
    },
}

fn expected_arity(min: usize, max: usize) -> String {
    match (min, max) {
        (1, 1) => "expected 1 argument".to_string(),
        (min, max) if min == max => format!("expected {} arguments", min),
        (min, max) => format!("expected between {} and {} arguments", min, max),
    }
}

/// Declared arity and argument kinds of a bridge function
///
/// Arguments beyond `min` are optional, but any that are passed must
/// still have the declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub min: usize,
    pub max: usize,
    pub kinds: &'static [ArgKind],
}

impl Signature {
    pub const fn exact(name: &'static str, kinds: &'static [ArgKind]) -> Self {
        Self {
            name,
            min: kinds.len(),
            max: kinds.len(),
            kinds,
        }
    }

    pub const fn range(name: &'static str, min: usize, kinds: &'static [ArgKind]) -> Self {
        Self {
            name,
            min,
            max: kinds.len(),
            kinds,
        }
    }

    pub fn check(&self, args: &[Value<'_>]) -> Result<(), ArgumentError> {
        if args.len() < self.min || args.len() > self.max {
            return Err(ArgumentError::Arity {
                function: self.name,
                min: self.min,
                max: self.max,
                received: args.len(),
            });
        }

        for (index, (kind, value)) in self.kinds.iter().zip(args).enumerate() {
            if !kind.matches(value) {
                return Err(ArgumentError::Kind {
                    function: self.name,
                    index: index + 1,
                    expected: *kind,
                });
            }
        }
        Ok(())
    }
}

type BridgeFn =
    for<'js> fn(&ScriptContext, &Ctx<'js>, &[Value<'js>]) -> rquickjs::Result<Value<'js>>;

/// One entry of the `mf` namespace
pub struct BridgeFunction {
    pub signature: Signature,
    call: BridgeFn,
}

use self::ArgKind::{Any, Boolean, Function as Callable, Number, Object as Obj, String as Str};

/// Every host function installed into `mf`, validated before the call
pub const BRIDGE_FUNCTIONS: &[BridgeFunction] = &[
    // utilities
    BridgeFunction {
        signature: Signature::exact("include", &[Str]),
        call: include,
    },
    BridgeFunction {
        signature: Signature::range("exit", 0, &[Number]),
        call: exit,
    },
    BridgeFunction {
        signature: Signature::exact("print", &[Str]),
        call: print,
    },
    BridgeFunction {
        signature: Signature::exact("debug", &[Any]),
        call: debug_value,
    },
    BridgeFunction {
        signature: Signature::exact("setTimeout", &[Callable, Number]),
        call: set_timeout,
    },
    BridgeFunction {
        signature: Signature::exact("clearTimeout", &[Number]),
        call: clear_timer,
    },
    BridgeFunction {
        signature: Signature::exact("setInterval", &[Callable, Number]),
        call: set_interval,
    },
    BridgeFunction {
        signature: Signature::exact("clearInterval", &[Number]),
        call: clear_timer,
    },
    BridgeFunction {
        signature: Signature::exact("readFile", &[Str]),
        call: read_file,
    },
    BridgeFunction {
        signature: Signature::exact("writeFile", &[Str, Str]),
        call: write_file,
    },
    // game
    BridgeFunction {
        signature: Signature::exact("chat", &[Str]),
        call: chat,
    },
    BridgeFunction {
        signature: Signature::exact("username", &[]),
        call: username,
    },
    BridgeFunction {
        signature: Signature::exact("itemStackHeight", &[Number]),
        call: item_stack_height,
    },
    BridgeFunction {
        signature: Signature::exact("health", &[]),
        call: health,
    },
    BridgeFunction {
        signature: Signature::exact("blockAt", &[Obj]),
        call: block_at,
    },
    BridgeFunction {
        signature: Signature::exact("playerState", &[]),
        call: player_state,
    },
    BridgeFunction {
        signature: Signature::exact("setControlState", &[Number, Boolean]),
        call: set_control_state,
    },
    BridgeFunction {
        signature: Signature::exact("Point", &[Number, Number, Number]),
        call: point,
    },
];

/// Install every bridge function as a named property of `mf`
pub fn install<'js>(ctx: &Ctx<'js>, mf: &Object<'js>, host: &Rc<ScriptContext>) -> rquickjs::Result<()> {
    for bridge in BRIDGE_FUNCTIONS {
        let host = Rc::clone(host);
        let signature = bridge.signature;
        let call = bridge.call;

        let function = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                if host.is_aborted() {
                    return Err(Exception::throw_message(&ctx, ABORTED));
                }
                signature
                    .check(&args.0)
                    .map_err(|err| throw_argument_error(&ctx, &err))?;
                call(&host, &ctx, &args.0)
            },
        )?
        .with_name(signature.name)?;

        mf.set(signature.name, function)?;
    }
    trace!(target: "scripting", "Installed {} bridge functions", BRIDGE_FUNCTIONS.len());
    Ok(())
}

/// Evaluate `source` as a classic script in the global scope
pub(crate) fn eval_global<'js>(ctx: &Ctx<'js>, source: String) -> rquickjs::Result<Value<'js>> {
    let mut options = rquickjs::context::EvalOptions::default();
    options.global = true;
    options.strict = false;
    ctx.eval_with_options(source, options)
}

pub(crate) fn throw_argument_error(ctx: &Ctx<'_>, err: &ArgumentError) -> rquickjs::Error {
    Exception::throw_type(ctx, &err.to_string())
}

/// Round half up, as in `floor(x + 0.5)`
pub fn nearest_int(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Period for a script timer given in milliseconds
///
/// Fractions are truncated; negative or NaN periods fire immediately.
pub fn timer_period(ms: f64) -> Duration {
    let ms = ms.trunc();
    if ms.is_nan() || ms <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_millis(ms.min(i32::MAX as f64) as u64)
    }
}

/// Write `contents` to `path`, retrying partial and interrupted writes
pub fn write_fully(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    let mut index = 0;
    while index < contents.len() {
        match file.write(&contents[index..]) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(written) => index += written,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    file.flush()
}

fn undefined<'js>(ctx: &Ctx<'js>) -> Value<'js> {
    Value::new_undefined(ctx.clone())
}

fn number(value: &Value<'_>) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

// ============================================================================
// Utilities
// ============================================================================

fn include<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let path = host.resolve_include(&args[0].get::<String>()?);
    let path = std::path::absolute(&path).unwrap_or(path);

    let source = match fs::read(&path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            debug!(target: "scripting", "Failed to read {}: {}", path.display(), err);
            return Err(Exception::throw_message(
                ctx,
                &format!("Cannot open included file: {}", path.display()),
            ));
        }
    };

    debug!(target: "scripting", "Including {}", path.display());
    if let Err(err) = eval_global(ctx, source) {
        // Fatal to the host whether or not the caller catches it
        let error = ScriptError::from_engine(ctx, err, host.exit_request());
        host.abort("evaluating included file", error);
        return Err(Exception::throw_message(ctx, ABORTED));
    }
    Ok(undefined(ctx))
}

fn exit<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let code = args.first().map(number).filter(|code| code.is_finite()).unwrap_or(0.0);
    host.request_exit(code as i32);
    Err(Exception::throw_message(ctx, EXIT_SENTINEL))
}

fn print<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let text = args[0].get::<String>()?;
    host.print(&text)
        .map_err(|err| Exception::throw_message(ctx, &format!("Unable to write to stdout: {}", err)))?;
    Ok(undefined(ctx))
}

fn debug_value<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let text = args[0].get::<Coerced<String>>()?.0;
    host.debug(&text)
        .map_err(|err| Exception::throw_message(ctx, &format!("Unable to write to stderr: {}", err)))?;
    Ok(undefined(ctx))
}

fn set_timeout<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    schedule(host, ctx, args, "setTimeout", false)
}

fn set_interval<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    schedule(host, ctx, args, "setInterval", true)
}

fn schedule<'js>(
    host: &ScriptContext,
    ctx: &Ctx<'js>,
    args: &[Value<'js>],
    name: &'static str,
    repeat: bool,
) -> rquickjs::Result<Value<'js>> {
    let Some(function) = args[0].as_function().cloned() else {
        return Err(throw_argument_error(
            ctx,
            &ArgumentError::Kind {
                function: name,
                index: 1,
                expected: ArgKind::Function,
            },
        ));
    };
    let period = timer_period(number(&args[1]));

    // Callbacks run with the global object as `this`
    let receiver = ctx.globals().into_value();
    let timed = TimedFunction {
        function: Persistent::save(ctx, function),
        receiver: Persistent::save(ctx, receiver),
    };

    let id = host.schedule_timer(timed, period, repeat);
    debug!(target: "scripting", "{} -> timer {} every {:?}", name, id, period);
    id.to_script().into_js(ctx)
}

fn clear_timer<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    if let Some(id) = args[0].as_number().and_then(TimerId::from_script) {
        host.clear_timer(id);
    }
    Ok(undefined(ctx))
}

fn read_file<'js>(_host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let path = args[0].get::<String>()?;
    match fs::read(&path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned().into_js(ctx),
        Err(err) => {
            debug!(target: "scripting", "readFile {}: {}", path, err);
            Ok(undefined(ctx))
        }
    }
}

fn write_file<'js>(_host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let path = args[0].get::<String>()?;
    let contents = args[1].get::<String>()?;
    if let Err(err) = write_fully(Path::new(&path), contents.as_bytes()) {
        debug!(target: "scripting", "writeFile {}: {}", path, err);
        return Err(Exception::throw_message(ctx, &format!("Unable to write file: {}", path)));
    }
    Ok(undefined(ctx))
}

// ============================================================================
// Game
// ============================================================================

fn chat<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let message = args[0].get::<String>()?;
    host.game().send_chat(&message);
    Ok(undefined(ctx))
}

fn username<'js>(host: &ScriptContext, ctx: &Ctx<'js>, _args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    host.username().into_js(ctx)
}

fn item_stack_height<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let item_type = number(&args[0]) as i32;
    host.game().item_stack_height(item_type).into_js(ctx)
}

fn health<'js>(host: &ScriptContext, ctx: &Ctx<'js>, _args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    host.game().player_health().into_js(ctx)
}

fn block_at<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let not_a_point = || {
        throw_argument_error(
            ctx,
            &ArgumentError::Shape {
                function: "blockAt",
                index: 1,
                expected: "a point with numeric x, y and z",
            },
        )
    };
    let point = args[0].as_object().ok_or_else(not_a_point)?;
    let coordinate = |axis: &str| -> rquickjs::Result<i32> {
        let value: Value = point.get(axis)?;
        value.as_number().map(nearest_int).ok_or_else(not_a_point)
    };
    let at = Int3D::new(coordinate("x")?, coordinate("y")?, coordinate("z")?);

    let block = host.game().block_at(at);
    let obj = Object::new(ctx.clone())?;
    obj.set("type", block.item_type())?;
    Ok(obj.into_value())
}

fn player_state<'js>(host: &ScriptContext, ctx: &Ctx<'js>, _args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let state = host.game().player_position();

    let position = float_point(ctx, state.x, state.y, state.z)?;
    let velocity = float_point(ctx, state.dx, state.dy, state.dz)?;

    let obj = Object::new(ctx.clone())?;
    obj.set("position", position)?;
    obj.set("velocity", velocity)?;
    obj.set("yaw", state.yaw as f64)?;
    obj.set("pitch", state.pitch as f64)?;
    obj.set("on_ground", state.on_ground)?;
    Ok(obj.into_value())
}

fn set_control_state<'js>(host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    let raw = number(&args[0]);
    let control = (raw.fract() == 0.0)
        .then(|| Control::from_discriminant(raw as i64))
        .flatten()
        .ok_or_else(|| {
            throw_argument_error(
                ctx,
                &ArgumentError::OutOfRange {
                    function: "setControlState",
                    index: 1,
                    value: raw,
                },
            )
        })?;
    let activated = args[1].as_bool().unwrap_or(false);

    host.game().set_control_activated(control, activated);
    Ok(undefined(ctx))
}

fn point<'js>(_host: &ScriptContext, ctx: &Ctx<'js>, args: &[Value<'js>]) -> rquickjs::Result<Value<'js>> {
    Ok(float_point(ctx, number(&args[0]), number(&args[1]), number(&args[2]))?.into_value())
}

fn float_point<'js>(ctx: &Ctx<'js>, x: f64, y: f64, z: f64) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("x", x)?;
    obj.set("y", y)?;
    obj.set("z", z)?;
    Ok(obj)
}
