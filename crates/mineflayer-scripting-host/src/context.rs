use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mineflayer_events::Game;
use rquickjs::{Function, Persistent, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ScriptError;
use crate::timer::{TimerId, TimerMultiplexer};

/// Output stream handed to `mf.print` / `mf.debug`
pub type ScriptOutput = Box<dyn Write + Send>;

/// Callback and receiver stored for a logical timer
#[derive(Clone)]
pub struct TimedFunction {
    pub function: Persistent<Function<'static>>,
    pub receiver: Persistent<Value<'static>>,
}

/// A failure inside a bridge call that ends the host even if the caller
/// catches what the bridge throws
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    pub context: &'static str,
    pub error: ScriptError,
}

/// Host state reachable from the bridge functions
///
/// Lives on the worker thread only; bridge closures share it through an
/// `Rc`, so interior mutability is cell based.
pub struct ScriptContext {
    /// Game collaborator the bridge delegates to
    game: Arc<dyn Game>,
    /// Account name reported by `mf.username()`
    username: String,
    /// Directory `mf.include` resolves against
    script_dir: PathBuf,
    /// Live logical timers
    timers: RefCell<TimerMultiplexer<TimedFunction>>,
    /// Set by `mf.exit`, taken after each top-level script entry
    exit_request: Cell<Option<i32>>,
    /// First fatal failure seen inside a bridge call
    abort: RefCell<Option<Abort>>,
    stdout: RefCell<ScriptOutput>,
    stderr: RefCell<ScriptOutput>,
}

impl ScriptContext {
    pub fn new(
        game: Arc<dyn Game>,
        username: impl Into<String>,
        script_dir: impl Into<PathBuf>,
        expirations: UnboundedSender<TimerId>,
        stdout: ScriptOutput,
        stderr: ScriptOutput,
    ) -> Self {
        Self {
            game,
            username: username.into(),
            script_dir: script_dir.into(),
            timers: RefCell::new(TimerMultiplexer::new(expirations)),
            exit_request: Cell::new(None),
            abort: RefCell::new(None),
            stdout: RefCell::new(stdout),
            stderr: RefCell::new(stderr),
        }
    }

    pub fn game(&self) -> &dyn Game {
        self.game.as_ref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Resolve an include path against the main script's directory
    pub fn resolve_include(&self, path: &str) -> PathBuf {
        self.script_dir.join(path)
    }

    // ===== Output =====

    /// Write `text` to stdout as-is and flush
    pub fn print(&self, text: &str) -> std::io::Result<()> {
        let mut out = self.stdout.borrow_mut();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    /// Write `text` and a newline to stderr and flush
    pub fn debug(&self, text: &str) -> std::io::Result<()> {
        let mut err = self.stderr.borrow_mut();
        writeln!(err, "{}", text)?;
        err.flush()
    }

    // ===== Timers =====

    pub fn schedule_timer(&self, timed: TimedFunction, period: Duration, repeat: bool) -> TimerId {
        self.timers.borrow_mut().schedule(timed, period, repeat)
    }

    pub fn clear_timer(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().clear(id)
    }

    /// Look up the callback for a fired timer, retiring one-shot timers
    pub fn expire_timer(&self, id: TimerId) -> Option<TimedFunction> {
        self.timers.borrow_mut().expire(id)
    }

    pub fn clear_all_timers(&self) {
        self.timers.borrow_mut().clear_all();
    }

    pub fn active_timers(&self) -> usize {
        self.timers.borrow().active_count()
    }

    // ===== Exit requests =====

    pub fn request_exit(&self, code: i32) {
        self.exit_request.set(Some(code));
    }

    pub fn exit_request(&self) -> &Cell<Option<i32>> {
        &self.exit_request
    }

    // ===== Aborts =====

    /// Record a fatal failure; later ones are dropped
    pub fn abort(&self, context: &'static str, error: ScriptError) {
        let mut abort = self.abort.borrow_mut();
        if abort.is_none() {
            *abort = Some(Abort { context, error });
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.borrow().is_some()
    }

    pub fn take_abort(&self) -> Option<Abort> {
        self.abort.borrow_mut().take()
    }
}
