use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use mineflayer_events::{EventSink, Game, GameEvent, LoginStatus};
use rquickjs::function::This;
use rquickjs::{Context, Ctx, FromJs, Object, Persistent, Runtime, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use crate::bridge::{self, eval_global};
use crate::context::{ScriptContext, ScriptOutput};
use crate::dispatcher::{self, raise_event, EventArg, ON_CONNECTED};
use crate::enums::EnumNamespace;
use crate::error::{HostError, ScriptError, ScriptFailure};
use crate::tick::{TickDriver, PHYSICS_FPS};
use crate::timer::TimerId;
use crate::{BRIDGE_NAMESPACE, CREATE_HANDLERS, ITEM_TYPE_ENUM};

/// Work posted to the host's worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRequest {
    /// Run the startup sequence and connect
    Go,
    /// Stop the host with the given status
    Shutdown(i32),
}

/// How the host finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostExit {
    /// Status the process should exit with
    pub code: i32,
    /// Code passed to `mf.exit`, if that is what ended the host
    pub requested_code: Option<i32>,
    /// The uncaught script error that ended the host, if any
    pub failure: Option<ScriptFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Constructed,
    Starting,
    Running,
    Exiting,
}

/// Configures and spawns a script host
pub struct ScriptRunnerBuilder {
    script_path: PathBuf,
    game: Arc<dyn Game>,
    username: String,
    physics_fps: u32,
    stdout: Option<ScriptOutput>,
    stderr: Option<ScriptOutput>,
}

impl ScriptRunnerBuilder {
    fn new(script_path: PathBuf, game: Arc<dyn Game>) -> Self {
        Self {
            script_path,
            game,
            username: "player".to_string(),
            physics_fps: PHYSICS_FPS,
            stdout: None,
            stderr: None,
        }
    }

    /// Name reported by `mf.username()`
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn physics_fps(mut self, fps: u32) -> Self {
        self.physics_fps = fps;
        self
    }

    /// Redirect `mf.print` (defaults to the process stdout)
    pub fn stdout(mut self, out: impl io::Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(out));
        self
    }

    /// Redirect `mf.debug` (defaults to the process stderr)
    pub fn stderr(mut self, err: impl io::Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(err));
        self
    }

    /// Start the worker thread and build the engine on it
    ///
    /// Returns once the engine exists; the script itself only runs after
    /// [`HostHandle::go`].
    pub fn spawn(self) -> Result<HostHandle, HostError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), HostError>>();

        let worker = std::thread::Builder::new()
            .name("script-host".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(HostError::Spawn(e)));
                        return None;
                    }
                };

                runtime.block_on(async move {
                    let (runner, channels) = match ScriptRunner::new(self) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return None;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    Some(runner.run(request_rx, channels).await)
                })
            })
            .map_err(HostError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(HostHandle {
                requests: request_tx,
                worker,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(HostError::WorkerPanicked)
            }
        }
    }
}

/// Handle to a spawned script host
pub struct HostHandle {
    requests: UnboundedSender<HostRequest>,
    worker: JoinHandle<Option<HostExit>>,
}

impl HostHandle {
    /// Ask the worker to start the script; returns immediately
    pub fn go(&self) {
        self.post(HostRequest::Go);
    }

    /// Ask the worker to stop with `code`
    pub fn shutdown(&self, code: i32) {
        self.post(HostRequest::Shutdown(code));
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the worker is done
    pub fn join(self) -> Result<HostExit, HostError> {
        let HostHandle { requests, worker } = self;
        // A host that never got `Go` only stops once the sender is gone
        drop(requests);
        worker
            .join()
            .map_err(|_| HostError::WorkerPanicked)?
            .ok_or(HostError::WorkerPanicked)
    }

    fn post(&self, request: HostRequest) {
        if self.requests.send(request).is_err() {
            warn!(target: "scripting", "Script host already stopped, dropping {:?}", request);
        }
    }
}

/// Receiving ends the worker loop drains besides host requests
struct RunnerChannels {
    expirations: UnboundedReceiver<TimerId>,
    events: UnboundedReceiver<GameEvent>,
}

/// Owns the script engine and everything that re-enters it
///
/// Lives on the host's worker thread for its whole life. Script code only
/// runs from the startup sequence, a timer expiration or an event dispatch;
/// the physics tick feeds the game without entering the engine.
pub struct ScriptRunner {
    state: HostState,
    exit_code: Option<i32>,
    requested_code: Option<i32>,
    failure: Option<ScriptFailure>,
    script_path: PathBuf,
    game: Arc<dyn Game>,
    item_types: EnumNamespace,
    physics_fps: u32,
    /// Handed to the game once the main script succeeded
    event_sink: Option<EventSink>,
    tick: Option<TickDriver>,
    /// Event name -> handler list, created by the bootstrap resource
    handlers: Option<Persistent<Object<'static>>>,
    host: Rc<ScriptContext>,
    context: Context,
    // Must drop after everything holding script values
    _runtime: Runtime,
}

impl ScriptRunner {
    pub fn builder(script_path: impl Into<PathBuf>, game: Arc<dyn Game>) -> ScriptRunnerBuilder {
        ScriptRunnerBuilder::new(script_path.into(), game)
    }

    fn new(builder: ScriptRunnerBuilder) -> Result<(Self, RunnerChannels), HostError> {
        let ScriptRunnerBuilder {
            script_path,
            game,
            username,
            physics_fps,
            stdout,
            stderr,
        } = builder;

        let item_types =
            EnumNamespace::parse(ITEM_TYPE_ENUM).map_err(|source| HostError::EnumResource {
                resource: "ItemTypeEnum.h",
                source,
            })?;

        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let host = Rc::new(ScriptContext::new(
            Arc::clone(&game),
            username,
            script_dir(&script_path),
            timer_tx,
            stdout.unwrap_or_else(|| Box::new(io::stdout())),
            stderr.unwrap_or_else(|| Box::new(io::stderr())),
        ));

        let runner = Self {
            state: HostState::Constructed,
            exit_code: None,
            requested_code: None,
            failure: None,
            script_path,
            game,
            item_types,
            physics_fps,
            event_sink: Some(event_tx),
            tick: None,
            handlers: None,
            host,
            context,
            _runtime: runtime,
        };
        let channels = RunnerChannels {
            expirations: timer_rx,
            events: event_rx,
        };
        Ok((runner, channels))
    }

    async fn run(
        mut self,
        mut requests: UnboundedReceiver<HostRequest>,
        channels: RunnerChannels,
    ) -> HostExit {
        let RunnerChannels {
            mut expirations,
            mut events,
        } = channels;
        let mut requests_open = true;
        let mut events_open = true;

        while self.exit_code.is_none() {
            tokio::select! {
                request = requests.recv(), if requests_open => match request {
                    Some(HostRequest::Go) => self.go(),
                    Some(HostRequest::Shutdown(code)) => self.shutdown(code),
                    None => {
                        requests_open = false;
                        if self.state == HostState::Constructed {
                            debug!(target: "scripting", "Host handle dropped before start");
                            self.finish(0);
                        }
                    }
                },
                Some(id) = expirations.recv() => self.fire_timer(id),
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        events_open = false;
                        if self.state == HostState::Running {
                            info!(target: "scripting", "Game session ended");
                            self.finish(0);
                        }
                    }
                },
                elapsed = next_tick(&mut self.tick) => self.physics_tick(elapsed),
            }
        }

        HostExit {
            code: self.exit_code.unwrap_or(0),
            requested_code: self.requested_code,
            failure: self.failure.take(),
        }
    }

    /// Startup sequence; runs once, on the worker
    fn go(&mut self) {
        if self.state != HostState::Constructed {
            warn!(target: "scripting", "Script host already started, ignoring go request");
            return;
        }
        self.state = HostState::Starting;
        info!(target: "scripting", "Starting script {}", self.script_path.display());

        let context = self.context.clone();
        if context.with(|ctx| self.start_script(&ctx)).is_none() {
            return;
        }

        if let Some(sink) = self.event_sink.take() {
            self.game.subscribe(sink);
        }
        self.state = HostState::Running;
        debug!(target: "scripting", "Script started, connecting");
        self.game.start();
    }

    fn start_script<'js>(&mut self, ctx: &Ctx<'js>) -> Option<()> {
        // 1. bridge namespace, visible to the bootstrap resource
        let mf = self.check(ctx, "creating bridge namespace", create_namespace(ctx))?;

        // 2. handler map
        let handlers = eval_global(ctx, format!("({})", CREATE_HANDLERS))
            .and_then(|value| Object::from_js(ctx, value));
        let handlers = self.check(ctx, "evaluating create_handlers.js", handlers)?;
        self.handlers = Some(Persistent::save(ctx, handlers));

        // 3. enum constants
        let enums = self
            .item_types
            .to_object(ctx)
            .and_then(|obj| mf.set(self.item_types.name(), obj));
        self.check(ctx, "creating enums", enums)?;

        // 4. bridge functions
        let installed = bridge::install(ctx, &mf, &self.host);
        self.check(ctx, "installing bridge functions", installed)?;

        // 5. main script
        let source = match fs::read(&self.script_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                error!(target: "scripting", "file not found: {} ({})", self.script_path.display(), e);
                self.shutdown(1);
                return None;
            }
        };
        let evaluated = eval_global(ctx, source);

        // 6. a failing main script already shut the host down
        self.check(ctx, "evaluating main script", evaluated)?;
        (self.state != HostState::Exiting).then_some(())
    }

    /// Inspect the outcome of a top-level entry into script code
    ///
    /// Uncaught errors are logged and shut the host down with status 1;
    /// an `mf.exit` does the same silently.
    fn check<'js, T>(
        &mut self,
        ctx: &Ctx<'js>,
        doing: &str,
        result: rquickjs::Result<T>,
    ) -> Option<T> {
        let (doing, script_error) = match (result, self.host.take_abort()) {
            (Ok(value), None) => {
                // An exit caught by the script itself is void
                self.host.exit_request().take();
                return Some(value);
            }
            (result, Some(abort)) => {
                // Whatever reached the top is fallout of the recorded failure
                if result.is_err() {
                    let _ = ctx.catch();
                }
                self.host.exit_request().take();
                (abort.context.to_string(), abort.error)
            }
            (Err(err), None) => (
                doing.to_string(),
                ScriptError::from_engine(ctx, err, self.host.exit_request()),
            ),
        };
        if self.state == HostState::Exiting {
            return None;
        }

        match script_error {
            ScriptError::Exit { requested_code } => {
                self.requested_code = Some(requested_code);
                // The requested code is not honoured yet
                self.shutdown(1);
            }
            ScriptError::Uncaught { message, stack } => {
                error!(target: "scripting", "Error while {}: {}\n{}", doing, message, stack);
                self.failure = Some(ScriptFailure {
                    context: doing,
                    message,
                    stack,
                });
                self.shutdown(1);
            }
        }
        None
    }

    /// Stop the host; only the first call has any effect
    fn shutdown(&mut self, code: i32) {
        if self.state == HostState::Exiting {
            return;
        }
        let started = self.state == HostState::Running;
        self.state = HostState::Exiting;
        self.tick = None;
        self.host.clear_all_timers();

        if started {
            info!(target: "scripting", "Shutting down game with status {}", code);
            self.game.shutdown(code);
        } else {
            debug!(target: "scripting", "Stopping before the game started, status {}", code);
        }
        self.exit_code = Some(code);
    }

    /// End the loop without asking the game to shut down
    fn finish(&mut self, code: i32) {
        self.state = HostState::Exiting;
        self.tick = None;
        self.host.clear_all_timers();
        self.exit_code = Some(code);
    }

    fn fire_timer(&mut self, id: TimerId) {
        if self.state == HostState::Exiting {
            return;
        }
        let Some(timed) = self.host.expire_timer(id) else {
            trace!(target: "scripting", "Ignoring expiration of retired timer {}", id);
            return;
        };

        let context = self.context.clone();
        context.with(|ctx| {
            let result = timed.function.restore(&ctx).and_then(|function| {
                let receiver = timed.receiver.restore(&ctx)?;
                function.call::<_, Value>((This(receiver),))
            });
            self.check(&ctx, &format!("running timer {}", id), result);
        });
    }

    fn handle_event(&mut self, event: GameEvent) {
        if self.state != HostState::Running {
            return;
        }
        match event {
            GameEvent::LoginStatusUpdated(status) => self.handle_login_status(status),
            other => {
                if let Some((name, args)) = dispatcher::script_event(&other) {
                    self.raise(name, args);
                }
            }
        }
    }

    fn handle_login_status(&mut self, status: LoginStatus) {
        debug!(target: "scripting", "Login status: {}", status);
        // The game handles Disconnected and SocketError itself
        if status != LoginStatus::Success {
            return;
        }

        let mut driver = TickDriver::start(self.physics_fps);
        self.game.do_physics(driver.restart());
        self.tick = Some(driver);
        self.raise(ON_CONNECTED, Vec::new());
    }

    fn raise(&mut self, name: &'static str, args: Vec<EventArg>) {
        let Some(handlers) = self.handlers.clone() else {
            return;
        };

        let context = self.context.clone();
        context.with(|ctx| {
            let result = handlers
                .restore(&ctx)
                .and_then(|map| raise_event(&ctx, &map, name, args));
            self.check(&ctx, &format!("raising event {}", name), result);
        });
    }

    fn physics_tick(&mut self, elapsed: f32) {
        if self.state == HostState::Running {
            self.game.do_physics(elapsed);
        }
    }
}

impl Drop for ScriptRunner {
    fn drop(&mut self) {
        // Script values must be released while the runtime is still alive
        self.host.clear_all_timers();
        self.handlers = None;
    }
}

fn create_namespace<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let mf = Object::new(ctx.clone())?;
    ctx.globals().set(BRIDGE_NAMESPACE, mf.clone())?;
    Ok(mf)
}

/// Absolute directory of the main script, the base for `mf.include`
fn script_dir(script_path: &Path) -> PathBuf {
    match script_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

async fn next_tick(tick: &mut Option<TickDriver>) -> f32 {
    match tick {
        Some(driver) => driver.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(script_dir(Path::new("bot.js")), cwd);
        assert_eq!(script_dir(Path::new("scripts/bot.js")), cwd.join("scripts"));
        assert_eq!(
            script_dir(Path::new("/opt/bots/bot.js")),
            PathBuf::from("/opt/bots")
        );
    }
}
