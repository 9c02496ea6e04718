use std::cell::Cell;

use rquickjs::{Coerced, Ctx, Exception, FromJs};

use crate::enums::EnumParseError;
use crate::EXIT_SENTINEL;

/// Failures of the host itself, as opposed to failures of script code
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to create script engine: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("Failed to parse enum resource {resource}: {source}")]
    EnumResource {
        resource: &'static str,
        #[source]
        source: EnumParseError,
    },

    #[error("Failed to spawn script host worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Script host worker panicked")]
    WorkerPanicked,
}

/// How a piece of script code ended when it did not return normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The script called `mf.exit`
    Exit { requested_code: i32 },
    /// Any other error escaping to the host
    Uncaught { message: String, stack: String },
}

impl ScriptError {
    /// Classify an engine error raised while running script code
    ///
    /// Takes the pending exception out of the context, and with it any exit
    /// request. Only the error thrown by `mf.exit` itself counts as
    /// [`ScriptError::Exit`]; anything else thrown after a caught exit is
    /// uncaught.
    pub fn from_engine(ctx: &Ctx<'_>, err: rquickjs::Error, exit_request: &Cell<Option<i32>>) -> Self {
        let thrown = match err {
            rquickjs::Error::Exception => describe_exception(ctx),
            other => Thrown::plain(other.to_string()),
        };

        match exit_request.take() {
            Some(requested_code) if thrown.is_exit_sentinel() => ScriptError::Exit { requested_code },
            _ => ScriptError::Uncaught {
                message: thrown.message,
                stack: thrown.stack,
            },
        }
    }
}

/// An uncaught error together with what the host was doing at the time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub context: String,
    pub message: String,
    pub stack: String,
}

impl std::fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error while {}: {}", self.context, self.message)
    }
}

/// The pending exception, rendered for logging
struct Thrown {
    /// `<name>: <message>` for Error objects
    message: String,
    stack: String,
    /// Bare message of an `Error` instance
    error_message: Option<String>,
}

impl Thrown {
    fn plain(message: String) -> Self {
        Self {
            message,
            stack: String::new(),
            error_message: None,
        }
    }

    fn is_exit_sentinel(&self) -> bool {
        self.error_message.as_deref() == Some(EXIT_SENTINEL)
    }
}

/// Pull the pending exception out of `ctx`
fn describe_exception(ctx: &Ctx<'_>) -> Thrown {
    let caught = ctx.catch();

    if let Some(obj) = caught.as_object() {
        if let Some(exception) = Exception::from_object(obj.clone()) {
            let message = exception.message().unwrap_or_default();
            let stack = exception.stack().unwrap_or_default();
            let name = obj
                .get::<_, Coerced<String>>("name")
                .map(|name| name.0)
                .unwrap_or_else(|_| "Error".to_string());
            return Thrown {
                message: format!("{}: {}", name, message),
                stack,
                error_message: (name == "Error").then_some(message),
            };
        }
    }

    // Scripts may throw values that are not Error objects
    match Coerced::<String>::from_js(ctx, caught) {
        Ok(text) => Thrown::plain(text.0),
        Err(err) => Thrown::plain(format!("(failed to stringify exception: {})", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime, Value};

    fn classify(source: &str, exit_request: Option<i32>) -> ScriptError {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let request = Cell::new(exit_request);
        let error = context.with(|ctx| {
            let err = ctx.eval::<Value, _>(source).unwrap_err();
            ScriptError::from_engine(&ctx, err, &request)
        });
        assert_eq!(request.get(), None, "exit request is always consumed");
        error
    }

    #[test]
    fn test_sentinel_with_request_is_exit() {
        assert_eq!(
            classify("throw new Error('SystemExit')", Some(4)),
            ScriptError::Exit { requested_code: 4 }
        );
    }

    #[test]
    fn test_other_error_after_caught_exit_is_uncaught() {
        let error = classify("throw new Error('boom')", Some(0));
        assert!(matches!(error, ScriptError::Uncaught { ref message, .. } if message == "Error: boom"));

        let error = classify("null.x", Some(0));
        assert!(matches!(error, ScriptError::Uncaught { ref message, .. } if message.starts_with("TypeError")));
    }

    #[test]
    fn test_sentinel_without_request_is_uncaught() {
        let error = classify("throw new Error('SystemExit')", None);
        assert!(matches!(error, ScriptError::Uncaught { ref message, .. } if message == "Error: SystemExit"));

        // Only Error instances carry the sentinel
        let error = classify("throw 'SystemExit'", Some(1));
        assert_eq!(
            error,
            ScriptError::Uncaught {
                message: "SystemExit".to_string(),
                stack: String::new(),
            }
        );
    }
}
