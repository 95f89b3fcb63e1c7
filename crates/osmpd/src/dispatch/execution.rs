//! Runs handlers with fault isolation and an optional time budget.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::registry::CommandHandler;

use super::DISPATCH_TARGET;
use super::context::CommandContext;
use super::errors::HandlerFailure;

/// How a handler run ended.
pub(super) enum Execution {
    /// The handler returned; the context carries its staged effects.
    Completed {
        context: Box<CommandContext>,
        result: Result<Value, HandlerFailure>,
    },
    /// The handler panicked; its staged effects are gone.
    Panicked { message: String },
    /// The handler did not return within the budget.
    TimedOut,
}

/// Runs `handler` against `context`.
///
/// Without a timeout the handler runs on the calling thread. With a timeout
/// it runs on a worker thread; on expiry the worker is abandoned together
/// with its context, so nothing it staged can be committed.
pub(super) fn run(
    handler: Arc<dyn CommandHandler>,
    context: CommandContext,
    timeout: Option<Duration>,
) -> Execution {
    let Some(timeout) = timeout else {
        return invoke(handler.as_ref(), context);
    };

    let (sender, receiver) = mpsc::sync_channel(1);
    let name = format!("osmp-cmd-{}", context.invocation().command);
    let spawned = thread::Builder::new().name(name).spawn(move || {
        let execution = invoke(handler.as_ref(), context);
        // The dispatcher may have stopped waiting.
        drop(sender.send(execution));
    });
    if let Err(error) = spawned {
        return Execution::Panicked {
            message: format!("failed to spawn command worker: {error}"),
        };
    }

    match receiver.recv_timeout(timeout) {
        Ok(execution) => execution,
        Err(RecvTimeoutError::Timeout) => Execution::TimedOut,
        Err(RecvTimeoutError::Disconnected) => Execution::Panicked {
            message: "command worker exited without reporting".to_owned(),
        },
    }
}

fn invoke(handler: &dyn CommandHandler, mut context: CommandContext) -> Execution {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(&mut context))) {
        Ok(result) => Execution::Completed {
            context: Box::new(context),
            result,
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: DISPATCH_TARGET,
                command = %context.invocation().command,
                panic = %message,
                "command handler panicked"
            );
            Execution::Panicked { message }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}
