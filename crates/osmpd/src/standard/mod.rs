//! The built-in `standard` instruction set.
//!
//! Every server installs [`StandardModule`]. It provides introspection
//! (`help`, `apropos`, `capabilities`, `active-cmds`), event subscription
//! management for the calling session, `echo` for connectivity checks and
//! `wait` for exercising timeouts and cancellation.

mod introspection;
mod subscriptions;
#[cfg(test)]
mod tests;
mod timing;

use osmp_protocol::{ErrorKind, STANDARD_INSTRUCTION_SET};
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::{CommandContext, HandlerFailure};
use crate::registry::{
    CommandDescriptor, CommandModule, EventDescriptor, ParamKind, ParamSpec, Registrar,
    RegistryError, Schema,
};

/// Name of the liveness event published by the daemon.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Commands and events of the `standard` instruction set.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardModule;

impl CommandModule for StandardModule {
    fn name(&self) -> &str {
        STANDARD_INSTRUCTION_SET
    }

    fn register(&self, registrar: &mut dyn Registrar) -> Result<(), RegistryError> {
        registrar.register_command(
            command("echo", echo)
                .describe("Return the supplied text unchanged")
                .param(ParamSpec::required("text", ParamKind::String).describe("Text to echo"))
                .example(r#"{"type":"cmd","id":"echo","nr":1,"data":{"text":"hi"}}"#)
                .returns("the text"),
        )?;
        registrar.register_command(
            command("wait", timing::wait)
                .describe("Wait the given number of seconds, or until cancelled")
                .param(
                    ParamSpec::optional("seconds", ParamKind::Number)
                        .describe("Seconds to wait, fractions allowed; unbounded when omitted"),
                )
                .example(r#"{"type":"cmd","id":"wait","nr":3,"data":{"seconds":0.5}}"#)
                .returns("the number of seconds actually waited"),
        )?;
        registrar.register_command(
            command("help", introspection::help)
                .alias("?")
                .describe("List commands, or describe one command in detail")
                .param(
                    ParamSpec::optional("command", ParamKind::String)
                        .describe("Command name or alias"),
                )
                .param(
                    ParamSpec::optional("instruction-set", ParamKind::String)
                        .describe("Instruction set to search; every enabled one by default"),
                )
                .returns("command summaries, or the detailed description of one command"),
        )?;
        registrar.register_command(
            command("apropos", introspection::apropos)
                .describe("Search command names and descriptions")
                .param(ParamSpec::required("term", ParamKind::String).describe("Search term"))
                .returns("matching command summaries"),
        )?;
        registrar.register_command(
            command("capabilities", introspection::capabilities)
                .describe("List the enabled instruction sets")
                .with_schema(Schema::new())
                .returns("instruction set names in the order they were enabled"),
        )?;
        registrar.register_command(
            command("active-cmds", introspection::active_commands)
                .describe("List commands currently executing")
                .with_schema(Schema::new())
                .returns("in-flight invocations, this one included"),
        )?;
        registrar.register_command(
            command("event-list", subscriptions::list)
                .describe("List the events offered by enabled instruction sets")
                .with_schema(Schema::new())
                .returns("event names with their instruction set and description"),
        )?;
        registrar.register_command(
            command("event-subscribe", subscriptions::subscribe)
                .alias("evs")
                .describe("Subscribe this session to an event")
                .long_description(
                    "Use '*' as the event name to subscribe to every event of the \
                     instruction set. A subscription with a timeout lapses after that \
                     many seconds.",
                )
                .param(ParamSpec::required("event", ParamKind::String).describe("Event name or '*'"))
                .param(
                    ParamSpec::optional("timeout", ParamKind::Number)
                        .describe("Lifetime of the subscription in seconds"),
                )
                .param(
                    ParamSpec::optional("instruction-set", ParamKind::String)
                        .describe("Instruction set owning the event; 'standard' by default"),
                )
                .example(r#"{"type":"cmd","id":"evs","nr":2,"data":{"event":"heartbeat"}}"#)
                .returns("names of the events subscribed to"),
        )?;
        registrar.register_command(
            command("event-unsubscribe", subscriptions::unsubscribe)
                .alias("evu")
                .describe("Cancel this session's subscription to an event")
                .param(ParamSpec::required("event", ParamKind::String).describe("Event name or '*'"))
                .param(
                    ParamSpec::optional("instruction-set", ParamKind::String)
                        .describe("Instruction set owning the event; 'standard' by default"),
                )
                .returns("names of the events unsubscribed from"),
        )?;
        registrar.register_event(
            EventDescriptor::new(STANDARD_INSTRUCTION_SET, HEARTBEAT_EVENT)
                .describe("Periodic liveness signal carrying the server uptime in seconds"),
        )?;
        Ok(())
    }
}

fn command(
    name: &str,
    handler: fn(&mut CommandContext) -> Result<Value, HandlerFailure>,
) -> CommandDescriptor {
    CommandDescriptor::new(STANDARD_INSTRUCTION_SET, name, handler)
}

fn echo(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    context
        .arguments()
        .get("text")
        .cloned()
        .ok_or_else(|| HandlerFailure::with_kind(ErrorKind::MissingArgument, "text is required"))
}

fn to_value(value: impl Serialize) -> Result<Value, HandlerFailure> {
    serde_json::to_value(value)
        .map_err(|error| HandlerFailure::with_kind(ErrorKind::InternalError, error.to_string()))
}
