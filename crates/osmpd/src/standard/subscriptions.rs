//! `event-list`, `event-subscribe` and `event-unsubscribe`.

use std::time::Duration;

use osmp_protocol::{ErrorKind, STANDARD_INSTRUCTION_SET};
use serde::Serialize;
use serde_json::{Value, json};

use crate::dispatch::{CommandContext, HandlerFailure};

use super::to_value;

const EVERY_EVENT: &str = "*";

#[derive(Debug, Serialize)]
struct Listing<'a> {
    #[serde(rename = "instruction-set")]
    instruction_set: &'a str,
    name: &'a str,
    description: &'a str,
}

pub(super) fn list(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let enabled = context.enabled_instruction_sets();
    let listings: Vec<Listing<'_>> = context
        .events()
        .events()
        .iter()
        .filter(|descriptor| enabled.iter().any(|set| set == descriptor.instruction_set()))
        .map(|descriptor| Listing {
            instruction_set: descriptor.instruction_set(),
            name: descriptor.name(),
            description: descriptor.description(),
        })
        .collect();
    to_value(listings)
}

pub(super) fn subscribe(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let (instruction_set, names) = targets(context)?;
    let ttl = match context.arguments().f64("timeout") {
        None => None,
        Some(seconds) if seconds > 0.0 => Some(Duration::try_from_secs_f64(seconds).map_err(
            |error| HandlerFailure::invalid_argument(format!("timeout: {error}")),
        )?),
        Some(_) => {
            return Err(HandlerFailure::invalid_argument(
                "timeout must be a positive number of seconds",
            ));
        }
    };
    for name in &names {
        context.subscribe(&instruction_set, name, ttl)?;
    }
    Ok(json!({ "instruction-set": instruction_set, "subscribed": names }))
}

pub(super) fn unsubscribe(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let (instruction_set, names) = targets(context)?;
    for name in &names {
        context.unsubscribe(&instruction_set, name)?;
    }
    Ok(json!({ "instruction-set": instruction_set, "unsubscribed": names }))
}

/// Resolves the `event` and `instruction-set` arguments to event names.
fn targets(context: &CommandContext) -> Result<(String, Vec<String>), HandlerFailure> {
    let arguments = context.arguments();
    let instruction_set = arguments
        .str("instruction-set")
        .unwrap_or(STANDARD_INSTRUCTION_SET)
        .to_owned();
    if !context.is_enabled(&instruction_set) {
        return Err(HandlerFailure::with_kind(
            ErrorKind::CapabilityDenied,
            format!("instruction set '{instruction_set}' is not enabled"),
        ));
    }
    let Some(event) = arguments.str("event") else {
        return Err(HandlerFailure::with_kind(
            ErrorKind::MissingArgument,
            "event is required",
        ));
    };
    let names = if event == EVERY_EVENT {
        context
            .events()
            .in_instruction_set(&instruction_set)
            .map(|descriptor| descriptor.name().to_owned())
            .collect()
    } else {
        vec![event.to_owned()]
    };
    Ok((instruction_set, names))
}
