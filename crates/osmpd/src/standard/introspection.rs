//! `help`, `apropos`, `capabilities` and `active-cmds`.

use std::sync::Arc;

use osmp_protocol::ErrorKind;
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::{CommandContext, HandlerFailure};
use crate::registry::{CommandDescriptor, ParamSpec};

use super::to_value;

#[derive(Debug, Serialize)]
struct Summary<'a> {
    #[serde(rename = "instruction-set")]
    instruction_set: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    aliases: &'a [String],
    description: &'a str,
}

impl<'a> From<&'a CommandDescriptor> for Summary<'a> {
    fn from(descriptor: &'a CommandDescriptor) -> Self {
        Self {
            instruction_set: descriptor.instruction_set(),
            name: descriptor.name(),
            aliases: descriptor.aliases(),
            description: descriptor.description(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Detail<'a> {
    #[serde(flatten)]
    summary: Summary<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    parameters: &'a [ParamSpec],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    examples: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    returns: &'a [String],
}

/// Commands of enabled instruction sets, in registration order.
fn visible(context: &CommandContext) -> Vec<Arc<CommandDescriptor>> {
    let enabled = context.enabled_instruction_sets();
    context
        .commands()
        .commands()
        .iter()
        .filter(|descriptor| enabled.iter().any(|set| set == descriptor.instruction_set()))
        .cloned()
        .collect()
}

pub(super) fn help(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let scope = context.arguments().str("instruction-set").map(str::to_owned);
    if let Some(set) = scope.as_deref()
        && !context.is_enabled(set)
    {
        return Err(HandlerFailure::with_kind(
            ErrorKind::CapabilityDenied,
            format!("instruction set '{set}' is not enabled"),
        ));
    }
    let in_scope = |set: &str| scope.as_deref().is_none_or(|wanted| wanted == set);

    let commands = visible(context);
    let Some(name) = context.arguments().str("command") else {
        let summaries: Vec<Summary<'_>> = commands
            .iter()
            .filter(|descriptor| in_scope(descriptor.instruction_set()))
            .map(|descriptor| Summary::from(descriptor.as_ref()))
            .collect();
        return to_value(summaries);
    };

    let descriptor = commands
        .iter()
        .filter(|descriptor| in_scope(descriptor.instruction_set()))
        .find(|descriptor| descriptor.names().any(|candidate| candidate == name))
        .ok_or_else(|| {
            HandlerFailure::with_kind(ErrorKind::UnknownCommand, format!("no command '{name}'"))
        })?;
    to_value(Detail {
        summary: Summary::from(descriptor.as_ref()),
        details: descriptor.detailed_description(),
        parameters: descriptor
            .schema()
            .map_or(&[][..], |schema| schema.params()),
        examples: descriptor.examples(),
        returns: descriptor.return_values(),
    })
}

pub(super) fn apropos(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    let term = context
        .arguments()
        .str("term")
        .unwrap_or_default()
        .to_lowercase();
    let commands = visible(context);
    let matches: Vec<Summary<'_>> = commands
        .iter()
        .filter(|descriptor| {
            descriptor
                .names()
                .any(|name| name.to_lowercase().contains(&term))
                || descriptor.description().to_lowercase().contains(&term)
        })
        .map(|descriptor| Summary::from(descriptor.as_ref()))
        .collect();
    to_value(matches)
}

pub(super) fn capabilities(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    to_value(context.enabled_instruction_sets())
}

pub(super) fn active_commands(context: &mut CommandContext) -> Result<Value, HandlerFailure> {
    to_value(context.active_commands())
}
