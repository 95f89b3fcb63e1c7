//! Command descriptors and the command registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::{CommandContext, HandlerFailure};

use super::errors::{RegistryError, check_name};
use super::schema::Schema;

/// Executable body of a command.
///
/// Handlers run against a [`CommandContext`]; environment writes and event
/// publications made through the context only take effect when the handler
/// returns `Ok`.
pub trait CommandHandler: Send + Sync + 'static {
    /// Runs the command.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerFailure`] describing the business failure.
    fn invoke(&self, context: &mut CommandContext) -> Result<Value, HandlerFailure>;
}

impl<F> CommandHandler for F
where
    F: Fn(&mut CommandContext) -> Result<Value, HandlerFailure> + Send + Sync + 'static,
{
    fn invoke(&self, context: &mut CommandContext) -> Result<Value, HandlerFailure> {
        self(context)
    }
}

/// A registered command.
#[derive(Clone)]
pub struct CommandDescriptor {
    instruction_set: String,
    name: String,
    aliases: Vec<String>,
    description: String,
    long_description: Option<String>,
    examples: Vec<String>,
    returns: Vec<String>,
    schema: Option<Schema>,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    /// Creates a descriptor without a schema; named arguments pass through
    /// unchecked until [`CommandDescriptor::with_schema`] or
    /// [`CommandDescriptor::param`] declares one.
    pub fn new(
        instruction_set: impl Into<String>,
        name: impl Into<String>,
        handler: impl CommandHandler,
    ) -> Self {
        Self {
            instruction_set: instruction_set.into(),
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            long_description: None,
            examples: Vec::new(),
            returns: Vec::new(),
            schema: None,
            handler: Arc::new(handler),
        }
    }

    /// Sets the one-line description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the detailed description shown by `help <command>`.
    #[must_use]
    pub fn long_description(mut self, text: impl Into<String>) -> Self {
        self.long_description = Some(text.into());
        self
    }

    /// Adds an alias resolving to this command.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds a usage example.
    #[must_use]
    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Documents a returned value.
    #[must_use]
    pub fn returns(mut self, description: impl Into<String>) -> Self {
        self.returns.push(description.into());
        self
    }

    /// Replaces the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Appends a parameter, creating the schema when absent.
    #[must_use]
    pub fn param(mut self, spec: super::ParamSpec) -> Self {
        let schema = self.schema.take().unwrap_or_default();
        self.schema = Some(schema.param(spec));
        self
    }

    /// Owning instruction set.
    #[must_use]
    pub fn instruction_set(&self) -> &str {
        &self.instruction_set
    }

    /// Canonical command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternative names.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// One-line description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Detailed description.
    #[must_use]
    pub fn detailed_description(&self) -> Option<&str> {
        self.long_description.as_deref()
    }

    /// Usage examples.
    #[must_use]
    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Documented return values.
    #[must_use]
    pub fn return_values(&self) -> &[String] {
        &self.returns
    }

    /// Argument schema, if declared.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Canonical name followed by aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub(crate) fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandDescriptor")
            .field("instruction_set", &self.instruction_set)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Maps `(instruction set, name or alias)` to command descriptors.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    by_set: HashMap<String, HashMap<String, Arc<CommandDescriptor>>>,
    ordered: Vec<Arc<CommandDescriptor>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` under its name and aliases.
    ///
    /// Nothing is registered when any name collides.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCommand`] for a colliding name or
    /// alias and [`RegistryError::InvalidName`] for blank names.
    pub fn register(
        &mut self,
        descriptor: CommandDescriptor,
    ) -> Result<Arc<CommandDescriptor>, RegistryError> {
        check_name("instruction set", descriptor.instruction_set())?;
        let existing = self.by_set.get(descriptor.instruction_set());
        let mut seen: Vec<&str> = Vec::new();
        for name in descriptor.names() {
            check_name("command", name)?;
            let taken = existing.is_some_and(|names| names.contains_key(name));
            if taken || seen.contains(&name) {
                return Err(RegistryError::duplicate_command(
                    descriptor.instruction_set(),
                    name,
                ));
            }
            seen.push(name);
        }

        let descriptor = Arc::new(descriptor);
        let names = self
            .by_set
            .entry(descriptor.instruction_set.clone())
            .or_default();
        for name in descriptor.names() {
            names.insert(name.to_owned(), Arc::clone(&descriptor));
        }
        self.ordered.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Resolves a command by name or alias within one instruction set.
    ///
    /// Resolution never falls back to another instruction set.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCommand`] on a miss.
    pub fn resolve(
        &self,
        instruction_set: &str,
        name: &str,
    ) -> Result<Arc<CommandDescriptor>, RegistryError> {
        self.by_set
            .get(instruction_set)
            .and_then(|names| names.get(name))
            .cloned()
            .ok_or_else(|| RegistryError::unknown_command(instruction_set, name))
    }

    /// Every command in registration order.
    #[must_use]
    pub fn commands(&self) -> &[Arc<CommandDescriptor>] {
        &self.ordered
    }

    /// Commands of one instruction set in registration order.
    pub fn in_instruction_set<'a>(
        &'a self,
        instruction_set: &'a str,
    ) -> impl Iterator<Item = &'a Arc<CommandDescriptor>> + 'a {
        self.ordered
            .iter()
            .filter(move |descriptor| descriptor.instruction_set == instruction_set)
    }

    /// Number of registered commands, aliases excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
