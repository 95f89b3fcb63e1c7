//! The request-handling core.

use std::sync::Arc;
use std::time::Duration;

use osmp_config::Config;
use osmp_protocol::{CorrelationId, Request, Response};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::environment::GlobalEnvironment;
use crate::registry::{
    CommandDescriptor, CommandModule, CommandRegistry, Delivery, DeliveryStatus, EventDescriptor,
    EventRegistry, InstructionSetRegistry, InstructionSetSnapshot, Registrar, RegistryError, SubscriberHandle,
    bind_arguments,
};

use super::DISPATCH_TARGET;
use super::active::{ActiveCommand, ActiveCommands};
use super::context::{
    Caller, CommandContext, Effects, Invocation, PendingEvent, SessionId, SubscriptionChange,
};
use super::errors::DispatchError;
use super::execution::{self, Execution};

/// Static settings consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Instruction sets enabled at construction, in advertisement order.
    pub instruction_sets: Vec<String>,
    /// Per-command time budget; `None` lets handlers run unbounded.
    pub command_timeout: Option<Duration>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DispatcherSettings {
    /// Extracts dispatcher settings from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            instruction_sets: config.instruction_sets().to_vec(),
            command_timeout: config.command_timeout(),
        }
    }
}

/// Outcome of resolving a command name.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The command exists in an enabled instruction set.
    Found(Arc<CommandDescriptor>),
    /// The instruction set is enabled but has no such command.
    NotFound,
    /// The instruction set is not enabled.
    Denied,
}

#[derive(Debug)]
struct Shared {
    settings: DispatcherSettings,
    instruction_sets: InstructionSetRegistry,
    commands: CommandRegistry,
    events: EventRegistry,
    environment: Arc<GlobalEnvironment>,
    active: ActiveCommands,
}

/// Resolves, validates and executes requests, and publishes events.
///
/// Cloning is cheap; clones share every registry and the environment. The
/// dispatcher keeps no per-request state between calls and is safe to use
/// from many connection threads at once.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder(settings: DispatcherSettings) -> DispatcherBuilder {
        DispatcherBuilder::new(settings)
    }

    /// Handles a request issued by the server itself.
    #[must_use]
    pub fn handle(&self, request: Request) -> Response {
        self.handle_as(&Caller::internal(), request)
    }

    /// Handles a request issued by `caller`.
    ///
    /// Every failure is converted into a response carrying the request's
    /// correlation identifier; nothing escapes to the caller's thread.
    #[must_use]
    pub fn handle_as(&self, caller: &Caller, request: Request) -> Response {
        let correlation_id = request.correlation_id;
        let instruction_set = request.instruction_set.clone();
        let command = request.command.clone();
        match self.execute(caller, request) {
            Ok(value) => {
                debug!(
                    target: DISPATCH_TARGET,
                    %instruction_set,
                    %command,
                    %correlation_id,
                    session = %caller.id(),
                    "command succeeded"
                );
                Response::success(correlation_id, value)
            }
            Err(error) => {
                let kind = error.kind();
                if kind.is_recoverable() {
                    debug!(
                        target: DISPATCH_TARGET,
                        %instruction_set,
                        %command,
                        %correlation_id,
                        %kind,
                        %error,
                        "command failed"
                    );
                } else {
                    warn!(
                        target: DISPATCH_TARGET,
                        %instruction_set,
                        %command,
                        %correlation_id,
                        %kind,
                        %error,
                        "command failed"
                    );
                }
                Response::failure(correlation_id, error.to_payload())
            }
        }
    }

    /// Resolves a command, applying the capability check first.
    #[must_use]
    pub fn resolve(&self, instruction_set: &str, command: &str) -> Resolution {
        self.resolve_in(&self.shared.instruction_sets.snapshot(), instruction_set, command)
    }

    fn resolve_in(
        &self,
        capabilities: &InstructionSetSnapshot,
        instruction_set: &str,
        command: &str,
    ) -> Resolution {
        if !capabilities.is_enabled(instruction_set) {
            return Resolution::Denied;
        }
        match self.shared.commands.resolve(instruction_set, command) {
            Ok(descriptor) => Resolution::Found(descriptor),
            Err(_) => Resolution::NotFound,
        }
    }

    /// Publishes an event to every live subscriber.
    ///
    /// Deliveries are handed to each subscriber's sink before the channel is
    /// released. Returns the delivery records; an empty sequence means nobody
    /// was listening.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::CapabilityDenied`] when the instruction set is
    /// disabled and an `unknown_event` registry error when the event is not
    /// registered.
    pub fn publish(
        &self,
        instruction_set: &str,
        name: &str,
        payload: Value,
    ) -> Result<Vec<Delivery>, DispatchError> {
        if !self.shared.instruction_sets.is_enabled(instruction_set) {
            return Err(DispatchError::capability_denied(instruction_set));
        }
        let deliveries =
            self.shared
                .events
                .publish_with(instruction_set, name, payload, fan_out)?;
        Ok(deliveries)
    }

    /// Subscribes `subscriber` to an event.
    ///
    /// # Errors
    ///
    /// Returns an `unknown_event` registry error when the event is not
    /// registered.
    pub fn subscribe(
        &self,
        instruction_set: &str,
        name: &str,
        subscriber: SubscriberHandle,
        ttl: Option<Duration>,
    ) -> Result<(), DispatchError> {
        Ok(self
            .shared
            .events
            .subscribe(instruction_set, name, subscriber, ttl)?)
    }

    /// Unsubscribes `subscriber` from an event. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an `unknown_event` registry error when the event is not
    /// registered.
    pub fn unsubscribe(
        &self,
        instruction_set: &str,
        name: &str,
        subscriber: &SubscriberHandle,
    ) -> Result<bool, DispatchError> {
        Ok(self
            .shared
            .events
            .unsubscribe(instruction_set, name, subscriber)?)
    }

    /// Removes `subscriber` from every event.
    pub fn unsubscribe_all(&self, subscriber: &SubscriberHandle) -> usize {
        self.shared.events.unsubscribe_all(subscriber)
    }

    /// Enables an instruction set. Idempotent.
    pub fn enable_instruction_set(&self, name: &str) -> bool {
        self.shared.instruction_sets.enable(name)
    }

    /// Disables an instruction set. Idempotent.
    pub fn disable_instruction_set(&self, name: &str) -> bool {
        self.shared.instruction_sets.disable(name)
    }

    /// Enabled instruction sets in insertion order.
    #[must_use]
    pub fn list_enabled_instruction_sets(&self) -> Vec<String> {
        self.shared.instruction_sets.list_enabled()
    }

    /// Cancels the invocation `correlation_id` started by `origin`.
    pub fn cancel(&self, origin: SessionId, correlation_id: CorrelationId) -> bool {
        self.shared.active.cancel(origin, correlation_id)
    }

    /// Cancels every invocation started by `origin`.
    pub fn cancel_origin(&self, origin: SessionId) -> usize {
        self.shared.active.cancel_origin(origin)
    }

    /// Snapshot of in-flight invocations.
    #[must_use]
    pub fn active_commands(&self) -> Vec<ActiveCommand> {
        self.shared.active.snapshot()
    }

    /// Instruction set registry.
    #[must_use]
    pub fn instruction_sets(&self) -> &InstructionSetRegistry {
        &self.shared.instruction_sets
    }

    /// Command registry.
    #[must_use]
    pub fn commands(&self) -> &CommandRegistry {
        &self.shared.commands
    }

    /// Event registry.
    #[must_use]
    pub fn events(&self) -> &EventRegistry {
        &self.shared.events
    }

    /// Shared environment store.
    #[must_use]
    pub fn environment(&self) -> &Arc<GlobalEnvironment> {
        &self.shared.environment
    }

    /// Settings the dispatcher was built with.
    #[must_use]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.shared.settings
    }

    fn execute(&self, caller: &Caller, request: Request) -> Result<Value, DispatchError> {
        let Request {
            instruction_set,
            command,
            arguments,
            correlation_id,
        } = request;

        let capabilities = self.shared.instruction_sets.snapshot();
        let descriptor = match self.resolve_in(&capabilities, &instruction_set, &command) {
            Resolution::Found(descriptor) => descriptor,
            Resolution::NotFound => {
                return Err(RegistryError::unknown_command(instruction_set, command).into());
            }
            Resolution::Denied => return Err(DispatchError::capability_denied(instruction_set)),
        };
        let arguments = bind_arguments(descriptor.schema(), arguments)?;

        let invocation = Invocation {
            instruction_set,
            command: descriptor.name().to_owned(),
            requested_as: command,
            correlation_id,
            session: caller.id(),
        };
        let token = CancellationToken::new();
        let _active = self.shared.active.start(&invocation, token.clone());
        let context = CommandContext::new(
            invocation,
            arguments,
            caller.clone(),
            token.clone(),
            capabilities,
            self.clone(),
        );

        let timeout = self.shared.settings.command_timeout;
        match execution::run(descriptor.handler(), context, timeout) {
            Execution::Completed {
                context,
                result: Ok(value),
            } => {
                self.finalise(descriptor.name(), *context, &token)?;
                Ok(value)
            }
            Execution::Completed {
                result: Err(_), ..
            } if token.is_cancelled() => Err(DispatchError::cancelled(descriptor.name())),
            Execution::Completed {
                result: Err(failure),
                ..
            } => Err(DispatchError::Handler(failure)),
            Execution::Panicked { message } => {
                Err(DispatchError::panicked(descriptor.name(), message))
            }
            Execution::TimedOut => {
                token.cancel();
                Err(DispatchError::timeout(
                    descriptor.name(),
                    timeout.unwrap_or_default(),
                ))
            }
        }
    }

    /// Applies a successful handler's staged effects.
    ///
    /// The environment commit is the point of no return: cancellation is
    /// honoured up to it, and subscriptions and events are only applied after
    /// it succeeds. Queued events were checked against the capability
    /// snapshot the request resolved under, so a set disabled mid-request
    /// cannot split the writes from their events.
    fn finalise(
        &self,
        command: &str,
        context: CommandContext,
        token: &CancellationToken,
    ) -> Result<(), DispatchError> {
        if token.is_cancelled() {
            return Err(DispatchError::cancelled(command));
        }
        let Effects {
            environment,
            events,
            subscriptions,
        } = context.into_effects();
        self.shared
            .environment
            .commit(environment, token)
            .map_err(|error| DispatchError::from_commit(command, error))?;

        for change in subscriptions {
            self.apply_subscription(change);
        }
        for PendingEvent {
            instruction_set,
            name,
            payload,
        } in events
        {
            if let Err(error) =
                self.shared
                    .events
                    .publish_with(&instruction_set, &name, payload, fan_out)
            {
                warn!(
                    target: DISPATCH_TARGET,
                    %command,
                    %instruction_set,
                    event = %name,
                    %error,
                    "queued event could not be published"
                );
            }
        }
        Ok(())
    }

    fn apply_subscription(&self, change: SubscriptionChange) {
        let result = match change {
            SubscriptionChange::Subscribe {
                instruction_set,
                name,
                subscriber,
                ttl,
            } => self
                .shared
                .events
                .subscribe(&instruction_set, &name, subscriber, ttl),
            SubscriptionChange::Unsubscribe {
                instruction_set,
                name,
                subscriber,
            } => self
                .shared
                .events
                .unsubscribe(&instruction_set, &name, &subscriber)
                .map(|_| ()),
        };
        if let Err(error) = result {
            warn!(target: DISPATCH_TARGET, %error, "subscription change failed");
        }
    }
}

fn fan_out(deliveries: &[Delivery]) {
    for delivery in deliveries {
        let Some(sink) = delivery.subscriber.sink() else {
            continue;
        };
        match sink.deliver(&delivery.event) {
            DeliveryStatus::Delivered => {}
            DeliveryStatus::Dropped => warn!(
                target: DISPATCH_TARGET,
                subscriber = %delivery.subscriber.id(),
                instruction_set = %delivery.event.instruction_set,
                event = %delivery.event.name,
                sequence = delivery.event.sequence,
                "subscriber queue full; event dropped"
            ),
            DeliveryStatus::Closed => debug!(
                target: DISPATCH_TARGET,
                subscriber = %delivery.subscriber.id(),
                "subscriber closed"
            ),
        }
    }
}

/// Collects registrations before the dispatcher starts serving.
#[derive(Debug)]
pub struct DispatcherBuilder {
    settings: DispatcherSettings,
    instruction_sets: InstructionSetRegistry,
    commands: CommandRegistry,
    events: EventRegistry,
    environment: Option<Arc<GlobalEnvironment>>,
}

impl DispatcherBuilder {
    /// Creates a builder enabling the configured instruction sets.
    #[must_use]
    pub fn new(settings: DispatcherSettings) -> Self {
        let instruction_sets =
            InstructionSetRegistry::with_enabled(settings.instruction_sets.iter().cloned());
        Self {
            settings,
            instruction_sets,
            commands: CommandRegistry::new(),
            events: EventRegistry::new(),
            environment: None,
        }
    }

    /// Uses `environment` instead of a fresh empty store.
    #[must_use]
    pub fn environment(mut self, environment: Arc<GlobalEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Installs every command and event of `module`.
    ///
    /// # Errors
    ///
    /// Propagates the first registration failure; registration conflicts are
    /// configuration errors and must abort startup.
    pub fn install(&mut self, module: &dyn CommandModule) -> Result<(), RegistryError> {
        let commands_before = self.commands.len();
        let events_before = self.events.events().len();
        module.register(self)?;
        info!(
            target: DISPATCH_TARGET,
            module = module.name(),
            commands = self.commands.len() - commands_before,
            events = self.events.events().len() - events_before,
            "command module installed"
        );
        Ok(())
    }

    /// Freezes the registries and returns the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            shared: Arc::new(Shared {
                settings: self.settings,
                instruction_sets: self.instruction_sets,
                commands: self.commands,
                events: self.events,
                environment: self.environment.unwrap_or_default(),
                active: ActiveCommands::default(),
            }),
        }
    }
}

impl Registrar for DispatcherBuilder {
    fn register_command(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistryError> {
        let instruction_set = descriptor.instruction_set().to_owned();
        self.commands.register(descriptor)?;
        self.instruction_sets.declare(&instruction_set);
        Ok(())
    }

    fn register_event(&mut self, descriptor: EventDescriptor) -> Result<(), RegistryError> {
        let instruction_set = descriptor.instruction_set().to_owned();
        self.events.register(descriptor)?;
        self.instruction_sets.declare(&instruction_set);
        Ok(())
    }
}
