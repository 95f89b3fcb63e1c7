//! Execution context handed to command handlers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use osmp_protocol::CorrelationId;
use serde::Serialize;
use serde_json::Value;

use crate::cancellation::CancellationToken;
use crate::environment::EnvTransaction;
use crate::registry::{
    BoundArguments, CommandRegistry, EventRegistry, InstructionSetSnapshot, SubscriberHandle,
};

use super::active::ActiveCommand;
use super::dispatcher::Dispatcher;
use super::errors::{DispatchError, HandlerFailure};

/// Identity of the connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Requests issued by the server itself.
    pub const INTERNAL: Self = Self(0);

    /// Allocates a fresh session identity.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Who issued a request and where its events should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    session: SessionId,
    subscriber: Option<SubscriberHandle>,
}

impl Caller {
    /// The server itself; cannot receive events.
    #[must_use]
    pub const fn internal() -> Self {
        Self {
            session: SessionId::INTERNAL,
            subscriber: None,
        }
    }

    /// A client session, optionally able to receive events.
    #[must_use]
    pub fn session(session: SessionId, subscriber: Option<SubscriberHandle>) -> Self {
        Self {
            session,
            subscriber,
        }
    }

    /// Session identity.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.session
    }

    /// Event subscriber handle of the session.
    #[must_use]
    pub const fn subscriber(&self) -> Option<&SubscriberHandle> {
        self.subscriber.as_ref()
    }
}

/// Identifies the invocation a context belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Instruction set of the command.
    pub instruction_set: String,
    /// Canonical command name.
    pub command: String,
    /// Name used by the caller; differs from `command` for aliases.
    pub requested_as: String,
    /// Correlation number supplied by the caller.
    pub correlation_id: CorrelationId,
    /// Session that issued the request.
    pub session: SessionId,
}

#[derive(Debug)]
pub(super) struct PendingEvent {
    pub(super) instruction_set: String,
    pub(super) name: String,
    pub(super) payload: Value,
}

#[derive(Debug)]
pub(super) enum SubscriptionChange {
    Subscribe {
        instruction_set: String,
        name: String,
        subscriber: SubscriberHandle,
        ttl: Option<Duration>,
    },
    Unsubscribe {
        instruction_set: String,
        name: String,
        subscriber: SubscriberHandle,
    },
}

/// Side effects that take effect only when the handler succeeds.
#[derive(Debug)]
pub(super) struct Effects {
    pub(super) environment: EnvTransaction,
    pub(super) events: Vec<PendingEvent>,
    pub(super) subscriptions: Vec<SubscriptionChange>,
}

/// State available to a running command.
///
/// Environment writes, event publications and subscription changes are
/// staged here. The dispatcher applies them after the handler returns `Ok`
/// and discards them otherwise.
///
/// Capability queries answer from the snapshot taken when the request passed
/// its capability check, not from the live registry.
pub struct CommandContext {
    invocation: Invocation,
    arguments: BoundArguments,
    caller: Caller,
    token: CancellationToken,
    capabilities: Arc<InstructionSetSnapshot>,
    dispatcher: Dispatcher,
    environment: EnvTransaction,
    events: Vec<PendingEvent>,
    subscriptions: Vec<SubscriptionChange>,
}

impl CommandContext {
    pub(super) fn new(
        invocation: Invocation,
        arguments: BoundArguments,
        caller: Caller,
        token: CancellationToken,
        capabilities: Arc<InstructionSetSnapshot>,
        dispatcher: Dispatcher,
    ) -> Self {
        let environment = dispatcher.environment().begin();
        Self {
            invocation,
            arguments,
            caller,
            token,
            capabilities,
            dispatcher,
            environment,
            events: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// The invocation being served.
    #[must_use]
    pub const fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Validated arguments.
    #[must_use]
    pub const fn arguments(&self) -> &BoundArguments {
        &self.arguments
    }

    /// The requesting session.
    #[must_use]
    pub const fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Staged environment view.
    #[must_use]
    pub const fn env(&self) -> &EnvTransaction {
        &self.environment
    }

    /// Mutable staged environment view.
    pub const fn env_mut(&mut self) -> &mut EnvTransaction {
        &mut self.environment
    }

    /// Returns true once the invocation has been cancelled or timed out.
    /// Long-running handlers should poll this and return early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancellation token of the invocation.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Registered commands.
    #[must_use]
    pub fn commands(&self) -> &CommandRegistry {
        self.dispatcher.commands()
    }

    /// Registered events.
    #[must_use]
    pub fn events(&self) -> &EventRegistry {
        self.dispatcher.events()
    }

    /// Instruction sets enabled when the request was admitted, in insertion
    /// order.
    #[must_use]
    pub fn enabled_instruction_sets(&self) -> Vec<String> {
        self.capabilities.list_enabled()
    }

    /// Returns true when `instruction_set` was enabled when the request was
    /// admitted.
    #[must_use]
    pub fn is_enabled(&self, instruction_set: &str) -> bool {
        self.capabilities.is_enabled(instruction_set)
    }

    /// Snapshot of in-flight invocations, this one included.
    #[must_use]
    pub fn active_commands(&self) -> Vec<ActiveCommand> {
        self.dispatcher.active_commands()
    }

    /// Queues an event for publication after the command succeeds.
    ///
    /// # Errors
    ///
    /// Fails with `unknown_event` when the event is not registered and with
    /// `capability_denied` when its instruction set is disabled.
    pub fn publish(
        &mut self,
        instruction_set: &str,
        name: &str,
        payload: Value,
    ) -> Result<(), HandlerFailure> {
        self.check_event(instruction_set, name)?;
        self.events.push(PendingEvent {
            instruction_set: instruction_set.to_owned(),
            name: name.to_owned(),
            payload,
        });
        Ok(())
    }

    /// Queues a subscription of the calling session.
    ///
    /// # Errors
    ///
    /// Fails when the caller cannot receive events, when the event is not
    /// registered, or when its instruction set is disabled.
    pub fn subscribe(
        &mut self,
        instruction_set: &str,
        name: &str,
        ttl: Option<Duration>,
    ) -> Result<(), HandlerFailure> {
        let subscriber = self.subscriber()?;
        self.check_event(instruction_set, name)?;
        self.subscriptions.push(SubscriptionChange::Subscribe {
            instruction_set: instruction_set.to_owned(),
            name: name.to_owned(),
            subscriber,
            ttl,
        });
        Ok(())
    }

    /// Queues removal of the calling session's subscription. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails when the caller cannot receive events or when the event is not
    /// registered.
    pub fn unsubscribe(&mut self, instruction_set: &str, name: &str) -> Result<(), HandlerFailure> {
        let subscriber = self.subscriber()?;
        self.dispatcher
            .events()
            .descriptor(instruction_set, name)
            .map_err(DispatchError::from)?;
        self.subscriptions.push(SubscriptionChange::Unsubscribe {
            instruction_set: instruction_set.to_owned(),
            name: name.to_owned(),
            subscriber,
        });
        Ok(())
    }

    pub(super) fn into_effects(self) -> Effects {
        Effects {
            environment: self.environment,
            events: self.events,
            subscriptions: self.subscriptions,
        }
    }

    fn subscriber(&self) -> Result<SubscriberHandle, HandlerFailure> {
        self.caller
            .subscriber()
            .cloned()
            .ok_or_else(|| HandlerFailure::new("this session cannot receive events"))
    }

    fn check_event(&self, instruction_set: &str, name: &str) -> Result<(), HandlerFailure> {
        self.dispatcher
            .events()
            .descriptor(instruction_set, name)
            .map_err(DispatchError::from)?;
        if !self.is_enabled(instruction_set) {
            return Err(DispatchError::capability_denied(instruction_set).into());
        }
        Ok(())
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandContext")
            .field("invocation", &self.invocation)
            .field("arguments", &self.arguments)
            .field("caller", &self.caller)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
