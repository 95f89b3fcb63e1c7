//! JSONL sessions bridging sockets to the dispatcher.
//!
//! A session greets the client with the enabled instruction sets, then reads
//! command and cancel frames until the client disconnects. Each command runs
//! on its own thread so a slow command never blocks the next frame. All
//! outbound messages pass through one bounded queue drained by a writer
//! thread: responses wait for room, events are dropped when it is full.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use osmp_protocol::{ClientMessage, CommandFrame, CorrelationId, Event, Greeting, ServerMessage};
use tracing::{debug, info, warn};

use crate::dispatch::{Caller, Dispatcher, SessionId};
use crate::registry::{DeliveryStatus, EventSink, SubscriberHandle};

use super::lines::{Line, LineReader, MAX_LINE_BYTES};
use super::writer::ResponseWriter;
use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET};

/// Serves every accepted connection as an OSMP session.
#[derive(Debug, Clone)]
pub(crate) struct SessionHandler {
    dispatcher: Dispatcher,
    service_path: String,
    queue_capacity: usize,
}

impl SessionHandler {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        service_path: impl Into<String>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            dispatcher,
            service_path: service_path.into(),
            queue_capacity: queue_capacity.max(1),
        }
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let session = SessionId::next();
        let output = match stream.try_clone() {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    %session,
                    %error,
                    "failed to split connection"
                );
                return;
            }
        };

        let (outbox, queue) = mpsc::sync_channel(self.queue_capacity);
        let writer = match thread::Builder::new()
            .name(format!("osmp-writer-{session}"))
            .spawn(move || drain(output, queue, session))
        {
            Ok(writer) => writer,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    %session,
                    %error,
                    "failed to spawn session writer"
                );
                return;
            }
        };

        info!(target: LISTENER_TARGET, %session, "session opened");
        let mut state = Session::open(session, self.dispatcher.clone(), outbox);
        state.send(ServerMessage::greeting(&Greeting::new(
            self.service_path.clone(),
            self.dispatcher.list_enabled_instruction_sets(),
        )));
        state.serve(stream);
        state.close();

        if writer.join().is_err() {
            warn!(target: LISTENER_TARGET, %session, "session writer panicked");
        }
        info!(target: LISTENER_TARGET, %session, "session closed");
    }
}

/// Event sink feeding a session's outbound queue.
struct SessionSink {
    session: SessionId,
    outbox: SyncSender<ServerMessage>,
}

impl EventSink for SessionSink {
    fn deliver(&self, event: &Event) -> DeliveryStatus {
        match self.outbox.try_send(ServerMessage::event(event.clone())) {
            Ok(()) => DeliveryStatus::Delivered,
            Err(TrySendError::Full(_)) => {
                debug!(
                    target: LISTENER_TARGET,
                    session = %self.session,
                    "outbound queue full"
                );
                DeliveryStatus::Dropped
            }
            Err(TrySendError::Disconnected(_)) => DeliveryStatus::Closed,
        }
    }
}

struct Session {
    id: SessionId,
    dispatcher: Dispatcher,
    outbox: SyncSender<ServerMessage>,
    // Keeps the subscriber alive; the registry only holds a weak handle.
    _sink: Arc<dyn EventSink>,
    caller: Caller,
    commands: Vec<JoinHandle<()>>,
}

impl Session {
    fn open(id: SessionId, dispatcher: Dispatcher, outbox: SyncSender<ServerMessage>) -> Self {
        let sink: Arc<dyn EventSink> = Arc::new(SessionSink {
            session: id,
            outbox: outbox.clone(),
        });
        let caller = Caller::session(id, Some(SubscriberHandle::new(&sink)));
        Self {
            id,
            dispatcher,
            outbox,
            _sink: sink,
            caller,
            commands: Vec::new(),
        }
    }

    fn serve(&mut self, stream: ConnectionStream) {
        let mut reader = LineReader::new(stream);
        loop {
            match reader.next_line() {
                Ok(Some(Line::Complete(line))) => self.receive(&line),
                Ok(Some(Line::Oversize)) => self.send(ServerMessage::error(format!(
                    "frame exceeds {MAX_LINE_BYTES} bytes"
                ))),
                Ok(None) => break,
                Err(error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        session = %self.id,
                        %error,
                        "session read failed"
                    );
                    break;
                }
            }
        }
    }

    fn receive(&mut self, line: &[u8]) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        match serde_json::from_slice::<ClientMessage>(line) {
            Ok(ClientMessage::Cmd(frame)) => self.start(frame),
            Ok(ClientMessage::Cancel { nr }) => self.cancel(nr),
            Err(error) => self.send(ServerMessage::error(format!("malformed frame: {error}"))),
        }
    }

    fn start(&mut self, frame: CommandFrame) {
        self.commands.retain(|command| !command.is_finished());

        let name = frame.id.clone();
        let request = frame.into_request();
        let dispatcher = self.dispatcher.clone();
        let caller = self.caller.clone();
        let outbox = self.outbox.clone();
        let spawned = thread::Builder::new()
            .name(format!("osmp-request-{}", self.id))
            .spawn(move || {
                let response = dispatcher.handle_as(&caller, request);
                // The writer is gone once the client disconnects.
                drop(outbox.send(ServerMessage::response(name, response)));
            });
        match spawned {
            Ok(command) => self.commands.push(command),
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    session = %self.id,
                    %error,
                    "failed to spawn command thread"
                );
                self.send(ServerMessage::error("server is out of worker threads"));
            }
        }
    }

    fn cancel(&self, correlation_id: CorrelationId) {
        if !self.dispatcher.cancel(self.id, correlation_id) {
            self.send(ServerMessage::error(format!(
                "no command {correlation_id} is running"
            )));
        }
    }

    fn send(&self, message: ServerMessage) {
        // Fails only once the writer has stopped.
        drop(self.outbox.send(message));
    }

    /// Cancels outstanding work and releases the session's subscriptions.
    fn close(self) {
        let cancelled = self.dispatcher.cancel_origin(self.id);
        if cancelled > 0 {
            debug!(
                target: LISTENER_TARGET,
                session = %self.id,
                cancelled,
                "cancelled in-flight commands"
            );
        }
        if let Some(handle) = self.caller.subscriber() {
            self.dispatcher.unsubscribe_all(handle);
        }
        for command in self.commands {
            if command.join().is_err() {
                warn!(target: LISTENER_TARGET, session = %self.id, "command thread panicked");
            }
        }
    }
}

fn drain(output: ConnectionStream, queue: Receiver<ServerMessage>, session: SessionId) {
    let mut writer = ResponseWriter::new(output);
    for message in queue {
        if let Err(error) = writer.write_message(&message) {
            debug!(
                target: LISTENER_TARGET,
                %session,
                %error,
                "session write failed"
            );
            break;
        }
    }
}
