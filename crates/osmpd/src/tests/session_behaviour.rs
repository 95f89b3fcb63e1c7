//! Behavioural tests for JSONL sessions served by a bootstrapped daemon.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use osmp_config::{Config, SocketEndpoint};
use osmp_protocol::{Greeting, ResponseStatus, ServerMessage};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::bootstrap::{Daemon, StaticConfigLoader, bootstrap_with};
use crate::standard::HEARTBEAT_EVENT;
use crate::transport::ListenerHandle;

use super::support::RecordingHealthReporter;

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).expect("write frame");
        self.stream.write_all(b"\n").expect("write newline");
    }

    fn receive(&mut self) -> ServerMessage {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read frame");
        serde_json::from_str(&line).expect("decode server frame")
    }
}

#[derive(Default)]
struct SessionWorld {
    daemon: Option<Daemon>,
    listener: Option<ListenerHandle>,
    client: Option<Client>,
    received: Vec<ServerMessage>,
}

impl SessionWorld {
    fn start(&mut self) {
        let loader = StaticConfigLoader::new(Config {
            listen: SocketEndpoint::tcp("127.0.0.1", 0),
            ..Config::default()
        });
        let daemon = bootstrap_with(&loader, Arc::new(RecordingHealthReporter::default()), &[])
            .expect("bootstrap should succeed");
        self.listener = Some(daemon.start_listener().expect("listener should start"));
        self.daemon = Some(daemon);
    }

    fn connect(&mut self) {
        let addr = self
            .listener
            .as_ref()
            .and_then(ListenerHandle::local_addr)
            .expect("tcp listener address");
        let stream = TcpStream::connect(addr).expect("connect client");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        self.client = Some(Client { stream, reader });
    }

    fn client(&mut self) -> &mut Client {
        self.client.as_mut().expect("client should be connected")
    }

    fn daemon(&self) -> &Daemon {
        self.daemon.as_ref().expect("daemon should be running")
    }

    fn last(&self) -> &ServerMessage {
        self.received.last().expect("no frame was received")
    }
}

impl Drop for SessionWorld {
    fn drop(&mut self) {
        self.client = None;
        if let Some(listener) = self.listener.take() {
            drop(listener.stop(Duration::from_secs(2)));
        }
    }
}

#[fixture]
fn world() -> RefCell<SessionWorld> {
    RefCell::new(SessionWorld::default())
}

#[given("a running daemon")]
fn given_running_daemon(world: &RefCell<SessionWorld>) {
    world.borrow_mut().start();
}

#[given("a connected client")]
fn given_connected_client(world: &RefCell<SessionWorld>) {
    let mut world = world.borrow_mut();
    world.connect();
    let greeting = world.client().receive();
    world.received.push(greeting);
}

#[when("the client sends {frame}")]
fn when_client_sends(world: &RefCell<SessionWorld>, frame: String) {
    world.borrow_mut().client().send(&frame);
}

#[when("the client reads a frame")]
fn when_client_reads(world: &RefCell<SessionWorld>) {
    let mut world = world.borrow_mut();
    let message = world.client().receive();
    world.received.push(message);
}

#[when("the client reads {count} frames")]
fn when_client_reads_many(world: &RefCell<SessionWorld>, count: usize) {
    let mut world = world.borrow_mut();
    for _ in 0..count {
        let message = world.client().receive();
        world.received.push(message);
    }
}

#[when("the daemon publishes {count} heartbeats")]
fn when_daemon_publishes(world: &RefCell<SessionWorld>, count: u64) {
    let world = world.borrow();
    for uptime in 0..count {
        world
            .daemon()
            .dispatcher()
            .publish("standard", HEARTBEAT_EVENT, json!({"uptime": uptime}))
            .expect("publish heartbeat");
    }
}

#[when("the daemon is executing {count} command")]
fn when_daemon_executing(world: &RefCell<SessionWorld>, count: usize) {
    let world = world.borrow();
    let dispatcher = world.daemon().dispatcher();
    let deadline = Instant::now() + Duration::from_secs(5);
    while dispatcher.active_commands().len() != count {
        assert!(
            Instant::now() < deadline,
            "expected {count} active commands, found {}",
            dispatcher.active_commands().len()
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[then("the greeting advertises {sets}")]
fn then_greeting_advertises(world: &RefCell<SessionWorld>, sets: String) {
    let world = world.borrow();
    let ServerMessage::Event(frame) = world.received.first().expect("greeting missing") else {
        panic!("expected greeting event");
    };
    let greeting = Greeting::from_frame(frame).expect("greeting payload");
    let expected: Vec<String> = sets.split(',').map(|set| set.trim().to_owned()).collect();
    assert_eq!(greeting.instruction_sets, expected);
    assert_eq!(greeting.service, world.daemon().config().service_path());
}

#[then("the response to {nr} succeeds with {data}")]
fn then_response_succeeds(world: &RefCell<SessionWorld>, nr: u64, data: String) {
    let world = world.borrow();
    let ServerMessage::Response(frame) = world.last() else {
        panic!("expected response, got {:?}", world.last());
    };
    let expected: Value = serde_json::from_str(&data).expect("expected data must be JSON");
    assert_eq!(frame.cmd_nr.0, nr);
    assert_eq!(frame.status, ResponseStatus::Ok);
    assert_eq!(frame.data.as_ref(), Some(&expected));
}

#[then("the response to {nr} fails with {kind}")]
fn then_response_fails(world: &RefCell<SessionWorld>, nr: u64, kind: String) {
    let world = world.borrow();
    let ServerMessage::Response(frame) = world.last() else {
        panic!("expected response, got {:?}", world.last());
    };
    assert_eq!(frame.cmd_nr.0, nr);
    assert_eq!(frame.status, ResponseStatus::Error);
    let error = frame.error.as_ref().expect("error detail");
    assert_eq!(error.kind.to_string(), kind);
}

#[then("the client received an error frame")]
fn then_error_frame(world: &RefCell<SessionWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.last(), ServerMessage::Error { .. }),
        "expected error frame, got {:?}",
        world.last()
    );
}

#[then("the client received heartbeats numbered {numbers}")]
fn then_heartbeats_numbered(world: &RefCell<SessionWorld>, numbers: String) {
    let expected: Vec<u64> = numbers
        .split(',')
        .map(|number| number.trim().parse().expect("sequence number"))
        .collect();
    let world = world.borrow();
    let received: Vec<u64> = world
        .received
        .iter()
        .filter_map(|message| match message {
            ServerMessage::Event(frame) if frame.id == HEARTBEAT_EVENT => Some(frame.nr),
            _ => None,
        })
        .collect();
    assert_eq!(received, expected);
}

macro_rules! session_scenario {
    ($($test:ident => $name:literal),+ $(,)?) => {
        $(
            #[scenario(path = "tests/features/session.feature", name = $name)]
            fn $test(world: RefCell<SessionWorld>) {
                drop(world);
            }
        )+
    };
}

session_scenario! {
    sessions_are_greeted => "Sessions open with a capability greeting",
    echo_over_the_wire => "Echo over the wire",
    denied_over_the_wire => "Disabled instruction sets are denied over the wire",
    malformed_frames => "Malformed frames do not end the session",
    heartbeats_in_order => "Subscribed sessions receive events in order",
    cancel_over_the_wire => "Cancelling a running command over the wire",
}
