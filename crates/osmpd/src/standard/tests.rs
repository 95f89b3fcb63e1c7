//! Behaviour of the built-in `standard` commands.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use osmp_protocol::{CorrelationId, ErrorKind, Outcome};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::dispatch::{Caller, Dispatcher, DispatcherSettings};
use crate::tests::support::{RecordingSink, call, session_for, success};

struct Session {
    dispatcher: Dispatcher,
    sink: Arc<RecordingSink>,
    caller: Caller,
}

impl Session {
    fn call(&self, command: &str, arguments: Value) -> Outcome {
        call(&self.dispatcher, &self.caller, "standard", command, arguments)
    }
}

#[fixture]
fn session() -> Session {
    let mut builder = Dispatcher::builder(DispatcherSettings {
        instruction_sets: vec!["standard".to_owned()],
        command_timeout: None,
    });
    builder.install(&StandardModule).expect("install standard module");
    let sink = RecordingSink::new();
    Session {
        dispatcher: builder.build(),
        caller: session_for(&sink),
        sink,
    }
}

#[rstest]
#[case(json!({"text": "hi"}))]
#[case(json!(["hi"]))]
fn echo_returns_text_unchanged(session: Session, #[case] arguments: Value) {
    assert_eq!(success(session.call("echo", arguments)), json!("hi"));
}

#[rstest]
fn echo_requires_text(session: Session) {
    assert_eq!(
        session.call("echo", Value::Null).error_kind(),
        Some(ErrorKind::MissingArgument)
    );
}

#[rstest]
fn help_lists_every_standard_command(session: Session) {
    let listing = success(session.call("help", Value::Null));
    let names: Vec<&str> = listing
        .as_array()
        .expect("help returns an array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    for expected in [
        "echo",
        "wait",
        "help",
        "apropos",
        "capabilities",
        "active-cmds",
        "event-list",
        "event-subscribe",
        "event-unsubscribe",
    ] {
        assert!(names.contains(&expected), "help is missing {expected}");
    }
}

#[rstest]
fn help_describes_a_command_by_alias(session: Session) {
    let detail = success(session.call("?", json!({"command": "evs"})));
    assert_eq!(detail["name"], json!("event-subscribe"));
    assert_eq!(detail["aliases"], json!(["evs"]));
    assert_eq!(detail["parameters"][0]["name"], json!("event"));
    assert_eq!(detail["parameters"][0]["kind"], json!("string"));
    assert!(detail["details"].as_str().is_some());
}

#[rstest]
fn help_for_an_unknown_command_fails(session: Session) {
    assert_eq!(
        session.call("help", json!({"command": "bogus"})).error_kind(),
        Some(ErrorKind::UnknownCommand)
    );
}

#[rstest]
fn apropos_matches_names_and_descriptions(session: Session) {
    let matches = success(session.call("apropos", json!({"term": "SUBSCRI"})));
    let names: Vec<&str> = matches
        .as_array()
        .expect("apropos returns an array")
        .iter()
        .filter_map(|entry| entry["name"].as_str())
        .collect();
    assert_eq!(names, ["event-subscribe", "event-unsubscribe"]);
}

#[rstest]
fn capabilities_lists_enabled_instruction_sets(session: Session) {
    session.dispatcher.enable_instruction_set("custom");
    assert_eq!(
        success(session.call("capabilities", Value::Null)),
        json!(["standard", "custom"])
    );
}

#[rstest]
fn active_commands_include_the_caller(session: Session) {
    let active = success(session.call("active-cmds", Value::Null));
    let entries = active.as_array().expect("active-cmds returns an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["command"], json!("active-cmds"));
    assert_eq!(entries[0]["cmd-nr"], json!(1));
    assert!(session.dispatcher.active_commands().is_empty());
}

#[rstest]
fn event_list_reports_the_heartbeat(session: Session) {
    let events = success(session.call("event-list", Value::Null));
    assert_eq!(events[0]["instruction-set"], json!("standard"));
    assert_eq!(events[0]["name"], json!(HEARTBEAT_EVENT));
}

#[rstest]
fn subscribing_routes_published_events_to_the_session(session: Session) {
    let result = success(session.call("evs", json!({"event": HEARTBEAT_EVENT})));
    assert_eq!(result["subscribed"], json!([HEARTBEAT_EVENT]));

    let deliveries = session
        .dispatcher
        .publish("standard", HEARTBEAT_EVENT, json!({"uptime": 1}))
        .expect("publish");
    assert_eq!(deliveries.len(), 1);
    let received = session.sink.events();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload, json!({"uptime": 1}));
}

#[rstest]
fn wildcard_subscribes_to_every_event_of_the_instruction_set(session: Session) {
    let result = success(session.call("event-subscribe", json!({"event": "*"})));
    assert_eq!(result["subscribed"], json!([HEARTBEAT_EVENT]));
    assert_eq!(
        session
            .dispatcher
            .events()
            .subscriber_count("standard", HEARTBEAT_EVENT)
            .expect("count"),
        1
    );
}

#[rstest]
#[case(json!({"event": HEARTBEAT_EVENT, "timeout": 0}), ErrorKind::InvalidArgument)]
#[case(json!({"event": HEARTBEAT_EVENT, "timeout": -3}), ErrorKind::InvalidArgument)]
#[case(json!({"event": "missing"}), ErrorKind::UnknownEvent)]
#[case(json!({"event": HEARTBEAT_EVENT, "instruction-set": "custom"}), ErrorKind::CapabilityDenied)]
fn invalid_subscriptions_are_rejected(
    session: Session,
    #[case] arguments: Value,
    #[case] kind: ErrorKind,
) {
    assert_eq!(session.call("evs", arguments).error_kind(), Some(kind));
    assert_eq!(
        session
            .dispatcher
            .events()
            .subscriber_count("standard", HEARTBEAT_EVENT)
            .expect("count"),
        0
    );
}

#[rstest]
fn the_server_itself_cannot_subscribe(session: Session) {
    let outcome = call(
        &session.dispatcher,
        &Caller::internal(),
        "standard",
        "evs",
        json!({"event": HEARTBEAT_EVENT}),
    );
    assert_eq!(outcome.error_kind(), Some(ErrorKind::HandlerError));
}

#[rstest]
fn unsubscribing_is_idempotent(session: Session) {
    success(session.call("evs", json!({"event": HEARTBEAT_EVENT})));
    success(session.call("evu", json!({"event": HEARTBEAT_EVENT})));
    success(session.call("evu", json!({"event": HEARTBEAT_EVENT})));

    let deliveries = session
        .dispatcher
        .publish("standard", HEARTBEAT_EVENT, Value::Null)
        .expect("publish");
    assert!(deliveries.is_empty());
    assert!(session.sink.events().is_empty());
}

#[rstest]
fn wait_returns_after_the_requested_time(session: Session) {
    let result = success(session.call("wait", json!({"seconds": 0.02})));
    let waited = result["waited"].as_f64().expect("waited seconds");
    assert!(waited >= 0.02, "waited only {waited}s");
}

#[rstest]
#[case(json!({"seconds": -1}), ErrorKind::InvalidArgument)]
#[case(json!({"seconds": "soon"}), ErrorKind::InvalidArgument)]
fn wait_rejects_bad_durations(session: Session, #[case] arguments: Value, #[case] kind: ErrorKind) {
    assert_eq!(session.call("wait", arguments).error_kind(), Some(kind));
}

#[test]
fn unbounded_wait_ends_at_the_command_timeout() {
    let mut builder = Dispatcher::builder(DispatcherSettings {
        instruction_sets: vec!["standard".to_owned()],
        command_timeout: Some(Duration::from_millis(50)),
    });
    builder.install(&StandardModule).expect("install standard module");
    let dispatcher = builder.build();

    let outcome = call(&dispatcher, &Caller::internal(), "standard", "wait", Value::Null);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
}

#[rstest]
fn unbounded_wait_ends_when_cancelled(session: Session) {
    let canceller = {
        let dispatcher = session.dispatcher.clone();
        let origin = session.caller.id();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while dispatcher.active_commands().is_empty() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            dispatcher.cancel(origin, CorrelationId(1))
        })
    };

    let outcome = session.call("wait", Value::Null);
    assert!(canceller.join().expect("canceller panicked"));
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
}
