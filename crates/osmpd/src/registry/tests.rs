//! Unit tests for the command, event and instruction set registries.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use osmp_protocol::{Arguments, ErrorKind};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::dispatch::{CommandContext, HandlerFailure};

fn noop(_: &mut CommandContext) -> Result<Value, HandlerFailure> {
    Ok(Value::Null)
}

fn sink_handle(sink: MockEventSink) -> (Arc<dyn EventSink>, SubscriberHandle) {
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let handle = SubscriberHandle::new(&sink);
    (sink, handle)
}

#[fixture]
fn events() -> EventRegistry {
    let mut registry = EventRegistry::new();
    registry
        .register(EventDescriptor::new("standard", "heartbeat").describe("liveness"))
        .expect("register heartbeat");
    registry
        .register(EventDescriptor::new("standard", "tick"))
        .expect("register tick");
    registry
}

#[test]
fn commands_resolve_by_name_and_alias_within_their_instruction_set() {
    let mut registry = CommandRegistry::new();
    registry
        .register(CommandDescriptor::new("standard", "help", noop).alias("?"))
        .expect("register help");

    assert_eq!(
        registry.resolve("standard", "?").expect("alias").name(),
        "help"
    );
    let miss = registry.resolve("custom", "help").expect_err("no fallback");
    assert_eq!(miss.kind(), ErrorKind::UnknownCommand);
}

#[rstest]
#[case::same_name(CommandDescriptor::new("standard", "echo", noop))]
#[case::alias_collides_with_name(CommandDescriptor::new("standard", "say", noop).alias("echo"))]
#[case::name_collides_with_alias(CommandDescriptor::new("standard", "talk", noop))]
fn duplicate_command_names_are_rejected(#[case] descriptor: CommandDescriptor) {
    let mut registry = CommandRegistry::new();
    registry
        .register(CommandDescriptor::new("standard", "echo", noop).alias("talk"))
        .expect("register echo");

    let error = registry.register(descriptor).expect_err("collision");
    assert_eq!(error.kind(), ErrorKind::DuplicateCommand);
    assert_eq!(registry.len(), 1);
    assert!(registry.resolve("standard", "say").is_err());
}

#[test]
fn the_same_name_may_exist_in_different_instruction_sets() {
    let mut registry = CommandRegistry::new();
    registry
        .register(CommandDescriptor::new("standard", "status", noop))
        .expect("register standard status");
    registry
        .register(CommandDescriptor::new("custom", "status", noop))
        .expect("register custom status");
    assert_eq!(registry.in_instruction_set("custom").count(), 1);
}

#[rstest]
#[case("")]
#[case(" padded")]
fn blank_names_are_invalid(#[case] name: &str) {
    let mut registry = CommandRegistry::new();
    let error = registry
        .register(CommandDescriptor::new("standard", name, noop))
        .expect_err("invalid name");
    assert!(matches!(error, RegistryError::InvalidName { .. }));
}

#[rstest]
fn duplicate_events_are_rejected(mut events: EventRegistry) {
    let error = events
        .register(EventDescriptor::new("standard", "tick"))
        .expect_err("duplicate");
    assert_eq!(error.kind(), ErrorKind::DuplicateEvent);
    assert_eq!(events.events().len(), 2);
}

#[rstest]
fn publishing_without_subscribers_succeeds(events: EventRegistry) {
    let deliveries = events
        .publish("standard", "heartbeat", json!({}))
        .expect("publish");
    assert!(deliveries.is_empty());
}

#[rstest]
fn publishing_an_unknown_event_fails(events: EventRegistry) {
    let error = events
        .publish("standard", "missing", Value::Null)
        .expect_err("unknown event");
    assert_eq!(error.kind(), ErrorKind::UnknownEvent);
}

#[rstest]
fn sequences_increase_across_events_of_one_instruction_set(events: EventRegistry) {
    let (_sink, handle) = sink_handle(MockEventSink::new());
    events
        .subscribe("standard", "heartbeat", handle.clone(), None)
        .expect("subscribe heartbeat");
    events
        .subscribe("standard", "tick", handle, None)
        .expect("subscribe tick");

    let first = events
        .publish("standard", "heartbeat", json!(1))
        .expect("publish heartbeat");
    let second = events
        .publish("standard", "tick", json!(2))
        .expect("publish tick");
    assert_eq!(first[0].event.sequence, 1);
    assert_eq!(second[0].event.sequence, 2);
}

#[rstest]
fn fan_out_sees_every_subscriber_once(events: EventRegistry) {
    let mut first = MockEventSink::new();
    first
        .expect_deliver()
        .times(1)
        .returning(|_| DeliveryStatus::Delivered);
    let mut second = MockEventSink::new();
    second
        .expect_deliver()
        .times(1)
        .returning(|_| DeliveryStatus::Dropped);
    let (_first, first_handle) = sink_handle(first);
    let (_second, second_handle) = sink_handle(second);
    for handle in [&first_handle, &second_handle] {
        events
            .subscribe("standard", "heartbeat", handle.clone(), None)
            .expect("subscribe");
    }

    let mut statuses = Vec::new();
    events
        .publish_with("standard", "heartbeat", json!("beat"), |deliveries| {
            for delivery in deliveries {
                if let Some(sink) = delivery.subscriber.sink() {
                    statuses.push(sink.deliver(&delivery.event));
                }
            }
        })
        .expect("publish");
    assert_eq!(
        statuses,
        [DeliveryStatus::Delivered, DeliveryStatus::Dropped]
    );
}

#[rstest]
fn late_subscribers_never_see_earlier_events(events: EventRegistry) {
    let mut late = MockEventSink::new();
    late.expect_deliver()
        .withf(|event| event.sequence == 2 && event.payload == json!("second"))
        .times(1)
        .returning(|_| DeliveryStatus::Delivered);
    let (_late, handle) = sink_handle(late);

    assert!(events.publish("standard", "tick", json!("first")).expect("publish").is_empty());
    events
        .subscribe("standard", "tick", handle, None)
        .expect("subscribe");
    events
        .publish_with("standard", "tick", json!("second"), |deliveries| {
            for delivery in deliveries {
                if let Some(sink) = delivery.subscriber.sink() {
                    sink.deliver(&delivery.event);
                }
            }
        })
        .expect("publish");
}

#[rstest]
fn resubscribing_does_not_duplicate_deliveries(events: EventRegistry) {
    let (_sink, handle) = sink_handle(MockEventSink::new());
    for _ in 0..3 {
        events
            .subscribe("standard", "tick", handle.clone(), None)
            .expect("subscribe");
    }
    assert_eq!(events.subscriber_count("standard", "tick").expect("count"), 1);
}

#[rstest]
fn unsubscribe_is_idempotent(events: EventRegistry) {
    let (_sink, handle) = sink_handle(MockEventSink::new());
    events
        .subscribe("standard", "tick", handle.clone(), None)
        .expect("subscribe");
    assert!(events.unsubscribe("standard", "tick", &handle).expect("first"));
    assert!(!events.unsubscribe("standard", "tick", &handle).expect("second"));
    assert_eq!(
        events
            .unsubscribe("standard", "missing", &handle)
            .expect_err("unknown")
            .kind(),
        ErrorKind::UnknownEvent
    );
}

#[rstest]
fn unsubscribe_all_clears_every_channel(events: EventRegistry) {
    let (_sink, handle) = sink_handle(MockEventSink::new());
    events
        .subscribe("standard", "tick", handle.clone(), None)
        .expect("subscribe tick");
    events
        .subscribe("standard", "heartbeat", handle.clone(), None)
        .expect("subscribe heartbeat");
    assert_eq!(events.unsubscribe_all(&handle), 2);
    assert_eq!(events.unsubscribe_all(&handle), 0);
}

#[rstest]
fn dropped_subscribers_are_pruned_on_publish(events: EventRegistry) {
    let (sink, handle) = sink_handle(MockEventSink::new());
    events
        .subscribe("standard", "tick", handle.clone(), None)
        .expect("subscribe");
    drop(sink);

    assert!(!handle.is_alive());
    let deliveries = events.publish("standard", "tick", json!(0)).expect("publish");
    assert!(deliveries.is_empty());
}

#[rstest]
fn expired_subscriptions_receive_nothing(events: EventRegistry) {
    let (_sink, handle) = sink_handle(MockEventSink::new());
    events
        .subscribe("standard", "tick", handle, Some(Duration::from_millis(1)))
        .expect("subscribe");
    thread::sleep(Duration::from_millis(20));
    assert_eq!(events.subscriber_count("standard", "tick").expect("count"), 0);
    assert!(events.publish("standard", "tick", json!(0)).expect("publish").is_empty());
}

#[test]
fn instruction_sets_keep_insertion_order_and_toggle_idempotently() {
    let registry = InstructionSetRegistry::with_enabled(["standard", "custom"]);
    assert_eq!(registry.list_enabled(), ["standard", "custom"]);

    assert!(registry.disable("standard"));
    assert!(!registry.disable("standard"));
    assert!(!registry.disable("never-heard-of"));
    assert_eq!(registry.list_enabled(), ["custom"]);

    assert!(registry.enable("standard"));
    assert!(!registry.enable("standard"));
    assert_eq!(registry.list_enabled(), ["standard", "custom"]);
}

#[test]
fn standard_is_known_even_when_not_configured() {
    let registry = InstructionSetRegistry::with_enabled(["custom"]);
    assert!(!registry.is_enabled("standard"));
    assert!(registry.snapshot().contains("standard"));
    assert!(registry.enable("extension"));
    assert_eq!(registry.list_enabled(), ["custom", "extension"]);
}

#[test]
fn snapshots_are_unaffected_by_later_changes() {
    let registry = InstructionSetRegistry::new();
    let before = registry.snapshot();
    registry.disable("standard");
    assert!(before.is_enabled("standard"));
    assert!(!registry.is_enabled("standard"));
}

fn echo_schema() -> Schema {
    Schema::new()
        .param(ParamSpec::required("text", ParamKind::String))
        .param(ParamSpec::optional("times", ParamKind::Integer))
}

#[test]
fn named_arguments_bind_against_the_schema() {
    let bound = echo_schema()
        .bind(Arguments::named([("text", json!("hi"))]))
        .expect("bind");
    assert_eq!(bound.str("text"), Some("hi"));
    assert!(!bound.contains("times"));
}

#[test]
fn positional_arguments_bind_in_declaration_order() {
    let bound = echo_schema()
        .bind(Arguments::Positional(vec![json!("hi"), json!(3)]))
        .expect("bind");
    assert_eq!(bound.str("text"), Some("hi"));
    assert_eq!(bound.i64("times"), Some(3));
}

#[rstest]
#[case::missing(Arguments::named::<_, &str>([]), ErrorKind::MissingArgument)]
#[case::wrong_type(Arguments::named([("text", json!(5))]), ErrorKind::InvalidArgument)]
#[case::null_value(Arguments::named([("text", Value::Null)]), ErrorKind::InvalidArgument)]
#[case::float_for_integer(
    Arguments::named([("text", json!("hi")), ("times", json!(1.5))]),
    ErrorKind::InvalidArgument
)]
#[case::unknown_name(
    Arguments::named([("text", json!("hi")), ("loud", json!(true))]),
    ErrorKind::UnexpectedArgument
)]
#[case::too_many_positional(
    Arguments::Positional(vec![json!("hi"), json!(1), json!(2)]),
    ErrorKind::UnexpectedArgument
)]
fn schema_violations_are_classified(#[case] arguments: Arguments, #[case] kind: ErrorKind) {
    let violation = echo_schema().bind(arguments).expect_err("violation");
    assert_eq!(violation.kind(), kind);
}

#[test]
fn unexpected_names_are_reported_before_missing_ones() {
    let violation = echo_schema()
        .bind(Arguments::named([("loud", json!(true))]))
        .expect_err("violation");
    assert_eq!(
        violation,
        SchemaViolation::Unexpected {
            param: "loud".to_owned()
        }
    );
}

#[test]
fn commands_without_schema_pass_named_arguments_through() {
    let bound = bind_arguments(None, Arguments::named([("anything", json!([1, 2]))]))
        .expect("bind");
    assert_eq!(bound.get("anything"), Some(&json!([1, 2])));
    assert_eq!(
        bind_arguments(None, Arguments::Positional(vec![json!(1)]))
            .expect_err("positional")
            .kind(),
        ErrorKind::UnexpectedArgument
    );
}
