//! Tests that exercise the crate's public re-exports.

use std::sync::Arc;

use osmp_protocol::{Arguments, CorrelationId, Request};
use rstest::rstest;
use serde_json::json;

use crate::{
    CommandDescriptor, CommandModule, Dispatcher, DispatcherSettings, ParamKind, ParamSpec,
    Registrar, StandardModule, bootstrap_with, registry::RegistryError,
};

use super::support::{HealthEvent, RecordingHealthReporter, TestConfigLoader, handler};

struct Greeter;

impl CommandModule for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn register(&self, registrar: &mut dyn Registrar) -> Result<(), RegistryError> {
        registrar.register_command(
            CommandDescriptor::new(
                "greeter",
                "greet",
                handler(|context| {
                    let name = context.arguments().str("name").unwrap_or("world");
                    Ok(json!(format!("hello, {name}")))
                }),
            )
            .param(ParamSpec::optional("name", ParamKind::String)),
        )
    }
}

#[rstest]
fn bootstrap_with_reexport_initialises_daemon() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&loader, reporter.clone(), &[&Greeter])
        .expect("bootstrap should succeed");

    assert!(daemon.config().listen().prepare_filesystem().is_ok());
    assert!(!daemon.telemetry().filter().is_empty());
    assert_eq!(
        daemon.dispatcher().list_enabled_instruction_sets(),
        ["standard"]
    );
    let events = reporter.events();
    assert!(events.contains(&HealthEvent::BootstrapStarting));
    assert!(events.contains(&HealthEvent::BootstrapSucceeded));
}

#[rstest]
fn embedders_can_assemble_a_dispatcher() {
    let mut builder = Dispatcher::builder(DispatcherSettings {
        instruction_sets: vec!["standard".to_owned(), "greeter".to_owned()],
        command_timeout: None,
    });
    builder.install(&StandardModule).expect("install standard module");
    builder.install(&Greeter).expect("install greeter");
    let dispatcher = builder.build();

    let response = dispatcher.handle(Request::new(
        "greeter",
        "greet",
        Arguments::named([("name", json!("osmp"))]),
        CorrelationId(3),
    ));
    assert_eq!(response.correlation_id, CorrelationId(3));
    assert_eq!(
        response.outcome,
        osmp_protocol::Outcome::Success(json!("hello, osmp"))
    );
}
