use crate::logging::LogFormat;
use crate::security::TransportSecurity;
use crate::socket::SocketEndpoint;

/// Default TCP port the daemon listens on.
pub const DEFAULT_TCP_PORT: u16 = 7443;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default base resource path advertised to clients.
pub const DEFAULT_SERVICE_PATH: &str = "/osmp/v1";

/// Default per-command timeout in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default capacity of a session's outbound queue.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Default log filter expression used by the daemon.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Loopback endpoint on the default port.
pub fn default_listen_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

/// Plaintext transport; TLS termination happens in front of the daemon.
pub fn default_transport_security() -> TransportSecurity {
    TransportSecurity::Plain
}

/// Owned default service path.
pub fn default_service_path() -> String {
    DEFAULT_SERVICE_PATH.to_owned()
}

/// Only the `standard` instruction set is enabled out of the box.
pub fn default_instruction_sets() -> Vec<String> {
    vec!["standard".to_owned()]
}

/// Default per-command timeout in milliseconds.
pub fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

/// Default capacity of a session's outbound queue.
pub fn default_subscriber_queue() -> usize {
    DEFAULT_SUBSCRIBER_QUEUE
}
