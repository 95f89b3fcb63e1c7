use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Security mode of the listening transport.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransportSecurity {
    /// Plaintext JSONL; deploy behind a TLS-terminating proxy when exposed.
    #[default]
    Plain,
    /// TLS terminated by the daemon itself.
    Tls,
}

impl TransportSecurity {
    /// Returns true when the daemon is expected to terminate TLS.
    #[must_use]
    pub const fn requires_tls(self) -> bool {
        matches!(self, Self::Tls)
    }
}

/// Errors encountered while parsing a [`TransportSecurity`] from text.
pub type TransportSecurityParseError = strum::ParseError;
