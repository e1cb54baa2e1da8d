//! Request correlation identifiers.

use uuid::Uuid;

/// Mint a correlation id for a request, attached to its log span and echoed
/// back in error payloads so operators can join client reports to log lines.
pub fn new_correlation_id() -> String {
    Uuid::now_v7().to_string()
}
