//! Audit trail emission.
//!
//! One tab-separated line per connection event, emitted under the `audit`
//! tracing target so the subscriber can route them to their own sink.

use std::fmt::Display;

use tracing::info;

/// Tracing target carrying audit lines.
pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Verb {
    Open,
    Close,
    Error,
    Dropped,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Open => "OPEN",
            Verb::Close => "CLOSE",
            Verb::Error => "ERROR",
            Verb::Dropped => "DROPPED",
        }
    }
}

/// Emits one audit line: `tag  verb  client  chain  target  trace`.
pub(crate) fn record(
    verb: Verb,
    tag: &str,
    client: impl Display,
    chain: &str,
    target_addr: &str,
    trace: &str,
) {
    info!(
        target: AUDIT_TARGET,
        "{tag}\t{verb}\t{client}\t{chain}\t{target_addr}\t{trace}",
        verb = verb.as_str(),
    );
}
