//! Error types for rule evaluation and route lookup.

use thiserror::Error;

/// Errors raised while evaluating a rule tree or looking up a route.
///
/// Any of these aborts the connection that triggered the lookup; they are
/// never retried.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("address: {0}")]
    Address(#[from] hopper_proto::ProtocolError),

    #[error("regexp rule without a variable")]
    MissingVariable,

    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("invalid CIDR '{0}'")]
    Cidr(String),

    #[error("routing table '{0}' is not defined")]
    UnknownTable(String),
}
