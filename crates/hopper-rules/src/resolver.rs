//! The route-resolution seam.

use crate::error::RoutingError;

/// Maps a destination `host:port` to a chain name.
///
/// The default implementation evaluates a configured routing table; an
/// alternative may wrap an external policy engine such as a PAC script.
/// Implementations must be cheap to call per connection and must not block.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, addr: &str) -> Result<String, RoutingError>;
}
