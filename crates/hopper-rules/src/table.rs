//! Ordered routing tables: first matching block wins.

use crate::error::RoutingError;
use crate::rule::RuleNode;

/// Reserved route meaning "deny this connection at the routing layer".
pub const DROP_ROUTE: &str = "drop";

/// One (rule tree, route) pair in a routing table.
///
/// Disabled blocks never reach this type; they are dropped when the
/// configuration is loaded.
#[derive(Debug, Clone)]
pub struct RuleBlock {
    pub comment: String,
    pub rules: RuleNode,
    pub route: String,
}

/// A named ordered list of rule blocks plus a default route.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    pub blocks: Vec<RuleBlock>,
    pub default_route: String,
}

impl RoutingTable {
    /// Returns the route for `addr`: the first block whose rule tree
    /// evaluates to true, or the table default.
    pub fn lookup(&self, addr: &str) -> Result<String, RoutingError> {
        for block in &self.blocks {
            if block.rules.evaluate(addr)? {
                return Ok(block.route.clone());
            }
        }
        Ok(self.default_route.clone())
    }
}
