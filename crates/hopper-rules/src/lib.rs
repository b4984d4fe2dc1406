//! Routing rule model and evaluator.
//!
//! Rules test a destination `host:port` with `regexp` and `subnet` atoms
//! combined by AND/OR, optionally negated. Routing tables evaluate their
//! blocks in declaration order and return the first matching block's route.

mod error;
mod resolver;
mod rule;
mod table;

pub use error::RoutingError;
pub use resolver::RouteResolver;
pub use rule::{Op, Rule, RuleCombo, RuleKind, RuleNode, Variable};
pub use table::{DROP_ROUTE, RoutingTable, RuleBlock};
