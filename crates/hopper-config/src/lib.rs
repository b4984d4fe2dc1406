//! Configuration model for the router.
//!
//! Callers load a JSON document with [`load_config`], check it with
//! [`validate_config`], and only then build runtime state from it. Both
//! steps are pure; nothing here touches the network.

mod defaults;
mod loader;
mod types;
mod validate;

pub use defaults::{default_proxy_dns, default_tcp_connect_timeout, default_tcp_read_timeout};
pub use loader::{ConfigError, load_config};
pub use types::{
    ChainConfig, Config, ProxyConfig, ProxyScheme, RouteTableConfig, RuleBlockConfig, ServerKind,
    ServerSpec,
};
pub use validate::validate_config;
