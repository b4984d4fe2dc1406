//! Cross-referential configuration validation.
//!
//! A pure function over the parsed document: either the configuration is
//! accepted as a whole, or the full list of diagnostics is returned. A
//! rejected candidate never partially applies.

use std::collections::HashSet;

use crate::loader::ConfigError;
use crate::types::{Config, ServerKind, ServerSpec};
use hopper_rules::DROP_ROUTE;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut diags: Vec<String> = Vec::new();

    for (name, proxy) in &config.proxies {
        if let Err(e) = proxy.parse_connstring() {
            diags.push(format!("proxy '{name}': {e}"));
        }
        if name == DROP_ROUTE {
            diags.push(format!("proxy name '{DROP_ROUTE}' is reserved"));
        }
    }

    // Every proxy also becomes an implicit single-proxy chain of the same
    // name, so chain references may name either set.
    let chain_names: HashSet<&str> = config
        .chains
        .keys()
        .chain(config.proxies.keys())
        .map(String::as_str)
        .collect();

    for (name, chain) in &config.chains {
        if name == DROP_ROUTE {
            diags.push(format!("chain name '{DROP_ROUTE}' is reserved"));
        }
        if config.proxies.contains_key(name) {
            diags.push(format!(
                "chain '{name}' collides with the implicit chain of proxy '{name}'"
            ));
        }
        for proxy in &chain.proxies {
            if !config.proxies.contains_key(proxy) {
                diags.push(format!(
                    "chain '{name}' references undeclared proxy '{proxy}'"
                ));
            }
        }
    }

    for (name, table) in &config.routes {
        if table.default != DROP_ROUTE && !chain_names.contains(table.default.as_str()) {
            diags.push(format!(
                "routing table '{name}' defaults to undeclared chain '{}'",
                table.default
            ));
        }
        for (i, block) in table.blocks.iter().enumerate() {
            if block.disable {
                continue;
            }
            if block.route != DROP_ROUTE && !chain_names.contains(block.route.as_str()) {
                diags.push(format!(
                    "routing table '{name}' block {i} ('{}') routes to undeclared chain '{}'",
                    block.comment, block.route
                ));
            }
        }
    }

    for descriptor in &config.servers {
        match ServerSpec::parse(descriptor) {
            Err(e) => diags.push(e.to_string()),
            Ok(spec) => match spec.kind() {
                ServerKind::Socks5 { table } | ServerKind::Http { table } => {
                    if !config.routes.contains_key(table) {
                        diags.push(format!(
                            "server '{descriptor}' uses undeclared routing table '{table}'"
                        ));
                    }
                }
                ServerKind::Forward { chain, .. } => {
                    if !chain_names.contains(chain.as_str()) {
                        diags.push(format!(
                            "server '{descriptor}' forwards through undeclared chain '{chain}'"
                        ));
                    }
                }
            },
        }
    }

    if diags.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(diags))
    }
}
