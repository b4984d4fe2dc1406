//! Shared runtime state built from an accepted configuration.
//!
//! The chains, routing tables and host overrides live in one `Tables`
//! value behind an `ArcSwap`. Readers load the current handle once per
//! lookup; a reload stores a whole new value. The reload path is the only
//! writer, so readers never observe a half-applied configuration.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use hopper_chain::{Chain, Proxy};
use hopper_config::{Config, ConfigError, validate_config};
use hopper_rules::{RouteResolver, RoutingError, RoutingTable, RuleBlock};

/// One consistent snapshot of the routable world.
#[derive(Debug, Default)]
pub struct Tables {
    pub chains: HashMap<String, Arc<Chain>>,
    pub routes: HashMap<String, RoutingTable>,
    pub hosts: HashMap<String, String>,
}

/// Builds runtime tables from a parsed configuration.
///
/// Validates first; a rejected configuration produces no tables at all.
/// Every declared proxy also gets an implicit single-proxy chain under
/// its own name, and disabled rule blocks are dropped here, never to be
/// evaluated.
pub fn build_tables(config: &Config) -> Result<Tables, ConfigError> {
    validate_config(config)?;

    let mut proxies: HashMap<String, Proxy> = HashMap::with_capacity(config.proxies.len());
    for (name, proxy_config) in &config.proxies {
        proxies.insert(name.clone(), Proxy::from_config(proxy_config)?);
    }

    let mut chains: HashMap<String, Arc<Chain>> = HashMap::new();
    for (name, proxy) in &proxies {
        chains.insert(name.clone(), Arc::new(Chain::implicit(name, proxy.clone())));
    }
    for (name, chain_config) in &config.chains {
        chains.insert(
            name.clone(),
            Arc::new(Chain::from_config(name, chain_config, &proxies)?),
        );
    }

    let mut routes: HashMap<String, RoutingTable> = HashMap::new();
    for (name, table) in &config.routes {
        let blocks = table
            .blocks
            .iter()
            .filter(|block| !block.disable)
            .map(|block| RuleBlock {
                comment: block.comment.clone(),
                rules: block.rules.clone(),
                route: block.route.clone(),
            })
            .collect();
        routes.insert(
            name.clone(),
            RoutingTable {
                blocks,
                default_route: table.default.clone(),
            },
        );
    }

    Ok(Tables {
        chains,
        routes,
        hosts: config.hosts.clone(),
    })
}

/// Hot-swappable holder for the shared tables.
#[derive(Debug)]
pub struct RouterState {
    tables: ArcSwap<Tables>,
}

impl RouterState {
    pub fn new(tables: Tables) -> Self {
        Self {
            tables: ArcSwap::from_pointee(tables),
        }
    }

    /// The current snapshot. Callers keep the returned handle for the
    /// duration of one decision, never across a whole connection.
    pub fn tables(&self) -> Arc<Tables> {
        self.tables.load_full()
    }

    /// Atomically replaces the snapshot.
    pub fn replace(&self, tables: Tables) {
        self.tables.store(Arc::new(tables));
    }
}

impl Default for RouterState {
    fn default() -> Self {
        Self::new(Tables::default())
    }
}

/// The default route resolver: evaluates one named routing table from the
/// shared state.
pub struct TableResolver {
    state: Arc<RouterState>,
    table: String,
}

impl TableResolver {
    pub fn new(state: Arc<RouterState>, table: impl Into<String>) -> Self {
        Self {
            state,
            table: table.into(),
        }
    }
}

impl RouteResolver for TableResolver {
    fn resolve(&self, addr: &str) -> Result<String, RoutingError> {
        let tables = self.state.tables();
        let table = tables
            .routes
            .get(&self.table)
            .ok_or_else(|| RoutingError::UnknownTable(self.table.clone()))?;
        table.lookup(addr)
    }
}
