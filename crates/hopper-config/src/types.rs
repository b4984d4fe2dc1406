//! Configuration type definitions.
//!
//! One JSON document with `proxies`, `chains`, `routes`, `servers` and
//! `hosts` sections. Decoding is strict: unknown fields are rejected
//! everywhere.

use std::collections::HashMap;

use serde::Deserialize;

use crate::defaults::*;
use crate::loader::ConfigError;
use hopper_rules::RuleNode;

/// The whole parsed configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub proxies: HashMap<String, ProxyConfig>,
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub routes: HashMap<String, RouteTableConfig>,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub hosts: HashMap<String, String>,
}

/// Upstream proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Socks5,
    HttpConnect,
}

/// One upstream proxy declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// `<prot>://host:port` where `prot` is `socks5`, `http` or
    /// `httpconnect`.
    pub connstring: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl ProxyConfig {
    /// Parses the connection string into scheme, host and port.
    pub fn parse_connstring(&self) -> Result<(ProxyScheme, String, u16), ConfigError> {
        let bad = || ConfigError::Connstring(self.connstring.clone());
        let (prot, rest) = self.connstring.split_once("://").ok_or_else(bad)?;
        let scheme = match prot {
            "socks5" => ProxyScheme::Socks5,
            "http" | "httpconnect" => ProxyScheme::HttpConnect,
            other => return Err(ConfigError::UnknownScheme(other.to_string())),
        };
        let (host, port) = rest.rsplit_once(':').ok_or_else(bad)?;
        if host.is_empty() {
            return Err(bad());
        }
        let port = port.parse::<u16>().map_err(|_| bad())?;
        Ok((scheme, host.to_string(), port))
    }
}

/// One proxy chain declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChainConfig {
    /// When true, hostnames are passed to the proxies as is; when false
    /// they are resolved locally first.
    #[serde(default = "default_proxy_dns")]
    pub proxy_dns: bool,
    /// Reserved for a per-hop dial timeout; parsed but not applied.
    #[serde(default = "default_tcp_connect_timeout")]
    pub tcp_connect_timeout: u64,
    /// Deadline in milliseconds for the whole chain connect, handshakes
    /// included.
    #[serde(default = "default_tcp_read_timeout")]
    pub tcp_read_timeout: u64,
    #[serde(default)]
    pub proxies: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            proxy_dns: default_proxy_dns(),
            tcp_connect_timeout: default_tcp_connect_timeout(),
            tcp_read_timeout: default_tcp_read_timeout(),
            proxies: Vec::new(),
        }
    }
}

/// One named routing table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTableConfig {
    #[serde(default = "default_route")]
    pub default: String,
    #[serde(default)]
    pub blocks: Vec<RuleBlockConfig>,
}

/// One rule block inside a routing table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleBlockConfig {
    #[serde(default)]
    pub comment: String,
    pub rules: RuleNode,
    pub route: String,
    #[serde(default)]
    pub disable: bool,
}

/// What a listener does with accepted connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKind {
    /// SOCKS5 inbound, routed through the named table.
    Socks5 { table: String },
    /// HTTP CONNECT inbound, routed through the named table.
    Http { table: String },
    /// Fixed-destination forward through the named chain.
    Forward {
        chain: String,
        dest_host: String,
        dest_port: u16,
    },
}

/// A parsed listener descriptor.
///
/// The descriptor string is the listener's identity: two specs are the
/// same listener exactly when their descriptors are equal.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    descriptor: String,
    bind_host: String,
    bind_port: u16,
    kind: ServerKind,
}

impl PartialEq for ServerSpec {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl Eq for ServerSpec {}

impl ServerSpec {
    /// Parses a `servers` entry:
    /// `socks5://bind:port:table`, `http://bind:port:table` or
    /// `fwd://bind:port:chain:destHost:destPort`.
    pub fn parse(descriptor: &str) -> Result<Self, ConfigError> {
        let bad = |why: &str| ConfigError::ServerSpec(descriptor.to_string(), why.to_string());
        let (prot, rest) = descriptor
            .split_once("://")
            .ok_or_else(|| bad("missing scheme"))?;
        let parts: Vec<&str> = rest.split(':').collect();

        let parse_port = |s: &str| {
            s.parse::<u16>()
                .map_err(|_| bad(&format!("invalid port '{s}'")))
        };

        let (bind_host, bind_port, kind) = match prot {
            "socks5" | "http" => {
                let &[bind, port, table] = parts.as_slice() else {
                    return Err(bad("expected bind:port:table"));
                };
                let table = table.to_string();
                let kind = if prot == "socks5" {
                    ServerKind::Socks5 { table }
                } else {
                    ServerKind::Http { table }
                };
                (bind.to_string(), parse_port(port)?, kind)
            }
            "fwd" => {
                let &[bind, port, chain, dest_host, dest_port] = parts.as_slice() else {
                    return Err(bad("expected bind:port:chain:destHost:destPort"));
                };
                let kind = ServerKind::Forward {
                    chain: chain.to_string(),
                    dest_host: dest_host.to_string(),
                    dest_port: parse_port(dest_port)?,
                };
                (bind.to_string(), parse_port(port)?, kind)
            }
            other => return Err(bad(&format!("unknown server type '{other}'"))),
        };

        if bind_host.is_empty() {
            return Err(bad("empty bind address"));
        }

        Ok(Self {
            descriptor: descriptor.to_string(),
            bind_host,
            bind_port,
            kind,
        })
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn kind(&self) -> &ServerKind {
        &self.kind
    }

    /// The `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

impl std::fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.descriptor)
    }
}
