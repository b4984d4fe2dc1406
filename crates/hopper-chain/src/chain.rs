//! The multi-hop chain connector.
//!
//! A chain is an ordered list of upstream proxies plus per-chain DNS and
//! timeout policy. Connecting stacks one handshake per hop: hop N's
//! tunnel is built over the stream obtained through hops 1..N-1. The
//! whole connect runs under a deadline scope derived from the caller's
//! cancellation token, and every dial and handshake observes it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ChainError, ChainErrorKind};
use crate::proxy::Proxy;
use hopper_config::{ChainConfig, ConfigError};
use hopper_proto::{join_host_port, split_host_port};

/// An ordered list of upstream proxies with connection policy.
///
/// An empty proxy list is a direct connection.
#[derive(Debug, Clone)]
pub struct Chain {
    pub name: String,
    /// When true, hostnames are handed to the proxies untouched. When
    /// false, they are resolved locally and the first address is used.
    pub proxy_dns: bool,
    /// Reserved for a per-hop dial timeout. Parsed and carried, not
    /// applied.
    pub tcp_connect_timeout: Duration,
    /// Deadline for the whole chain connect, handshakes included.
    pub tcp_read_timeout: Duration,
    pub proxies: Vec<Proxy>,
}

impl Chain {
    /// Builds a chain from its configuration entry, resolving proxy names
    /// against the declared proxy set.
    pub fn from_config(
        name: &str,
        config: &ChainConfig,
        proxies: &HashMap<String, Proxy>,
    ) -> Result<Self, ConfigError> {
        let members = config
            .proxies
            .iter()
            .map(|pname| {
                proxies.get(pname).cloned().ok_or_else(|| {
                    ConfigError::Invalid(vec![format!(
                        "chain '{name}' references undeclared proxy '{pname}'"
                    )])
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            proxy_dns: config.proxy_dns,
            tcp_connect_timeout: Duration::from_millis(config.tcp_connect_timeout),
            tcp_read_timeout: Duration::from_millis(config.tcp_read_timeout),
            proxies: members,
        })
    }

    /// The implicit single-proxy chain sharing the proxy's name.
    pub fn implicit(name: &str, proxy: Proxy) -> Self {
        Self {
            name: name.to_string(),
            proxy_dns: hopper_config::default_proxy_dns(),
            tcp_connect_timeout: Duration::from_millis(hopper_config::default_tcp_connect_timeout()),
            tcp_read_timeout: Duration::from_millis(hopper_config::default_tcp_read_timeout()),
            proxies: vec![proxy],
        }
    }

    /// Connects to `address` (`host:port`) through the chain.
    ///
    /// Returns the established stream and the hop trace string. The trace
    /// records every attempted hop and is also carried inside the error
    /// when a hop fails.
    ///
    /// Host overrides apply before anything else, replacing the host even
    /// when `proxy_dns` is on. Local resolution time is not charged
    /// against the read timeout.
    pub async fn connect(
        &self,
        parent: &CancellationToken,
        hosts: &HashMap<String, String>,
        address: &str,
    ) -> Result<(TcpStream, String), ChainError> {
        let (host, port) = split_host_port(address)
            .map_err(|e| ChainError::bare(e.into()))?;
        let mut host = host.to_string();

        if let Some(replacement) = hosts.get(&host) {
            debug!(host = %host, replacement = %replacement, "host override");
            host = replacement.clone();
        }

        if !self.proxy_dns && host.parse::<IpAddr>().is_err() {
            debug!(chain = %self.name, host = %host, "resolving locally");
            host = self.resolve(parent, &host, port).await.map_err(ChainError::bare)?;
        }

        let address = join_host_port(&host, port);

        // Deadline scope for the whole connect. The timer cancels the
        // child scope; cancelling the parent does too.
        let scope = parent.child_token();
        let timer = {
            let scope = scope.clone();
            let deadline = self.tcp_read_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                scope.cancel();
            })
        };
        let result = self.connect_n(&scope, self.proxies.len(), &address).await;
        timer.abort();
        result
    }

    async fn resolve(
        &self,
        parent: &CancellationToken,
        host: &str,
        port: u16,
    ) -> Result<String, ChainErrorKind> {
        let lookup = tokio::select! {
            r = tokio::net::lookup_host((host, port)) => r,
            _ = parent.cancelled() => return Err(ChainErrorKind::Timeout),
        };
        let mut addrs =
            lookup.map_err(|e| ChainErrorKind::Resolution(format!("lookup on {host} failed: {e}")))?;
        match addrs.next() {
            Some(addr) => Ok(addr.ip().to_string()),
            None => Err(ChainErrorKind::Resolution(format!(
                "no IP returned for {host}"
            ))),
        }
    }

    /// Connects to `address` through the first `n` proxies of the chain.
    ///
    /// `n == 0` is a direct dial. Otherwise the stream to proxy `n` is
    /// obtained (directly for `n == 1`, recursively below that) and proxy
    /// `n`'s handshake extends the tunnel to `address`.
    async fn connect_n(
        &self,
        scope: &CancellationToken,
        n: usize,
        address: &str,
    ) -> Result<(TcpStream, String), ChainError> {
        if n == 0 {
            debug!(target_addr = %address, "direct dial");
            return match self.dial(scope, address).await {
                Ok(stream) => Ok((stream, format!("---> {address}"))),
                Err(kind) => Err(ChainError {
                    trace: format!("-X-> {address} ({kind})"),
                    kind,
                }),
            };
        }

        let hop = &self.proxies[n - 1];
        let hop_addr = hop.address();

        let (mut stream, mut trace) = if n == 1 {
            match self.dial(scope, &hop_addr).await {
                Ok(stream) => (stream, format!("---> {hop_addr}")),
                Err(kind) => {
                    return Err(ChainError {
                        trace: format!("-X-> {hop_addr} ({kind})"),
                        kind,
                    });
                }
            }
        } else {
            Box::pin(self.connect_n(scope, n - 1, &hop_addr)).await?
        };

        debug!(hop = %hop_addr, target_addr = %address, "handshaking");
        let handshake = tokio::select! {
            r = hop.handshake(&mut stream, address) => r,
            _ = scope.cancelled() => Err(ChainErrorKind::Timeout),
        };

        match handshake {
            Ok(()) => {
                trace.push_str(&format!(" ===> {address}"));
                Ok((stream, trace))
            }
            Err(kind) => {
                drop(stream);
                trace.push_str(&format!(" =X=> {address} ({kind})"));
                Err(ChainError { kind, trace })
            }
        }
    }

    async fn dial(
        &self,
        scope: &CancellationToken,
        address: &str,
    ) -> Result<TcpStream, ChainErrorKind> {
        tokio::select! {
            r = TcpStream::connect(address) => r.map_err(ChainErrorKind::Io),
            _ = scope.cancelled() => Err(ChainErrorKind::Timeout),
        }
    }
}
