//! Upstream proxy variants.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ChainErrorKind;
use crate::{http, socks5};
use hopper_config::{ConfigError, ProxyConfig, ProxyScheme};
use hopper_proto::join_host_port;

/// Where a proxy listens and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// An upstream proxy, dispatching to the protocol-specific handshake.
#[derive(Debug, Clone)]
pub enum Proxy {
    Socks5(ProxyEndpoint),
    HttpConnect(ProxyEndpoint),
}

impl Proxy {
    /// Builds a proxy from its configuration entry.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let (scheme, host, port) = config.parse_connstring()?;
        let endpoint = ProxyEndpoint {
            host,
            port,
            user: config.user.clone(),
            pass: config.pass.clone(),
        };
        Ok(match scheme {
            ProxyScheme::Socks5 => Proxy::Socks5(endpoint),
            ProxyScheme::HttpConnect => Proxy::HttpConnect(endpoint),
        })
    }

    /// The `host:port` where the proxy is exposed.
    pub fn address(&self) -> String {
        let ep = self.endpoint();
        join_host_port(&ep.host, ep.port)
    }

    /// Turns a stream connected to this proxy into a stream connected to
    /// `target` through it. On success the stream is positioned right
    /// after the proxy's reply, ready to carry application bytes.
    pub async fn handshake<S>(&self, stream: &mut S, target: &str) -> Result<(), ChainErrorKind>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Proxy::Socks5(ep) => socks5::handshake(ep, stream, target).await,
            Proxy::HttpConnect(ep) => http::handshake(ep, stream, target).await,
        }
    }

    fn endpoint(&self) -> &ProxyEndpoint {
        match self {
            Proxy::Socks5(ep) | Proxy::HttpConnect(ep) => ep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_dispatches_on_scheme() {
        let p = Proxy::from_config(&ProxyConfig {
            connstring: "socks5://10.0.0.1:1080".into(),
            user: String::new(),
            pass: String::new(),
        })
        .unwrap();
        assert!(matches!(p, Proxy::Socks5(_)));
        assert_eq!(p.address(), "10.0.0.1:1080");

        let p = Proxy::from_config(&ProxyConfig {
            connstring: "httpconnect://proxy.corp:3128".into(),
            user: "u".into(),
            pass: "p".into(),
        })
        .unwrap();
        assert!(matches!(p, Proxy::HttpConnect(_)));
        assert_eq!(p.address(), "proxy.corp:3128");
    }

    #[test]
    fn from_config_rejects_unknown_scheme() {
        let result = Proxy::from_config(&ProxyConfig {
            connstring: "ftp://10.0.0.1:21".into(),
            user: String::new(),
            pass: String::new(),
        });
        assert!(result.is_err());
    }
}
