//! SOCKS5 wire primitives shared by the dial and accept sides (RFC 1928).
//!
//! This crate is intentionally small: the ATYP-tagged address codec, the
//! protocol constants, and `host:port` string handling. Both handshake
//! directions build on it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt};

pub const SOCKS_VERSION: u8 = 0x05;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_USERPASS: u8 = 0x02;
pub const METHOD_NO_ACCEPTABLE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 reply codes.
pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
pub const REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
pub const REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
pub const REPLY_TTL_EXPIRED: u8 = 0x06;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Maximum domain name length representable in a SOCKS5 address.
pub const MAX_DOMAIN_LEN: usize = 255;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported address type {0:#04x}")]
    InvalidAtyp(u8),
    #[error("empty domain name")]
    EmptyDomain,
    #[error("domain name too long ({0} bytes)")]
    DomainTooLong(usize),
    #[error("unexpected protocol version {0}")]
    InvalidVersion(u8),
    #[error("no acceptable authentication method")]
    NoAcceptableMethods,
    #[error("missing port in address '{0}'")]
    MissingPort(String),
    #[error("invalid port in address '{0}'")]
    InvalidPort(String),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Splits a `host:port` string, handling the `[v6]:port` bracket form.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), ProtocolError> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ProtocolError::MissingPort(addr.to_string()))?;
        let tail = &rest[end + 1..];
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| ProtocolError::MissingPort(addr.to_string()))?;
        (&rest[..end], port)
    } else {
        addr.rsplit_once(':')
            .ok_or_else(|| ProtocolError::MissingPort(addr.to_string()))?
    };
    let port = port
        .parse::<u16>()
        .map_err(|_| ProtocolError::InvalidPort(addr.to_string()))?;
    Ok((host, port))
}

/// Joins a host and port into the canonical `host:port` form, bracketing
/// IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Encodes a host and port as a SOCKS5 address: `ATYP | ADDR | PORT`.
///
/// IPv4 and IPv6 literals use their binary forms; anything else is emitted
/// as a length-prefixed domain name.
pub fn encode_addr(host: &str, port: u16) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(1 + MAX_DOMAIN_LEN + 2);
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            out.push(ATYP_IPV4);
            out.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            out.push(ATYP_IPV6);
            out.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            if host.is_empty() {
                return Err(ProtocolError::EmptyDomain);
            }
            if host.len() > MAX_DOMAIN_LEN {
                return Err(ProtocolError::DomainTooLong(host.len()));
            }
            out.push(ATYP_DOMAIN);
            out.push(host.len() as u8);
            out.extend_from_slice(host.as_bytes());
        }
    }
    out.extend_from_slice(&port.to_be_bytes());
    Ok(out)
}

/// Reads a SOCKS5 address body (everything after the ATYP byte) and returns
/// the canonical `host:port` string.
pub async fn read_addr<R>(reader: &mut R, atyp: u8) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let host = match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf).await?;
            Ipv4Addr::from(buf).to_string()
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16];
            reader.read_exact(&mut buf).await?;
            Ipv6Addr::from(buf).to_string()
        }
        ATYP_DOMAIN => {
            let len = reader.read_u8().await? as usize;
            if len == 0 {
                return Err(ProtocolError::EmptyDomain);
            }
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            String::from_utf8_lossy(&buf).into_owned()
        }
        other => return Err(ProtocolError::InvalidAtyp(other)),
    };
    let port = reader.read_u16().await?;
    Ok(join_host_port(&host, port))
}

/// Reads one `\n`-terminated line as bytes, byte by byte.
///
/// Deliberately unbuffered: the stream carries tunneled application data
/// right after the protocol exchange, so nothing past the line may be
/// consumed. The terminator is included in the returned string.
pub async fn read_line<R>(reader: &mut R, max: usize) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(64);
    loop {
        let b = reader.read_u8().await?;
        line.push(b);
        if b == b'\n' {
            break;
        }
        if line.len() >= max {
            return Err(ProtocolError::LineTooLong(max));
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ipv4_and_domain() {
        assert_eq!(split_host_port("10.0.0.1:80").unwrap(), ("10.0.0.1", 80));
        assert_eq!(
            split_host_port("example.com:443").unwrap(),
            ("example.com", 443)
        );
    }

    #[test]
    fn split_ipv6_bracketed() {
        assert_eq!(split_host_port("[::1]:8080").unwrap(), ("::1", 8080));
    }

    #[test]
    fn split_rejects_missing_or_bad_port() {
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port("example.com:http").is_err());
        assert!(split_host_port("[::1]").is_err());
    }

    #[test]
    fn join_brackets_ipv6() {
        assert_eq!(join_host_port("::1", 80), "[::1]:80");
        assert_eq!(join_host_port("example.com", 80), "example.com:80");
    }

    #[test]
    fn encode_ipv4() {
        let buf = encode_addr("1.2.3.4", 0x0405).unwrap();
        assert_eq!(buf, vec![ATYP_IPV4, 1, 2, 3, 4, 0x04, 0x05]);
    }

    #[test]
    fn encode_domain_length_prefixed() {
        let buf = encode_addr("foo.bar", 80).unwrap();
        assert_eq!(buf[0], ATYP_DOMAIN);
        assert_eq!(buf[1], 7);
        assert_eq!(&buf[2..9], b"foo.bar");
        assert_eq!(&buf[9..], &[0, 80]);
    }

    #[test]
    fn encode_rejects_oversized_domain() {
        let long = "a".repeat(MAX_DOMAIN_LEN + 1);
        assert!(matches!(
            encode_addr(&long, 80),
            Err(ProtocolError::DomainTooLong(_))
        ));
    }

    #[tokio::test]
    async fn decode_roundtrip() {
        for (host, port) in [
            ("1.2.3.4", 80u16),
            ("2001:db8::1", 443),
            ("example.com", 65535),
            ("x", 0),
        ] {
            let encoded = encode_addr(host, port).unwrap();
            let mut cursor = &encoded[1..];
            let decoded = read_addr(&mut cursor, encoded[0]).await.unwrap();
            assert_eq!(decoded, join_host_port(host, port));
        }
    }

    #[tokio::test]
    async fn decode_rejects_unknown_atyp() {
        let mut cursor: &[u8] = &[0, 0, 0, 0];
        assert!(matches!(
            read_addr(&mut cursor, 0x02).await,
            Err(ProtocolError::InvalidAtyp(0x02))
        ));
    }

    #[tokio::test]
    async fn decode_rejects_empty_domain() {
        let mut cursor: &[u8] = &[0u8, 0, 80];
        assert!(matches!(
            read_addr(&mut cursor, ATYP_DOMAIN).await,
            Err(ProtocolError::EmptyDomain)
        ));
    }

    #[tokio::test]
    async fn decode_rejects_truncated_input() {
        let mut cursor: &[u8] = &[1, 2, 3];
        assert!(read_addr(&mut cursor, ATYP_IPV4).await.is_err());
    }

    #[tokio::test]
    async fn read_line_stops_at_newline() {
        let mut cursor: &[u8] = b"HTTP/1.1 200 OK\r\nrest";
        let line = read_line(&mut cursor, 1024).await.unwrap();
        assert_eq!(line, "HTTP/1.1 200 OK\r\n");
        assert_eq!(cursor, b"rest");
    }

    #[tokio::test]
    async fn read_line_enforces_limit() {
        let mut cursor: &[u8] = &[b'a'; 64];
        assert!(matches!(
            read_line(&mut cursor, 16).await,
            Err(ProtocolError::LineTooLong(16))
        ));
    }
}
