//! Dial-side HTTP CONNECT handshake.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::ChainErrorKind;
use crate::proxy::ProxyEndpoint;
use hopper_proto::{read_line, split_host_port};

const MAX_LINE: usize = 8 * 1024;

/// Connects `stream` (already connected to the proxy) to `target` by
/// issuing a CONNECT request and consuming the response headers.
pub(crate) async fn handshake<S>(
    ep: &ProxyEndpoint,
    stream: &mut S,
    target: &str,
) -> Result<(), ChainErrorKind>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (host, _) = split_host_port(target)?;

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {host}\r\n");
    if !ep.user.is_empty() {
        let auth = BASE64.encode(format!("{}:{}", ep.user, ep.pass));
        request.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let status = read_line(stream, MAX_LINE).await?;
    let accepted = ["HTTP/1.0 2", "HTTP/1.1 2", "HTTP/2 2"]
        .iter()
        .any(|p| status.starts_with(p));
    if !accepted {
        return Err(ChainErrorKind::Upstream(format!(
            "proxy refused CONNECT: {}",
            status.trim_end()
        )));
    }

    // Drain response headers up to the empty line; the body, if any, is
    // not part of CONNECT.
    loop {
        let line = read_line(stream, MAX_LINE).await?;
        if line == "\r\n" || line == "\n" {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    fn endpoint(user: &str, pass: &str) -> ProxyEndpoint {
        ProxyEndpoint {
            host: "proxy".into(),
            port: 3128,
            user: user.into(),
            pass: pass.into(),
        }
    }

    async fn run_script(
        ep: ProxyEndpoint,
        target: &str,
        response: &str,
    ) -> (Result<(), ChainErrorKind>, String) {
        let (mut dialer, mut peer) = duplex(4096);
        let target = target.to_string();
        let client = tokio::spawn(async move { handshake(&ep, &mut dialer, &target).await });

        let mut buf = [0u8; 2048];
        let n = peer.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
        peer.write_all(response.as_bytes()).await.unwrap();

        (client.await.unwrap(), request)
    }

    #[tokio::test]
    async fn connect_success_consumes_headers() {
        let (result, request) = run_script(
            endpoint("", ""),
            "example.com:443",
            "HTTP/1.1 200 Connection established\r\nVia: 1.1 proxy\r\n\r\n",
        )
        .await;
        result.unwrap();
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com\r\n"));
        assert!(!request.contains("Proxy-Authorization"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn http10_and_http2_statuses_accepted() {
        for status in ["HTTP/1.0 200 OK\r\n\r\n", "HTTP/2 200\r\n\r\n"] {
            let (result, _) = run_script(endpoint("", ""), "example.com:443", status).await;
            result.unwrap();
        }
    }

    #[tokio::test]
    async fn credentials_add_proxy_authorization() {
        let (result, request) = run_script(
            endpoint("alice", "secret"),
            "example.com:443",
            "HTTP/1.1 200 OK\r\n\r\n",
        )
        .await;
        result.unwrap();
        let auth = BASE64.encode("alice:secret");
        assert!(request.contains(&format!("Proxy-Authorization: Basic {auth}\r\n")));
    }

    #[tokio::test]
    async fn non_2xx_is_upstream_error() {
        let (result, _) = run_script(
            endpoint("", ""),
            "example.com:443",
            "HTTP/1.1 407 Proxy Authentication Required\r\n\r\n",
        )
        .await;
        match result {
            Err(ChainErrorKind::Upstream(msg)) => assert!(msg.contains("407")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_response_is_io_error() {
        let (mut dialer, peer) = duplex(4096);
        let ep = endpoint("", "");
        let client =
            tokio::spawn(async move { handshake(&ep, &mut dialer, "example.com:443").await });
        drop(peer);
        assert!(matches!(
            client.await.unwrap(),
            Err(ChainErrorKind::Io(_))
        ));
    }
}
