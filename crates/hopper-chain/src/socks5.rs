//! Dial-side SOCKS5 handshake (RFC 1928 client role).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChainErrorKind;
use crate::proxy::ProxyEndpoint;
use hopper_proto::{
    self as proto, CMD_CONNECT, METHOD_NO_AUTH, METHOD_USERPASS, SOCKS_VERSION, split_host_port,
};

/// Connects `stream` (already connected to the proxy) to `target` through
/// the SOCKS5 CONNECT command.
pub(crate) async fn handshake<S>(
    ep: &ProxyEndpoint,
    stream: &mut S,
    target: &str,
) -> Result<(), ChainErrorKind>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation. User/pass is advertised when credentials are
    // configured but its sub-negotiation is not implemented; only the
    // no-auth selection is accepted.
    if ep.user.is_empty() {
        stream
            .write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH])
            .await?;
    } else {
        stream
            .write_all(&[SOCKS_VERSION, 2, METHOD_NO_AUTH, METHOD_USERPASS])
            .await?;
    }

    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;
    if buf[0] != SOCKS_VERSION {
        return Err(proto::ProtocolError::InvalidVersion(buf[0]).into());
    }
    match buf[1] {
        METHOD_NO_AUTH => {}
        METHOD_USERPASS => return Err(ChainErrorKind::Unimplemented),
        other => {
            return Err(ChainErrorKind::Protocol(format!(
                "proxy selected unsupported authentication method {other:#04x}"
            )));
        }
    }

    // CONNECT request.
    let (host, port) = split_host_port(target)?;
    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
    request.extend_from_slice(&proto::encode_addr(host, port)?);
    stream.write_all(&request).await?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT. The bound address is
    // consumed and discarded.
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(proto::ProtocolError::InvalidVersion(head[0]).into());
    }
    let _bound = proto::read_addr(stream, head[3]).await?;

    match head[1] {
        proto::REPLY_SUCCEEDED => Ok(()),
        rep => Err(ChainErrorKind::Upstream(reply_message(rep).to_string())),
    }
}

/// Human-readable text for a non-zero SOCKS5 reply code.
fn reply_message(rep: u8) -> std::borrow::Cow<'static, str> {
    match rep {
        proto::REPLY_GENERAL_FAILURE => "general SOCKS server failure".into(),
        proto::REPLY_CONNECTION_NOT_ALLOWED => "connection not allowed by ruleset".into(),
        proto::REPLY_NETWORK_UNREACHABLE => "network unreachable".into(),
        proto::REPLY_HOST_UNREACHABLE => "host unreachable".into(),
        proto::REPLY_CONNECTION_REFUSED => "connection refused".into(),
        proto::REPLY_TTL_EXPIRED => "TTL expired".into(),
        proto::REPLY_COMMAND_NOT_SUPPORTED => "command not supported".into(),
        proto::REPLY_ADDRESS_TYPE_NOT_SUPPORTED => "address type not supported".into(),
        other => format!("unrecognized SOCKS5 reply code {other:#04x}").into(),
    }
}
