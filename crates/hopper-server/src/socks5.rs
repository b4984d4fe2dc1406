//! Accept-side SOCKS5 handshake (RFC 1928 server role).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use hopper_proto::{
    self as proto, METHOD_NO_ACCEPTABLE, METHOD_NO_AUTH, ProtocolError, SOCKS_VERSION,
};

/// Performs method negotiation with a connecting client.
///
/// Selects no-auth when offered; otherwise answers `05 FF` and fails.
pub(crate) async fn negotiate_method<S>(stream: &mut S) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(ProtocolError::InvalidVersion(header[0]));
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&METHOD_NO_AUTH) {
        stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
        Ok(())
    } else {
        let _ = stream
            .write_all(&[SOCKS_VERSION, METHOD_NO_ACCEPTABLE])
            .await;
        Err(ProtocolError::NoAcceptableMethods)
    }
}

/// Reads the request after negotiation and returns `(command, target)`.
pub(crate) async fn read_request<S>(stream: &mut S) -> Result<(u8, String), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    // VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(ProtocolError::InvalidVersion(header[0]));
    }
    let addr = proto::read_addr(stream, header[3]).await?;
    Ok((header[1], addr))
}

/// Sends a reply with a zeroed IPv4 bind address.
pub(crate) async fn send_reply<S>(stream: &mut S, reply: u8) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[
            SOCKS_VERSION,
            reply,
            0x00,
            proto::ATYP_IPV4,
            0,
            0,
            0,
            0,
            0,
            0,
        ])
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn negotiation_selects_no_auth() {
        let (mut server, mut client) = duplex(256);
        let task = tokio::spawn(async move {
            negotiate_method(&mut server).await.unwrap();
            read_request(&mut server).await.unwrap()
        });

        client.write_all(&[5, 2, 0x00, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [5, 0]);

        // CONNECT example.com:443
        let mut request = vec![5, 1, 0, 3, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let (cmd, addr) = task.await.unwrap();
        assert_eq!(cmd, 1);
        assert_eq!(addr, "example.com:443");
    }

    #[tokio::test]
    async fn negotiation_rejects_without_no_auth() {
        let (mut server, mut client) = duplex(256);
        let task = tokio::spawn(async move { negotiate_method(&mut server).await });

        client.write_all(&[5, 1, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [5, 0xFF]);
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn negotiation_rejects_wrong_version() {
        let (mut server, mut client) = duplex(256);
        let task = tokio::spawn(async move { negotiate_method(&mut server).await });
        client.write_all(&[4, 1, 0]).await.unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ProtocolError::InvalidVersion(4))
        ));
    }

    #[tokio::test]
    async fn request_reads_ipv4_target() {
        let (mut server, mut client) = duplex(256);
        let task = tokio::spawn(async move { read_request(&mut server).await });
        client
            .write_all(&[5, 1, 0, 1, 10, 0, 0, 1, 0, 80])
            .await
            .unwrap();
        let (cmd, addr) = task.await.unwrap().unwrap();
        assert_eq!(cmd, 1);
        assert_eq!(addr, "10.0.0.1:80");
    }

    #[tokio::test]
    async fn reply_is_ten_bytes_zeroed() {
        let (mut server, mut client) = duplex(256);
        send_reply(&mut server, 0x02).await.unwrap();
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [5, 2, 0, 1, 0, 0, 0, 0, 0, 0]);
    }
}
