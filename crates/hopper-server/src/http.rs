//! Accept-side HTTP CONNECT parsing and replies.
//!
//! Only enough HTTP to serve CONNECT: one request line, headers up to the
//! empty line, and bare status-line responses whose version mirrors the
//! request's.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use hopper_proto::{ProtocolError, read_line};

const MAX_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 128;

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpRequestError {
    #[error(transparent)]
    Proto(#[from] ProtocolError),
    #[error("malformed request line '{0}'")]
    BadRequestLine(String),
    #[error("too many header lines")]
    TooManyHeaders,
}

/// A parsed inbound HTTP request, pared down to what CONNECT needs.
#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    /// The request target, an authority (`host:port`) for CONNECT.
    pub target: String,
    /// The Host header value, when present.
    pub host: Option<String>,
    pub proto_major: u8,
    pub proto_minor: u8,
}

impl HttpRequest {
    /// The host the client claims to be addressing. Falls back to the
    /// request target when no Host header was sent.
    pub fn effective_host(&self) -> &str {
        self.host.as_deref().unwrap_or(&self.target)
    }
}

/// Reads one request head: request line plus headers up to the empty line.
pub(crate) async fn read_request<S>(stream: &mut S) -> Result<HttpRequest, HttpRequestError>
where
    S: AsyncRead + Unpin,
{
    let line = read_line(stream, MAX_LINE).await?;
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let mut parts = trimmed.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpRequestError::BadRequestLine(trimmed.to_string()));
    };
    if parts.next().is_some() {
        return Err(HttpRequestError::BadRequestLine(trimmed.to_string()));
    }

    let (proto_major, proto_minor) = parse_version(version)
        .ok_or_else(|| HttpRequestError::BadRequestLine(trimmed.to_string()))?;

    let mut host = None;
    for _ in 0..MAX_HEADERS {
        let line = read_line(stream, MAX_LINE).await?;
        if line == "\r\n" || line == "\n" {
            return Ok(HttpRequest {
                method: method.to_string(),
                target: target.to_string(),
                host,
                proto_major,
                proto_minor,
            });
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("host")
        {
            host = Some(value.trim().to_string());
        }
    }
    Err(HttpRequestError::TooManyHeaders)
}

fn parse_version(version: &str) -> Option<(u8, u8)> {
    let rest = version.strip_prefix("HTTP/")?;
    match rest.split_once('.') {
        Some((major, minor)) => Some((major.parse().ok()?, minor.parse().ok()?)),
        None => Some((rest.parse().ok()?, 0)),
    }
}

/// Writes a headerless status response mirroring the request's version.
pub(crate) async fn write_status<S>(
    stream: &mut S,
    request: &HttpRequest,
    code: u16,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reason = match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    };
    let line = format!(
        "HTTP/{}.{} {code} {reason}\r\n\r\n",
        request.proto_major, request.proto_minor
    );
    stream.write_all(line.as_bytes()).await
}
