//! NTLM-over-HTTP channel opening (§4.13): each of the `RPC_IN_DATA`/
//! `RPC_OUT_DATA` HTTP channels authenticates independently via two
//! request-response round-trips carrying base64-encoded NTLM tokens in the
//! `Authorization`/`WWW-Authenticate` headers, the same raw-header-string
//! style as `transport::proxy::http_connect`.
//!
//! This module frames that exchange; it does not implement NTLMSSP message
//! generation itself; callers supply a [`NtlmAuthenticator`] that produces
//! the Type 1 (negotiate) and Type 3 (authenticate) tokens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::RpcError;

/// The two virtual-connection channels, each opened against the same URI
/// with a different HTTP method (§4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcChannel {
    In,
    Out,
}

impl RpcChannel {
    fn method(self) -> &'static str {
        match self {
            RpcChannel::In => "RPC_IN_DATA",
            RpcChannel::Out => "RPC_OUT_DATA",
        }
    }
}

/// Produces the client's NTLM tokens for an HTTP channel's authentication
/// round-trips. A real deployment backs this with an NTLMSSP
/// implementation seeded from the gateway credentials; this crate's wire
/// layer only needs to move the resulting bytes.
pub trait NtlmAuthenticator {
    /// Builds the initial Type 1 negotiate token, sent with no prior
    /// server challenge.
    fn negotiate(&mut self) -> Vec<u8>;

    /// Builds the Type 3 authenticate token in response to the server's
    /// Type 2 challenge token.
    fn authenticate(&mut self, server_challenge: &[u8]) -> Vec<u8>;
}

/// Opens one HTTP channel (`IN` or `OUT`) against `uri` on `gateway_host`,
/// performing the two-round-trip NTLM-over-HTTP handshake described in
/// §4.13. `content_length` is the `Content-Length` header value the
/// channel's *final* request carries (0 for the OUT channel, which never
/// sends a body; a large sentinel for the IN channel's open-ended RPC
/// data stream, matching `rpc_ntlm_http_in_connect`'s `0x40000000`).
pub async fn open_channel<S>(
    stream: &mut S,
    channel: RpcChannel,
    gateway_host: &str,
    uri: &str,
    content_length: u64,
    auth: &mut dyn NtlmAuthenticator,
) -> Result<(), RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let negotiate = auth.negotiate();
    send_ntlm_request(stream, channel, gateway_host, uri, 0, &negotiate).await?;
    let response = read_http_response(stream).await?;
    let challenge = response
        .ntlm_auth_param()
        .ok_or(RpcError::AuthFailed)
        .and_then(|token| BASE64.decode(token).map_err(|_| RpcError::AuthFailed))?;

    let authenticate = auth.authenticate(&challenge);
    send_ntlm_request(stream, channel, gateway_host, uri, content_length, &authenticate).await?;
    let response = read_http_response(stream).await?;
    if response.status != 200 {
        return Err(RpcError::AuthFailed);
    }
    Ok(())
}

async fn send_ntlm_request<S>(
    stream: &mut S,
    channel: RpcChannel,
    gateway_host: &str,
    uri: &str,
    content_length: u64,
    token: &[u8],
) -> Result<(), RpcError>
where
    S: AsyncWrite + Unpin,
{
    let encoded_token = BASE64.encode(token);
    let request = format!(
        "{method} {uri} HTTP/1.1\r\n\
         Host: {gateway_host}\r\n\
         Content-Length: {content_length}\r\n\
         Authorization: NTLM {encoded_token}\r\n\
         Accept: application/rpc\r\n\
         Cache-Control: no-cache\r\n\
         Connection: Keep-Alive\r\n\
         User-Agent: MSRPC\r\n\
         \r\n",
        method = channel.method(),
    );
    stream.write_all(request.as_bytes()).await?;
    Ok(())
}

struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
}

impl HttpResponse {
    fn ntlm_auth_param(&self) -> Option<&str> {
        self.headers.iter().find_map(|(name, value)| {
            if name.eq_ignore_ascii_case("www-authenticate") {
                value.strip_prefix("NTLM ").map(str::trim)
            } else {
                None
            }
        })
    }
}

async fn read_http_response<S>(stream: &mut S) -> Result<HttpResponse, RpcError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before HTTP headers completed",
            )));
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
        if buf.len() > 64 * 1024 {
            return Err(RpcError::MalformedHeader("HTTP response headers too large".into()));
        }
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    let status_line = lines.next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RpcError::MalformedHeader(format!("bad HTTP status line: {status_line}")))?;

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    Ok(HttpResponse { status, headers })
}
