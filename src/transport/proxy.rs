//! Proxy dialers: HTTP `CONNECT` tunneling and SOCKS5, plus `no_proxy`
//! matching against `https_proxy`/`HTTPS_PROXY`/`no_proxy`/`NO_PROXY` (§4.12).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::net::IpAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::TransportError;

/// Target address for a proxy `CONNECT`.
#[derive(Debug, Clone)]
pub enum Target {
    Host(String, u16),
    Ip(IpAddr, u16),
}

/// Performs an HTTP `CONNECT` tunnel handshake over an already-connected
/// stream to the proxy. Succeeds only on an HTTP/1.x `200` status line.
pub async fn http_connect<S>(
    stream: &mut S,
    target: &Target,
    proxy_auth: Option<(&str, &str)>,
) -> Result<(), TransportError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (host, port) = match target {
        Target::Host(h, p) => (h.clone(), *p),
        Target::Ip(ip, p) => (ip.to_string(), *p),
    };
    let mut request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n"
    );
    if let Some((user, pass)) = proxy_auth {
        let token = BASE64.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(TransportError::ProxyRejected(
                "connection closed before CONNECT response completed".to_string(),
            ));
        }
        response.push(byte[0]);
        if response.ends_with(b"\r\n\r\n") {
            break;
        }
        if response.len() > 64 * 1024 {
            return Err(TransportError::ProxyRejected(
                "CONNECT response headers too large".to_string(),
            ));
        }
    }
    let text = String::from_utf8_lossy(&response);
    let status_line = text.lines().next().unwrap_or("");
    let is_http = status_line.starts_with("HTTP/1.0") || status_line.starts_with("HTTP/1.1");
    let is_200 = status_line.split_whitespace().nth(1) == Some("200");
    if is_http && is_200 {
        Ok(())
    } else {
        Err(TransportError::ProxyRejected(status_line.to_string()))
    }
}

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_FQDN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn socks_status_message(code: u8) -> &'static str {
    match code {
        0x00 => "succeeded",
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS5 reply code",
    }
}

/// Performs a SOCKS5 handshake and `CONNECT` request over an
/// already-connected stream to the proxy (§4.12).
pub async fn socks5_connect<S>(
    stream: &mut S,
    target: &Target,
    credentials: Option<(&str, &str)>,
) -> Result<(), TransportError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let methods: &[u8] = if credentials.is_some() {
        &[METHOD_NO_AUTH, METHOD_USER_PASS]
    } else {
        &[METHOD_NO_AUTH]
    };
    let mut greeting = vec![SOCKS_VERSION, methods.len() as u8];
    greeting.extend_from_slice(methods);
    stream.write_all(&greeting).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS_VERSION {
        return Err(TransportError::ProxyRejected(
            "unexpected SOCKS version in method selection".to_string(),
        ));
    }
    match reply[1] {
        METHOD_NO_AUTH => {}
        METHOD_USER_PASS => {
            let (user, pass) = credentials.ok_or_else(|| {
                TransportError::ProxyRejected("proxy required auth but none was configured".to_string())
            })?;
            let mut auth = vec![0x01u8, user.len() as u8];
            auth.extend_from_slice(user.as_bytes());
            auth.push(pass.len() as u8);
            auth.extend_from_slice(pass.as_bytes());
            stream.write_all(&auth).await?;
            let mut auth_reply = [0u8; 2];
            stream.read_exact(&mut auth_reply).await?;
            if auth_reply[1] != 0x00 {
                return Err(TransportError::ProxyRejected(
                    "SOCKS5 username/password authentication failed".to_string(),
                ));
            }
        }
        0xFF => {
            return Err(TransportError::ProxyRejected(
                "SOCKS5 proxy has no acceptable authentication method".to_string(),
            ))
        }
        other => {
            return Err(TransportError::ProxyRejected(format!(
                "SOCKS5 proxy selected unsupported method {other}"
            )))
        }
    }

    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];
    match target {
        Target::Ip(IpAddr::V4(addr), port) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&addr.octets());
            request.extend_from_slice(&port.to_be_bytes());
        }
        Target::Ip(IpAddr::V6(addr), port) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&addr.octets());
            request.extend_from_slice(&port.to_be_bytes());
        }
        Target::Host(host, port) => {
            request.push(ATYP_FQDN);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
            request.extend_from_slice(&port.to_be_bytes());
        }
    }
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        return Err(TransportError::ProxyRejected(
            socks_status_message(head[1]).to_string(),
        ));
    }
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_FQDN => {
            let mut len_byte = [0u8; 1];
            stream.read_exact(&mut len_byte).await?;
            len_byte[0] as usize
        }
        other => {
            return Err(TransportError::ProxyRejected(format!(
                "unsupported bound-address type {other} in SOCKS5 reply"
            )))
        }
    };
    let mut discard = vec![0u8; addr_len + 2];
    stream.read_exact(&mut discard).await?;
    Ok(())
}

/// Parses a comma-separated `no_proxy` rule list.
pub fn parse_no_proxy(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Returns `true` if `host` should bypass the proxy per `no_proxy`'s rules:
/// `*` matches everything, a bare or leading-dot entry matches as a
/// case-insensitive suffix, otherwise an exact match (covering bare IPv4/
/// IPv6 literals; CIDR ranges are treated as exact strings, matching no
/// differently-formatted address, which callers must pre-expand if needed).
pub fn bypasses_proxy(host: &str, rules: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    for rule in rules {
        if rule == "*" {
            return true;
        }
        let pattern = rule.strip_prefix('.').unwrap_or(rule);
        if host == *rule || host.ends_with(&format!(".{pattern}")) || host == pattern {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_proxy_bare_hostname_matches_exactly() {
        let rules = parse_no_proxy("internal.example.com,localhost");
        assert!(bypasses_proxy("internal.example.com", &rules));
        assert!(bypasses_proxy("LOCALHOST", &rules));
        assert!(!bypasses_proxy("example.com", &rules));
    }

    #[test]
    fn no_proxy_leading_dot_matches_subdomains() {
        let rules = parse_no_proxy(".example.com");
        assert!(bypasses_proxy("sub.example.com", &rules));
        assert!(bypasses_proxy("example.com", &rules));
        assert!(!bypasses_proxy("notexample.com", &rules));
    }

    #[test]
    fn no_proxy_star_matches_everything() {
        let rules = parse_no_proxy("*");
        assert!(bypasses_proxy("anything.invalid", &rules));
    }

    #[test]
    fn socks_status_message_covers_all_documented_codes() {
        for code in 0x00u8..=0x08 {
            assert_ne!(socks_status_message(code), "unknown SOCKS5 reply code");
        }
        assert_eq!(socks_status_message(0x09), "unknown SOCKS5 reply code");
    }
}
