//! Transport-layer concerns sitting underneath the RDP wire protocol: the
//! TLS wrapper and certificate-pinning store (§4.11), and the HTTP-CONNECT
//! / SOCKS5 proxy dialer (§4.12).

pub mod known_hosts;
pub mod proxy;
pub mod tls;

use thiserror::Error;

/// Errors raised by the transport layer (TLS handshake, certificate
/// pinning, or proxy dialing).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TLS handshake itself failed (bad cipher negotiation, protocol
    /// mismatch, peer reset).
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer certificate didn't match the certificate-binding check
    /// the handshake was required to pass (explicit allow-list, or pinned
    /// known-hosts entry rejected by the caller's callback).
    #[error("certificate verification failed")]
    CertMismatch,

    /// No known-hosts entry exists yet for this (host, port) and the
    /// caller's trust-on-first-use callback declined to proceed.
    #[error("no known-hosts entry and trust-on-first-use was declined")]
    CertNoEntry,

    /// The proxy rejected the CONNECT request.
    #[error("proxy rejected connection: {0}")]
    ProxyRejected(String),

    /// The operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}
