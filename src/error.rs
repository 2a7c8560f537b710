//! Crate-wide error type for `rdpcore`.
//!
//! Each subsystem (codec, negotiation, transport, RPC/RTS) defines its own
//! narrower error enum so a caller that only drives the codec never has to
//! match on TLS or RPC variants; those enums convert into [`CoreError`] via
//! `#[from]`, matching the abstract error kinds of the design (§7).

use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::nego::NegoError;
use crate::rpc::RpcError;
use crate::transport::TransportError;

/// Result type for `rdpcore` operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur anywhere in the `rdpcore` stack.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A RemoteFX / Progressive codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A security-negotiation error.
    #[error("negotiation error: {0}")]
    Nego(#[from] NegoError),

    /// A transport-layer error (TLS, proxy dialer).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An RPC/RTS tunnel error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The requested operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The operation was canceled by the caller.
    #[error("operation canceled")]
    Canceled,
}
