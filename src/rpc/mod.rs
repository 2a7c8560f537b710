//! RPC-over-HTTP (`RPC_IN_DATA`/`RPC_OUT_DATA`) virtual connection tunnel
//! and its RTS (Request To Send) control-plane PDUs (§3.6, §4.13).

pub mod conn;
pub mod ntlm_http;
pub mod rts;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use conn::VirtualConnection;
use ntlm_http::{open_channel, NtlmAuthenticator, RpcChannel};
use rts::RtsPdu;

use thiserror::Error;

/// Errors raised establishing or maintaining the RPC/RTS virtual connection.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on one of the two HTTP channels.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An RTS PDU's header didn't match the fixed values §4.13 requires.
    #[error("malformed RTS PDU header: {0}")]
    MalformedHeader(String),

    /// An RTS PDU carried a flags/command-type combination this tunnel
    /// doesn't recognize as a valid signature.
    #[error("unrecognized RTS PDU signature (flags=0x{flags:04x})")]
    UnrecognizedSignature { flags: u16 },

    /// NTLM-over-HTTP authentication did not complete within its two
    /// round-trips.
    #[error("NTLM authentication over HTTP failed")]
    AuthFailed,

    /// The virtual connection's handshake failed (CONN/A1, CONN/B1,
    /// CONN/A3, or CONN/C2 was malformed or out of order).
    #[error("virtual connection handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Reads one complete RTS PDU off `stream`: the fixed 20-byte header first
/// (to learn `frag_length`), then the remaining `frag_length - 20` bytes of
/// commands.
async fn read_rts_pdu<S>(stream: &mut S) -> Result<RtsPdu, RpcError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 20];
    stream.read_exact(&mut buf).await?;
    let frag_length = u16::from_le_bytes([buf[8], buf[9]]) as usize;
    if frag_length < 20 {
        return Err(RpcError::MalformedHeader(format!(
            "frag_length {frag_length} is shorter than the RTS header itself"
        )));
    }
    buf.resize(frag_length, 0);
    stream.read_exact(&mut buf[20..]).await?;
    let mut bytes = bytes::BytesMut::from(&buf[..]);
    RtsPdu::decode(&mut bytes)
}

/// Opens the full virtual connection end to end (§3.6, §4.13): NTLM-over-
/// HTTP on the OUT channel, CONN/A1, NTLM-over-HTTP on the IN channel,
/// CONN/B1, then the server's CONN/A3 and CONN/C2 on the OUT channel. On
/// success `VirtualConnection::state` is `Opened` and the two channel
/// streams are ready for RPC traffic and flow-control/keep-alive PDUs.
pub async fn open_virtual_connection<O, I>(
    out_stream: &mut O,
    in_stream: &mut I,
    gateway_host: &str,
    uri: &str,
    out_auth: &mut dyn NtlmAuthenticator,
    in_auth: &mut dyn NtlmAuthenticator,
) -> Result<VirtualConnection, RpcError>
where
    O: AsyncRead + AsyncWrite + Unpin,
    I: AsyncRead + AsyncWrite + Unpin,
{
    let mut vc = VirtualConnection::new();

    open_channel(out_stream, RpcChannel::Out, gateway_host, uri, 0, out_auth).await?;
    let conn_a1 = vc.build_conn_a1().encode();
    out_stream.write_all(&conn_a1).await?;

    open_channel(in_stream, RpcChannel::In, gateway_host, uri, 0x4000_0000, in_auth).await?;
    let conn_b1 = vc.build_conn_b1().encode();
    in_stream.write_all(&conn_b1).await?;

    vc.on_channels_sent()?;
    vc.on_out_channel_response_ok()?;

    let conn_a3 = read_rts_pdu(out_stream).await?;
    vc.on_handshake_pdu(&conn_a3)?;

    let conn_c2 = read_rts_pdu(out_stream).await?;
    vc.on_handshake_pdu(&conn_c2)?;

    Ok(vc)
}
