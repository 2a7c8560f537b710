//! RTS (Request To Send) PDU framing and the virtual-connection handshake
//! built on top of it (§3.6, §4.13).
//!
//! Every RTS PDU starts with a fixed 20-byte header (DCE/RPC common header
//! fields plus an RTS-specific flags/command-count pair) followed by a
//! sequence of typed commands. This module frames that header and a subset
//! of the command types the virtual-connection handshake and flow-control
//! loop actually need; it does not attempt to round-trip every command type
//! `[MS-RPCH]` defines.

use bytes::{Buf, BufMut, BytesMut};

use super::RpcError;

const RTS_VERS: u8 = 5;
const RTS_VERS_MINOR: u8 = 0;
const PTYPE_RTS: u8 = 0x14;
const PFC_FIRST_LAST: u8 = 0x03;
const DREP_LITTLE_ENDIAN_ASCII: u32 = 0x0000_0010;

/// Default flow-control receive window (§4.13).
pub const DEFAULT_RECEIVE_WINDOW: u32 = 0x10000;
/// Default keep-alive interval, in seconds (§4.13).
pub const DEFAULT_KEEP_ALIVE_SECS: u32 = 300;

/// RTS PDU header flag bits, used both to tag an RTS PDU's purpose and to
/// match an incoming PDU's signature against the handshake/flow-control
/// tables (§4.13).
pub const RTS_FLAG_NONE: u16 = 0x0000;
pub const RTS_FLAG_PING: u16 = 0x0001;
pub const RTS_FLAG_OTHER_CMD: u16 = 0x0002;
pub const RTS_FLAG_RECYCLE_CHANNEL: u16 = 0x0004;
pub const RTS_FLAG_IN_CHANNEL: u16 = 0x0008;
pub const RTS_FLAG_OUT_CHANNEL: u16 = 0x0010;
pub const RTS_FLAG_EOF: u16 = 0x0020;
pub const RTS_FLAG_ECHO: u16 = 0x0040;

/// RTS command type codes this module frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    ReceiveWindowSize = 0,
    FlowControlAck = 1,
    ConnectionTimeout = 2,
    Cookie = 3,
    ChannelLifetime = 4,
    ClientKeepalive = 5,
    Version = 6,
    Empty = 7,
    Padding = 8,
    NegativeAnce = 9,
    AnceHold = 10,
    ClientAddress = 11,
    AssociationGroupId = 12,
    Destination = 13,
    PingTrafficSentNotify = 14,
}

impl CommandType {
    fn from_u16(v: u16) -> Result<Self, RpcError> {
        use CommandType::*;
        Ok(match v {
            0 => ReceiveWindowSize,
            1 => FlowControlAck,
            2 => ConnectionTimeout,
            3 => Cookie,
            4 => ChannelLifetime,
            5 => ClientKeepalive,
            6 => Version,
            7 => Empty,
            8 => Padding,
            9 => NegativeAnce,
            10 => AnceHold,
            11 => ClientAddress,
            12 => AssociationGroupId,
            13 => Destination,
            14 => PingTrafficSentNotify,
            other => {
                return Err(RpcError::MalformedHeader(format!(
                    "unknown RTS command type {other}"
                )))
            }
        })
    }
}

/// `Destination` command values (§4.13 flow control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Destination {
    FdClient = 0,
    FdInProxy = 1,
    FdOutProxy = 2,
    FdServer = 3,
}

/// A single decoded RTS command, carrying just the fields the virtual
/// connection and flow-control loop consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ReceiveWindowSize(u32),
    FlowControlAck {
        bytes_received: u32,
        available_window: u32,
        channel_cookie: [u8; 16],
    },
    ConnectionTimeout(u32),
    Cookie([u8; 16]),
    ChannelLifetime(u32),
    ClientKeepalive(u32),
    Version(u32),
    Empty,
    Padding(Vec<u8>),
    ClientAddress { ipv4: bool, address: Vec<u8> },
    AssociationGroupId([u8; 16]),
    Destination(u32),
    PingTrafficSentNotify(u32),
}

impl Command {
    pub(crate) fn command_type(&self) -> CommandType {
        match self {
            Command::ReceiveWindowSize(_) => CommandType::ReceiveWindowSize,
            Command::FlowControlAck { .. } => CommandType::FlowControlAck,
            Command::ConnectionTimeout(_) => CommandType::ConnectionTimeout,
            Command::Cookie(_) => CommandType::Cookie,
            Command::ChannelLifetime(_) => CommandType::ChannelLifetime,
            Command::ClientKeepalive(_) => CommandType::ClientKeepalive,
            Command::Version(_) => CommandType::Version,
            Command::Empty => CommandType::Empty,
            Command::Padding(_) => CommandType::Padding,
            Command::ClientAddress { .. } => CommandType::ClientAddress,
            Command::AssociationGroupId(_) => CommandType::AssociationGroupId,
            Command::Destination(_) => CommandType::Destination,
            Command::PingTrafficSentNotify(_) => CommandType::PingTrafficSentNotify,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.command_type() as u16);
        match self {
            Command::ReceiveWindowSize(v)
            | Command::ConnectionTimeout(v)
            | Command::ChannelLifetime(v)
            | Command::ClientKeepalive(v)
            | Command::Version(v)
            | Command::Destination(v)
            | Command::PingTrafficSentNotify(v) => buf.put_u32_le(*v),
            Command::FlowControlAck {
                bytes_received,
                available_window,
                channel_cookie,
            } => {
                buf.put_u32_le(*bytes_received);
                buf.put_u32_le(*available_window);
                buf.put_slice(channel_cookie);
            }
            Command::Cookie(cookie) | Command::AssociationGroupId(cookie) => {
                buf.put_slice(cookie)
            }
            Command::Empty => {}
            Command::Padding(bytes) => {
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            Command::ClientAddress { ipv4, address } => {
                buf.put_u32_le(if *ipv4 { 0 } else { 1 });
                buf.put_slice(address);
                // Padding to keep the command a fixed 20 or 32 bytes per
                // address family (§6).
                let total = if *ipv4 { 20 } else { 32 };
                let written = 4 + address.len();
                if total > written {
                    buf.put_bytes(0, total - written);
                }
            }
        }
    }

    fn decode(buf: &mut BytesMut) -> Result<Self, RpcError> {
        if buf.len() < 2 {
            return Err(RpcError::MalformedHeader("truncated RTS command type".into()));
        }
        let command_type = CommandType::from_u16(buf.get_u16_le())?;
        Ok(match command_type {
            CommandType::ReceiveWindowSize => Command::ReceiveWindowSize(need_u32(buf)?),
            CommandType::ConnectionTimeout => Command::ConnectionTimeout(need_u32(buf)?),
            CommandType::ChannelLifetime => Command::ChannelLifetime(need_u32(buf)?),
            CommandType::ClientKeepalive => Command::ClientKeepalive(need_u32(buf)?),
            CommandType::Version => Command::Version(need_u32(buf)?),
            CommandType::Destination => Command::Destination(need_u32(buf)?),
            CommandType::PingTrafficSentNotify => Command::PingTrafficSentNotify(need_u32(buf)?),
            CommandType::FlowControlAck => {
                let bytes_received = need_u32(buf)?;
                let available_window = need_u32(buf)?;
                let mut channel_cookie = [0u8; 16];
                need_bytes(buf, &mut channel_cookie)?;
                Command::FlowControlAck {
                    bytes_received,
                    available_window,
                    channel_cookie,
                }
            }
            CommandType::Cookie => {
                let mut cookie = [0u8; 16];
                need_bytes(buf, &mut cookie)?;
                Command::Cookie(cookie)
            }
            CommandType::AssociationGroupId => {
                let mut cookie = [0u8; 16];
                need_bytes(buf, &mut cookie)?;
                Command::AssociationGroupId(cookie)
            }
            CommandType::Empty => Command::Empty,
            CommandType::Padding => {
                let len = need_u32(buf)? as usize;
                if buf.len() < len {
                    return Err(RpcError::MalformedHeader("truncated padding command".into()));
                }
                Command::Padding(buf.split_to(len).to_vec())
            }
            CommandType::ClientAddress => {
                let family = need_u32(buf)?;
                let ipv4 = family == 0;
                let addr_len = if ipv4 { 4 } else { 16 };
                let pad_len = if ipv4 { 20 } else { 32 } - 4 - addr_len;
                if buf.len() < addr_len + pad_len {
                    return Err(RpcError::MalformedHeader("truncated ClientAddress command".into()));
                }
                let address = buf.split_to(addr_len).to_vec();
                buf.advance(pad_len);
                Command::ClientAddress { ipv4, address }
            }
            other => {
                return Err(RpcError::MalformedHeader(format!(
                    "command type {other:?} is not supported by this tunnel"
                )))
            }
        })
    }
}

fn need_u32(buf: &mut BytesMut) -> Result<u32, RpcError> {
    if buf.len() < 4 {
        return Err(RpcError::MalformedHeader("truncated u32 command field".into()));
    }
    Ok(buf.get_u32_le())
}

fn need_bytes(buf: &mut BytesMut, out: &mut [u8]) -> Result<(), RpcError> {
    if buf.len() < out.len() {
        return Err(RpcError::MalformedHeader("truncated fixed-length command field".into()));
    }
    out.copy_from_slice(&buf.split_to(out.len()));
    Ok(())
}

/// A complete RTS PDU: the 20-byte header plus its commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtsPdu {
    pub flags: u16,
    pub commands: Vec<Command>,
}

impl RtsPdu {
    /// Encodes the full PDU: header with `frag_length`/`NumberOfCommands`
    /// filled in from the command list, followed by each command in order.
    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        for command in &self.commands {
            command.encode(&mut body);
        }
        let frag_length = 20 + body.len();

        let mut out = BytesMut::with_capacity(frag_length);
        out.put_u8(RTS_VERS);
        out.put_u8(RTS_VERS_MINOR);
        out.put_u8(PTYPE_RTS);
        out.put_u8(PFC_FIRST_LAST);
        out.put_u32_le(DREP_LITTLE_ENDIAN_ASCII);
        out.put_u16_le(frag_length as u16);
        out.put_u16_le(0); // auth_length
        out.put_u32_le(0); // call_id
        out.put_u16_le(self.flags);
        out.put_u16_le(self.commands.len() as u16);
        out.extend_from_slice(&body);
        out
    }

    /// Decodes a full RTS PDU from `buf`, consuming exactly `frag_length`
    /// bytes.
    pub fn decode(buf: &mut BytesMut) -> Result<Self, RpcError> {
        if buf.len() < 20 {
            return Err(RpcError::MalformedHeader("PDU shorter than the 20-byte RTS header".into()));
        }
        let vers = buf.get_u8();
        let vers_minor = buf.get_u8();
        let ptype = buf.get_u8();
        let _pfc_flags = buf.get_u8();
        let _drep = buf.get_u32_le();
        let frag_length = buf.get_u16_le() as usize;
        let _auth_length = buf.get_u16_le();
        let _call_id = buf.get_u32_le();
        let flags = buf.get_u16_le();
        let num_commands = buf.get_u16_le();

        if vers != RTS_VERS || vers_minor != RTS_VERS_MINOR {
            return Err(RpcError::MalformedHeader(format!(
                "unexpected RTS version {vers}.{vers_minor}"
            )));
        }
        if ptype != PTYPE_RTS {
            return Err(RpcError::MalformedHeader(format!("unexpected ptype {ptype}")));
        }

        let mut commands = Vec::with_capacity(num_commands as usize);
        for _ in 0..num_commands {
            commands.push(Command::decode(buf)?);
        }

        let consumed = 20 + commands_wire_len(&commands);
        if consumed != frag_length {
            return Err(RpcError::MalformedHeader(format!(
                "frag_length {frag_length} did not match decoded size {consumed}"
            )));
        }

        Ok(RtsPdu { flags, commands })
    }
}

fn commands_wire_len(commands: &[Command]) -> usize {
    let mut encoded = BytesMut::new();
    for command in commands {
        command.encode(&mut encoded);
    }
    encoded.len()
}

/// Tracks one direction's flow-control window (§4.13): how many bytes have
/// been received against the receive window most recently advertised, and
/// when to emit a `FlowControlAck`.
#[derive(Debug, Clone, Copy)]
pub struct FlowControl {
    pub receive_window_size: u32,
    pub bytes_received: u32,
    pub available_window_advertised: u32,
}

impl FlowControl {
    pub fn new(receive_window_size: u32) -> Self {
        Self {
            receive_window_size,
            bytes_received: 0,
            available_window_advertised: receive_window_size,
        }
    }

    /// Records `n` newly received bytes, returning `true` if the consumed
    /// window has dropped below half the advertised window and a
    /// `FlowControlAck` should now be sent.
    pub fn on_bytes_received(&mut self, n: u32) -> bool {
        self.bytes_received = self.bytes_received.wrapping_add(n);
        let consumed = self
            .bytes_received
            .wrapping_sub(self.receive_window_size - self.available_window_advertised);
        consumed >= self.receive_window_size / 2
    }

    /// Builds the `FlowControlAck` command to send, and resets the
    /// advertised-window baseline.
    pub fn build_ack(&mut self, channel_cookie: [u8; 16]) -> Command {
        self.available_window_advertised = self.receive_window_size;
        Command::FlowControlAck {
            bytes_received: self.bytes_received,
            available_window: self.available_window_advertised,
            channel_cookie,
        }
    }

    /// Applies a peer's `FlowControlAck`, updating the sender-side window:
    /// `SenderAvailableWindow = AvailableWindow - (BytesSent - BytesReceived)`.
    pub fn apply_peer_ack(&self, bytes_sent: u32, ack_available_window: u32, ack_bytes_received: u32) -> u32 {
        ack_available_window.saturating_sub(bytes_sent.saturating_sub(ack_bytes_received))
    }
}
