//! The virtual-connection CONN handshake (§3.6, §4.13): opening the two
//! HTTP channels, exchanging CONN/A1 → CONN/B1 → CONN/A3 → CONN/C2, and
//! driving `ConnState` through its transitions. Out-of-sequence PDUs
//! (flow-control acks, keep-alives, pings) are handled by `FlowControl`
//! once the connection reaches `Opened`.

use uuid::Uuid;

use super::rts::{
    Command, CommandType, Destination, FlowControl, RtsPdu, DEFAULT_KEEP_ALIVE_SECS,
    DEFAULT_RECEIVE_WINDOW, RTS_FLAG_OTHER_CMD,
};
use super::RpcError;

/// State of the virtual-connection CONN handshake (§3.6, §4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Initial,
    OutChannelWait,
    WaitA3W,
    WaitC2,
    Opened,
    Final,
}

/// Generates a fresh 16-byte RTS cookie. These are GUID-shaped on the wire
/// (`rts_generate_cookie` in the handshake this is grounded on fills a
/// `UUID` structure), so a v4 UUID's bytes are used directly rather than
/// raw random bytes.
fn generate_cookie() -> [u8; 16] {
    *Uuid::new_v4().as_bytes()
}

/// Holds everything §3.6 says a virtual connection tracks: the two
/// endpoint-identifying cookies, the per-channel flow-control windows, the
/// keep-alive/timeout settings, and the handshake's current state.
#[derive(Debug)]
pub struct VirtualConnection {
    pub state: ConnState,
    pub association_group_id: [u8; 16],
    pub vc_cookie: [u8; 16],
    pub out_channel_cookie: [u8; 16],
    pub in_channel_cookie: [u8; 16],
    pub out_flow: FlowControl,
    pub channel_lifetime: u32,
    pub keep_alive_interval_secs: u32,
    pub connection_timeout_secs: u32,
}

impl VirtualConnection {
    /// A freshly-minted virtual connection in `Initial` state, with new
    /// random cookies and the default flow-control/keep-alive settings
    /// (§4.13).
    pub fn new() -> Self {
        Self {
            state: ConnState::Initial,
            association_group_id: generate_cookie(),
            vc_cookie: generate_cookie(),
            out_channel_cookie: generate_cookie(),
            in_channel_cookie: generate_cookie(),
            out_flow: FlowControl::new(DEFAULT_RECEIVE_WINDOW),
            channel_lifetime: u32::MAX,
            keep_alive_interval_secs: DEFAULT_KEEP_ALIVE_SECS,
            connection_timeout_secs: 0,
        }
    }

    /// Builds the CONN/A1 PDU, sent on the OUT channel once it is open:
    /// version, virtual-connection cookie, OUT-channel cookie, receive
    /// window.
    pub fn build_conn_a1(&self) -> RtsPdu {
        RtsPdu {
            flags: 0,
            commands: vec![
                Command::Version(RTS_VERSION),
                Command::Cookie(self.vc_cookie),
                Command::Cookie(self.out_channel_cookie),
                Command::ReceiveWindowSize(self.out_flow.receive_window_size),
            ],
        }
    }

    /// Builds the CONN/B1 PDU, sent on the IN channel once it is open:
    /// version, virtual-connection cookie, IN-channel cookie, channel
    /// lifetime, client keep-alive interval, association group id.
    pub fn build_conn_b1(&self) -> RtsPdu {
        RtsPdu {
            flags: 0,
            commands: vec![
                Command::Version(RTS_VERSION),
                Command::Cookie(self.vc_cookie),
                Command::Cookie(self.in_channel_cookie),
                Command::ChannelLifetime(self.channel_lifetime),
                Command::ClientKeepalive(self.keep_alive_interval_secs * 1000),
                Command::AssociationGroupId(self.association_group_id),
            ],
        }
    }

    /// Advances `Initial` → `OutChannelWait` once both the OUT-channel
    /// CONN/A1 and the IN-channel CONN/B1 PDUs have been sent.
    pub fn on_channels_sent(&mut self) -> Result<(), RpcError> {
        if self.state != ConnState::Initial {
            return Err(RpcError::HandshakeFailed(format!(
                "CONN/A1 and CONN/B1 sent in unexpected state {:?}",
                self.state
            )));
        }
        self.state = ConnState::OutChannelWait;
        Ok(())
    }

    /// Advances `OutChannelWait` → `WaitA3W` on the OUT channel's HTTP 200
    /// response. A client MUST NOT accept this response in any other
    /// state (§4.13).
    pub fn on_out_channel_response_ok(&mut self) -> Result<(), RpcError> {
        if self.state != ConnState::OutChannelWait {
            return Err(RpcError::HandshakeFailed(format!(
                "OUT channel response received in unexpected state {:?}",
                self.state
            )));
        }
        self.state = ConnState::WaitA3W;
        Ok(())
    }

    /// Processes an RTS PDU received on the OUT channel while the
    /// handshake is in progress, advancing `WaitA3W` → `WaitC2` → `Opened`
    /// as CONN/A3 then CONN/C2 arrive. Any PDU received out of the
    /// expected state is a protocol error.
    pub fn on_handshake_pdu(&mut self, pdu: &RtsPdu) -> Result<(), RpcError> {
        match self.state {
            ConnState::WaitA3W => {
                let timeout = expect_conn_a3(pdu)?;
                self.connection_timeout_secs = timeout;
                self.state = ConnState::WaitC2;
                Ok(())
            }
            ConnState::WaitC2 => {
                let (receive_window, timeout) = expect_conn_c2(pdu)?;
                self.out_flow = FlowControl::new(receive_window);
                self.connection_timeout_secs = timeout;
                self.state = ConnState::Opened;
                Ok(())
            }
            other => Err(RpcError::HandshakeFailed(format!(
                "unexpected RTS PDU received in state {other:?}"
            ))),
        }
    }

    /// Builds the FlowControlAck PDU to send on the IN channel once
    /// `FlowControl::on_bytes_received` signals the window has dropped
    /// below half (§4.13): `Destination(FDOutProxy)` then the ack command.
    pub fn build_flow_control_ack(&mut self) -> RtsPdu {
        RtsPdu {
            flags: 0,
            commands: vec![
                Command::Destination(Destination::FdOutProxy as u32),
                self.out_flow.build_ack(self.out_channel_cookie),
            ],
        }
    }

    /// Builds the keep-alive PDU the client emits at
    /// `keep_alive_interval_secs` (§4.13).
    pub fn build_keep_alive(&self) -> RtsPdu {
        RtsPdu {
            flags: RTS_FLAG_OTHER_CMD,
            commands: vec![Command::ClientKeepalive(self.keep_alive_interval_secs * 1000)],
        }
    }
}

impl Default for VirtualConnection {
    fn default() -> Self {
        Self::new()
    }
}

const RTS_VERSION: u32 = 1;

fn expect_conn_a3(pdu: &RtsPdu) -> Result<u32, RpcError> {
    match pdu.commands.as_slice() {
        [Command::ConnectionTimeout(timeout)] => Ok(*timeout),
        _ => Err(RpcError::UnrecognizedSignature { flags: pdu.flags }),
    }
}

fn expect_conn_c2(pdu: &RtsPdu) -> Result<(u32, u32), RpcError> {
    let mut version = None;
    let mut receive_window = None;
    let mut timeout = None;
    for command in &pdu.commands {
        match (command.command_type(), command) {
            (CommandType::Version, Command::Version(v)) => version = Some(*v),
            (CommandType::ReceiveWindowSize, Command::ReceiveWindowSize(w)) => receive_window = Some(*w),
            (CommandType::ConnectionTimeout, Command::ConnectionTimeout(t)) => timeout = Some(*t),
            _ => {}
        }
    }
    match (version, receive_window, timeout) {
        (Some(_), Some(w), Some(t)) => Ok((w, t)),
        _ => Err(RpcError::UnrecognizedSignature { flags: pdu.flags }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_a1_carries_the_four_expected_commands() {
        let vc = VirtualConnection::new();
        let pdu = vc.build_conn_a1();
        assert_eq!(pdu.commands.len(), 4);
        assert!(matches!(pdu.commands[0], Command::Version(_)));
        assert_eq!(pdu.commands[1], Command::Cookie(vc.vc_cookie));
        assert_eq!(pdu.commands[2], Command::Cookie(vc.out_channel_cookie));
    }

    #[test]
    fn conn_b1_carries_the_six_expected_commands() {
        let vc = VirtualConnection::new();
        let pdu = vc.build_conn_b1();
        assert_eq!(pdu.commands.len(), 6);
        assert_eq!(
            pdu.commands[5],
            Command::AssociationGroupId(vc.association_group_id)
        );
    }

    #[test]
    fn full_handshake_reaches_opened() {
        let mut vc = VirtualConnection::new();
        vc.on_channels_sent().unwrap();
        assert_eq!(vc.state, ConnState::OutChannelWait);
        vc.on_out_channel_response_ok().unwrap();
        assert_eq!(vc.state, ConnState::WaitA3W);

        let conn_a3 = RtsPdu {
            flags: 0,
            commands: vec![Command::ConnectionTimeout(120)],
        };
        vc.on_handshake_pdu(&conn_a3).unwrap();
        assert_eq!(vc.state, ConnState::WaitC2);
        assert_eq!(vc.connection_timeout_secs, 120);

        let conn_c2 = RtsPdu {
            flags: 0,
            commands: vec![
                Command::Version(1),
                Command::ReceiveWindowSize(0x20000),
                Command::ConnectionTimeout(180),
            ],
        };
        vc.on_handshake_pdu(&conn_c2).unwrap();
        assert_eq!(vc.state, ConnState::Opened);
        assert_eq!(vc.connection_timeout_secs, 180);
        assert_eq!(vc.out_flow.receive_window_size, 0x20000);
    }

    #[test]
    fn conn_a3_before_out_channel_opened_is_a_handshake_error() {
        let mut vc = VirtualConnection::new();
        let conn_a3 = RtsPdu {
            flags: 0,
            commands: vec![Command::ConnectionTimeout(120)],
        };
        assert!(vc.on_handshake_pdu(&conn_a3).is_err());
    }

    #[test]
    fn keep_alive_pdu_carries_the_interval_in_milliseconds() {
        let vc = VirtualConnection::new();
        let pdu = vc.build_keep_alive();
        assert_eq!(
            pdu.commands,
            vec![Command::ClientKeepalive(DEFAULT_KEEP_ALIVE_SECS * 1000)]
        );
    }

    #[test]
    fn cookies_are_freshly_drawn_per_connection() {
        let a = VirtualConnection::new();
        let b = VirtualConnection::new();
        assert_ne!(a.vc_cookie, b.vc_cookie);
    }
}
