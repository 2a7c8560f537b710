//! RDP connection-security negotiation (§3.5, §4.10).
//!
//! Mirrors the shape of a VNC client's initial handshake (offer a set of
//! supported auth mechanisms, pick the strongest one both sides accept) but
//! generalized to RDP's `X.224`-wrapped `RDP_NEG_REQ`/`RDP_NEG_RSP` exchange
//! and its ordered fallback between security protocols when the server
//! rejects the client's first choice.

mod pdu;

pub use pdu::{FailureCode, NegReq, NegResponse};

use thiserror::Error;

/// Errors raised while negotiating the security protocol for a connection.
#[derive(Debug, Error)]
pub enum NegoError {
    /// The PDU was shorter than its declared fields require.
    #[error("short read: needed {needed} bytes, had {available}")]
    ShortRead { needed: usize, available: usize },

    /// The response's `length` field was not the fixed value of 8.
    #[error("malformed negotiation PDU: length field was {0}, expected 8")]
    MalformedLength(u16),

    /// An unrecognized PDU type byte was encountered where `RDP_NEG_RSP` or
    /// `RDP_NEG_FAILURE` was expected.
    #[error("unrecognized negotiation PDU type 0x{0:02x}")]
    UnrecognizedPduType(u8),

    /// The server rejected every protocol tier the client is willing to
    /// fall back to; carries the last failure code seen.
    #[error("negotiation failed, server rejected all offered protocols (last code: {0:?})")]
    NegotiationFailed(FailureCode),

    /// A routing-token or cookie string exceeded the 0xFF-byte wire limit.
    #[error("cookie or routing token too long: {0} bytes (max 255)")]
    CookieTooLong(usize),
}

/// Requested-protocol bitmask flags (§3.5).
pub mod protocol_flags {
    pub const RDP: u32 = 0;
    pub const TLS: u32 = 1;
    pub const NLA: u32 = 1 << 1;
    pub const NLA_EXT: u32 = 1 << 3;
    pub const RDSTLS: u32 = 1 << 4;
    pub const AAD: u32 = 1 << 16;
}

/// Response flags a server can set on a successful `RDP_NEG_RSP` (§3.5).
pub mod response_flags {
    pub const EXTENDED_CLIENT_DATA: u8 = 0x01;
    pub const DYNVC_GFX: u8 = 0x02;
    pub const RESTRICTED_ADMIN: u8 = 0x08;
    pub const REDIRECTED_AUTH: u8 = 0x10;
}

/// Negotiation state, following §3.5's explicit state machine. Each tier
/// state (`Aad`, `Rdstls`, `Ext`, `Nla`, `Tls`, `Rdp`) corresponds to one
/// `CONNECTION_REQUEST` attempt at progressively weaker security, tried in
/// that fixed order until one succeeds, all are exhausted (`Fail`), or the
/// caller cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initial,
    Aad,
    Rdstls,
    Ext,
    Nla,
    Tls,
    Rdp,
    Fail,
    Final,
}

/// The fixed fallback order: highest security first. `next_lower` walks
/// this list from a state that just failed.
const FALLBACK_ORDER: [State; 6] = [
    State::Aad,
    State::Rdstls,
    State::Ext,
    State::Nla,
    State::Tls,
    State::Rdp,
];

/// Drives the client side of §4.10's negotiation state machine: which
/// protocol tier to try next, and how to react to a server's response.
pub struct Negotiator {
    requested_protocols: u32,
    state: State,
    selected_protocol: Option<u32>,
    response_flags: u8,
    routing_token: Option<String>,
    cookie: Option<String>,
    last_failure: Option<FailureCode>,
    /// Set after a `SSL_NOT_ALLOWED_BY_SERVER`/`SSL_CERT_NOT_ON_SERVER`
    /// failure: the retry must omit the negotiation data entirely (§4.10).
    pub suppress_nego_data_on_retry: bool,
}

impl Negotiator {
    /// Creates a negotiator that will try every tier enabled in
    /// `requested_protocols`, starting from the strongest.
    pub fn new(requested_protocols: u32) -> Self {
        Self {
            requested_protocols,
            state: State::Initial,
            selected_protocol: None,
            response_flags: 0,
            routing_token: None,
            cookie: None,
            last_failure: None,
            suppress_nego_data_on_retry: false,
        }
    }

    /// Sets the `Cookie: mstshash=<user>\r\n` value sent with every
    /// `CONNECTION_REQUEST`. Truncated to 255 bytes if longer (§4.10).
    pub fn set_cookie(&mut self, username: &str) {
        let mut cookie = format!("Cookie: mstshash={username}\r\n");
        if cookie.len() > 0xFF {
            cookie.truncate(0xFF);
        }
        self.cookie = Some(cookie);
    }

    /// Sets a routing token, appending a trailing CRLF if missing (§4.10).
    pub fn set_routing_token(&mut self, token: &str) -> Result<(), NegoError> {
        let mut token = token.to_string();
        if !token.ends_with("\r\n") {
            token.push_str("\r\n");
        }
        if token.len() > 0xFF {
            return Err(NegoError::CookieTooLong(token.len()));
        }
        self.routing_token = Some(token);
        self.state = State::Initial;
        Ok(())
    }

    /// Current negotiation state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The protocol bit corresponding to `tier`.
    fn protocol_bit(tier: State) -> u32 {
        match tier {
            State::Aad => protocol_flags::AAD,
            State::Rdstls => protocol_flags::RDSTLS,
            State::Ext => protocol_flags::NLA_EXT,
            State::Nla => protocol_flags::NLA,
            State::Tls => protocol_flags::TLS,
            State::Rdp => protocol_flags::RDP,
            _ => 0,
        }
    }

    /// Advances to the first enabled tier (on first call) or the next
    /// lower enabled tier after a failure, returning the PDU to send, or
    /// `None` once every tier has been exhausted.
    pub fn advance(&mut self) -> Option<NegReq> {
        let start = match self.state {
            State::Initial => 0,
            _ => {
                let current = FALLBACK_ORDER.iter().position(|s| *s == self.state)?;
                current + 1
            }
        };
        for tier in &FALLBACK_ORDER[start..] {
            let bit = Self::protocol_bit(*tier);
            if *tier == State::Rdp || self.requested_protocols & bit != 0 {
                self.state = *tier;
                return Some(NegReq {
                    flags: 0,
                    requested_protocols: self.requested_protocols,
                });
            }
        }
        self.state = State::Fail;
        None
    }

    /// Feeds a parsed server response into the state machine.
    pub fn on_response(&mut self, response: NegResponse) -> Result<(), NegoError> {
        match response {
            NegResponse::Success { flags, selected } => {
                self.selected_protocol = Some(selected);
                self.response_flags = flags;
                self.state = State::Final;
                Ok(())
            }
            NegResponse::Failure { code } => {
                self.last_failure = Some(code);
                self.suppress_nego_data_on_retry = matches!(
                    code,
                    FailureCode::SslNotAllowedByServer | FailureCode::SslCertNotOnServer
                );
                self.state = State::Fail;
                Err(NegoError::NegotiationFailed(code))
            }
            NegResponse::BareRdp => {
                self.selected_protocol = Some(protocol_flags::RDP);
                self.state = State::Final;
                Ok(())
            }
        }
    }

    /// The protocol ultimately agreed on, once negotiation reaches `Final`.
    pub fn selected_protocol(&self) -> Option<u32> {
        self.selected_protocol
    }

    /// Server response flags from the final successful response.
    pub fn response_flags(&self) -> u8 {
        self.response_flags
    }
}

/// Supplies the credential material a negotiated security tier needs (NLA's
/// CredSSP, RDSTLS) without this crate needing to know how credentials are
/// stored (§9 design note: "Credentials provider as a trait").
pub trait CredentialsProvider: Send + Sync {
    /// The account name to authenticate as.
    fn username(&self) -> &str;
    /// The domain, if any, to authenticate against.
    fn domain(&self) -> Option<&str>;
    /// The plaintext password, or `None` if a different credential type
    /// (smart card, Kerberos ticket) is in use.
    fn password(&self) -> Option<&str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_fallback_order_for_full_mask() {
        let mask = protocol_flags::AAD
            | protocol_flags::RDSTLS
            | protocol_flags::NLA_EXT
            | protocol_flags::NLA
            | protocol_flags::TLS;
        let mut nego = Negotiator::new(mask);
        assert_eq!(nego.advance().is_some(), true);
        assert_eq!(nego.state(), State::Aad);
    }

    #[test]
    fn advance_skips_disabled_tiers() {
        let mut nego = Negotiator::new(protocol_flags::TLS);
        nego.advance();
        assert_eq!(nego.state(), State::Tls);
    }

    #[test]
    fn advance_always_falls_back_to_rdp() {
        let mut nego = Negotiator::new(0);
        nego.advance();
        assert_eq!(nego.state(), State::Rdp);
    }

    #[test]
    fn exhausting_every_tier_reaches_fail() {
        let mut nego = Negotiator::new(0);
        assert!(nego.advance().is_some()); // Rdp
        assert!(nego.advance().is_none());
        assert_eq!(nego.state(), State::Fail);
    }

    #[test]
    fn cookie_truncates_to_wire_limit() {
        let mut nego = Negotiator::new(0);
        nego.set_cookie(&"a".repeat(500));
        assert!(nego.cookie.as_ref().unwrap().len() <= 0xFF);
    }

    #[test]
    fn routing_token_gets_crlf_appended() {
        let mut nego = Negotiator::new(0);
        nego.set_routing_token("Cookie: token").unwrap();
        assert!(nego.routing_token.as_ref().unwrap().ends_with("\r\n"));
    }

    #[test]
    fn success_response_reaches_final_state() {
        let mut nego = Negotiator::new(protocol_flags::TLS);
        nego.advance();
        nego.on_response(NegResponse::Success {
            flags: response_flags::EXTENDED_CLIENT_DATA,
            selected: protocol_flags::TLS,
        })
        .unwrap();
        assert_eq!(nego.state(), State::Final);
        assert_eq!(nego.selected_protocol(), Some(protocol_flags::TLS));
    }

    #[test]
    fn ssl_cert_failure_suppresses_nego_data_on_retry() {
        let mut nego = Negotiator::new(protocol_flags::TLS);
        nego.advance();
        let _ = nego.on_response(NegResponse::Failure {
            code: FailureCode::SslCertNotOnServer,
        });
        assert!(nego.suppress_nego_data_on_retry);
    }
}
