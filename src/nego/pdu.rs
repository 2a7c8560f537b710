//! Wire encode/decode for `RDP_NEG_REQ`, `RDP_NEG_RSP`, and
//! `RDP_NEG_FAILURE` (§4.10, §6). These are carried inside the variable
//! part of an X.224 `CONNECTION_REQUEST`/`CONNECTION_CONFIRM` TPDU; this
//! module only handles the 8-byte negotiation payload itself, not the
//! TPKT/X.224 framing around it.

use super::NegoError;

const TYPE_RDP_NEG_REQ: u8 = 0x01;
const TYPE_RDP_NEG_RSP: u8 = 0x02;
const TYPE_RDP_NEG_FAILURE: u8 = 0x03;
const FIXED_LENGTH: u16 = 8;

/// Flags carried on `RDP_NEG_REQ` (§4.10).
pub mod req_flags {
    pub const RESTRICTED_ADMIN_MODE_REQUIRED: u8 = 0x01;
    pub const REDIRECTED_AUTHENTICATION_MODE_REQUIRED: u8 = 0x08;
    pub const CORRELATION_INFO_PRESENT: u8 = 0x10;
}

/// The client's requested-protocols negotiation PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegReq {
    pub flags: u8,
    pub requested_protocols: u32,
}

impl NegReq {
    /// Encodes the fixed 8-byte `RDP_NEG_REQ` structure.
    pub fn encode(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = TYPE_RDP_NEG_REQ;
        out[1] = self.flags;
        out[2..4].copy_from_slice(&FIXED_LENGTH.to_le_bytes());
        out[4..8].copy_from_slice(&self.requested_protocols.to_le_bytes());
        out
    }

    /// Decodes an `RDP_NEG_REQ` from exactly 8 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, NegoError> {
        if bytes.len() < 8 {
            return Err(NegoError::ShortRead {
                needed: 8,
                available: bytes.len(),
            });
        }
        if bytes[0] != TYPE_RDP_NEG_REQ {
            return Err(NegoError::UnrecognizedPduType(bytes[0]));
        }
        let length = u16::from_le_bytes([bytes[2], bytes[3]]);
        if length != FIXED_LENGTH {
            return Err(NegoError::MalformedLength(length));
        }
        Ok(Self {
            flags: bytes[1],
            requested_protocols: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Failure codes a server can report on `RDP_NEG_FAILURE` (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    SslRequiredByServer,
    SslNotAllowedByServer,
    SslCertNotOnServer,
    InconsistentFlags,
    HybridRequiredByServer,
    Unknown(u32),
}

impl FailureCode {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => FailureCode::SslRequiredByServer,
            2 => FailureCode::SslNotAllowedByServer,
            3 => FailureCode::SslCertNotOnServer,
            4 => FailureCode::InconsistentFlags,
            5 => FailureCode::HybridRequiredByServer,
            other => FailureCode::Unknown(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            FailureCode::SslRequiredByServer => 1,
            FailureCode::SslNotAllowedByServer => 2,
            FailureCode::SslCertNotOnServer => 3,
            FailureCode::InconsistentFlags => 4,
            FailureCode::HybridRequiredByServer => 5,
            FailureCode::Unknown(v) => v,
        }
    }
}

/// A parsed server response to a `CONNECTION_REQUEST`: either the
/// negotiated protocol, a failure code, or — when the variable part of the
/// `CONNECTION_CONFIRM` was absent entirely — a bare RDP Security fallback
/// implied by the server simply not answering with negotiation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegResponse {
    Success { flags: u8, selected: u32 },
    Failure { code: FailureCode },
    BareRdp,
}

impl NegResponse {
    /// Decodes the variable part of a `CONNECTION_CONFIRM`. An empty slice
    /// means the server sent no negotiation data at all, which implies a
    /// bare RDP Security connection (§4.10).
    pub fn decode(bytes: &[u8]) -> Result<Self, NegoError> {
        if bytes.is_empty() {
            return Ok(NegResponse::BareRdp);
        }
        if bytes.len() < 8 {
            return Err(NegoError::ShortRead {
                needed: 8,
                available: bytes.len(),
            });
        }
        let length = u16::from_le_bytes([bytes[2], bytes[3]]);
        if length != FIXED_LENGTH {
            return Err(NegoError::MalformedLength(length));
        }
        let field = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        match bytes[0] {
            TYPE_RDP_NEG_RSP => Ok(NegResponse::Success {
                flags: bytes[1],
                selected: field,
            }),
            TYPE_RDP_NEG_FAILURE => Ok(NegResponse::Failure {
                code: FailureCode::from_u32(field),
            }),
            other => Err(NegoError::UnrecognizedPduType(other)),
        }
    }

    /// Encodes a successful response (used by tests and by a server-side
    /// negotiator).
    pub fn encode_success(flags: u8, selected: u32) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = TYPE_RDP_NEG_RSP;
        out[1] = flags;
        out[2..4].copy_from_slice(&FIXED_LENGTH.to_le_bytes());
        out[4..8].copy_from_slice(&selected.to_le_bytes());
        out
    }

    /// Encodes a failure response.
    pub fn encode_failure(code: FailureCode) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = TYPE_RDP_NEG_FAILURE;
        out[2..4].copy_from_slice(&FIXED_LENGTH.to_le_bytes());
        out[4..8].copy_from_slice(&code.to_u32().to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neg_req_round_trips() {
        let req = NegReq {
            flags: req_flags::RESTRICTED_ADMIN_MODE_REQUIRED,
            requested_protocols: 0x0000_0003,
        };
        let bytes = req.encode();
        let decoded = NegReq::decode(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn success_response_round_trips() {
        let bytes = NegResponse::encode_success(0x02, 1);
        let decoded = NegResponse::decode(&bytes).unwrap();
        assert_eq!(decoded, NegResponse::Success { flags: 0x02, selected: 1 });
    }

    #[test]
    fn failure_response_round_trips() {
        let bytes = NegResponse::encode_failure(FailureCode::HybridRequiredByServer);
        let decoded = NegResponse::decode(&bytes).unwrap();
        assert_eq!(
            decoded,
            NegResponse::Failure {
                code: FailureCode::HybridRequiredByServer
            }
        );
    }

    #[test]
    fn empty_variable_part_means_bare_rdp() {
        assert_eq!(NegResponse::decode(&[]).unwrap(), NegResponse::BareRdp);
    }

    #[test]
    fn bad_length_field_is_rejected() {
        let mut bytes = NegResponse::encode_success(0, 1);
        bytes[2] = 9;
        assert!(matches!(
            NegResponse::decode(&bytes),
            Err(NegoError::MalformedLength(9))
        ));
    }
}
