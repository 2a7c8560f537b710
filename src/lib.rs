// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # rdpcore
//!
//! The wire-format codec core of an RDP (Remote Desktop Protocol)
//! implementation: the RemoteFX/Progressive bitmap image codec pipeline,
//! and the connection negotiation / security bootstrap that precedes it.
//!
//! ## Modules
//!
//! - [`codec`]: the RemoteFX and Progressive bitmap codecs — wavelet
//!   transform, scalar quantization, adaptive RLGR entropy coding, and
//!   fixed-point color conversion, tied together by the `rfx`/`progressive`
//!   message framing.
//! - [`nego`]: the client-side RDP security negotiation state machine
//!   (`RDP_NEG_REQ`/`RDP_NEG_RSP`/`RDP_NEG_FAILURE`) and its ordered
//!   fallback between AAD, RDSTLS, CredSSP (NLA), plain TLS, and bare RDP
//!   Security.
//! - [`transport`]: the TLS wrapper (certificate pinning rather than CA
//!   trust, since RDP servers are overwhelmingly self-signed) and the
//!   HTTP-CONNECT/SOCKS5 proxy dialers used to reach a gatewayed server.
//! - [`rpc`]: the RPC-over-HTTP virtual connection (RDG/TSGU) and its RTS
//!   control-plane PDUs, for connections tunneled through an RD Gateway.
//!
//! Each subsystem defines its own narrow error enum; [`error::CoreError`]
//! unifies them for callers that drive the whole connect sequence.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod nego;
pub mod rpc;
pub mod transport;

pub use error::{CoreError, Result};
