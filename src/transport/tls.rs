//! TLS wrapper around `rustls`/`tokio-rustls` (§4.11): handshake driving,
//! channel-binding extraction, and certificate pinning against a
//! [`KnownHostsStore`] instead of (or alongside) a CA-validated chain.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{client::TlsStream, TlsConnector};
use x509_cert::der::Decode;
use x509_cert::Certificate;

use super::known_hosts::{KnownHostsStore, LookupResult, PinnedCert};
use super::TransportError;

/// Outcome of a single handshake step, mirroring the non-blocking
/// handshake drivers in `rustls` itself: `Continue` means more I/O is
/// needed before the handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResult {
    Success,
    Continue,
    Error,
    VerifyError,
}

/// What to do when a presented certificate doesn't match (or has no) pinned
/// entry. Implemented by the caller, e.g. to prompt a user interactively.
pub trait CertCallback: Send + Sync {
    /// Called when no known-hosts entry exists yet. Returning `true`
    /// pins the certificate for future connections.
    fn on_no_entry(&self, host: &str, presented: &PinnedCert) -> bool;

    /// Called when the presented certificate differs from the pinned one.
    /// Returning `true` overwrites the pinned entry; `false` aborts the
    /// handshake.
    fn on_mismatch(&self, host: &str, pinned: &PinnedCert, presented: &PinnedCert) -> bool;
}

/// Accepts any certificate unconditionally, whether because the caller set
/// an "ignore certificate errors" flag or supplied an explicit fingerprint
/// allow-list match before ever consulting the known-hosts store.
pub struct AlwaysAccept;

impl CertCallback for AlwaysAccept {
    fn on_no_entry(&self, _host: &str, _presented: &PinnedCert) -> bool {
        true
    }
    fn on_mismatch(&self, _host: &str, _pinned: &PinnedCert, _presented: &PinnedCert) -> bool {
        true
    }
}

/// Reads the subject/issuer display strings out of a leaf certificate's DER
/// via `x509-cert`, then derives the SHA-256 fingerprint pin comparisons
/// actually key on.
pub fn pinned_cert_from_der(der: &CertificateDer<'_>) -> Result<PinnedCert, TransportError> {
    let cert = Certificate::from_der(der.as_ref())
        .map_err(|e| TransportError::HandshakeFailed(format!("malformed peer certificate: {e}")))?;
    let subject = cert.tbs_certificate.subject.to_string();
    let issuer = cert.tbs_certificate.issuer.to_string();

    let mut hasher = Sha256::new();
    hasher.update(der.as_ref());
    let digest = hasher.finalize();
    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&digest);
    Ok(PinnedCert {
        subject,
        issuer,
        fingerprint_sha256: fingerprint,
    })
}

/// The hash function used to bind a `tls-server-end-point` channel binding
/// to a certificate (RFC 5929 §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndPointHash {
    Sha256,
    Sha384,
    Sha512,
}

/// Maps a certificate's signature-algorithm OID (dotted string) to the hash
/// function RFC 5929 says the channel binding must use: the same hash the
/// certificate was signed with, except MD5 and SHA-1 are upgraded to
/// SHA-256, and anything this table doesn't recognize (RSASSA-PSS with
/// embedded parameters, EdDSA, a future algorithm) also falls back to
/// SHA-256 per the RFC's guidance for hash-less or unusual signature
/// algorithms.
fn end_point_hash_for_signature_algorithm(oid: &str) -> EndPointHash {
    match oid {
        "1.2.840.113549.1.1.12" | "1.2.840.10045.4.3.3" => EndPointHash::Sha384,
        "1.2.840.113549.1.1.13" | "1.2.840.10045.4.3.4" => EndPointHash::Sha512,
        _ => EndPointHash::Sha256,
    }
}

/// Derives the `tls-server-end-point` channel-binding value for NLA/CredSSP
/// (RFC 5929 §4.1): the hash of the server's certificate, using the same
/// hash algorithm the certificate was signed with (falling back to SHA-256
/// when that algorithm is MD5, SHA-1, or not recognized).
pub fn channel_binding(der: &CertificateDer<'_>) -> Vec<u8> {
    let hash_alg = Certificate::from_der(der.as_ref())
        .map(|cert| end_point_hash_for_signature_algorithm(&cert.signature_algorithm.oid.to_string()))
        .unwrap_or(EndPointHash::Sha256);

    let digest = match hash_alg {
        EndPointHash::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(der.as_ref());
            hasher.finalize().to_vec()
        }
        EndPointHash::Sha384 => {
            let mut hasher = Sha384::new();
            hasher.update(der.as_ref());
            hasher.finalize().to_vec()
        }
        EndPointHash::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(der.as_ref());
            hasher.finalize().to_vec()
        }
    };
    let mut out = b"tls-server-end-point:".to_vec();
    out.extend_from_slice(&digest);
    out
}

/// Verifies a freshly-handshaken server certificate against the pinning
/// store, consulting `callback` on a no-entry or mismatch outcome and
/// updating the store when the callback accepts.
pub fn verify_and_pin(
    store: &mut dyn KnownHostsStore,
    callback: &dyn CertCallback,
    host: &str,
    port: u16,
    presented: &PinnedCert,
) -> Result<(), TransportError> {
    match store.lookup(host, port, presented) {
        LookupResult::Match => Ok(()),
        LookupResult::NoEntry => {
            if callback.on_no_entry(host, presented) {
                store.store(host, port, presented.clone());
                Ok(())
            } else {
                Err(TransportError::CertNoEntry)
            }
        }
        LookupResult::Mismatch(pinned) => {
            if callback.on_mismatch(host, &pinned, presented) {
                store.store(host, port, presented.clone());
                Ok(())
            } else {
                Err(TransportError::CertMismatch)
            }
        }
    }
}

/// Thin wrapper over a completed `tokio_rustls` client stream, exposing the
/// reduced surface the codec/negotiation layers actually drive: reads,
/// writes, and alert sending on teardown.
pub struct TlsTransport<S> {
    stream: TlsStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TlsTransport<S> {
    /// Completes a client-side TLS handshake over `transport` using
    /// `connector`, for `server_name`.
    pub async fn connect(
        connector: &TlsConnector,
        server_name: ServerName<'static>,
        transport: S,
    ) -> Result<Self, TransportError> {
        let stream = connector
            .connect(server_name, transport)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        Ok(Self { stream })
    }

    /// The peer's leaf certificate DER, if the handshake completed and a
    /// certificate was presented.
    pub fn peer_certificate(&self) -> Option<CertificateDer<'static>> {
        let (_, session) = self.stream.get_ref();
        session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .cloned()
    }

    /// Reads into `buf`, returning the number of bytes read (0 on EOF).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.stream.read(buf).await?)
    }

    /// Writes all of `buf`.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(buf).await?;
        Ok(())
    }
}

/// Builds a `rustls::ClientConfig` that performs no chain validation,
/// deferring entirely to the application-level pinning check in
/// `verify_and_pin`. This is the correct posture for a protocol (RDP) whose
/// servers are overwhelmingly self-signed and never chain to a public CA.
pub fn pinning_only_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoChainVerifier))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Builds a `rustls::ClientConfig` that validates against the host's native
/// CA trust store, for legs of the connection that terminate on a
/// publicly-trusted certificate rather than a self-signed RDP server — the
/// RPC/RTS gateway's outer HTTPS hop (§4.13) is the case this crate actually
/// needs it for.
pub fn system_trust_connector() -> Result<TlsConnector, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::warn!("failed to load a native root certificate: {err}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            log::warn!("failed to add a native root certificate to the trust store: {e}");
        }
    }
    if roots.is_empty() {
        return Err(TransportError::HandshakeFailed(
            "no native root certificates were loaded".to_string(),
        ));
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[derive(Debug)]
struct NoChainVerifier;

impl rustls::client::danger::ServerCertVerifier for NoChainVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::known_hosts::MemoryKnownHosts;

    fn cert(byte: u8) -> PinnedCert {
        PinnedCert {
            subject: "CN=test".to_string(),
            issuer: "CN=test".to_string(),
            fingerprint_sha256: [byte; 32],
        }
    }

    #[test]
    fn first_connection_pins_on_accept() {
        let mut store = MemoryKnownHosts::new();
        let result = verify_and_pin(&mut store, &AlwaysAccept, "host", 3389, &cert(1));
        assert!(result.is_ok());
        assert_eq!(store.lookup("host", 3389, &cert(1)), LookupResult::Match);
    }

    struct RejectMismatch;
    impl CertCallback for RejectMismatch {
        fn on_no_entry(&self, _host: &str, _presented: &PinnedCert) -> bool {
            true
        }
        fn on_mismatch(&self, _host: &str, _pinned: &PinnedCert, _presented: &PinnedCert) -> bool {
            false
        }
    }

    #[test]
    fn changed_cert_is_rejected_by_default_callback() {
        let mut store = MemoryKnownHosts::new();
        store.store("host", 3389, cert(1));
        let result = verify_and_pin(&mut store, &RejectMismatch, "host", 3389, &cert(2));
        assert!(matches!(result, Err(TransportError::CertMismatch)));
    }

    #[test]
    fn channel_binding_has_tls_server_end_point_prefix() {
        let der = CertificateDer::from(vec![1, 2, 3]);
        let binding = channel_binding(&der);
        assert!(binding.starts_with(b"tls-server-end-point:"));
    }
}
