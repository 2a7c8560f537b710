//! Certificate-pinning store keyed by `(hostname, port)` (§4.11).
//!
//! A line-oriented, append-friendly persisted store — the same shape as an
//! SSH `known_hosts` file — so a TLS wrapper can trust-on-first-use a
//! server's certificate and flag any later change for the caller to accept
//! or reject, rather than trusting a CA chain.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// One pinned certificate's stable identity: its fingerprint plus the
/// subject/issuer strings kept around purely for display when asking a
/// caller to confirm a new or changed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCert {
    pub subject: String,
    pub issuer: String,
    pub fingerprint_sha256: [u8; 32],
}

impl PinnedCert {
    /// Lowercase hex encoding of the fingerprint, the form written to (and
    /// read from) a known-hosts file line.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint_sha256)
    }
}

impl fmt::Display for PinnedCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (issued by {})", self.subject, self.issuer)
    }
}

/// What a lookup against the store found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// No entry exists for this host/port yet.
    NoEntry,
    /// The presented certificate matches the pinned one.
    Match,
    /// An entry exists but the presented certificate's fingerprint
    /// differs; carries the previously pinned certificate for display.
    Mismatch(PinnedCert),
}

/// A certificate-pinning store. `FileKnownHosts` is the on-disk
/// implementation; tests use an in-memory `HashMap`-backed one directly.
pub trait KnownHostsStore: Send + Sync {
    /// Looks up the pinned certificate for `(host, port)`, comparing
    /// against `presented` if an entry exists.
    fn lookup(&self, host: &str, port: u16, presented: &PinnedCert) -> LookupResult;

    /// Stores (or overwrites) the pinned certificate for `(host, port)`.
    fn store(&mut self, host: &str, port: u16, cert: PinnedCert);
}

/// An in-process known-hosts store. A real deployment would back this with
/// a line-oriented file and single-writer best-effort fsync (§5); this
/// in-memory map is the part of that behavior this crate actually needs to
/// exercise in tests and expose to callers that want their own persistence.
#[derive(Debug, Default)]
pub struct MemoryKnownHosts {
    entries: HashMap<(String, u16), PinnedCert>,
}

impl MemoryKnownHosts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnownHostsStore for MemoryKnownHosts {
    fn lookup(&self, host: &str, port: u16, presented: &PinnedCert) -> LookupResult {
        match self.entries.get(&(host.to_string(), port)) {
            None => LookupResult::NoEntry,
            Some(pinned) if pinned.fingerprint_sha256 == presented.fingerprint_sha256 => {
                LookupResult::Match
            }
            Some(pinned) => LookupResult::Mismatch(pinned.clone()),
        }
    }

    fn store(&mut self, host: &str, port: u16, cert: PinnedCert) {
        self.entries.insert((host.to_string(), port), cert);
    }
}

/// A persisted, line-oriented known-hosts file, one pinned entry per line:
/// `host port fingerprint_hex subject\tissuer`. The whole file is parsed
/// into memory on open and rewritten in full on every `store`, the same
/// model an SSH `known_hosts` file uses at this scale (a handful to a few
/// hundred entries, not a database workload).
#[derive(Debug)]
pub struct FileKnownHosts {
    path: PathBuf,
    entries: HashMap<(String, u16), PinnedCert>,
}

impl FileKnownHosts {
    /// Opens (or creates) the known-hosts file at `path`, parsing any
    /// existing entries. Malformed lines are skipped rather than failing
    /// the whole open, matching how `ssh` tolerates a hand-edited file.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => parse_entries(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries })
    }

    fn flush(&self) -> io::Result<()> {
        let mut out = String::new();
        for ((host, port), cert) in &self.entries {
            out.push_str(&format_entry(host, *port, cert));
            out.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = tmp_path_for(&self.path);
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(out.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
    }
}

impl KnownHostsStore for FileKnownHosts {
    fn lookup(&self, host: &str, port: u16, presented: &PinnedCert) -> LookupResult {
        match self.entries.get(&(host.to_string(), port)) {
            None => LookupResult::NoEntry,
            Some(pinned) if pinned.fingerprint_sha256 == presented.fingerprint_sha256 => {
                LookupResult::Match
            }
            Some(pinned) => LookupResult::Mismatch(pinned.clone()),
        }
    }

    fn store(&mut self, host: &str, port: u16, cert: PinnedCert) {
        self.entries.insert((host.to_string(), port), cert);
        if let Err(e) = self.flush() {
            log::warn!("failed to persist known-hosts entry for {host}:{port}: {e}");
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn format_entry(host: &str, port: u16, cert: &PinnedCert) -> String {
    format!(
        "{host} {port} {} {}\t{}",
        cert.fingerprint_hex(),
        cert.subject,
        cert.issuer
    )
}

fn parse_entries(contents: &str) -> HashMap<(String, u16), PinnedCert> {
    let mut entries = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, cert)) = parse_entry_line(line) {
            entries.insert(key, cert);
        }
    }
    entries
}

fn parse_entry_line(line: &str) -> Option<((String, u16), PinnedCert)> {
    let mut parts = line.splitn(4, ' ');
    let host = parts.next()?.to_string();
    let port: u16 = parts.next()?.parse().ok()?;
    let fingerprint_hex = parts.next()?;
    let rest = parts.next().unwrap_or("");
    let (subject, issuer) = rest.split_once('\t').unwrap_or((rest, ""));

    let fingerprint_bytes = hex::decode(fingerprint_hex).ok()?;
    if fingerprint_bytes.len() != 32 {
        return None;
    }
    let mut fingerprint_sha256 = [0u8; 32];
    fingerprint_sha256.copy_from_slice(&fingerprint_bytes);

    Some((
        (host, port),
        PinnedCert {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            fingerprint_sha256,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(byte: u8) -> PinnedCert {
        PinnedCert {
            subject: "CN=example".to_string(),
            issuer: "CN=example".to_string(),
            fingerprint_sha256: [byte; 32],
        }
    }

    #[test]
    fn lookup_on_empty_store_is_no_entry() {
        let store = MemoryKnownHosts::new();
        assert_eq!(store.lookup("host", 3389, &cert(1)), LookupResult::NoEntry);
    }

    #[test]
    fn stored_cert_matches_on_lookup() {
        let mut store = MemoryKnownHosts::new();
        store.store("host", 3389, cert(1));
        assert_eq!(store.lookup("host", 3389, &cert(1)), LookupResult::Match);
    }

    #[test]
    fn changed_cert_is_reported_as_mismatch() {
        let mut store = MemoryKnownHosts::new();
        store.store("host", 3389, cert(1));
        assert_eq!(
            store.lookup("host", 3389, &cert(2)),
            LookupResult::Mismatch(cert(1))
        );
    }

    fn temp_known_hosts_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "rdpcore-known-hosts-test-{name}-{}",
            std::process::id()
        ));
        path
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let path = temp_known_hosts_path("persist");
        let _ = fs::remove_file(&path);

        let mut store = FileKnownHosts::open(&path).unwrap();
        assert_eq!(store.lookup("host", 3389, &cert(1)), LookupResult::NoEntry);
        store.store("host", 3389, cert(1));

        let reopened = FileKnownHosts::open(&path).unwrap();
        assert_eq!(reopened.lookup("host", 3389, &cert(1)), LookupResult::Match);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_store_round_trips_fingerprint_through_hex() {
        let path = temp_known_hosts_path("hex");
        let _ = fs::remove_file(&path);

        let mut store = FileKnownHosts::open(&path).unwrap();
        let c = cert(0xAB);
        assert_eq!(c.fingerprint_hex().len(), 64);
        store.store("gateway.example.com", 443, c.clone());

        let reopened = FileKnownHosts::open(&path).unwrap();
        assert_eq!(reopened.lookup("gateway.example.com", 443, &c), LookupResult::Match);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_opens_as_empty_store() {
        let path = temp_known_hosts_path("missing");
        let _ = fs::remove_file(&path);
        let store = FileKnownHosts::open(&path).unwrap();
        assert_eq!(store.lookup("host", 3389, &cert(1)), LookupResult::NoEntry);
    }
}
