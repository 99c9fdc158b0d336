//! Host identity verification hooks

use dashmap::DashMap;

/// Decides whether a server's host key is trusted.
///
/// Called during the handshake with the SHA-256 fingerprint of the key the
/// server presented. Returning `false` aborts the connection.
pub trait HostKeyVerifier: Send + Sync {
    fn verify(&self, host: &str, port: u16, fingerprint: &str) -> bool;
}

/// Accepts every host key.
///
/// Placeholder trust-on-first-use policy: nothing is pinned or persisted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllHostKeys;

impl HostKeyVerifier for AcceptAllHostKeys {
    fn verify(&self, host: &str, port: u16, fingerprint: &str) -> bool {
        tracing::debug!("Accepting host key {} for {}:{}", fingerprint, host, port);
        true
    }
}

/// Accepts only fingerprints pinned for the host.
///
/// With `learn_unknown` set, the first key seen for an unpinned host is
/// pinned and accepted; later keys for that host must match it.
#[derive(Debug, Default)]
pub struct PinnedHostKeys {
    pins: DashMap<String, Vec<String>>,
    learn_unknown: bool,
}

impl PinnedHostKeys {
    /// Strict verifier: unpinned hosts are rejected
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier that pins the first key seen for each host
    pub fn trust_on_first_use() -> Self {
        Self {
            pins: DashMap::new(),
            learn_unknown: true,
        }
    }

    /// Pin a fingerprint for `host:port`
    pub fn pin(&self, host: &str, port: u16, fingerprint: impl Into<String>) {
        self.pins
            .entry(Self::key(host, port))
            .or_default()
            .push(fingerprint.into());
    }

    /// Fingerprints currently pinned for `host:port`
    pub fn pinned(&self, host: &str, port: u16) -> Vec<String> {
        self.pins
            .get(&Self::key(host, port))
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    fn key(host: &str, port: u16) -> String {
        format!("{}:{}", host.to_ascii_lowercase(), port)
    }
}

impl HostKeyVerifier for PinnedHostKeys {
    fn verify(&self, host: &str, port: u16, fingerprint: &str) -> bool {
        let key = Self::key(host, port);

        if let Some(pins) = self.pins.get(&key) {
            let trusted = pins.iter().any(|pin| pin == fingerprint);
            if !trusted {
                tracing::warn!(
                    "Host key for {} does not match pinned keys: got {}",
                    key,
                    fingerprint
                );
            }
            return trusted;
        }

        if self.learn_unknown {
            tracing::info!("Pinning first-seen host key {} for {}", fingerprint, key);
            self.pins.insert(key, vec![fingerprint.to_string()]);
            return true;
        }

        tracing::warn!("No pinned host key for {}, rejecting {}", key, fingerprint);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert!(AcceptAllHostKeys.verify("10.0.0.5", 22, "SHA256:abc"));
    }

    #[test]
    fn test_strict_pins() {
        let verifier = PinnedHostKeys::new();
        verifier.pin("Example.com", 22, "SHA256:good");

        assert!(verifier.verify("example.com", 22, "SHA256:good"));
        assert!(!verifier.verify("example.com", 22, "SHA256:evil"));
        assert!(!verifier.verify("example.com", 2222, "SHA256:good"));
        assert!(!verifier.verify("other.com", 22, "SHA256:good"));
    }

    #[test]
    fn test_trust_on_first_use() {
        let verifier = PinnedHostKeys::trust_on_first_use();

        assert!(verifier.verify("10.0.0.5", 22, "SHA256:first"));
        assert_eq!(verifier.pinned("10.0.0.5", 22), vec!["SHA256:first".to_string()]);
        assert!(verifier.verify("10.0.0.5", 22, "SHA256:first"));
        assert!(!verifier.verify("10.0.0.5", 22, "SHA256:changed"));
    }
}
