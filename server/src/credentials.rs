//! Name verification
//!
//! A client proves ownership of its name with an "mppass": the hex MD5 of the
//! server salt followed by the name, handed out by the server list. A client
//! moving between servers may instead present a one-time reconnect token that
//! was restored into this process by the session-transfer mechanism.
//!
//! Hashing is a stateless digest per call, so concurrent admissions never
//! contend on a shared hasher.

use crate::address;
use crate::error::CredentialError;
use log::info;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// One-time reconnect tokens keyed by player name.
///
/// Keyed by the exact name the token was issued for; a handshake under a
/// differently cased name does not see it. A name has at most one
/// outstanding token. [`consume`](Self::consume)
/// removes the token under the lock, so two concurrent attempts can never
/// both observe it.
#[derive(Debug, Default)]
pub struct ReconnectTokens {
    tokens: Mutex<HashMap<String, String>>,
}

impl ReconnectTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for `name`, replacing any outstanding one.
    pub fn restore(&self, name: &str, token: &str) {
        self.tokens.lock().insert(name.to_string(), token.to_string());
    }

    /// Removes and returns the token for `name`, if any.
    pub fn consume(&self, name: &str) -> Option<String> {
        self.tokens.lock().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tokens.lock().contains_key(name)
    }
}

/// How a credential check was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Name checking is switched off server-wide
    NotRequired,
    ReconnectToken,
    Mppass,
    /// Accepted only because the source is on a private network
    TrustedNetwork,
    Rejected,
}

impl Verification {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verification::Rejected)
    }

    /// True when the client actually proved its name.
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::ReconnectToken | Verification::Mppass)
    }
}

/// Computes the mppass a client must present for `name`.
pub fn expected_mppass(salt: &str, name: &str) -> Result<String, CredentialError> {
    if !salt.is_ascii() || !name.is_ascii() {
        return Err(CredentialError::NonAscii(name.to_string()));
    }
    let mut hasher = Md5::new();
    hasher.update(salt.as_bytes());
    hasher.update(name.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    salt: String,
    verify_names: bool,
    trust_private_networks: bool,
    tokens: Arc<ReconnectTokens>,
}

impl CredentialVerifier {
    pub fn new(
        salt: impl Into<String>,
        verify_names: bool,
        trust_private_networks: bool,
        tokens: Arc<ReconnectTokens>,
    ) -> Self {
        Self {
            salt: salt.into(),
            verify_names,
            trust_private_networks,
            tokens,
        }
    }

    /// Checks `supplied` against a reconnect token or the salted hash.
    ///
    /// A reconnect token is consumed whether or not it matches; a mismatch
    /// falls through to the hash. Hashing errors are returned to the caller,
    /// which must treat them as a rejection.
    pub fn verify(
        &self,
        name: &str,
        supplied: &str,
        source: IpAddr,
    ) -> Result<Verification, CredentialError> {
        if !self.verify_names {
            return Ok(Verification::NotRequired);
        }

        if let Some(token) = self.tokens.consume(name) {
            if supplied.eq_ignore_ascii_case(&token) {
                info!("Player {} restore token success", name);
                return Ok(Verification::ReconnectToken);
            }
            info!("Player {} restore token didn't match", name);
        }

        let expected = expected_mppass(&self.salt, name)?;
        if supplied.eq_ignore_ascii_case(&expected) {
            return Ok(Verification::Mppass);
        }

        if self.trust_private_networks && address::is_private(source) {
            return Ok(Verification::TrustedNetwork);
        }

        Ok(Verification::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: &str = "203.0.113.5";
    const LOCAL: &str = "127.0.0.1";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn verifier(tokens: Arc<ReconnectTokens>) -> CredentialVerifier {
        CredentialVerifier::new("S", true, true, tokens)
    }

    #[test]
    fn test_expected_mppass_vector() {
        // MD5("SAlice")
        assert_eq!(
            expected_mppass("S", "Alice").unwrap(),
            "a904bd84d7d1793d1304d5799a6232e4"
        );
        assert_eq!(
            expected_mppass("", "").unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_non_ascii_input_is_an_error() {
        assert!(expected_mppass("sält", "Alice").is_err());

        let verifier = CredentialVerifier::new("sält", true, true, Arc::default());
        assert!(verifier.verify("Alice", "x", ip(LOCAL)).is_err());
    }

    #[test]
    fn test_mppass_accepted_case_insensitive() {
        let verifier = verifier(Arc::default());
        let mppass = expected_mppass("S", "Alice").unwrap().to_uppercase();

        let result = verifier.verify("Alice", &mppass, ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::Mppass);
        assert!(result.is_verified());
    }

    #[test]
    fn test_name_is_case_sensitive_in_hash() {
        let verifier = verifier(Arc::default());
        let mppass = expected_mppass("S", "Alice").unwrap();

        let result = verifier.verify("alice", &mppass, ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::Rejected);
    }

    #[test]
    fn test_wrong_mppass_rejected_from_public_address() {
        let verifier = verifier(Arc::default());
        let result = verifier.verify("Alice", "deadbeef", ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::Rejected);
        assert!(!result.is_accepted());
    }

    #[test]
    fn test_private_network_bypass() {
        let verifier = verifier(Arc::default());
        let result = verifier.verify("Alice", "", ip(LOCAL)).unwrap();
        assert_eq!(result, Verification::TrustedNetwork);
        assert!(result.is_accepted());
        assert!(!result.is_verified());
    }

    #[test]
    fn test_private_network_bypass_can_be_disabled() {
        let verifier = CredentialVerifier::new("S", true, false, Arc::default());
        let result = verifier.verify("Alice", "", ip(LOCAL)).unwrap();
        assert_eq!(result, Verification::Rejected);
    }

    #[test]
    fn test_verification_disabled() {
        let verifier = CredentialVerifier::new("S", false, false, Arc::default());
        let result = verifier.verify("Alice", "", ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::NotRequired);
        assert!(!result.is_verified());
    }

    #[test]
    fn test_reconnect_token_is_single_use() {
        let tokens = Arc::new(ReconnectTokens::new());
        tokens.restore("Alice", "TOKEN123");
        let verifier = verifier(Arc::clone(&tokens));

        let first = verifier.verify("Alice", "token123", ip(PUBLIC)).unwrap();
        assert_eq!(first, Verification::ReconnectToken);
        assert!(!tokens.contains("Alice"));

        // Second use goes through the hash path and fails
        let second = verifier.verify("Alice", "token123", ip(PUBLIC)).unwrap();
        assert_eq!(second, Verification::Rejected);
    }

    #[test]
    fn test_mismatched_token_is_consumed_and_falls_back_to_hash() {
        let tokens = Arc::new(ReconnectTokens::new());
        tokens.restore("Alice", "TOKEN123");
        let verifier = verifier(Arc::clone(&tokens));
        let mppass = expected_mppass("S", "Alice").unwrap();

        let result = verifier.verify("Alice", &mppass, ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::Mppass);
        assert!(!tokens.contains("Alice"));
    }

    #[test]
    fn test_hash_match_leaves_other_tokens_alone() {
        let tokens = Arc::new(ReconnectTokens::new());
        tokens.restore("Bob", "TOKEN");
        let verifier = verifier(Arc::clone(&tokens));
        let mppass = expected_mppass("S", "Alice").unwrap();

        verifier.verify("Alice", &mppass, ip(PUBLIC)).unwrap();
        assert!(tokens.contains("Bob"));
    }

    #[test]
    fn test_token_keyed_by_exact_name() {
        let tokens = Arc::new(ReconnectTokens::new());
        tokens.restore("Alice", "TOKEN");
        let verifier = verifier(Arc::clone(&tokens));

        let result = verifier.verify("alice", "TOKEN", ip(PUBLIC)).unwrap();
        assert_eq!(result, Verification::Rejected);
        assert!(tokens.contains("Alice"));
        assert!(!tokens.contains("alice"));
    }

    #[test]
    fn test_concurrent_token_consumption() {
        let tokens = Arc::new(ReconnectTokens::new());
        tokens.restore("Alice", "TOKEN");
        let verifier = verifier(Arc::clone(&tokens));

        let successes: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let verifier = &verifier;
                    scope.spawn(move || {
                        verifier.verify("Alice", "TOKEN", ip(PUBLIC)).unwrap()
                            == Verification::ReconnectToken
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(successes, 1);
    }
}
