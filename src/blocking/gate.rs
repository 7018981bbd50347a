//! Strict-mode gate for the disable path.
//!
//! The gate only decides whether proof is *required*. Whether a scanned tag
//! is genuine is answered by a [`TagVerifier`] supplied by the platform layer.

use super::error::{EngineError, EngineResult};
use super::state::BlockingState;

/// Validates a raw NFC scan against the registered unlock tags.
pub trait TagVerifier: Send + Sync {
    fn validate(&self, raw_scan: &[u8]) -> bool;
}

/// Verifier that accepts nothing; used when no tag hardware is available.
pub struct RejectAllTags;

impl TagVerifier for RejectAllTags {
    fn validate(&self, _raw_scan: &[u8]) -> bool {
        false
    }
}

/// A verified tag scan. Not `Clone`: each value unlocks one disable attempt.
#[derive(Debug)]
pub struct ProofOfPresence {
    _private: (),
}

impl ProofOfPresence {
    pub fn verify(verifier: &dyn TagVerifier, raw_scan: &[u8]) -> EngineResult<Self> {
        if verifier.validate(raw_scan) {
            Ok(Self { _private: () })
        } else {
            Err(EngineError::InvalidProof)
        }
    }
}

pub struct StrictModeGate;

impl StrictModeGate {
    /// Refuses only when proof is required and the snapshot is strict.
    pub fn evaluate(require_proof: bool, snapshot: &BlockingState) -> EngineResult<()> {
        if require_proof && snapshot.is_strict_mode {
            return Err(EngineError::StrictModeRequiresProof);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptTag(&'static [u8]);

    impl TagVerifier for AcceptTag {
        fn validate(&self, raw_scan: &[u8]) -> bool {
            raw_scan == self.0
        }
    }

    fn snapshot(strict: bool) -> BlockingState {
        BlockingState {
            is_active: true,
            active_profile_id: Some("p1".into()),
            is_strict_mode: strict,
            ..BlockingState::default()
        }
    }

    #[test]
    fn test_gate_matrix() {
        assert!(matches!(
            StrictModeGate::evaluate(true, &snapshot(true)),
            Err(EngineError::StrictModeRequiresProof)
        ));
        assert!(StrictModeGate::evaluate(false, &snapshot(true)).is_ok());
        assert!(StrictModeGate::evaluate(true, &snapshot(false)).is_ok());
        assert!(StrictModeGate::evaluate(false, &snapshot(false)).is_ok());
    }

    #[test]
    fn test_refusal_message_asks_for_tag() {
        let err = StrictModeGate::evaluate(true, &snapshot(true)).unwrap_err();
        assert!(err.to_string().contains("scan your tag"));
    }

    #[test]
    fn test_proof_requires_valid_scan() {
        let verifier = AcceptTag(b"tag-123");
        assert!(ProofOfPresence::verify(&verifier, b"tag-123").is_ok());
        assert!(matches!(
            ProofOfPresence::verify(&verifier, b"other"),
            Err(EngineError::InvalidProof)
        ));
        assert!(ProofOfPresence::verify(&RejectAllTags, b"tag-123").is_err());
    }
}
