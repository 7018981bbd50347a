use thiserror::Error;

/// Failures surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Disable was requested without proof while a strict profile is active.
    #[error("strict mode is active; scan your tag to stop blocking")]
    StrictModeRequiresProof,

    /// The scanned tag was not accepted by the tag verifier.
    #[error("the scanned tag is not a registered unlock tag")]
    InvalidProof,

    /// Activation or deactivation write failed upstream. Not retried.
    #[error("profile repository failed: {0:#}")]
    Repository(anyhow::Error),

    /// The platform refused to host the background enforcement context.
    #[error("background context unavailable: {0:#}")]
    Background(anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
