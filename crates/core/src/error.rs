use thiserror::Error;

/// Exhaustive error surface for the Milton control plane.
///
/// Internal plumbing inside each component crate uses `anyhow::Result`;
/// `MiltonError` is reserved for the public boundary of a component where
/// callers need to match on a specific kind (HTTP status mapping, CLI exit
/// codes, selector/deploy gating).
#[derive(Debug, Error)]
pub enum MiltonError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("inference backend unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("inference call timed out after {0}ms")]
    InferenceTimeout(u64),

    #[error("memory store unavailable: {0}")]
    MemoryStoreUnavailable(String),

    #[error("intent ambiguous: {0}")]
    IntentAmbiguous(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("load test failed: {0}")]
    LoadTestFailed(String),

    #[error("bundle malformed: {0}")]
    BundleMalformed(String),

    #[error("registry conflict: {0}")]
    RegistryConflict(String),

    #[error("candidate {version} rejected by threshold gate: {reason}")]
    ThresholdRejected { version: String, reason: String },

    #[error("no candidate survived selection")]
    NoCandidate,

    #[error("deployment target already exists: {0}")]
    DeploymentExists(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("cancelled by client")]
    CancelledByClient,

    #[error("internal error: {0}")]
    InternalError(String),
}

/// CLI process exit codes for `deploy-best-model`/`rollback`.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_FAILURE: i32 = 2;
    pub const IO_ERROR: i32 = 3;
    pub const NO_CANDIDATE: i32 = 4;
}

impl MiltonError {
    /// Map this error to the CLI exit code it corresponds to.
    pub fn exit_code(&self) -> i32 {
        match self {
            MiltonError::ThresholdRejected { .. }
            | MiltonError::ChecksumMismatch { .. }
            | MiltonError::LoadTestFailed(_)
            | MiltonError::ValidationError(_) => exit_code::VALIDATION_FAILURE,
            MiltonError::IoError(_) | MiltonError::BundleMalformed(_) => exit_code::IO_ERROR,
            MiltonError::NoCandidate => exit_code::NO_CANDIDATE,
            _ => exit_code::IO_ERROR,
        }
    }
}
