use thiserror::Error;

use crate::hook::HookId;
use crate::nexus::NexusId;
use crate::owner::Key;

pub type Result<T> = std::result::Result<T, SubmitError>;

/// Errors surfaced by submissions, fusions, and hook operations.
///
/// Every error raised before the commit phase leaves the data model exactly
/// as it was before the call.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("conflicting candidates for fused hooks in {nexus}: {message}")]
    ValueConflict { nexus: NexusId, message: String },

    #[error("{hook} rejected the candidate: {message}")]
    IsolatedValidation { hook: HookId, message: String },

    #[error("owner '{owner}' rejected the proposed snapshot: {message}")]
    OwnerValidation { owner: String, message: String },

    #[error("completion by owner '{owner}' failed: {message}")]
    CompletionFailure { owner: String, message: String },

    #[error("fusion rejected")]
    FusionRejected {
        #[source]
        source: Box<SubmitError>,
    },

    #[error("nested submission from a notification callback")]
    NestedSubmission,

    #[error("{hook} has been released")]
    DeadHook { hook: HookId },

    #[error("candidate type {candidate} does not match stored type {stored}")]
    TypeMismatch {
        stored: &'static str,
        candidate: &'static str,
    },

    #[error("hooks belong to different nexus managers")]
    ManagerMismatch,

    #[error("owner exposes no hook under key '{key}'")]
    UnknownKey { key: Key },
}

impl SubmitError {
    #[must_use]
    pub fn fusion(source: SubmitError) -> Self {
        Self::FusionRejected {
            source: Box::new(source),
        }
    }

    /// The validation failure a rejected fusion wraps, if this is one.
    #[must_use]
    pub fn fusion_cause(&self) -> Option<&SubmitError> {
        match self {
            Self::FusionRejected { source } => Some(source),
            _ => None,
        }
    }
}
