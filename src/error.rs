use thiserror::Error;

use crate::model::PhysicalId;

/// Failures of the certificate authority collaborator.
#[derive(Error, Debug)]
pub enum AuthorityError {
    /// The certificate does not exist (or no longer exists).
    #[error("certificate not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

/// Everything that can abort a Create, Update or Delete.
///
/// None of these are retried internally; the handler turns each one into a
/// single FAILED outcome.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Updating the {0} is not allowed")]
    ImmutableFieldChanged(&'static str),

    #[error("Unexpected certificate state: {0}")]
    UnexpectedState(String),

    #[error("Timeout waiting for the certificate to be validated ({0}s)")]
    Timeout(u64),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Dns(anyhow::Error),

    /// Validation succeeded but the challenge record could not be removed.
    #[error(
        "Certificate {physical_id} is issued and validated, but removing the validation record failed: {source}"
    )]
    ChallengeCleanup {
        physical_id: PhysicalId,
        #[source]
        source: anyhow::Error,
    },
}

impl ResourceError {
    /// Identity established before the failure, if any.
    pub fn physical_id(&self) -> Option<&PhysicalId> {
        match self {
            ResourceError::ChallengeCleanup { physical_id, .. } => Some(physical_id),
            _ => None,
        }
    }
}
