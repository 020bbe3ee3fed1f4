use tracing::{error, warn};

use crate::db::DbError;
use crate::envelope::Envelope;
use crate::expenses::import::ImportError;

/// Everything a service can fail with. Services turn it into an envelope at
/// their own boundary; nothing here reaches a controller as an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Lookup miss, reported without an error payload.
    #[error("{0}")]
    NotFound(&'static str),
    /// Expected refusal (bad credentials, unverified account, unknown token).
    #[error("{0}")]
    Rejected(&'static str),
    #[error(transparent)]
    Persistence(#[from] DbError),
    #[error(transparent)]
    Stream(#[from] ImportError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Failure envelope; `failure_message` is used for unexpected errors.
    pub fn into_envelope<T>(self, failure_message: &str) -> Envelope<T> {
        match self {
            ServiceError::NotFound(message) | ServiceError::Rejected(message) => {
                warn!(reason = message, "request rejected");
                Envelope::fail(message)
            }
            other => {
                error!(error = %other, "{}", failure_message);
                Envelope::error(failure_message, other.to_string())
            }
        }
    }
}
