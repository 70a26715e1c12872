use rocket::http::Status;
use thiserror::Error;

use crate::capability::CapabilityError;

/// Failure taxonomy for one pipeline run. Cleanup problems are not part of
/// it; they are logged and never fail a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("failed to persist the operation record")]
    Persistence(#[source] anyhow::Error),

    #[error("no record found for the given id")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    pub fn status(&self) -> Status {
        match self {
            PipelineError::Validation(_) => Status::BadRequest,
            PipelineError::NotFound => Status::NotFound,
            _ => Status::InternalServerError,
        }
    }
}
