pub mod handlers;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use crate::capability::CapabilityError;
use crate::pipeline::error::PipelineError;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
    pub hint: Option<&'static str>,
}

impl AppError {
    /// Map a pipeline failure onto its response status.
    pub fn from_pipeline(err: PipelineError) -> Self {
        AppError {
            status: err.status(),
            error: err.into(),
            hint: None,
        }
    }

    pub fn bad_request(error: anyhow::Error) -> Self {
        AppError {
            status: Status::BadRequest,
            error,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let mut body = json!({
            "error": outer_msg,
            "chain": chain,
        });
        if let Some(hint) = self.hint {
            body["hint"] = json!(hint);
        }
        let body = body.to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
            hint: None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// A decrypt failure reported by the capability usually means the key does
/// not match the artifact.
pub fn decrypt_failure(err: PipelineError) -> AppError {
    let wrong_key = matches!(err, PipelineError::Capability(CapabilityError::Execution { .. }));
    let mapped = AppError::from_pipeline(err);
    if wrong_key {
        mapped.with_hint(crate::common::WRONG_KEY_HINT)
    } else {
        mapped
    }
}
