//! Mapping of domain errors to HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use heat_priority_ai::AiError;
use heat_priority_earthengine::EarthEngineError;
use heat_priority_index::IndexError;
use heat_priority_report::ReportError;
use heat_priority_server_models::ApiError;
use heat_priority_ward::WardError;

/// Errors surfaced by the server, at startup or while handling requests.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The request body is not what the endpoint expects.
    #[error("Malformed request: {message}")]
    BadRequest {
        /// What is wrong with the body.
        message: String,
    },

    /// The request carried no wards and no reference wards are loaded.
    #[error("No wards supplied and no reference wards loaded")]
    NoWards,

    /// Ward input could not be parsed or loaded.
    #[error(transparent)]
    Ward(#[from] WardError),

    /// Scoring failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The report could not be produced.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// The Earth Engine session could not be established.
    #[error(transparent)]
    EarthEngine(#[from] EarthEngineError),

    /// The LLM provider is misconfigured.
    #[error(transparent)]
    Ai(#[from] AiError),

    /// A blocking task was cancelled.
    #[error("Background task failed: {message}")]
    Blocking {
        /// Description of the failure.
        message: String,
    },

    /// The HTTP server failed to bind or run.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. }
            | Self::NoWards
            | Self::Ward(WardError::MalformedInput { .. } | WardError::Json(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Index(
                IndexError::UpstreamUnavailable { .. }
                | IndexError::EmptyStatistic { .. }
                | IndexError::Reduction { .. },
            )
            | Self::EarthEngine(_) => StatusCode::BAD_GATEWAY,
            Self::Ward(_)
            | Self::Index(_)
            | Self::Report(_)
            | Self::Ai(_)
            | Self::Blocking { .. }
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiError {
            error: self.to_string(),
        })
    }
}
