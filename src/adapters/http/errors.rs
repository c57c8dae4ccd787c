use actix_web::{
  HttpResponse,
  error::ResponseError,
  http::{StatusCode, header::ContentType},
};
use serde::Serialize;
use std::fmt;

use crate::domain::invoice::InvoiceError;

/// HTTP error rendered as an inline HTML alert, swapped in place by htmx
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ApiError {
  /// Invalid form input (400)
  Validation(String),

  /// Unknown client, product or file (404)
  NotFound(String),

  /// Submission in progress or already issued (409)
  Conflict(String),

  /// Google services unreachable or credentials missing (502)
  Upstream(String),

  /// Configuration incomplete (503)
  Unavailable(String),

  /// Internal server error (500)
  Internal(String),
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
      ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
      ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
      ApiError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
      ApiError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
      ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
    }
  }
}

impl ApiError {
  fn user_message(&self) -> String {
    match self {
      ApiError::Validation(msg)
      | ApiError::NotFound(msg)
      | ApiError::Conflict(msg)
      | ApiError::Upstream(msg) => msg.clone(),
      ApiError::Unavailable(msg) => format!("Configuration incomplète : {}", msg),
      ApiError::Internal(msg) => {
        // Don't expose internal error details
        tracing::error!("Internal error: {}", msg);
        "Une erreur interne est survenue.".to_string()
      }
    }
  }
}

impl ResponseError for ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let html = format!(
      r#"<div class="alert alert-error" role="alert">{}</div>"#,
      tera::escape_html(&self.user_message())
    );

    HttpResponse::build(self.status_code())
      .content_type(ContentType::html())
      .body(html)
  }
}

/// Convert InvoiceError to ApiError
impl From<InvoiceError> for ApiError {
  fn from(error: InvoiceError) -> Self {
    match error {
      InvoiceError::Validation(e) => ApiError::Validation(e.to_string()),
      InvoiceError::InvalidSubmission(msg) => ApiError::Validation(msg),
      InvoiceError::ClientNotFound(_) | InvoiceError::ProductNotFound(_) => {
        ApiError::NotFound(error.to_string())
      }
      InvoiceError::SubmissionInProgress | InvoiceError::DuplicateSubmission { .. } => {
        ApiError::Conflict(error.to_string())
      }
      InvoiceError::SequenceExhausted { .. } => ApiError::Conflict(error.to_string()),
      ref remote if remote.is_remote() => {
        tracing::warn!(error = %error, "Google service error");
        ApiError::Upstream(error.to_string())
      }
      InvoiceError::Configuration(msg) => ApiError::Unavailable(msg),
      InvoiceError::PdfGenerationFailed(msg) | InvoiceError::Internal(msg) => {
        ApiError::Internal(msg)
      }
      other => ApiError::Internal(other.to_string()),
    }
  }
}

/// Convert validation errors from validator crate
impl From<validator::ValidationErrors> for ApiError {
  fn from(errors: validator::ValidationErrors) -> Self {
    let mut messages: Vec<String> = errors
      .field_errors()
      .iter()
      .flat_map(|(field, errors)| {
        errors
          .iter()
          .map(|error| {
            error
              .message
              .as_ref()
              .map(|m| m.to_string())
              .unwrap_or_else(|| format!("Invalid field: {}", field))
          })
          .collect::<Vec<_>>()
      })
      .collect();
    messages.sort();

    ApiError::Validation(messages.join(", "))
  }
}
