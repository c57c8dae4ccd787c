use super::value_objects::ValueObjectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoiceError {
  #[error("Validation error: {0}")]
  Validation(#[from] ValueObjectError),

  #[error("Invalid submission: {0}")]
  InvalidSubmission(String),

  #[error("Client not found: {0}")]
  ClientNotFound(String),

  #[error("Product not found: {0}")]
  ProductNotFound(String),

  #[error("Spreadsheet error: {0}")]
  TabularStore(String),

  #[error("Drive upload failed: {0}")]
  FileStore(String),

  #[error("Email sending failed: {0}")]
  Email(String),

  #[error("Google credentials error: {0}")]
  Credentials(String),

  #[error("PDF generation failed: {0}")]
  PdfGenerationFailed(String),

  #[error("No invoice number left for month {month}")]
  SequenceExhausted { month: String },

  #[error("A submission is already being processed")]
  SubmissionInProgress,

  #[error("This invoice was already issued as {invoice_number}")]
  DuplicateSubmission { invoice_number: String },

  #[error("Missing configuration: {0}")]
  Configuration(String),

  #[error("Internal error: {0}")]
  Internal(String),
}

impl InvoiceError {
  /// Failures raised by a remote Google service.
  pub fn is_remote(&self) -> bool {
    matches!(
      self,
      Self::TabularStore(_) | Self::FileStore(_) | Self::Email(_) | Self::Credentials(_)
    )
  }
}
