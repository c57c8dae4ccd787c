use std::path::PathBuf;

use async_trait::async_trait;

use super::entities::InvoiceDocument;
use super::errors::InvoiceError;

/// A file stored in the cloud drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
  pub id: String,
  pub link: String,
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
  pub file_name: String,
  pub content_type: String,
  pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
  /// `None` lets the transport use the authenticated mailbox.
  pub from: Option<String>,
  pub to: String,
  pub cc: Option<String>,
  pub subject: String,
  pub html_body: String,
  pub text_body: String,
  pub attachment: EmailAttachment,
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
  pub file_name: String,
  pub path: PathBuf,
  pub bytes: Vec<u8>,
}

/// Spreadsheet holding the catalog tabs and the invoice ledger.
#[async_trait]
pub trait TabularStore: Send + Sync {
  async fn list_sheet_titles(&self) -> Result<Vec<String>, InvoiceError>;

  /// Rows of `range` (A1 notation without the sheet name), as displayed values.
  async fn read_rows(&self, sheet: &str, range: &str) -> Result<Vec<Vec<String>>, InvoiceError>;

  async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), InvoiceError>;

  /// Creates `sheet` when absent and writes `header` on its first row when that row is empty.
  async fn ensure_header(&self, sheet: &str, header: &[&str]) -> Result<(), InvoiceError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
  async fn upload(
    &self,
    bytes: Vec<u8>,
    folder_id: &str,
    file_name: &str,
  ) -> Result<StoredFile, InvoiceError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
  async fn send(&self, email: OutgoingEmail) -> Result<(), InvoiceError>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
  async fn render(&self, document: &InvoiceDocument) -> Result<RenderedDocument, InvoiceError>;

  /// HTML body of the email carrying the document.
  fn render_email_html(
    &self,
    document: &InvoiceDocument,
    document_link: &str,
  ) -> Result<String, InvoiceError>;
}

/// Source of bearer tokens for the Google REST adapters.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
  async fn access_token(&self) -> Result<String, InvoiceError>;
}
