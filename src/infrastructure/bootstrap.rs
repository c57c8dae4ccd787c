use std::sync::Arc;

use crate::domain::invoice::{AccessTokenProvider, InvoiceError, InvoiceService};
use crate::infrastructure::config::Config;
use crate::infrastructure::google::{
  ClientSecrets, GmailAdapter, GoogleCredentials, GoogleDriveAdapter, GoogleOAuthManager,
  GoogleSheetsAdapter, TokenFile,
};
use crate::infrastructure::pdf::WkHtmlToPdfRenderer;
use crate::infrastructure::security::AesTokenEncryption;

/// OAuth client and token store shared by every Google adapter.
pub async fn google_credentials(config: &Config) -> Result<Arc<GoogleCredentials>, InvoiceError> {
  let google = &config.google;

  let secrets = ClientSecrets::resolve(
    google.oauth_client_id.as_deref(),
    google.oauth_client_secret.as_deref(),
    &google.credentials_path,
  )
  .await?;
  let oauth = GoogleOAuthManager::new(secrets, config.oauth_redirect_url())?;

  let encryption = AesTokenEncryption::from_optional_key(google.token_encryption_key.as_deref())
    .map_err(|e| InvoiceError::Configuration(format!("Invalid token encryption key: {}", e)))?;
  if encryption.is_none() {
    tracing::warn!("Token encryption key not set, the Google token is stored in clear");
  }

  Ok(Arc::new(GoogleCredentials::new(
    oauth,
    TokenFile::new(google.token_path.clone(), encryption),
  )))
}

/// Wires the invoice service to the Google adapters and the PDF renderer.
///
/// `cache_catalog` is false for one-shot command-line runs.
pub fn invoice_service(
  config: &Config,
  credentials: Arc<GoogleCredentials>,
  cache_catalog: bool,
) -> Result<Arc<InvoiceService>, InvoiceError> {
  let tokens: Arc<dyn AccessTokenProvider> = credentials;

  let store = Arc::new(GoogleSheetsAdapter::new(
    tokens.clone(),
    config.google.spreadsheet_id.trim().to_string(),
  ));
  let files = Arc::new(GoogleDriveAdapter::new(tokens.clone()));
  let mailer = Arc::new(GmailAdapter::new(tokens));
  let renderer = Arc::new(WkHtmlToPdfRenderer::new(
    config.pdf.output_dir.clone(),
    config.pdf.wkhtmltopdf_path.clone(),
  )?);

  Ok(Arc::new(InvoiceService::new(
    store,
    files,
    mailer,
    renderer,
    config.invoice_settings(cache_catalog),
  )))
}
