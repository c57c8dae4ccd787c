mod credentials;
mod drive_adapter;
mod gmail_adapter;
mod oauth_manager;
mod sheets_adapter;

pub use credentials::{GoogleCredentials, StoredToken, TokenFile};
pub use drive_adapter::GoogleDriveAdapter;
pub use gmail_adapter::GmailAdapter;
pub use oauth_manager::{ClientSecrets, GOOGLE_SCOPES, GoogleOAuthManager, OAuthTokens};
pub use sheets_adapter::GoogleSheetsAdapter;

/// Turns a non-success Google API response into a readable message.
async fn failure_message(context: &str, response: reqwest::Response) -> String {
  let status = response.status();
  let body = response.text().await.unwrap_or_default();
  format!("{} failed with status {}: {}", context, status, body.trim())
}
