use oauth2::reqwest::async_http_client;
use oauth2::{
  AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken, Scope,
  TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::Deserialize;
use std::path::Path;

use crate::domain::invoice::InvoiceError;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Sheets (catalog + ledger), Drive (files created by this app), Gmail (send only).
pub const GOOGLE_SCOPES: [&str; 3] = [
  "https://www.googleapis.com/auth/spreadsheets",
  "https://www.googleapis.com/auth/drive.file",
  "https://www.googleapis.com/auth/gmail.send",
];

/// OAuth tokens returned from Google
#[derive(Debug, Clone)]
pub struct OAuthTokens {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_in_seconds: u64,
}

/// OAuth client as downloaded from Google Cloud Console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
  pub client_id: String,
  pub client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretsSection {
  client_id: String,
  client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
  installed: Option<ClientSecretsSection>,
  web: Option<ClientSecretsSection>,
}

impl ClientSecrets {
  /// Parses a `credentials.json` file (`installed` or `web` client).
  pub fn from_json(json: &str) -> Result<Self, InvoiceError> {
    let file: ClientSecretsFile = serde_json::from_str(json)
      .map_err(|e| InvoiceError::Credentials(format!("Invalid client secrets file: {}", e)))?;

    file
      .installed
      .or(file.web)
      .map(|section| Self {
        client_id: section.client_id,
        client_secret: section.client_secret,
      })
      .ok_or_else(|| {
        InvoiceError::Credentials("Client secrets file has no installed or web client".to_string())
      })
  }

  pub async fn from_file(path: &Path) -> Result<Self, InvoiceError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
      InvoiceError::Credentials(format!("Cannot read {}: {}", path.display(), e))
    })?;
    Self::from_json(&json)
  }

  /// Configured id/secret pair, or the client secrets file.
  pub async fn resolve(
    client_id: Option<&str>,
    client_secret: Option<&str>,
    credentials_path: &Path,
  ) -> Result<Self, InvoiceError> {
    match (client_id, client_secret) {
      (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => Ok(Self {
        client_id: id.trim().to_string(),
        client_secret: secret.trim().to_string(),
      }),
      _ => Self::from_file(credentials_path).await,
    }
  }
}

/// Google OAuth 2.0 manager for Sheets, Drive and Gmail access
pub struct GoogleOAuthManager {
  client: BasicClient,
}

impl GoogleOAuthManager {
  /// Create a new OAuth manager
  ///
  /// # Arguments
  /// * `secrets` - OAuth client from Google Cloud Console
  /// * `redirect_url` - Redirect URL (must match Google Cloud Console settings)
  pub fn new(secrets: ClientSecrets, redirect_url: String) -> Result<Self, InvoiceError> {
    let client = BasicClient::new(
      ClientId::new(secrets.client_id),
      Some(ClientSecret::new(secrets.client_secret)),
      AuthUrl::new(AUTH_URL.to_string())
        .map_err(|e| InvoiceError::Credentials(format!("Invalid auth URL: {}", e)))?,
      Some(
        TokenUrl::new(TOKEN_URL.to_string())
          .map_err(|e| InvoiceError::Credentials(format!("Invalid token URL: {}", e)))?,
      ),
    )
    .set_redirect_uri(
      RedirectUrl::new(redirect_url)
        .map_err(|e| InvoiceError::Credentials(format!("Invalid redirect URL: {}", e)))?,
    );

    Ok(Self { client })
  }

  /// Generate authorization URL for user consent
  ///
  /// Returns (authorization_url, csrf_state_token)
  pub fn get_authorization_url(&self) -> (String, String) {
    let csrf_token = uuid::Uuid::new_v4().to_string();
    let csrf_token_obj = CsrfToken::new(csrf_token.clone());

    let (auth_url, _) = self
      .client
      .authorize_url(|| csrf_token_obj.clone())
      .add_scopes(GOOGLE_SCOPES.iter().map(|s| Scope::new(s.to_string())))
      // Offline access so a refresh token is issued
      .add_extra_param("access_type", "offline")
      .add_extra_param("prompt", "consent")
      .url();

    (auth_url.to_string(), csrf_token)
  }

  /// Exchange authorization code for tokens
  pub async fn exchange_code(&self, code: String) -> Result<OAuthTokens, InvoiceError> {
    let token_response = self
      .client
      .exchange_code(AuthorizationCode::new(code.trim().to_string()))
      .request_async(async_http_client)
      .await
      .map_err(|e| InvoiceError::Credentials(format!("Token exchange failed: {}", e)))?;

    let refresh_token = token_response.refresh_token().ok_or_else(|| {
      InvoiceError::Credentials("No refresh token received from Google".to_string())
    })?;

    Ok(OAuthTokens {
      access_token: token_response.access_token().secret().clone(),
      refresh_token: refresh_token.secret().clone(),
      expires_in_seconds: token_response
        .expires_in()
        .map(|d| d.as_secs())
        .unwrap_or(3600),
    })
  }

  /// Refresh access token using refresh token
  pub async fn refresh_token(&self, refresh_token: String) -> Result<OAuthTokens, InvoiceError> {
    let token_response = self
      .client
      .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
      .request_async(async_http_client)
      .await
      .map_err(|e| InvoiceError::Credentials(format!("Token refresh failed: {}", e)))?;

    Ok(OAuthTokens {
      access_token: token_response.access_token().secret().clone(),
      // Google does not always return a new refresh token
      refresh_token: token_response
        .refresh_token()
        .map(|t| t.secret().clone())
        .unwrap_or(refresh_token),
      expires_in_seconds: token_response
        .expires_in()
        .map(|d| d.as_secs())
        .unwrap_or(3600),
    })
  }
}
