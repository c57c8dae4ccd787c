use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::oauth_manager::{GoogleOAuthManager, OAuthTokens};
use crate::domain::invoice::{AccessTokenProvider, InvoiceError};
use crate::infrastructure::security::AesTokenEncryption;

/// Tokens are refreshed this long before Google considers them expired.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Token file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl StoredToken {
  pub fn from_tokens(tokens: OAuthTokens, now: DateTime<Utc>) -> Self {
    Self {
      access_token: tokens.access_token,
      refresh_token: tokens.refresh_token,
      expires_at: now + Duration::seconds(tokens.expires_in_seconds as i64),
    }
  }

  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    now + Duration::seconds(EXPIRY_MARGIN_SECONDS) < self.expires_at
  }
}

/// Persists the token between runs, sealed when an encryption key is configured.
pub struct TokenFile {
  path: PathBuf,
  encryption: Option<AesTokenEncryption>,
}

impl TokenFile {
  pub fn new(path: PathBuf, encryption: Option<AesTokenEncryption>) -> Self {
    Self { path, encryption }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub async fn load(&self) -> Result<Option<StoredToken>, InvoiceError> {
    let contents = match tokio::fs::read_to_string(&self.path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(InvoiceError::Credentials(format!(
          "Cannot read token file {}: {}",
          self.path.display(),
          e
        )));
      }
    };

    let json = match &self.encryption {
      Some(cipher) => cipher
        .open(&contents)
        .map_err(|e| InvoiceError::Credentials(format!("Cannot decrypt token file: {}", e)))?,
      None => contents.into_bytes(),
    };

    serde_json::from_slice(&json)
      .map(Some)
      .map_err(|e| InvoiceError::Credentials(format!("Invalid token file: {}", e)))
  }

  pub async fn save(&self, token: &StoredToken) -> Result<(), InvoiceError> {
    let json = serde_json::to_vec_pretty(token)
      .map_err(|e| InvoiceError::Internal(format!("Token serialization failed: {}", e)))?;

    let contents = match &self.encryption {
      Some(cipher) => cipher
        .seal(&json)
        .map_err(|e| InvoiceError::Credentials(format!("Cannot encrypt token: {}", e)))?
        .into_bytes(),
      None => json,
    };

    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await.map_err(|e| {
        InvoiceError::Credentials(format!("Cannot create {}: {}", parent.display(), e))
      })?;
    }
    tokio::fs::write(&self.path, contents).await.map_err(|e| {
      InvoiceError::Credentials(format!(
        "Cannot write token file {}: {}",
        self.path.display(),
        e
      ))
    })
  }
}

/// Bearer tokens for the Google adapters, refreshed from the persisted
/// refresh token.
pub struct GoogleCredentials {
  oauth: GoogleOAuthManager,
  token_file: TokenFile,
  cached: Mutex<Option<StoredToken>>,
}

impl GoogleCredentials {
  pub fn new(oauth: GoogleOAuthManager, token_file: TokenFile) -> Self {
    Self {
      oauth,
      token_file,
      cached: Mutex::new(None),
    }
  }

  pub fn oauth(&self) -> &GoogleOAuthManager {
    &self.oauth
  }

  pub async fn is_authorized(&self) -> bool {
    if self.cached.lock().await.is_some() {
      return true;
    }
    matches!(self.token_file.load().await, Ok(Some(_)))
  }

  /// Completes the consent flow and persists the resulting token.
  pub async fn authorize_with_code(&self, code: String) -> Result<(), InvoiceError> {
    let tokens = self.oauth.exchange_code(code).await?;
    let token = StoredToken::from_tokens(tokens, Utc::now());
    self.token_file.save(&token).await?;
    *self.cached.lock().await = Some(token);

    tracing::info!(token_path = %self.token_file.path().display(), "Google authorization stored");
    Ok(())
  }
}

#[async_trait]
impl AccessTokenProvider for GoogleCredentials {
  async fn access_token(&self) -> Result<String, InvoiceError> {
    let mut cached = self.cached.lock().await;

    if cached.is_none() {
      *cached = self.token_file.load().await?;
    }

    let token = cached.as_ref().ok_or_else(|| {
      InvoiceError::Credentials(format!(
        "No Google token at {}; run `facturation-cli authorize` or open /oauth/google",
        self.token_file.path().display()
      ))
    })?;

    let now = Utc::now();
    if token.is_fresh(now) {
      return Ok(token.access_token.clone());
    }

    tracing::debug!("Refreshing Google access token");
    let refreshed =
      StoredToken::from_tokens(self.oauth.refresh_token(token.refresh_token.clone()).await?, now);
    self.token_file.save(&refreshed).await?;

    let access_token = refreshed.access_token.clone();
    *cached = Some(refreshed);
    Ok(access_token)
  }
}
