use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::failure_message;
use crate::domain::invoice::{AccessTokenProvider, FileStore, InvoiceError, StoredFile};

const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
  id: String,
  #[serde(default)]
  web_view_link: Option<String>,
}

/// Google Drive v3 adapter using OAuth 2.0 user tokens
pub struct GoogleDriveAdapter {
  client: Client,
  tokens: Arc<dyn AccessTokenProvider>,
}

impl GoogleDriveAdapter {
  pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
    Self {
      client: Client::new(),
      tokens,
    }
  }

  fn upload_form(bytes: Vec<u8>, folder_id: &str, file_name: &str) -> Result<Form, InvoiceError> {
    let metadata = json!({
      "name": file_name,
      "parents": [folder_id],
      "mimeType": "application/pdf"
    });

    Ok(
      Form::new()
        .part(
          "metadata",
          Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| InvoiceError::FileStore(format!("MIME type error: {}", e)))?,
        )
        .part(
          "file",
          Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| InvoiceError::FileStore(format!("MIME type error: {}", e)))?,
        ),
    )
  }
}

#[async_trait]
impl FileStore for GoogleDriveAdapter {
  async fn upload(
    &self,
    bytes: Vec<u8>,
    folder_id: &str,
    file_name: &str,
  ) -> Result<StoredFile, InvoiceError> {
    let access_token = self.tokens.access_token().await?;
    let form = Self::upload_form(bytes, folder_id, file_name)?;

    let response = self
      .client
      .post(DRIVE_UPLOAD_URL)
      .bearer_auth(&access_token)
      .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
      .multipart(form)
      .send()
      .await
      .map_err(|e| InvoiceError::FileStore(format!("Upload failed: {}", e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::FileStore(
        failure_message("Upload", response).await,
      ));
    }

    let file: DriveFile = response.json().await.map_err(|e| {
      InvoiceError::FileStore(format!("Failed to parse upload response: {}", e))
    })?;

    tracing::info!(
      file_name = %file_name,
      file_id = %file.id,
      "Uploaded to Google Drive"
    );

    Ok(StoredFile {
      link: file.web_view_link.unwrap_or_default(),
      id: file.id,
    })
  }
}
