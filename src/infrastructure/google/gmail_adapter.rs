use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::failure_message;
use crate::domain::invoice::{AccessTokenProvider, EmailSender, InvoiceError, OutgoingEmail};

const GMAIL_API_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
  email_address: String,
}

fn mailbox(address: &str) -> Result<Mailbox, InvoiceError> {
  address
    .trim()
    .parse()
    .map_err(|e| InvoiceError::Email(format!("Invalid address {}: {}", address, e)))
}

/// Builds the message: mixed(alternative(text, html), pdf attachment).
pub(crate) fn build_message(email: &OutgoingEmail, from: &str) -> Result<Vec<u8>, InvoiceError> {
  let mut builder = Message::builder()
    .from(mailbox(from)?)
    .to(mailbox(&email.to)?)
    .subject(email.subject.clone());
  if let Some(cc) = &email.cc {
    builder = builder.cc(mailbox(cc)?);
  }

  let content_type = ContentType::parse(&email.attachment.content_type)
    .map_err(|e| InvoiceError::Email(format!("Invalid attachment type: {}", e)))?;
  let attachment = Attachment::new(email.attachment.file_name.clone())
    .body(email.attachment.bytes.clone(), content_type);

  let message = builder
    .multipart(
      MultiPart::mixed()
        .multipart(
          MultiPart::alternative()
            .singlepart(SinglePart::plain(email.text_body.clone()))
            .singlepart(SinglePart::html(email.html_body.clone())),
        )
        .singlepart(attachment),
    )
    .map_err(|e| InvoiceError::Email(format!("Cannot build message: {}", e)))?;

  Ok(message.formatted())
}

/// Gmail v1 sender; the message is built locally and posted as `raw`.
pub struct GmailAdapter {
  client: Client,
  tokens: Arc<dyn AccessTokenProvider>,
  mailbox: OnceCell<String>,
}

impl GmailAdapter {
  pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Self {
    Self {
      client: Client::new(),
      tokens,
      mailbox: OnceCell::new(),
    }
  }

  /// Address of the authenticated mailbox, used when no sender is configured.
  async fn authenticated_address(&self, access_token: &str) -> Result<String, InvoiceError> {
    self
      .mailbox
      .get_or_try_init(|| async {
        let response = self
          .client
          .get(format!("{}/profile", GMAIL_API_URL))
          .bearer_auth(access_token)
          .send()
          .await
          .map_err(|e| InvoiceError::Email(format!("Reading Gmail profile failed: {}", e)))?;

        if !response.status().is_success() {
          return Err(InvoiceError::Email(
            failure_message("Reading Gmail profile", response).await,
          ));
        }

        let profile: Profile = response
          .json()
          .await
          .map_err(|e| InvoiceError::Email(format!("Failed to parse Gmail profile: {}", e)))?;
        Ok(profile.email_address)
      })
      .await
      .cloned()
  }
}

#[async_trait]
impl EmailSender for GmailAdapter {
  async fn send(&self, email: OutgoingEmail) -> Result<(), InvoiceError> {
    let access_token = self.tokens.access_token().await?;
    let from = match &email.from {
      Some(from) => from.clone(),
      None => self.authenticated_address(&access_token).await?,
    };

    let raw = general_purpose::URL_SAFE.encode(build_message(&email, &from)?);

    let response = self
      .client
      .post(format!("{}/messages/send", GMAIL_API_URL))
      .bearer_auth(&access_token)
      .json(&json!({ "raw": raw }))
      .send()
      .await
      .map_err(|e| InvoiceError::Email(format!("Sending failed: {}", e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::Email(
        failure_message("Sending", response).await,
      ));
    }

    tracing::info!(to = %email.to, cc = ?email.cc, subject = %email.subject, "Email sent");
    Ok(())
  }
}
