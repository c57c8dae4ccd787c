use actix_web::{HttpResponse, web};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::adapters::http::errors::ApiError;
use crate::adapters::http::templates::TemplateEngine;
use crate::domain::invoice::PracticeProfile;
use crate::infrastructure::google::GoogleCredentials;

/// CSRF states issued for pending consent redirects
#[derive(Debug, Default)]
pub struct OAuthStates {
  pending: Mutex<HashSet<String>>,
}

impl OAuthStates {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn issue(&self, state: String) {
    if let Ok(mut pending) = self.pending.lock() {
      pending.insert(state);
    }
  }

  /// Single use: a state is forgotten once checked.
  pub fn consume(&self, state: &str) -> bool {
    self
      .pending
      .lock()
      .map(|mut pending| pending.remove(state))
      .unwrap_or(false)
  }
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
  #[serde(default)]
  pub code: Option<String>,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

// GET /oauth/google - Redirect to the Google consent screen
pub async fn start_authorization(
  credentials: web::Data<Arc<GoogleCredentials>>,
  states: web::Data<OAuthStates>,
) -> HttpResponse {
  let (auth_url, csrf_state) = credentials.oauth().get_authorization_url();
  states.issue(csrf_state);

  HttpResponse::Found()
    .insert_header(("Location", auth_url))
    .finish()
}

/// OAuth callback handler - receives authorization code from Google
pub async fn oauth_callback(
  query: web::Query<OAuthCallbackQuery>,
  templates: web::Data<TemplateEngine>,
  practice: web::Data<PracticeProfile>,
  credentials: web::Data<Arc<GoogleCredentials>>,
  states: web::Data<OAuthStates>,
) -> Result<HttpResponse, ApiError> {
  let outcome = match (&query.error, &query.code, &query.state) {
    (Some(error), _, _) => {
      tracing::warn!("OAuth callback received error: {}", error);
      Err(format!("Autorisation refusée : {}", error))
    }
    (None, Some(code), Some(state)) if states.consume(state) => {
      match credentials.authorize_with_code(code.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
          tracing::error!(error = %e, "Authorization code exchange failed");
          Err(e.to_string())
        }
      }
    }
    _ => Err("Paramètres de retour OAuth invalides ou expirés.".to_string()),
  };

  let mut context = tera::Context::new();
  context.insert("practice_name", &practice.name);
  context.insert("title", "Autorisation Google");
  context.insert("error", &outcome.is_err());
  match &outcome {
    Ok(()) => context.insert(
      "message",
      "Accès à Google Sheets, Drive et Gmail enregistré.",
    ),
    Err(message) => context.insert("message", message),
  }

  let html = templates
    .render("pages/message.html.tera", &context)
    .map_err(|e| ApiError::Internal(format!("Template error: {}", e)))?;

  let mut response = if outcome.is_ok() {
    HttpResponse::Ok()
  } else {
    HttpResponse::BadRequest()
  };
  Ok(response.content_type("text/html").body(html))
}
