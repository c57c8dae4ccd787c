use actix_web::{HttpResponse, web};
use std::sync::Arc;

use crate::application::invoice::{IssueInvoiceUseCase, LoadCatalogUseCase, PreviewInvoiceUseCase};
use crate::domain::invoice::PracticeProfile;
use crate::infrastructure::google::GoogleCredentials;

use super::handlers::{DocumentDirectory, OAuthStates, invoices_web, oauth};
use super::templates::TemplateEngine;

/// Everything the web routes read from app data
pub struct WebRouteDependencies {
  pub templates: TemplateEngine,
  pub practice: PracticeProfile,
  pub credentials: Arc<GoogleCredentials>,
  pub oauth_states: web::Data<OAuthStates>,
  pub documents: DocumentDirectory,
  pub load_catalog_use_case: Arc<LoadCatalogUseCase>,
  pub preview_use_case: Arc<PreviewInvoiceUseCase>,
  pub issue_use_case: Arc<IssueInvoiceUseCase>,
}

/// Configure web routes
///
/// # Routes
///
/// - GET / - Invoice form
/// - POST /invoices/preview - Totals partial
/// - POST /invoices - Issue an invoice, returns the result partial
/// - GET /invoices/files/{file_name} - Download a rendered PDF
/// - GET /oauth/google - Start the Google consent flow
/// - GET /oauth/google/callback - Google redirect target
pub fn configure_web_routes(cfg: &mut web::ServiceConfig, deps: WebRouteDependencies) {
  cfg
    .app_data(web::Data::new(deps.templates))
    .app_data(web::Data::new(deps.practice))
    .app_data(web::Data::new(deps.credentials))
    .app_data(deps.oauth_states)
    .app_data(web::Data::new(deps.documents))
    .app_data(web::Data::new(deps.load_catalog_use_case))
    .app_data(web::Data::new(deps.preview_use_case))
    .app_data(web::Data::new(deps.issue_use_case));

  cfg.route("/", web::get().to(invoices_web::invoice_form_page));

  cfg.service(
    web::scope("/invoices")
      .route("", web::post().to(invoices_web::submit_invoice))
      .route("/preview", web::post().to(invoices_web::preview_invoice))
      .route(
        "/files/{file_name}",
        web::get().to(invoices_web::download_invoice),
      ),
  );

  cfg.service(
    web::scope("/oauth")
      .route("/google", web::get().to(oauth::start_authorization))
      .route("/google/callback", web::get().to(oauth::oauth_callback)),
  );
}

/// Liveness check
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
  cfg.route(
    "/health",
    web::get().to(|| async { HttpResponse::Ok().content_type("text/plain").body("OK") }),
  );
}
