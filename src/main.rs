use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use facturation::{
  adapters::http::{
    DocumentDirectory, OAuthStates, SessionIdMiddleware, TemplateEngine, WebRouteDependencies,
    configure_health_routes, configure_web_routes,
  },
  application::invoice::{
    IssueInvoiceUseCase, LoadCatalogUseCase, PreviewInvoiceUseCase, SessionRegistry,
  },
  infrastructure::{bootstrap, config::Config},
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  // Initialize environment variables from .env file
  dotenvy::dotenv().ok();

  // Initialize tracing subscriber for logging
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "facturation=debug,actix_web=info".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  tracing::info!("Starting Facturation");

  // Load configuration
  let config = Config::load().context("Failed to load configuration")?;
  if let Err(e) = config.validate() {
    // The form stays reachable so the Google authorization can still be granted.
    tracing::warn!("{}; invoices cannot be issued until it is set", e);
  }
  tracing::info!("Configuration loaded successfully");

  // Google credentials and adapters
  let credentials = bootstrap::google_credentials(&config)
    .await
    .context("Failed to initialize Google credentials")?;
  if !credentials.is_authorized().await {
    tracing::warn!(
      "No Google token found; open {}/oauth/google to authorize",
      config.server.base_url.trim_end_matches('/')
    );
  }

  let invoice_service = bootstrap::invoice_service(&config, credentials.clone(), true)
    .context("Failed to initialize invoice service")?;

  // Initialize invoice use cases
  let sessions = Arc::new(SessionRegistry::new());
  let load_catalog_use_case = Arc::new(LoadCatalogUseCase::new(invoice_service.clone()));
  let preview_use_case = Arc::new(PreviewInvoiceUseCase::new(invoice_service.clone()));
  let issue_use_case = Arc::new(IssueInvoiceUseCase::new(invoice_service.clone(), sessions));

  // Initialize template engine
  let templates = TemplateEngine::new().context("Failed to initialize template engine")?;
  tracing::info!("Template engine initialized");

  let oauth_states = web::Data::new(OAuthStates::new());
  let practice = config.practice_profile();
  let documents = DocumentDirectory(config.pdf.output_dir.clone());

  let server_host = config.server.host.clone();
  let server_port = config.server.port;
  tracing::info!("Starting HTTP server on {}:{}", server_host, server_port);

  // Create and start the HTTP server
  HttpServer::new(move || {
    App::new()
      .wrap(SessionIdMiddleware::new())
      // Add logging middleware
      .wrap(Logger::default())
      .configure(configure_health_routes)
      .configure(|cfg| {
        configure_web_routes(
          cfg,
          WebRouteDependencies {
            templates: templates.clone(),
            practice: practice.clone(),
            credentials: credentials.clone(),
            oauth_states: oauth_states.clone(),
            documents: documents.clone(),
            load_catalog_use_case: load_catalog_use_case.clone(),
            preview_use_case: preview_use_case.clone(),
            issue_use_case: issue_use_case.clone(),
          },
        )
      })
  })
  .bind((server_host.as_str(), server_port))
  .with_context(|| format!("Failed to bind {}:{}", server_host, server_port))?
  .run()
  .await?;

  Ok(())
}
