use actix_files::NamedFile;
use actix_web::{HttpRequest, HttpResponse, web};
use std::path::PathBuf;
use std::sync::Arc;
use validator::Validate;

use crate::adapters::http::dtos::{CatalogQuery, InvoiceForm};
use crate::adapters::http::errors::ApiError;
use crate::adapters::http::middleware::SessionIdExt;
use crate::adapters::http::templates::TemplateEngine;
use crate::application::invoice::{
  IssueInvoiceCommand, IssueInvoiceUseCase, LoadCatalogCommand, LoadCatalogUseCase,
  PreviewInvoiceCommand, PreviewInvoiceUseCase,
};
use crate::domain::invoice::{MAX_QUANTITY, PracticeProfile, StepStatus, SubmissionStep};
use crate::infrastructure::google::GoogleCredentials;

/// Directory where rendered invoices are kept
#[derive(Debug, Clone)]
pub struct DocumentDirectory(pub PathBuf);

fn render(
  templates: &TemplateEngine,
  template: &str,
  context: &tera::Context,
) -> Result<HttpResponse, ApiError> {
  let html = templates
    .render(template, context)
    .map_err(|e| ApiError::Internal(format!("Template error: {}", e)))?;

  Ok(HttpResponse::Ok().content_type("text/html").body(html))
}

fn non_blank(value: &Option<String>) -> Option<String> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
}

// GET / - Invoice form
pub async fn invoice_form_page(
  query: web::Query<CatalogQuery>,
  templates: web::Data<TemplateEngine>,
  practice: web::Data<PracticeProfile>,
  credentials: web::Data<Arc<GoogleCredentials>>,
  load_catalog_use_case: web::Data<Arc<LoadCatalogUseCase>>,
) -> Result<HttpResponse, ApiError> {
  let client_filter = non_blank(&query.client_filter);
  let product_filter = non_blank(&query.product_filter);
  let authorized = credentials.is_authorized().await;

  let mut context = tera::Context::new();
  context.insert("practice_name", &practice.name);
  context.insert("authorized", &authorized);
  context.insert("max_quantity", &MAX_QUANTITY);
  context.insert("client_filter", client_filter.as_deref().unwrap_or(""));
  context.insert("product_filter", product_filter.as_deref().unwrap_or(""));

  let catalog = if authorized {
    load_catalog_use_case
      .execute(LoadCatalogCommand {
        client_filter,
        product_filter,
        refresh: query.refresh,
      })
      .await
      .map(Some)
  } else {
    Ok(None)
  };

  match catalog {
    Ok(Some(catalog)) => {
      context.insert("clients", &catalog.clients);
      context.insert("products", &catalog.products);
      context.insert("client_warning", &catalog.client_warning);
      context.insert("product_warning", &catalog.product_warning);
    }
    Ok(None) => {
      context.insert("clients", &Vec::<()>::new());
      context.insert("products", &Vec::<()>::new());
    }
    Err(e) => {
      tracing::warn!(error = %e, "Failed to load catalog");
      context.insert("catalog_error", &e.to_string());
      context.insert("clients", &Vec::<()>::new());
      context.insert("products", &Vec::<()>::new());
    }
  }

  render(&templates, "pages/invoice_form.html.tera", &context)
}

// POST /invoices/preview - Totals for the current form state
pub async fn preview_invoice(
  form: web::Form<InvoiceForm>,
  templates: web::Data<TemplateEngine>,
  preview_use_case: web::Data<Arc<PreviewInvoiceUseCase>>,
) -> Result<HttpResponse, ApiError> {
  // Preview fires on every change; an incomplete form renders nothing.
  if form.client_id.trim().is_empty() || form.product_id.trim().is_empty() {
    return Ok(HttpResponse::Ok().content_type("text/html").body(""));
  }
  form.validate()?;

  let preview = preview_use_case
    .execute(PreviewInvoiceCommand {
      client_id: form.client_id.clone(),
      product_id: form.product_id.clone(),
      quantity: form.quantity,
      notes: form.notes(),
      manual_amount: form.manual_amount.clone(),
    })
    .await?;

  let mut context = tera::Context::new();
  context.insert("preview", &preview);

  render(&templates, "partials/preview.html.tera", &context)
}

// POST /invoices - Issue the invoice
pub async fn submit_invoice(
  req: HttpRequest,
  form: web::Form<InvoiceForm>,
  templates: web::Data<TemplateEngine>,
  issue_use_case: web::Data<Arc<IssueInvoiceUseCase>>,
) -> Result<HttpResponse, ApiError> {
  form.validate()?;

  let session_id = req
    .session_id()
    .ok_or_else(|| ApiError::Internal("Session id not set by middleware".to_string()))?;

  let response = issue_use_case
    .execute(IssueInvoiceCommand {
      session_id: session_id.to_string(),
      client_id: form.client_id.clone(),
      product_id: form.product_id.clone(),
      quantity: form.quantity,
      notes: form.notes(),
      manual_amount: form.manual_amount.clone(),
      issue_date: None,
    })
    .await?;

  let document_ready = matches!(
    response.report.status_of(SubmissionStep::Document),
    Some(StepStatus::Completed(_))
  );
  let download_url =
    document_ready.then(|| format!("/invoices/files/{}", response.document_file_name));

  let mut context = tera::Context::new();
  context.insert("result", &response);
  context.insert("download_url", &download_url);

  render(&templates, "partials/result.html.tera", &context)
}

/// Accepts bare PDF file names only.
fn is_safe_file_name(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with('.')
    && name.ends_with(".pdf")
    && !name.contains("..")
    && !name.contains(['/', '\\'])
}

// GET /invoices/files/{file_name} - Download a rendered invoice
pub async fn download_invoice(
  req: HttpRequest,
  path: web::Path<String>,
  directory: web::Data<DocumentDirectory>,
) -> Result<HttpResponse, ApiError> {
  let file_name = path.into_inner();
  if !is_safe_file_name(&file_name) {
    return Err(ApiError::Validation("Nom de fichier invalide".to_string()));
  }

  let file = NamedFile::open_async(directory.0.join(&file_name))
    .await
    .map_err(|_| ApiError::NotFound(format!("Facture introuvable : {}", file_name)))?;

  Ok(file.into_response(&req))
}
