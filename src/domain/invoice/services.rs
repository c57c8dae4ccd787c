use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use super::catalog::{
  self, Catalog, CatalogRules, CLIENT_RANGE, CLIENT_SHEET_NAMES, LEDGER_NUMBER_RANGE,
  LEDGER_SHEET_NAME, PRODUCT_RANGE, PRODUCT_SHEET_NAMES,
};
use super::entities::{
  Client, InvoiceDocument, InvoiceTotals, LedgerEntry, PracticeProfile, Product, LEDGER_HEADER,
};
use super::errors::InvoiceError;
use super::ports::{
  DocumentRenderer, EmailAttachment, EmailSender, FileStore, OutgoingEmail, TabularStore,
};
use super::value_objects::{Amount, InvoiceNumber, Notes, Quantity};

const PLAIN_TEXT_BODY: &str = "Veuillez trouver votre facture en pièce jointe.";
const VARIABLE_TAX_DISPLAY: &str = "20%";
const ABORTED: &str = "aborted";

/// What the operator asked to invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
  pub client_id: String,
  pub product_id: String,
  pub quantity: Quantity,
  pub notes: Notes,
  /// Unit net amount entered for variable-amount products.
  pub manual_amount: Option<Amount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePreview {
  pub client: Client,
  pub product: Product,
  pub quantity: Quantity,
  pub totals: InvoiceTotals,
}

/// Service-level settings, resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct InvoiceSettings {
  pub spreadsheet_id: String,
  pub drive_folder_id: String,
  pub practice: PracticeProfile,
  pub rules: CatalogRules,
  /// `None` reads the catalog on every call.
  pub catalog_cache_ttl: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStep {
  Numbering,
  Document,
  Upload,
  Email,
  Ledger,
}

impl SubmissionStep {
  pub const ALL: [SubmissionStep; 5] = [
    SubmissionStep::Numbering,
    SubmissionStep::Document,
    SubmissionStep::Upload,
    SubmissionStep::Email,
    SubmissionStep::Ledger,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Self::Numbering => "Numérotation",
      Self::Document => "Génération du PDF",
      Self::Upload => "Archivage Drive",
      Self::Email => "Envoi par email",
      Self::Ledger => "Journal des factures",
    }
  }
}

impl fmt::Display for SubmissionStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
  Completed(String),
  Skipped(String),
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
  pub step: SubmissionStep,
  pub status: StepStatus,
}

/// Outcome of every pipeline step once a number has been assigned.
///
/// Completed steps are never rolled back: a failed upload leaves the local
/// document, a failed ledger append leaves a sent email.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
  pub invoice_number: InvoiceNumber,
  pub issue_date: NaiveDate,
  pub totals: InvoiceTotals,
  pub document_file_name: String,
  pub document_link: Option<String>,
  pub recipients: Vec<String>,
  pub steps: Vec<StepRecord>,
}

impl SubmissionReport {
  fn new(number: InvoiceNumber, issue_date: NaiveDate, totals: InvoiceTotals, file_name: String) -> Self {
    Self {
      steps: vec![StepRecord {
        step: SubmissionStep::Numbering,
        status: StepStatus::Completed(number.to_string()),
      }],
      invoice_number: number,
      issue_date,
      totals,
      document_file_name: file_name,
      document_link: None,
      recipients: Vec::new(),
    }
  }

  fn record(&mut self, step: SubmissionStep, status: StepStatus) {
    self.steps.push(StepRecord { step, status });
  }

  /// Records the failure of `step` and skips every later step.
  fn abort(mut self, step: SubmissionStep, error: &InvoiceError) -> Self {
    tracing::error!(
      invoice_number = %self.invoice_number,
      step = ?step,
      error = %error,
      "Invoice step failed, aborting remaining steps"
    );
    self.record(step, StepStatus::Failed(error.to_string()));
    for later in SubmissionStep::ALL.iter().skip_while(|s| **s != step).skip(1) {
      self.record(*later, StepStatus::Skipped(ABORTED.to_string()));
    }
    self
  }

  pub fn status_of(&self, step: SubmissionStep) -> Option<&StepStatus> {
    self.steps.iter().find(|r| r.step == step).map(|r| &r.status)
  }

  pub fn failed_step(&self) -> Option<&StepRecord> {
    self
      .steps
      .iter()
      .find(|r| matches!(r.status, StepStatus::Failed(_)))
  }

  pub fn is_success(&self) -> bool {
    self.failed_step().is_none()
  }
}

struct CachedCatalog {
  loaded_at: Instant,
  catalog: Arc<Catalog>,
}

pub struct InvoiceService {
  store: Arc<dyn TabularStore>,
  files: Arc<dyn FileStore>,
  mailer: Arc<dyn EmailSender>,
  renderer: Arc<dyn DocumentRenderer>,
  settings: InvoiceSettings,
  catalog_cache: RwLock<Option<CachedCatalog>>,
  // Held from reading the ledger numbers until the new row is appended
  numbering_lock: Mutex<()>,
}

impl InvoiceService {
  pub fn new(
    store: Arc<dyn TabularStore>,
    files: Arc<dyn FileStore>,
    mailer: Arc<dyn EmailSender>,
    renderer: Arc<dyn DocumentRenderer>,
    settings: InvoiceSettings,
  ) -> Self {
    Self {
      store,
      files,
      mailer,
      renderer,
      settings,
      catalog_cache: RwLock::new(None),
      numbering_lock: Mutex::new(()),
    }
  }

  pub fn settings(&self) -> &InvoiceSettings {
    &self.settings
  }

  /// Fails with the names of the blank identifiers, before any remote call.
  pub fn ensure_configured(&self) -> Result<(), InvoiceError> {
    let missing: Vec<&str> = [
      ("GOOGLE_FOLDER_ID", &self.settings.drive_folder_id),
      ("ACCOUNTING_SPREADSHEET_ID", &self.settings.spreadsheet_id),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if missing.is_empty() {
      Ok(())
    } else {
      Err(InvoiceError::Configuration(missing.join(", ")))
    }
  }

  // Catalog operations
  pub async fn catalog(&self) -> Result<Arc<Catalog>, InvoiceError> {
    self.ensure_configured()?;

    let Some(ttl) = self.settings.catalog_cache_ttl else {
      return Ok(Arc::new(self.read_catalog().await?));
    };

    if let Some(cached) = self.catalog_cache.read().await.as_ref() {
      if cached.loaded_at.elapsed() < ttl {
        return Ok(cached.catalog.clone());
      }
    }

    let catalog = Arc::new(self.read_catalog().await?);
    *self.catalog_cache.write().await = Some(CachedCatalog {
      loaded_at: Instant::now(),
      catalog: catalog.clone(),
    });
    Ok(catalog)
  }

  pub async fn invalidate_catalog(&self) {
    *self.catalog_cache.write().await = None;
  }

  async fn read_catalog(&self) -> Result<Catalog, InvoiceError> {
    let titles = self.store.list_sheet_titles().await?;
    let client_sheet = catalog::resolve_sheet_title(&titles, &CLIENT_SHEET_NAMES, true)
      .ok_or_else(|| InvoiceError::TabularStore("No client tab in spreadsheet".to_string()))?;
    let product_sheet = catalog::resolve_sheet_title(&titles, &PRODUCT_SHEET_NAMES, true)
      .ok_or_else(|| InvoiceError::TabularStore("No product tab in spreadsheet".to_string()))?;

    let client_rows = self.store.read_rows(&client_sheet, CLIENT_RANGE).await?;
    let product_rows = self.store.read_rows(&product_sheet, PRODUCT_RANGE).await?;
    let catalog = Catalog::from_rows(&client_rows, &product_rows, &self.settings.rules);

    tracing::debug!(
      client_sheet = %client_sheet,
      product_sheet = %product_sheet,
      clients = catalog.clients.len(),
      products = catalog.products.len(),
      "Catalog loaded"
    );
    Ok(catalog)
  }

  async fn resolve(&self, request: &InvoiceRequest) -> Result<(Client, Product), InvoiceError> {
    let catalog = self.catalog().await?;
    let client = catalog
      .find_client(&request.client_id)
      .cloned()
      .ok_or_else(|| InvoiceError::ClientNotFound(request.client_id.clone()))?;
    let product = catalog
      .find_product(&request.product_id)
      .cloned()
      .ok_or_else(|| InvoiceError::ProductNotFound(request.product_id.clone()))?;
    Ok((client, product))
  }

  pub async fn preview(&self, request: &InvoiceRequest) -> Result<InvoicePreview, InvoiceError> {
    self.ensure_configured()?;

    let (client, product) = self.resolve(request).await?;
    let totals = InvoiceTotals::for_product(&product, request.quantity, request.manual_amount)?;

    Ok(InvoicePreview {
      client,
      product,
      quantity: request.quantity,
      totals,
    })
  }

  // Issue pipeline
  pub async fn issue(
    &self,
    request: &InvoiceRequest,
    issue_date: NaiveDate,
  ) -> Result<SubmissionReport, InvoiceError> {
    self.ensure_configured()?;

    let (client, product) = self.resolve(request).await?;
    let manual_amount = validate_variable_amount(&product, request)?;
    let totals = InvoiceTotals::for_product(&product, request.quantity, manual_amount)?;

    let _numbering = self.numbering_lock.lock().await;

    let ledger_sheet = self.ledger_sheet().await?;
    let number = self.next_number(&ledger_sheet, issue_date).await?;
    let file_name = number.document_file_name(&client.last_name, &client.first_name);
    tracing::info!(invoice_number = %number, client_id = %client.id, product_id = %product.id, "Invoice number assigned");

    let mut report = SubmissionReport::new(number.clone(), issue_date, totals, file_name.clone());

    let document = InvoiceDocument {
      number: number.clone(),
      issue_date,
      file_name,
      practice: self.settings.practice.clone(),
      unit_net_display: match manual_amount {
        Some(amount) => amount.to_string(),
        None => product.unit_net_raw.clone(),
      },
      tax_display: if product.variable_amount {
        VARIABLE_TAX_DISPLAY.to_string()
      } else {
        product.tax_raw.clone()
      },
      tax_exempt: product.tax_exempt && !product.variable_amount,
      client,
      product,
      quantity: request.quantity,
      totals,
      notes: request.notes.clone(),
    };

    // Document
    let rendered = match self.renderer.render(&document).await {
      Ok(rendered) => rendered,
      Err(e) => return Ok(report.abort(SubmissionStep::Document, &e)),
    };
    report.record(
      SubmissionStep::Document,
      StepStatus::Completed(rendered.path.display().to_string()),
    );
    tracing::info!(invoice_number = %number, step = ?SubmissionStep::Document, "PDF generated");

    // Upload
    let stored = match self
      .files
      .upload(
        rendered.bytes.clone(),
        &self.settings.drive_folder_id,
        &rendered.file_name,
      )
      .await
    {
      Ok(stored) => stored,
      Err(e) => return Ok(report.abort(SubmissionStep::Upload, &e)),
    };
    report.document_link = Some(stored.link.clone());
    report.record(SubmissionStep::Upload, StepStatus::Completed(stored.link.clone()));
    tracing::info!(invoice_number = %number, step = ?SubmissionStep::Upload, file_id = %stored.id, "Document archived");

    // Email
    let recipient = document.client.email().map(str::to_string);
    match &recipient {
      None => {
        tracing::warn!(invoice_number = %number, client_id = %document.client.id, "Client has no email address, not sending");
        report.record(
          SubmissionStep::Email,
          StepStatus::Skipped("client has no email address".to_string()),
        );
      }
      Some(to) => {
        let email = match self.compose_email(&document, &stored.link, to, rendered.bytes) {
          Ok(email) => email,
          Err(e) => return Ok(report.abort(SubmissionStep::Email, &e)),
        };
        let mut recipients = vec![email.to.clone()];
        recipients.extend(email.cc.clone());

        if let Err(e) = self.mailer.send(email).await {
          return Ok(report.abort(SubmissionStep::Email, &e));
        }
        report.record(
          SubmissionStep::Email,
          StepStatus::Completed(recipients.join(", ")),
        );
        report.recipients = recipients;
        tracing::info!(invoice_number = %number, step = ?SubmissionStep::Email, "Invoice emailed");
      }
    }

    // Ledger
    let entry = LedgerEntry {
      number: number.clone(),
      issue_date,
      client_id: document.client.id.clone(),
      client_last_name: document.client.last_name.clone(),
      client_first_name: document.client.first_name.clone(),
      product_id: document.product.id.clone(),
      product_label: document.product.label.clone(),
      quantity: document.quantity,
      totals,
      document_link: stored.link,
      recipient_email: recipient.unwrap_or_default(),
    };
    if let Err(e) = self.store.append_row(&ledger_sheet, entry.to_row()).await {
      return Ok(report.abort(SubmissionStep::Ledger, &e));
    }
    report.record(
      SubmissionStep::Ledger,
      StepStatus::Completed(ledger_sheet.clone()),
    );
    tracing::info!(invoice_number = %number, step = ?SubmissionStep::Ledger, sheet = %ledger_sheet, "Ledger row appended");

    Ok(report)
  }

  async fn ledger_sheet(&self) -> Result<String, InvoiceError> {
    let titles = self.store.list_sheet_titles().await?;
    let sheet = catalog::resolve_sheet_title(&titles, &[LEDGER_SHEET_NAME], false)
      .unwrap_or_else(|| LEDGER_SHEET_NAME.to_string());
    self.store.ensure_header(&sheet, &LEDGER_HEADER).await?;
    Ok(sheet)
  }

  async fn next_number(
    &self,
    ledger_sheet: &str,
    issue_date: NaiveDate,
  ) -> Result<InvoiceNumber, InvoiceError> {
    let existing: Vec<String> = self
      .store
      .read_rows(ledger_sheet, LEDGER_NUMBER_RANGE)
      .await?
      .into_iter()
      .filter_map(|row| row.into_iter().next())
      .collect();

    InvoiceNumber::next_in_month(&existing, issue_date).ok_or_else(|| {
      InvoiceError::SequenceExhausted {
        month: issue_date.format("%Y%m").to_string(),
      }
    })
  }

  fn compose_email(
    &self,
    document: &InvoiceDocument,
    link: &str,
    to: &str,
    bytes: Vec<u8>,
  ) -> Result<OutgoingEmail, InvoiceError> {
    let practice = &self.settings.practice;
    let html_body = self.renderer.render_email_html(document, link)?;

    Ok(OutgoingEmail {
      from: non_empty(practice.sender_email.as_deref()),
      to: to.to_string(),
      cc: non_empty(practice.accountant_email.as_deref()),
      subject: format!("Votre facture {} - {}", document.number, practice.name),
      html_body,
      text_body: PLAIN_TEXT_BODY.to_string(),
      attachment: EmailAttachment {
        file_name: document.file_name.clone(),
        content_type: "application/pdf".to_string(),
        bytes,
      },
    })
  }
}

fn non_empty(value: Option<&str>) -> Option<String> {
  value
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_string)
}

/// Variable-amount products need a positive amount and a description.
fn validate_variable_amount(
  product: &Product,
  request: &InvoiceRequest,
) -> Result<Option<Amount>, InvoiceError> {
  if !product.variable_amount {
    return Ok(None);
  }

  let amount = request
    .manual_amount
    .filter(Amount::is_positive)
    .ok_or_else(|| {
      InvoiceError::InvalidSubmission(format!(
        "Product {} requires a positive net amount",
        product.id
      ))
    })?;

  if request.notes.is_empty() {
    return Err(InvoiceError::InvalidSubmission(format!(
      "Product {} requires notes describing the service",
      product.id
    )));
  }

  Ok(Some(amount))
}
