use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::preview_invoice::invoice_request;
use super::session_guard::{SessionRegistry, SubmissionKey};
use crate::domain::invoice::{
  InvoiceError, InvoiceService, StepRecord, StepStatus, SubmissionReport,
};

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceCommand {
  pub session_id: String,
  pub client_id: String,
  pub product_id: String,
  pub quantity: u32,
  pub notes: Option<String>,
  pub manual_amount: Option<String>,
  /// Defaults to the local date.
  pub issue_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct StepOutcomeDto {
  pub label: String,
  pub status: String,
  pub detail: String,
}

impl From<&StepRecord> for StepOutcomeDto {
  fn from(record: &StepRecord) -> Self {
    let (status, detail) = match &record.status {
      StepStatus::Completed(detail) => ("completed", detail),
      StepStatus::Skipped(reason) => ("skipped", reason),
      StepStatus::Failed(message) => ("failed", message),
    };
    Self {
      label: record.step.label().to_string(),
      status: status.to_string(),
      detail: detail.clone(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct IssueInvoiceResponse {
  pub success: bool,
  pub invoice_number: String,
  pub issue_date: String,
  pub document_file_name: String,
  pub document_link: Option<String>,
  pub recipients: Vec<String>,
  pub net: String,
  pub tax: String,
  pub gross: String,
  pub steps: Vec<StepOutcomeDto>,
  #[serde(skip)]
  pub report: SubmissionReport,
}

impl From<SubmissionReport> for IssueInvoiceResponse {
  fn from(report: SubmissionReport) -> Self {
    Self {
      success: report.is_success(),
      invoice_number: report.invoice_number.to_string(),
      issue_date: report.issue_date.format("%d/%m/%Y").to_string(),
      document_file_name: report.document_file_name.clone(),
      document_link: report.document_link.clone(),
      recipients: report.recipients.clone(),
      net: report.totals.net.to_string(),
      tax: report.totals.tax.to_string(),
      gross: report.totals.gross.to_string(),
      steps: report.steps.iter().map(StepOutcomeDto::from).collect(),
      report,
    }
  }
}

pub struct IssueInvoiceUseCase {
  invoice_service: Arc<InvoiceService>,
  sessions: Arc<SessionRegistry>,
}

impl IssueInvoiceUseCase {
  pub fn new(invoice_service: Arc<InvoiceService>, sessions: Arc<SessionRegistry>) -> Self {
    Self {
      invoice_service,
      sessions,
    }
  }

  pub async fn execute(
    &self,
    command: IssueInvoiceCommand,
  ) -> Result<IssueInvoiceResponse, InvoiceError> {
    let request = invoice_request(
      &command.client_id,
      &command.product_id,
      command.quantity,
      command.notes,
      command.manual_amount.as_deref(),
    )?;

    // An unknown product is reported by the issue step itself
    let variable_amount = self
      .invoice_service
      .catalog()
      .await?
      .find_product(&request.product_id)
      .is_some_and(|product| product.variable_amount);
    let permit = self
      .sessions
      .acquire(&command.session_id, SubmissionKey::new(&request, variable_amount))?;

    let issue_date = command
      .issue_date
      .unwrap_or_else(|| Local::now().date_naive());
    let report = self.invoice_service.issue(&request, issue_date).await?;

    if report.is_success() {
      permit.complete(&report.invoice_number);
    }

    Ok(IssueInvoiceResponse::from(report))
  }
}
