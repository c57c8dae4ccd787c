use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::invoice::{
  Amount, InvoiceError, InvoiceRequest, InvoiceService, Notes, Quantity,
};

#[derive(Debug, Deserialize)]
pub struct PreviewInvoiceCommand {
  pub client_id: String,
  pub product_id: String,
  pub quantity: u32,
  pub notes: Option<String>,
  pub manual_amount: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewInvoiceResponse {
  pub client_name: String,
  pub client_email: Option<String>,
  pub product_label: String,
  pub quantity: u32,
  pub variable_amount: bool,
  pub tax_exempt: bool,
  pub net: String,
  pub tax: String,
  pub gross: String,
}

/// Builds the domain request from raw form or command-line values.
///
/// A blank manual amount counts as absent; anything else goes through the
/// lenient money parser.
pub fn invoice_request(
  client_id: &str,
  product_id: &str,
  quantity: u32,
  notes: Option<String>,
  manual_amount: Option<&str>,
) -> Result<InvoiceRequest, InvoiceError> {
  let client_id = client_id.trim();
  let product_id = product_id.trim();
  if client_id.is_empty() {
    return Err(InvoiceError::InvalidSubmission("Client is required".to_string()));
  }
  if product_id.is_empty() {
    return Err(InvoiceError::InvalidSubmission("Product is required".to_string()));
  }

  Ok(InvoiceRequest {
    client_id: client_id.to_string(),
    product_id: product_id.to_string(),
    quantity: Quantity::new(quantity)?,
    notes: Notes::new(notes)?,
    manual_amount: manual_amount
      .map(str::trim)
      .filter(|raw| !raw.is_empty())
      .map(Amount::parse),
  })
}

pub struct PreviewInvoiceUseCase {
  invoice_service: Arc<InvoiceService>,
}

impl PreviewInvoiceUseCase {
  pub fn new(invoice_service: Arc<InvoiceService>) -> Self {
    Self { invoice_service }
  }

  pub async fn execute(
    &self,
    command: PreviewInvoiceCommand,
  ) -> Result<PreviewInvoiceResponse, InvoiceError> {
    let request = invoice_request(
      &command.client_id,
      &command.product_id,
      command.quantity,
      command.notes,
      command.manual_amount.as_deref(),
    )?;

    let preview = self.invoice_service.preview(&request).await?;

    Ok(PreviewInvoiceResponse {
      client_name: preview.client.full_name(),
      client_email: preview.client.email().map(str::to_string),
      product_label: preview.product.label.clone(),
      quantity: preview.quantity.value(),
      variable_amount: preview.product.variable_amount,
      tax_exempt: preview.product.tax_exempt,
      net: preview.totals.net.to_string(),
      tax: preview.totals.tax.to_string(),
      gross: preview.totals.gross.to_string(),
    })
  }
}
