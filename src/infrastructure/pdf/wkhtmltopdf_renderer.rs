use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tera::{Context, Tera};
use tokio::process::Command;

use crate::domain::invoice::{
  DocumentRenderer, InvoiceDocument, InvoiceError, RenderedDocument,
};

const INVOICE_TEMPLATE: &str = "documents/invoice.html.tera";
const EMAIL_TEMPLATE: &str = "emails/invoice.html.tera";

/// Display values of one invoice, as printed.
#[derive(Debug, Serialize)]
struct InvoiceView<'a> {
  number: &'a str,
  date: String,
  practice_name: &'a str,
  practice_address: Vec<String>,
  siret: &'a str,
  tva_number: &'a str,
  exemption_notice: Option<&'a str>,
  client_name: String,
  client_street: &'a str,
  client_city: String,
  client_email: Option<&'a str>,
  label: &'a str,
  quantity: u32,
  unit_net: &'a str,
  tax: &'a str,
  total_net: String,
  total_tax: String,
  total_gross: String,
  notes: Option<&'a str>,
}

impl<'a> InvoiceView<'a> {
  fn new(document: &'a InvoiceDocument) -> Self {
    let practice = &document.practice;
    Self {
      number: document.number.value(),
      date: document.issue_date_display(),
      practice_name: &practice.name,
      practice_address: practice.address_lines(),
      siret: practice.siret.trim(),
      tva_number: practice.tva_number.trim(),
      exemption_notice: document
        .tax_exempt
        .then_some(practice.exemption_notice.trim())
        .filter(|n| !n.is_empty()),
      client_name: document.client.full_name(),
      client_street: document.client.street.trim(),
      client_city: document.client.city_line(),
      client_email: document.client.email(),
      label: &document.product.label,
      quantity: document.quantity.value(),
      unit_net: &document.unit_net_display,
      tax: &document.tax_display,
      total_net: document.totals.net.to_string(),
      total_tax: document.totals.tax.to_string(),
      total_gross: document.totals.gross.to_string(),
      notes: document.notes.value(),
    }
  }
}

/// Renders invoices to HTML with Tera and converts them with wkhtmltopdf.
pub struct WkHtmlToPdfRenderer {
  tera: Tera,
  output_dir: PathBuf,
  wkhtmltopdf_path: String,
}

impl WkHtmlToPdfRenderer {
  pub fn new(output_dir: PathBuf, wkhtmltopdf_path: Option<String>) -> Result<Self, InvoiceError> {
    let mut tera = Tera::default();
    tera
      .add_raw_templates(vec![
        (
          INVOICE_TEMPLATE,
          include_str!("../../../templates/documents/invoice.html.tera"),
        ),
        (
          EMAIL_TEMPLATE,
          include_str!("../../../templates/emails/invoice.html.tera"),
        ),
      ])
      .map_err(|e| InvoiceError::Internal(format!("Invalid document template: {}", e)))?;
    tera.autoescape_on(vec![".html.tera"]);

    Ok(Self {
      tera,
      output_dir,
      wkhtmltopdf_path: wkhtmltopdf_path.unwrap_or_else(|| "wkhtmltopdf".to_string()),
    })
  }

  pub fn render_html(&self, document: &InvoiceDocument) -> Result<String, InvoiceError> {
    let mut context = Context::new();
    context.insert("invoice", &InvoiceView::new(document));
    self
      .tera
      .render(INVOICE_TEMPLATE, &context)
      .map_err(|e| InvoiceError::PdfGenerationFailed(format!("Template rendering failed: {}", e)))
  }

  async fn convert(&self, html_path: &PathBuf, pdf_path: &PathBuf) -> Result<(), InvoiceError> {
    let output = Command::new(&self.wkhtmltopdf_path)
      .args([
        "--encoding",
        "utf-8",
        "--page-size",
        "A4",
        "--margin-top",
        "20mm",
        "--margin-bottom",
        "20mm",
        "--margin-left",
        "20mm",
        "--margin-right",
        "20mm",
        "--quiet",
      ])
      .arg(html_path)
      .arg(pdf_path)
      .output()
      .await
      .map_err(|e| {
        InvoiceError::PdfGenerationFailed(format!(
          "wkhtmltopdf not found ({}): {}. Please install wkhtmltopdf.",
          self.wkhtmltopdf_path, e
        ))
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(InvoiceError::PdfGenerationFailed(format!(
        "wkhtmltopdf failed: {}",
        stderr.trim()
      )));
    }

    Ok(())
  }
}

#[async_trait]
impl DocumentRenderer for WkHtmlToPdfRenderer {
  async fn render(&self, document: &InvoiceDocument) -> Result<RenderedDocument, InvoiceError> {
    let html = self.render_html(document)?;

    tokio::fs::create_dir_all(&self.output_dir)
      .await
      .map_err(|e| {
        InvoiceError::PdfGenerationFailed(format!(
          "Cannot create {}: {}",
          self.output_dir.display(),
          e
        ))
      })?;

    let pdf_path = self.output_dir.join(&document.file_name);
    let html_path = pdf_path.with_extension("html");
    tokio::fs::write(&html_path, html)
      .await
      .map_err(|e| InvoiceError::PdfGenerationFailed(format!("Cannot write HTML: {}", e)))?;

    tracing::info!(invoice_number = %document.number, path = %pdf_path.display(), "Generating PDF");
    self.convert(&html_path, &pdf_path).await?;

    let bytes = tokio::fs::read(&pdf_path).await.map_err(|e| {
      InvoiceError::PdfGenerationFailed(format!("PDF file was not created: {}", e))
    })?;

    Ok(RenderedDocument {
      file_name: document.file_name.clone(),
      path: pdf_path,
      bytes,
    })
  }

  fn render_email_html(
    &self,
    document: &InvoiceDocument,
    document_link: &str,
  ) -> Result<String, InvoiceError> {
    let mut context = Context::new();
    context.insert("invoice", &InvoiceView::new(document));
    context.insert("document_link", document_link);
    self
      .tera
      .render(EMAIL_TEMPLATE, &context)
      .map_err(|e| InvoiceError::Email(format!("Email template rendering failed: {}", e)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::invoice::{
    Amount, Client, InvoiceNumber, InvoiceTotals, Notes, PracticeProfile, Product, Quantity,
  };
  use chrono::NaiveDate;
  use rust_decimal_macros::dec;

  fn document(exempt: bool) -> InvoiceDocument {
    let number = InvoiceNumber::parse("FACT-202512-0004").unwrap();
    let quantity = Quantity::new(2).unwrap();
    let product = Product {
      id: "P1".to_string(),
      label: "Séance <individuelle>".to_string(),
      unit_net_raw: "60,00 €".to_string(),
      tax_raw: if exempt { "0%" } else { "20%" }.to_string(),
      unit_gross_raw: "72,00 €".to_string(),
      unit_net: Amount::new(dec!(60)),
      unit_gross: Amount::new(dec!(72)),
      tax_rate: dec!(0.2),
      tax_exempt: exempt,
      variable_amount: false,
    };
    InvoiceDocument {
      file_name: number.document_file_name("Martin", "Claire"),
      number,
      issue_date: NaiveDate::from_ymd_opt(2025, 12, 5).unwrap(),
      practice: PracticeProfile {
        name: "Cabinet Lilas".to_string(),
        address: "12 rue des Lilas\\n75011 Paris".to_string(),
        siret: "123 456 789 00012".to_string(),
        tva_number: String::new(),
        exemption_notice: "Exonération de TVA (art. 261 du CGI).".to_string(),
        ..Default::default()
      },
      client: Client {
        id: "C1".to_string(),
        last_name: "Martin".to_string(),
        first_name: "Claire".to_string(),
        street: "3 avenue Foch".to_string(),
        postal_code: "69006".to_string(),
        city: "Lyon".to_string(),
        email: "claire@example.org".to_string(),
      },
      unit_net_display: product.unit_net_raw.clone(),
      tax_display: product.tax_raw.clone(),
      totals: InvoiceTotals::for_product(&product, quantity, None).unwrap(),
      tax_exempt: exempt,
      product,
      quantity,
      notes: Notes::new(Some("Séances du 1er et 3 décembre".to_string())).unwrap(),
    }
  }

  fn renderer() -> WkHtmlToPdfRenderer {
    WkHtmlToPdfRenderer::new(PathBuf::from("/tmp/facturation-test"), None).unwrap()
  }

  #[test]
  fn test_invoice_html_contents() {
    let html = renderer().render_html(&document(false)).unwrap();

    assert!(html.contains("FACT-202512-0004"));
    assert!(html.contains("05/12/2025"));
    assert!(html.contains("SIRET : 123 456 789 00012"));
    assert!(html.contains("75011 Paris"));
    assert!(html.contains("Claire Martin"));
    assert!(html.contains("60,00 €"));
    assert!(html.contains("144,00 €"));
    assert!(html.contains("Séances du 1er et 3 décembre"));
    assert!(html.contains("Séance &lt;individuelle&gt;"));
    assert!(!html.contains("Exonération"));
    assert!(!html.contains("TVA intracom"));
  }

  #[test]
  fn test_exempt_invoice_prints_notice() {
    let html = renderer().render_html(&document(true)).unwrap();
    assert!(html.contains("Exonération de TVA (art. 261 du CGI)."));
    assert!(html.contains("120,00 €"));
  }

  #[test]
  fn test_email_body() {
    let html = renderer()
      .render_email_html(&document(false), "https://drive.google.com/file/d/1/view")
      .unwrap();
    assert!(html.contains("Bonjour Claire Martin"));
    assert!(html.contains("FACT-202512-0004"));
    assert!(html.contains("https://drive.google.com/file/d/1/view"));
    assert!(html.contains("Cabinet Lilas"));
  }

  #[tokio::test]
  async fn test_missing_binary_is_a_pdf_error() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = WkHtmlToPdfRenderer::new(
      dir.path().to_path_buf(),
      Some("/nonexistent/wkhtmltopdf".to_string()),
    )
    .unwrap();

    let result = renderer.render(&document(false)).await;
    assert!(matches!(result, Err(InvoiceError::PdfGenerationFailed(_))));
    // the HTML source is kept next to the missing PDF
    assert!(dir.path().join("FACT-202512-0004_martin_claire.html").exists());
  }
}
