use serde::Deserialize;
use validator::Validate;

/// Filters typed above the invoice form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
  #[serde(default)]
  pub client_filter: Option<String>,

  #[serde(default)]
  pub product_filter: Option<String>,

  /// Re-read the spreadsheet instead of the cached catalog
  #[serde(default)]
  pub refresh: bool,
}

/// Invoice form, posted by htmx for both the preview and the submission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InvoiceForm {
  #[validate(length(min = 1, message = "Sélectionnez un client"))]
  pub client_id: String,

  #[validate(length(min = 1, message = "Sélectionnez une prestation"))]
  pub product_id: String,

  #[validate(range(
    min = 1,
    max = 100,
    message = "La quantité doit être comprise entre 1 et 100"
  ))]
  #[serde(default = "default_quantity")]
  pub quantity: u32,

  #[validate(length(max = 1000, message = "Les notes sont limitées à 1000 caractères"))]
  #[serde(default)]
  pub notes: Option<String>,

  /// Per-unit net amount, only read for variable-amount products
  #[validate(length(max = 32, message = "Montant invalide"))]
  #[serde(default)]
  pub manual_amount: Option<String>,
}

fn default_quantity() -> u32 {
  1
}

impl InvoiceForm {
  pub fn notes(&self) -> Option<String> {
    self
      .notes
      .as_deref()
      .map(str::trim)
      .filter(|notes| !notes.is_empty())
      .map(str::to_string)
  }
}
