use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::invoice::{Client, InvoiceError, InvoiceService, Product};

#[derive(Debug, Default, Deserialize)]
pub struct LoadCatalogCommand {
  pub client_filter: Option<String>,
  pub product_filter: Option<String>,
  /// Drops the cached catalog before reading
  #[serde(default)]
  pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct ClientOptionDto {
  pub id: String,
  pub label: String,
  pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductOptionDto {
  pub id: String,
  pub label: String,
  pub variable_amount: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadCatalogResponse {
  pub clients: Vec<ClientOptionDto>,
  pub products: Vec<ProductOptionDto>,
  pub client_warning: Option<String>,
  pub product_warning: Option<String>,
}

impl From<&Client> for ClientOptionDto {
  fn from(client: &Client) -> Self {
    Self {
      id: client.id.clone(),
      label: client.display_label(),
      email: client.email().map(str::to_string),
    }
  }
}

impl From<&Product> for ProductOptionDto {
  fn from(product: &Product) -> Self {
    Self {
      id: product.id.clone(),
      label: product.display_label(),
      variable_amount: product.variable_amount,
    }
  }
}

pub struct LoadCatalogUseCase {
  invoice_service: Arc<InvoiceService>,
}

impl LoadCatalogUseCase {
  pub fn new(invoice_service: Arc<InvoiceService>) -> Self {
    Self { invoice_service }
  }

  pub async fn execute(
    &self,
    command: LoadCatalogCommand,
  ) -> Result<LoadCatalogResponse, InvoiceError> {
    if command.refresh {
      self.invoice_service.invalidate_catalog().await;
    }
    let catalog = self.invoice_service.catalog().await?;

    let clients = catalog.filter_clients(command.client_filter.as_deref().unwrap_or(""));
    let products = catalog.filter_products(command.product_filter.as_deref().unwrap_or(""));

    Ok(LoadCatalogResponse {
      clients: clients.items.iter().map(ClientOptionDto::from).collect(),
      products: products.items.iter().map(ProductOptionDto::from).collect(),
      client_warning: clients.warning,
      product_warning: products.warning,
    })
  }
}
