use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use super::entities::{Client, Product};
use super::value_objects::Amount;

const EXEMPT_TAX_VALUES: [&str; 6] = ["0", "0%", "0.0", "0.00", "0,0", "0,00"];
const TRUTHY_VALUES: [&str; 5] = ["oui", "true", "1", "x", "yes"];

pub const CLIENT_SHEET_NAMES: [&str; 2] = ["clients", "bdd client"];
pub const PRODUCT_SHEET_NAMES: [&str; 1] = ["produits"];
pub const LEDGER_SHEET_NAME: &str = "factures";

/// Column ranges read from each tab.
pub const CLIENT_RANGE: &str = "A1:G";
pub const PRODUCT_RANGE: &str = "A1:F";
pub const LEDGER_NUMBER_RANGE: &str = "A2:A";

/// A sheet row keyed by its normalised header.
pub type Record = HashMap<String, String>;

/// Keys each data row by the first row of the table.
///
/// Header cells are trimmed and lower-cased, values trimmed, and missing
/// trailing cells read as empty strings. A table without data rows is empty.
pub fn records(rows: &[Vec<String>]) -> Vec<Record> {
  let Some((header, data)) = rows.split_first() else {
    return Vec::new();
  };
  let header: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

  data
    .iter()
    .map(|row| {
      header
        .iter()
        .enumerate()
        .map(|(i, key)| {
          let value = row.get(i).map(|v| v.trim().to_string()).unwrap_or_default();
          (key.clone(), value)
        })
        .collect()
    })
    .collect()
}

/// Picks a tab by case-insensitive name, in order of preference.
pub fn resolve_sheet_title(titles: &[String], preferred: &[&str], fallback: bool) -> Option<String> {
  let by_key: HashMap<String, &String> = titles
    .iter()
    .map(|t| (t.trim().to_lowercase(), t))
    .collect();

  preferred
    .iter()
    .find_map(|name| by_key.get(&name.trim().to_lowercase()).map(|t| (*t).clone()))
    .or_else(|| if fallback { titles.first().cloned() } else { None })
}

fn field<'a>(record: &'a Record, keys: &[&str]) -> &'a str {
  keys
    .iter()
    .find_map(|k| record.get(*k).filter(|v| !v.is_empty()))
    .map(String::as_str)
    .unwrap_or("")
}

fn is_truthy(value: &str) -> bool {
  TRUTHY_VALUES.contains(&value.trim().to_lowercase().as_str())
}

/// Settings that shape how product rows are interpreted.
#[derive(Debug, Clone, Default)]
pub struct CatalogRules {
  /// Practice-wide exemption (medical acts); every product is then tax-free.
  pub practice_tax_exempt: bool,
  pub variable_amount_product_ids: HashSet<String>,
  pub variable_amount_label_marker: Option<String>,
}

impl CatalogRules {
  fn is_variable(&self, record: &Record, id: &str, label: &str) -> bool {
    if let Some(flag) = record.get("montant_variable").filter(|v| !v.is_empty()) {
      return is_truthy(flag);
    }
    if self.variable_amount_product_ids.contains(id) {
      return true;
    }
    self
      .variable_amount_label_marker
      .as_deref()
      .map(str::trim)
      .filter(|marker| !marker.is_empty())
      .is_some_and(|marker| label.to_lowercase().contains(&marker.to_lowercase()))
  }
}

pub fn parse_client(record: &Record) -> Option<Client> {
  let id = field(record, &["id"]);
  let last_name = field(record, &["nom"]);
  if id.is_empty() || last_name.is_empty() {
    tracing::warn!(client_id = %id, "Skipping client row without id or nom");
    return None;
  }

  Some(Client {
    id: id.to_string(),
    last_name: last_name.to_string(),
    first_name: field(record, &["prenom", "prénom"]).to_string(),
    street: field(record, &["rue"]).to_string(),
    postal_code: field(record, &["code postal", "code_postal"]).to_string(),
    city: field(record, &["ville"]).to_string(),
    email: field(record, &["mail", "email"]).to_string(),
  })
}

pub fn parse_product(record: &Record, rules: &CatalogRules) -> Option<Product> {
  let id = field(record, &["id"]);
  let label = field(record, &["libelle", "libellé"]);
  if id.is_empty() || label.is_empty() {
    tracing::warn!(product_id = %id, "Skipping product row without id or libelle");
    return None;
  }

  let unit_net_raw = field(record, &["prix_ht"]).to_string();
  let unit_gross_raw = field(record, &["prix_ttc"]).to_string();
  // An absent column means no tax; an empty cell does not
  let tax_raw = match record.get("tva") {
    Some(value) => value.clone(),
    None => "0%".to_string(),
  };

  let unit_net = Amount::parse_opt(record.get("prix_ht").map(String::as_str));
  let sheet_gross = Amount::parse_opt(record.get("prix_ttc").map(String::as_str));
  let tax_exempt = rules.practice_tax_exempt || EXEMPT_TAX_VALUES.contains(&tax_raw.as_str());

  let tax_rate = if tax_exempt {
    Decimal::ZERO
  } else {
    let stated = Amount::parse(&tax_raw.replace('%', "")).value() / Decimal::ONE_HUNDRED;
    if stated.is_zero() && unit_net.is_positive() {
      sheet_gross
        .value()
        .checked_div(unit_net.value())
        .and_then(|ratio| ratio.checked_sub(Decimal::ONE))
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
    } else {
      stated
    }
  };

  Some(Product {
    id: id.to_string(),
    label: label.to_string(),
    variable_amount: rules.is_variable(record, id, label),
    unit_net_raw,
    tax_raw,
    unit_gross_raw,
    unit_net,
    unit_gross: if tax_exempt { unit_net } else { sheet_gross },
    tax_rate,
    tax_exempt,
  })
}

/// Warning surfaced when a filter matches nothing and the full list is shown.
#[derive(Debug, Clone, Serialize)]
pub struct Filtered<T> {
  pub items: Vec<T>,
  pub warning: Option<String>,
}

fn filter_by_label<T: Clone>(items: &[T], query: &str, label: impl Fn(&T) -> String, kind: &str) -> Filtered<T> {
  let needle = query.trim().to_lowercase();
  if needle.is_empty() {
    return Filtered {
      items: items.to_vec(),
      warning: None,
    };
  }

  let matching: Vec<T> = items
    .iter()
    .filter(|item| label(item).to_lowercase().contains(&needle))
    .cloned()
    .collect();

  if matching.is_empty() {
    Filtered {
      items: items.to_vec(),
      warning: Some(format!(
        "Aucun {} ne correspond à « {} », affichage de la liste complète.",
        kind,
        query.trim()
      )),
    }
  } else {
    Filtered {
      items: matching,
      warning: None,
    }
  }
}

// Catalog - clients and products read from the spreadsheet
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  pub clients: Vec<Client>,
  pub products: Vec<Product>,
}

impl Catalog {
  pub fn from_rows(client_rows: &[Vec<String>], product_rows: &[Vec<String>], rules: &CatalogRules) -> Self {
    let clients = records(client_rows).iter().filter_map(parse_client).collect();
    let products = records(product_rows)
      .iter()
      .filter_map(|r| parse_product(r, rules))
      .collect();

    Self { clients, products }
  }

  pub fn find_client(&self, id: &str) -> Option<&Client> {
    self.clients.iter().find(|c| c.id == id.trim())
  }

  pub fn find_product(&self, id: &str) -> Option<&Product> {
    self.products.iter().find(|p| p.id == id.trim())
  }

  pub fn filter_clients(&self, query: &str) -> Filtered<Client> {
    filter_by_label(&self.clients, query, Client::display_label, "client")
  }

  pub fn filter_products(&self, query: &str) -> Filtered<Product> {
    filter_by_label(&self.products, query, Product::display_label, "produit")
  }
}
