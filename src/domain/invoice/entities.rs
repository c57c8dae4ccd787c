use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::value_objects::{Amount, InvoiceNumber, Notes, Quantity, ValueObjectError};

/// Flat tax applied to variable-amount products.
pub const VARIABLE_AMOUNT_TAX_RATE: Decimal = dec!(0.20);

/// Ledger header, in column order.
pub const LEDGER_HEADER: [&str; 13] = [
  "numero",
  "date",
  "client_id",
  "client_nom",
  "client_prenom",
  "produit_id",
  "libelle",
  "quantite",
  "montant_ht",
  "montant_tva",
  "montant_ttc",
  "lien_drive",
  "email_envoye_a",
];

// Client - snapshot of a row of the client tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
  pub id: String,
  pub last_name: String,
  pub first_name: String,
  pub street: String,
  pub postal_code: String,
  pub city: String,
  pub email: String,
}

impl Client {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
      .trim()
      .to_string()
  }

  /// Label shown in selection lists; also the text matched by the client filter.
  pub fn display_label(&self) -> String {
    format!(
      "{} {} • {} • [{}]",
      self.first_name, self.last_name, self.email, self.id
    )
  }

  pub fn email(&self) -> Option<&str> {
    let trimmed = self.email.trim();
    (!trimmed.is_empty()).then_some(trimmed)
  }

  pub fn city_line(&self) -> String {
    format!("{} {}", self.postal_code, self.city)
      .trim()
      .to_string()
  }
}

// Product - snapshot of a row of the product tab
//
// The raw strings are kept as stored in the sheet for display; the parsed
// amounts are used for arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub id: String,
  pub label: String,
  pub unit_net_raw: String,
  pub tax_raw: String,
  pub unit_gross_raw: String,
  pub unit_net: Amount,
  pub unit_gross: Amount,
  /// Decimal fraction, e.g. 0.20 for 20 %.
  pub tax_rate: Decimal,
  pub tax_exempt: bool,
  pub variable_amount: bool,
}

impl Product {
  pub fn display_label(&self) -> String {
    format!(
      "{} • HT {} • TTC {} • [{}]",
      self.label, self.unit_net, self.unit_gross, self.id
    )
  }

  /// Rate rounded to a whole percentage, e.g. `20%`.
  pub fn tax_rate_percent(&self) -> String {
    match self.tax_rate.checked_mul(Decimal::ONE_HUNDRED) {
      Some(percent) => format!("{}%", percent.round().normalize()),
      None => self.tax_raw.clone(),
    }
  }
}

// Invoice Totals - net (HT), tax (TVA) and gross (TTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
  pub net: Amount,
  pub tax: Amount,
  pub gross: Amount,
}

impl InvoiceTotals {
  /// Totals from catalog unit prices.
  ///
  /// Tax is the difference between gross and net, never a rate applied to
  /// net, so `net + tax == gross` holds exactly whatever the recorded rate.
  /// Amounts too large for exact arithmetic are rejected.
  pub fn calculate(
    unit_net: Amount,
    unit_gross: Amount,
    quantity: Quantity,
    tax_exempt: bool,
  ) -> Result<Self, ValueObjectError> {
    let net = unit_net.times(quantity)?;
    let gross = if tax_exempt {
      net
    } else {
      unit_gross.times(quantity)?
    };

    Ok(Self {
      net,
      tax: gross.checked_sub(net)?,
      gross,
    })
  }

  /// Totals from an operator-entered unit net amount with the flat 20 % tax.
  pub fn calculate_variable(
    manual_unit_net: Amount,
    quantity: Quantity,
  ) -> Result<Self, ValueObjectError> {
    let net = manual_unit_net.times(quantity)?;
    let tax = net.percent(VARIABLE_AMOUNT_TAX_RATE)?;

    Ok(Self {
      net,
      tax,
      gross: net.checked_add(tax)?,
    })
  }

  /// Variable-amount products use the manual amount (zero until entered);
  /// others ignore it.
  pub fn for_product(
    product: &Product,
    quantity: Quantity,
    manual_unit_net: Option<Amount>,
  ) -> Result<Self, ValueObjectError> {
    if product.variable_amount {
      Self::calculate_variable(manual_unit_net.unwrap_or(Amount::ZERO), quantity)
    } else {
      Self::calculate(
        product.unit_net,
        product.unit_gross,
        quantity,
        product.tax_exempt,
      )
    }
  }
}

// Practice Profile - issuer details printed on every invoice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeProfile {
  pub name: String,
  pub address: String,
  pub siret: String,
  pub tva_number: String,
  pub exemption_notice: String,
  pub sender_email: Option<String>,
  pub accountant_email: Option<String>,
}

impl PracticeProfile {
  /// Address lines; a literal `\n` in the configured value also breaks lines.
  pub fn address_lines(&self) -> Vec<String> {
    self
      .address
      .replace("\\n", "\n")
      .lines()
      .map(|line| line.trim().to_string())
      .filter(|line| !line.is_empty())
      .collect()
  }
}

// Invoice Document - everything the renderer needs for one invoice
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
  pub number: InvoiceNumber,
  pub issue_date: NaiveDate,
  pub file_name: String,
  pub practice: PracticeProfile,
  pub client: Client,
  pub product: Product,
  pub quantity: Quantity,
  pub unit_net_display: String,
  pub tax_display: String,
  pub totals: InvoiceTotals,
  pub notes: Notes,
  pub tax_exempt: bool,
}

impl InvoiceDocument {
  pub fn issue_date_display(&self) -> String {
    self.issue_date.format("%d/%m/%Y").to_string()
  }
}

// Ledger Entry - one immutable row of the invoice ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
  pub number: InvoiceNumber,
  pub issue_date: NaiveDate,
  pub client_id: String,
  pub client_last_name: String,
  pub client_first_name: String,
  pub product_id: String,
  pub product_label: String,
  pub quantity: Quantity,
  pub totals: InvoiceTotals,
  pub document_link: String,
  pub recipient_email: String,
}

impl LedgerEntry {
  pub fn to_row(&self) -> Vec<String> {
    vec![
      self.number.value().to_string(),
      self.issue_date.format("%d/%m/%Y").to_string(),
      self.client_id.clone(),
      self.client_last_name.clone(),
      self.client_first_name.clone(),
      self.product_id.clone(),
      self.product_label.clone(),
      self.quantity.to_string(),
      self.totals.net.to_ledger_string(),
      self.totals.tax.to_ledger_string(),
      self.totals.gross.to_ledger_string(),
      self.document_link.clone(),
      self.recipient_email.clone(),
    ]
  }
}
