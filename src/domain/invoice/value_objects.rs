use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
  static ref INTEGER_PATTERN: Regex = Regex::new(r"^[+-]?\d+$").expect("valid integer regex");
  static ref INVOICE_NUMBER_PATTERN: Regex =
    Regex::new(r"^FACT-(\d{6})-(\d{4})$").expect("valid invoice number regex");
  static ref SLUG_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").expect("valid slug regex");
}

const CURRENCY_SYMBOLS: &[char] = &['€', '$', '£', '¥', '₣', '₤', '₹', '¢', '₽', '₺', '₩', '₪'];
const QUOTE_MARKS: &[char] = &['\'', '’', '‘', '´', '`', '′'];

pub const MAX_QUANTITY: u32 = 100;
pub const MAX_MONTHLY_SEQUENCE: u32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueObjectError {
  #[error("Invalid quantity: {0}")]
  InvalidQuantity(String),
  #[error("Invalid amount: {0}")]
  InvalidAmount(String),
  #[error("Invalid invoice number: {0}")]
  InvalidInvoiceNumber(String),
  #[error("Invalid notes: {0}")]
  InvalidNotes(String),
}

// Amount - exact monetary value in euros
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
  pub const ZERO: Amount = Amount(Decimal::ZERO);

  pub fn new(value: Decimal) -> Self {
    Self(value)
  }

  /// Parses a human-entered or spreadsheet-stored currency string.
  ///
  /// Accepts French (`1 234,56 €`), US (`1,234.56`) and Swiss (`1'234.56`)
  /// conventions. The separator found at the rightmost position is the decimal
  /// separator whenever both kinds are present. Empty or malformed input yields
  /// zero; this function never fails.
  pub fn parse(raw: &str) -> Self {
    let normalized: String = raw.nfkc().collect();

    let cleaned: String = normalized
      .chars()
      .filter(|c| !CURRENCY_SYMBOLS.contains(c) && !QUOTE_MARKS.contains(c) && !c.is_whitespace())
      .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '+' | '-'))
      .collect();

    Self(decimal_from_cleaned(&cleaned).unwrap_or(Decimal::ZERO))
  }

  pub fn value(&self) -> Decimal {
    self.0
  }

  pub fn is_zero(&self) -> bool {
    self.0.is_zero()
  }

  pub fn is_positive(&self) -> bool {
    self.0 > Decimal::ZERO
  }

  /// Parses a cell or field that may be absent; `None` yields zero.
  pub fn parse_opt(raw: Option<&str>) -> Self {
    raw.map_or(Self::ZERO, Self::parse)
  }

  pub fn times(&self, quantity: Quantity) -> Result<Amount, ValueObjectError> {
    self
      .0
      .checked_mul(Decimal::from(quantity.value()))
      .map(Amount)
      .ok_or_else(|| out_of_range(self))
  }

  pub fn percent(&self, rate: Decimal) -> Result<Amount, ValueObjectError> {
    self
      .0
      .checked_mul(rate)
      .map(|value| Amount(value).rounded())
      .ok_or_else(|| out_of_range(self))
  }

  pub fn checked_add(self, rhs: Amount) -> Result<Amount, ValueObjectError> {
    self
      .0
      .checked_add(rhs.0)
      .map(Amount)
      .ok_or_else(|| out_of_range(&self))
  }

  pub fn checked_sub(self, rhs: Amount) -> Result<Amount, ValueObjectError> {
    self
      .0
      .checked_sub(rhs.0)
      .map(Amount)
      .ok_or_else(|| out_of_range(&self))
  }

  /// Two-decimal rounding, half away from zero.
  pub fn rounded(&self) -> Amount {
    Amount(
      self
        .0
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    )
  }

  /// Ledger representation: `1234.50`.
  pub fn to_ledger_string(&self) -> String {
    format!("{:.2}", self.rounded().0)
  }

  /// French accounting representation without the currency suffix: `1 234,50`.
  pub fn to_grouped_string(&self) -> String {
    let rounded = self.rounded().0;
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let digits = int_part.len();
    let mut grouped = String::with_capacity(digits + digits / 3 + 4);
    for (i, ch) in int_part.chars().enumerate() {
      if i > 0 && (digits - i) % 3 == 0 {
        grouped.push(' ');
      }
      grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
      "-"
    } else {
      ""
    };
    format!("{}{},{}", sign, grouped, frac_part)
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} €", self.to_grouped_string())
  }
}

impl From<Decimal> for Amount {
  fn from(value: Decimal) -> Self {
    Amount(value)
  }
}

fn out_of_range(amount: &Amount) -> ValueObjectError {
  ValueObjectError::InvalidAmount(format!("{} is too large to invoice", amount.value()))
}

fn decimal_from_cleaned(cleaned: &str) -> Option<Decimal> {
  if INTEGER_PATTERN.is_match(cleaned) {
    return decimal_from_plain(cleaned);
  }

  let commas = cleaned.matches(',').count();
  let periods = cleaned.matches('.').count();

  let canonical = if commas == 1 && periods == 0 {
    cleaned.replace(',', ".")
  } else if periods == 1 && commas == 0 {
    cleaned.to_string()
  } else if cleaned.rfind('.') > cleaned.rfind(',') {
    cleaned.replace(',', "")
  } else {
    cleaned.replace('.', "").replace(',', ".")
  };

  decimal_from_plain(&canonical)
}

/// Accepts `[+-]digits[.digits]` (either side of the point may be empty, not both).
fn decimal_from_plain(text: &str) -> Option<Decimal> {
  let (negative, body) = match text.as_bytes().first() {
    Some(b'-') => (true, &text[1..]),
    Some(b'+') => (false, &text[1..]),
    _ => (false, text),
  };

  if body.matches('.').count() > 1
    || !body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
    || !body.bytes().any(|b| b.is_ascii_digit())
  {
    return None;
  }

  let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
  let int_part = if int_part.is_empty() { "0" } else { int_part };
  let literal = if frac_part.is_empty() {
    int_part.to_string()
  } else {
    format!("{}.{}", int_part, frac_part)
  };

  let value = Decimal::from_str(&literal).ok()?;
  Some(if negative { -value } else { value })
}

// Quantity - whole units, 1 to 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
  pub fn new(value: u32) -> Result<Self, ValueObjectError> {
    if value == 0 {
      return Err(ValueObjectError::InvalidQuantity(
        "Quantity must be at least 1".to_string(),
      ));
    }
    if value > MAX_QUANTITY {
      return Err(ValueObjectError::InvalidQuantity(format!(
        "Quantity cannot exceed {}",
        MAX_QUANTITY
      )));
    }
    Ok(Self(value))
  }

  pub fn value(&self) -> u32 {
    self.0
  }
}

impl fmt::Display for Quantity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// Invoice Number - FACT-YYYYMM-NNNN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
  /// Month prefix including the trailing dash, e.g. `FACT-202512-`.
  pub fn month_prefix(date: NaiveDate) -> String {
    format!("FACT-{:04}{:02}-", date.year(), date.month())
  }

  /// Next number in the month of `today`, given every number already issued.
  ///
  /// Entries from other months, with another prefix or with a suffix that is
  /// not exactly four digits are ignored. Returns `None` once the month has
  /// used all 9999 sequence values.
  pub fn next_in_month<S: AsRef<str>>(existing: &[S], today: NaiveDate) -> Option<Self> {
    let month = format!("{:04}{:02}", today.year(), today.month());

    let highest = existing
      .iter()
      .filter_map(|number| {
        let captures = INVOICE_NUMBER_PATTERN.captures(number.as_ref().trim())?;
        if &captures[1] != month {
          return None;
        }
        captures[2].parse::<u32>().ok()
      })
      .max();

    let next = highest.map_or(1, |n| n + 1);
    if next > MAX_MONTHLY_SEQUENCE {
      return None;
    }

    Some(Self(format!("{}{:04}", Self::month_prefix(today), next)))
  }

  pub fn parse(value: &str) -> Result<Self, ValueObjectError> {
    let trimmed = value.trim();
    if !INVOICE_NUMBER_PATTERN.is_match(trimmed) {
      return Err(ValueObjectError::InvalidInvoiceNumber(format!(
        "'{}' does not match FACT-YYYYMM-NNNN",
        trimmed
      )));
    }
    Ok(Self(trimmed.to_string()))
  }

  /// `{number}_{slug(last_name)}_{slug(first_name)}.pdf`
  pub fn document_file_name(&self, last_name: &str, first_name: &str) -> String {
    format!("{}_{}_{}.pdf", self.0, slugify(last_name), slugify(first_name))
  }

  pub fn value(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for InvoiceNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Lower-cases, collapses every run of characters outside `[a-z0-9]` into a
/// single underscore and trims underscores at both ends.
pub fn slugify(value: &str) -> String {
  let lowered = value.trim().to_lowercase();
  SLUG_SEPARATORS
    .replace_all(&lowered, "_")
    .trim_matches('_')
    .to_string()
}

// Notes - free text printed on the invoice
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notes(Option<String>);

impl Notes {
  pub const MAX_LEN: usize = 1000;

  pub fn new(value: Option<String>) -> Result<Self, ValueObjectError> {
    let trimmed = value
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty());

    if let Some(text) = &trimmed {
      if text.chars().count() > Self::MAX_LEN {
        return Err(ValueObjectError::InvalidNotes(format!(
          "Notes cannot exceed {} characters",
          Self::MAX_LEN
        )));
      }
    }
    Ok(Self(trimmed))
  }

  pub fn value(&self) -> Option<&str> {
    self.0.as_deref()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_parse_locale_variants() {
    assert_eq!(Amount::parse("1 234,56 €").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1234.56").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1'234.56").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1’234.56").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1.234,56").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1,234.56").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1\u{a0}234,56\u{a0}€").value(), dec!(1234.56));
    assert_eq!(Amount::parse("1\u{202f}234,56 €").value(), dec!(1234.56));
    assert_eq!(Amount::parse("CHF 1'234.50").value(), dec!(1234.50));
  }

  #[test]
  fn test_parse_empty_and_missing() {
    assert_eq!(Amount::parse(""), Amount::ZERO);
    assert_eq!(Amount::parse_opt(None), Amount::ZERO);
    assert_eq!(Amount::parse_opt(Some("12,50")).value(), dec!(12.50));
  }

  #[test]
  fn test_parse_integers_and_signs() {
    assert_eq!(Amount::parse("80").value(), dec!(80));
    assert_eq!(Amount::parse("-15").value(), dec!(-15));
    assert_eq!(Amount::parse("+42 €").value(), dec!(42));
    assert_eq!(Amount::parse("20%").value(), dec!(20));
    assert_eq!(Amount::parse("-1 234,50 €").value(), dec!(-1234.50));
  }

  #[test]
  fn test_parse_multiple_separators_of_one_kind() {
    // the rightmost separator wins; the other kind is dropped
    assert_eq!(Amount::parse("1,234,567.89").value(), dec!(1234567.89));
    assert_eq!(Amount::parse("1.234.567,89").value(), dec!(1234567.89));
    // a lone group separator kind with no decimal part cannot be disambiguated
    assert_eq!(Amount::parse("1,234,567"), Amount::ZERO);
  }

  #[test]
  fn test_parse_malformed_degrades_to_zero() {
    assert_eq!(Amount::parse("abc"), Amount::ZERO);
    assert_eq!(Amount::parse("1.234.567"), Amount::ZERO);
    assert_eq!(Amount::parse("+-"), Amount::ZERO);
    assert_eq!(Amount::parse("12-5"), Amount::ZERO);
    assert_eq!(Amount::parse("€"), Amount::ZERO);
  }

  #[test]
  fn test_parse_partial_decimals() {
    assert_eq!(Amount::parse(",5").value(), dec!(0.5));
    assert_eq!(Amount::parse("12.").value(), dec!(12));
  }

  #[test]
  fn test_format_french_convention() {
    assert_eq!(Amount::new(dec!(1234.5)).to_string(), "1 234,50 €");
    assert_eq!(Amount::new(dec!(0)).to_string(), "0,00 €");
    assert_eq!(Amount::new(dec!(999.999)).to_string(), "1 000,00 €");
    assert_eq!(Amount::new(dec!(1234567.891)).to_string(), "1 234 567,89 €");
    assert_eq!(Amount::new(dec!(-1234.5)).to_string(), "-1 234,50 €");
    assert_eq!(Amount::new(dec!(-0.001)).to_string(), "0,00 €");
  }

  #[test]
  fn test_format_rounds_half_away_from_zero() {
    assert_eq!(Amount::new(dec!(0.125)).to_string(), "0,13 €");
    assert_eq!(Amount::new(dec!(0.135)).to_string(), "0,14 €");
    assert_eq!(Amount::new(dec!(2.005)).to_ledger_string(), "2.01");
  }

  #[test]
  fn test_parse_recovers_formatted_value() {
    for value in [
      dec!(0),
      dec!(0.01),
      dec!(7.5),
      dec!(80),
      dec!(999.99),
      dec!(1234.56),
      dec!(1000000),
      dec!(98765432.1),
    ] {
      let amount = Amount::new(value);
      assert_eq!(Amount::parse(&amount.to_string()), amount.rounded());
    }
  }

  #[test]
  fn test_arithmetic_overflow_is_an_error() {
    let huge = Amount::parse("79228162514264337593543950335");
    assert_eq!(huge.value(), Decimal::MAX);

    let two = Quantity::new(2).unwrap();
    assert!(matches!(huge.times(two), Err(ValueObjectError::InvalidAmount(_))));
    assert!(huge.checked_add(Amount::new(dec!(1))).is_err());
    assert!(Amount::new(Decimal::MIN).checked_sub(Amount::new(dec!(1))).is_err());
    assert!(huge.percent(dec!(1.5)).is_err());

    assert_eq!(Amount::new(dec!(40)).times(two).unwrap().value(), dec!(80));
    assert_eq!(
      Amount::new(dec!(40)).checked_sub(Amount::new(dec!(0.5))).unwrap().value(),
      dec!(39.5)
    );
  }

  #[test]
  fn test_ledger_string() {
    assert_eq!(Amount::new(dec!(300)).to_ledger_string(), "300.00");
    assert_eq!(Amount::new(dec!(60.5)).to_ledger_string(), "60.50");
  }

  #[test]
  fn test_quantity_bounds() {
    assert!(Quantity::new(1).is_ok());
    assert!(Quantity::new(100).is_ok());
    assert!(Quantity::new(0).is_err());
    assert!(Quantity::new(101).is_err());
  }

  #[test]
  fn test_next_invoice_number_empty_month() {
    let existing: Vec<String> = Vec::new();
    let next = InvoiceNumber::next_in_month(&existing, date(2025, 12, 1)).unwrap();
    assert_eq!(next.value(), "FACT-202512-0001");
  }

  #[test]
  fn test_next_invoice_number_ignores_other_months() {
    let existing = ["FACT-202512-0001", "FACT-202512-0003", "FACT-202511-0099"];
    let next = InvoiceNumber::next_in_month(&existing, date(2025, 12, 15)).unwrap();
    assert_eq!(next.value(), "FACT-202512-0004");
  }

  #[test]
  fn test_next_invoice_number_ignores_malformed_entries() {
    let existing = [
      "FACT-202512-12",
      "FACT-202512-00012",
      "FACTURE-202512-0042",
      "fact-202512-0050",
      "FACT-202512-0002",
      "",
      "numero",
    ];
    let next = InvoiceNumber::next_in_month(&existing, date(2025, 12, 20)).unwrap();
    assert_eq!(next.value(), "FACT-202512-0003");
  }

  #[test]
  fn test_next_invoice_number_exhausted_month() {
    let existing = ["FACT-202501-9999"];
    assert!(InvoiceNumber::next_in_month(&existing, date(2025, 1, 31)).is_none());
    let february = InvoiceNumber::next_in_month(&existing, date(2025, 2, 1)).unwrap();
    assert_eq!(february.value(), "FACT-202502-0001");
  }

  #[test]
  fn test_document_file_name() {
    let number = InvoiceNumber::parse("FACT-202512-0004").unwrap();
    assert_eq!(
      number.document_file_name("Le Gall", "Jean-Pierre"),
      "FACT-202512-0004_le_gall_jean_pierre.pdf"
    );
    assert_eq!(
      number.document_file_name("  Dupont!! ", "Éric"),
      "FACT-202512-0004_dupont_ric.pdf"
    );
  }

  #[test]
  fn test_slugify() {
    assert_eq!(slugify("__Hello   World__"), "hello_world");
    assert_eq!(slugify(""), "");
    assert_eq!(slugify("***"), "");
  }

  #[test]
  fn test_notes() {
    assert!(Notes::new(None).unwrap().is_empty());
    assert!(Notes::new(Some("   ".to_string())).unwrap().is_empty());
    assert_eq!(
      Notes::new(Some(" Séance du 5/12 ".to_string())).unwrap().value(),
      Some("Séance du 5/12")
    );
    assert!(Notes::new(Some("x".repeat(1001))).is_err());
  }
}
