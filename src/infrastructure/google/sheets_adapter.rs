use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::failure_message;
use crate::domain::invoice::{AccessTokenProvider, InvoiceError, TabularStore};

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// A1 reference to `range` of `sheet`; the tab name is always quoted.
pub(crate) fn a1_range(sheet: &str, range: &str) -> String {
  format!("'{}'!{}", sheet.replace('\'', "''"), range)
}

/// Header cells take the last column letter from the header width.
fn header_range(width: usize) -> String {
  let mut column = String::new();
  let mut n = width.max(1);
  while n > 0 {
    let rem = (n - 1) % 26;
    column.insert(0, (b'A' + rem as u8) as char);
    n = (n - 1) / 26;
  }
  format!("A1:{}1", column)
}

fn cell_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
  #[serde(default)]
  values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
  title: String,
}

#[derive(Debug, Deserialize)]
struct Sheet {
  properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
  #[serde(default)]
  sheets: Vec<Sheet>,
}

/// Sheets v4 REST adapter bound to one spreadsheet
pub struct GoogleSheetsAdapter {
  client: Client,
  tokens: Arc<dyn AccessTokenProvider>,
  spreadsheet_id: String,
  base_url: String,
}

impl GoogleSheetsAdapter {
  pub fn new(tokens: Arc<dyn AccessTokenProvider>, spreadsheet_id: String) -> Self {
    Self {
      client: Client::new(),
      tokens,
      spreadsheet_id,
      base_url: SHEETS_API_URL.to_string(),
    }
  }

  fn url(&self, segments: &[&str]) -> Result<Url, InvoiceError> {
    let mut url = Url::parse(&self.base_url)
      .map_err(|e| InvoiceError::Internal(format!("Invalid Sheets URL: {}", e)))?;
    url
      .path_segments_mut()
      .map_err(|_| InvoiceError::Internal("Sheets URL cannot be a base".to_string()))?
      .push(&self.spreadsheet_id)
      .extend(segments);
    Ok(url)
  }

  async fn read_values(&self, a1: &str) -> Result<Vec<Vec<String>>, InvoiceError> {
    let token = self.tokens.access_token().await?;
    let response = self
      .client
      .get(self.url(&["values", a1])?)
      .bearer_auth(&token)
      .send()
      .await
      .map_err(|e| InvoiceError::TabularStore(format!("Reading {} failed: {}", a1, e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::TabularStore(
        failure_message(&format!("Reading {}", a1), response).await,
      ));
    }

    let range: ValueRange = response.json().await.map_err(|e| {
      InvoiceError::TabularStore(format!("Failed to parse values of {}: {}", a1, e))
    })?;

    Ok(
      range
        .values
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect(),
    )
  }

  async fn add_sheet(&self, sheet: &str) -> Result<(), InvoiceError> {
    let token = self.tokens.access_token().await?;
    let mut url = self.url(&[])?;
    let path = format!("{}:batchUpdate", url.path());
    url.set_path(&path);

    let response = self
      .client
      .post(url)
      .bearer_auth(&token)
      .json(&json!({
        "requests": [{ "addSheet": { "properties": { "title": sheet } } }]
      }))
      .send()
      .await
      .map_err(|e| InvoiceError::TabularStore(format!("Creating tab {} failed: {}", sheet, e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::TabularStore(
        failure_message(&format!("Creating tab {}", sheet), response).await,
      ));
    }

    tracing::info!(sheet = %sheet, "Spreadsheet tab created");
    Ok(())
  }
}

#[async_trait]
impl TabularStore for GoogleSheetsAdapter {
  async fn list_sheet_titles(&self) -> Result<Vec<String>, InvoiceError> {
    let token = self.tokens.access_token().await?;
    let response = self
      .client
      .get(self.url(&[])?)
      .bearer_auth(&token)
      .query(&[("fields", "sheets.properties.title")])
      .send()
      .await
      .map_err(|e| InvoiceError::TabularStore(format!("Reading spreadsheet failed: {}", e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::TabularStore(
        failure_message("Reading spreadsheet", response).await,
      ));
    }

    let spreadsheet: Spreadsheet = response.json().await.map_err(|e| {
      InvoiceError::TabularStore(format!("Failed to parse spreadsheet metadata: {}", e))
    })?;

    Ok(
      spreadsheet
        .sheets
        .into_iter()
        .map(|s| s.properties.title)
        .collect(),
    )
  }

  async fn read_rows(&self, sheet: &str, range: &str) -> Result<Vec<Vec<String>>, InvoiceError> {
    self.read_values(&a1_range(sheet, range)).await
  }

  async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), InvoiceError> {
    let token = self.tokens.access_token().await?;
    let a1 = a1_range(sheet, "A2");
    let append = format!("{}:append", a1);

    let response = self
      .client
      .post(self.url(&["values", &append])?)
      .bearer_auth(&token)
      .query(&[
        ("valueInputOption", "RAW"),
        ("insertDataOption", "INSERT_ROWS"),
      ])
      .json(&json!({ "values": [row] }))
      .send()
      .await
      .map_err(|e| InvoiceError::TabularStore(format!("Appending to {} failed: {}", sheet, e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::TabularStore(
        failure_message(&format!("Appending to {}", sheet), response).await,
      ));
    }

    Ok(())
  }

  async fn ensure_header(&self, sheet: &str, header: &[&str]) -> Result<(), InvoiceError> {
    let titles = self.list_sheet_titles().await?;
    if !titles.iter().any(|t| t == sheet) {
      self.add_sheet(sheet).await?;
    }

    let a1 = a1_range(sheet, &header_range(header.len()));
    let existing = self.read_values(&a1).await?;
    if existing
      .first()
      .is_some_and(|row| row.iter().any(|cell| !cell.trim().is_empty()))
    {
      return Ok(());
    }

    let token = self.tokens.access_token().await?;
    let response = self
      .client
      .put(self.url(&["values", &a1])?)
      .bearer_auth(&token)
      .query(&[("valueInputOption", "RAW")])
      .json(&json!({ "values": [header] }))
      .send()
      .await
      .map_err(|e| InvoiceError::TabularStore(format!("Writing header of {} failed: {}", sheet, e)))?;

    if !response.status().is_success() {
      return Err(InvoiceError::TabularStore(
        failure_message(&format!("Writing header of {}", sheet), response).await,
      ));
    }

    tracing::info!(sheet = %sheet, "Ledger header written");
    Ok(())
  }
}
