use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::invoice::{CatalogRules, InvoiceSettings, PracticeProfile};

const DEFAULT_EXEMPTION_NOTICE: &str = "Exonération de TVA (art. 261 du CGI – actes médicaux).";

/// Flat variables understood for compatibility with existing `.env` files,
/// mapped to their configuration keys.
const LEGACY_VARIABLES: [(&str, &str); 8] = [
  ("GOOGLE_FOLDER_ID", "google.folder_id"),
  ("ACCOUNTING_SPREADSHEET_ID", "google.spreadsheet_id"),
  ("PRACTICE_NAME", "practice.name"),
  ("PRACTICE_ADDRESS", "practice.address"),
  ("PRACTICE_SIRET", "practice.siret"),
  ("PRACTICE_TVA_NUMBER", "practice.tva_number"),
  ("PRACTITIONER_EMAIL", "practice.sender_email"),
  ("COMPTABLE_EMAIL", "practice.accountant_email"),
];

// Default value functions
fn default_host() -> String {
  "127.0.0.1".to_string()
}

fn default_port() -> u16 {
  8080
}

fn default_base_url() -> String {
  "http://localhost:8080".to_string()
}

fn default_credentials_path() -> PathBuf {
  PathBuf::from("credentials.json")
}

fn default_token_path() -> PathBuf {
  PathBuf::from("token.json")
}

fn default_practice_name() -> String {
  "Cabinet".to_string()
}

fn default_exemption_notice() -> String {
  DEFAULT_EXEMPTION_NOTICE.to_string()
}

fn default_cache_ttl() -> u64 {
  60
}

fn default_output_dir() -> PathBuf {
  PathBuf::from("./data/invoices")
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("Missing required configuration: {}", .0.join(", "))]
  Missing(Vec<String>),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub google: GoogleConfig,
  #[serde(default)]
  pub practice: PracticeConfig,
  #[serde(default)]
  pub catalog: CatalogConfig,
  #[serde(default)]
  pub pdf: PdfConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  #[serde(default = "default_base_url")]
  pub base_url: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      base_url: default_base_url(),
    }
  }
}

/// Google APIs configuration (Sheets, Drive, Gmail)
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
  /// Drive folder receiving the generated documents
  #[serde(default)]
  pub folder_id: String,
  /// Spreadsheet holding the client, product and ledger tabs
  #[serde(default)]
  pub spreadsheet_id: String,
  /// Client secrets downloaded from Google Cloud Console
  #[serde(default = "default_credentials_path")]
  pub credentials_path: PathBuf,
  /// Persisted OAuth token (access + refresh)
  #[serde(default = "default_token_path")]
  pub token_path: PathBuf,
  /// OAuth 2.0 client ID, takes precedence over `credentials_path`
  pub oauth_client_id: Option<String>,
  pub oauth_client_secret: Option<String>,
  /// Defaults to `{server.base_url}/oauth/google/callback`
  pub oauth_redirect_url: Option<String>,
  /// Base64-encoded 32-byte key; when set the token file is encrypted.
  /// Generate with: openssl rand -base64 32
  pub token_encryption_key: Option<String>,
}

impl Default for GoogleConfig {
  fn default() -> Self {
    Self {
      folder_id: String::new(),
      spreadsheet_id: String::new(),
      credentials_path: default_credentials_path(),
      token_path: default_token_path(),
      oauth_client_id: None,
      oauth_client_secret: None,
      oauth_redirect_url: None,
      token_encryption_key: None,
    }
  }
}

/// Practice (issuer) details
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeConfig {
  #[serde(default = "default_practice_name")]
  pub name: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub siret: String,
  #[serde(default)]
  pub tva_number: String,
  #[serde(default = "default_exemption_notice")]
  pub exemption_notice: String,
  pub sender_email: Option<String>,
  pub accountant_email: Option<String>,
  /// Every product is tax-exempt (e.g. medical acts)
  #[serde(default)]
  pub tax_exempt: bool,
}

impl Default for PracticeConfig {
  fn default() -> Self {
    Self {
      name: default_practice_name(),
      address: String::new(),
      siret: String::new(),
      tva_number: String::new(),
      exemption_notice: default_exemption_notice(),
      sender_email: None,
      accountant_email: None,
      tax_exempt: false,
    }
  }
}

/// Catalog reading configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  #[serde(default = "default_cache_ttl")]
  pub cache_ttl_seconds: u64,
  #[serde(default)]
  pub variable_amount_product_ids: Vec<String>,
  pub variable_amount_label_marker: Option<String>,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      cache_ttl_seconds: default_cache_ttl(),
      variable_amount_product_ids: Vec::new(),
      variable_amount_label_marker: None,
    }
  }
}

/// PDF generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
  #[serde(default = "default_output_dir")]
  pub output_dir: PathBuf,
  pub wkhtmltopdf_path: Option<String>,
}

impl Default for PdfConfig {
  fn default() -> Self {
    Self {
      output_dir: default_output_dir(),
      wkhtmltopdf_path: None,
    }
  }
}

fn is_truthy(value: &str) -> bool {
  matches!(
    value.trim().to_lowercase().as_str(),
    "1" | "true" | "yes" | "oui" | "on"
  )
}

impl Config {
  /// Load configuration from files and environment variables
  ///
  /// Sources, later ones overriding earlier ones:
  /// 1. built-in defaults
  /// 2. config/default.toml, config/local.toml, config/{RUN_MODE}.toml (all optional)
  /// 3. Environment variables with FACTURATION_ prefix
  /// 4. The flat variables of existing `.env` files (`GOOGLE_FOLDER_ID`,
  ///    `ACCOUNTING_SPREADSHEET_ID`, `PRACTICE_NAME`, ..., `TVA_EXEMPT`)
  ///
  /// # Environment Variables
  ///
  /// Prefixed variables use double underscores as separator:
  /// - `FACTURATION_SERVER__PORT=8080`
  /// - `FACTURATION_GOOGLE__SPREADSHEET_ID=1AbC...`
  /// - `FACTURATION_CATALOG__CACHE_TTL_SECONDS=60`
  ///
  /// Loading does not check that the values needed to issue invoices are
  /// present; see [`Config::validate`].
  pub fn load() -> Result<Self, ConfigLoadError> {
    let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    let mut builder = ConfigBuilder::builder()
      .add_source(File::with_name("config/default").required(false))
      .add_source(File::with_name("config/local").required(false))
      .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
      // FACTURATION_SERVER__PORT=8080
      .add_source(
        Environment::with_prefix("FACTURATION")
          .prefix_separator("_")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("catalog.variable_amount_product_ids")
          .try_parsing(true),
      );

    for (variable, key) in LEGACY_VARIABLES {
      let value = env::var(variable).ok().filter(|v| !v.trim().is_empty());
      builder = builder.set_override_option(key, value)?;
    }
    if let Ok(value) = env::var("TVA_EXEMPT") {
      builder = builder.set_override("practice.tax_exempt", is_truthy(&value))?;
    }

    let config: Config = builder.build()?.try_deserialize()?;
    tracing::debug!(run_mode = %run_mode, "Configuration loaded");
    Ok(config)
  }

  /// Checks the values without which no invoice can be issued.
  pub fn validate(&self) -> Result<(), ConfigLoadError> {
    let mut missing = Vec::new();
    if self.google.folder_id.trim().is_empty() {
      missing.push("GOOGLE_FOLDER_ID".to_string());
    }
    if self.google.spreadsheet_id.trim().is_empty() {
      missing.push("ACCOUNTING_SPREADSHEET_ID".to_string());
    }

    if missing.is_empty() {
      Ok(())
    } else {
      Err(ConfigLoadError::Missing(missing))
    }
  }

  pub fn oauth_redirect_url(&self) -> String {
    self.google.oauth_redirect_url.clone().unwrap_or_else(|| {
      format!(
        "{}/oauth/google/callback",
        self.server.base_url.trim_end_matches('/')
      )
    })
  }

  pub fn practice_profile(&self) -> PracticeProfile {
    let practice = &self.practice;
    PracticeProfile {
      name: practice.name.clone(),
      address: practice.address.clone(),
      siret: practice.siret.clone(),
      tva_number: practice.tva_number.clone(),
      exemption_notice: practice.exemption_notice.clone(),
      sender_email: practice.sender_email.clone(),
      accountant_email: practice.accountant_email.clone(),
    }
  }

  /// Settings of the invoice service; `cache_catalog` is false for one-shot runs.
  pub fn invoice_settings(&self, cache_catalog: bool) -> InvoiceSettings {
    InvoiceSettings {
      spreadsheet_id: self.google.spreadsheet_id.trim().to_string(),
      drive_folder_id: self.google.folder_id.trim().to_string(),
      practice: self.practice_profile(),
      rules: CatalogRules {
        practice_tax_exempt: self.practice.tax_exempt,
        variable_amount_product_ids: self
          .catalog
          .variable_amount_product_ids
          .iter()
          .map(|id| id.trim().to_string())
          .filter(|id| !id.is_empty())
          .collect::<HashSet<_>>(),
        variable_amount_label_marker: self.catalog.variable_amount_label_marker.clone(),
      },
      catalog_cache_ttl: (cache_catalog && self.catalog.cache_ttl_seconds > 0)
        .then(|| Duration::from_secs(self.catalog.cache_ttl_seconds)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_structure() {
    let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            base_url = "https://factures.example.org/"

            [google]
            folder_id = "folder-123"
            spreadsheet_id = "sheet-456"
            token_path = "/var/lib/facturation/token.json"

            [practice]
            name = "Cabinet Martin"
            address = "12 rue des Lilas\\n75011 Paris"
            tax_exempt = true

            [catalog]
            variable_amount_product_ids = ["P9", " "]
            variable_amount_label_marker = "montant libre"
        "#;

    let config: Config = toml::from_str(toml).expect("Failed to parse config");

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.google.folder_id, "folder-123");
    assert_eq!(config.google.credentials_path, PathBuf::from("credentials.json")); // default
    assert_eq!(config.practice.siret, ""); // default
    assert!(config.practice.exemption_notice.starts_with("Exonération"));
    assert_eq!(config.catalog.cache_ttl_seconds, 60); // default
    assert_eq!(config.pdf.output_dir, PathBuf::from("./data/invoices")); // default
    assert_eq!(
      config.oauth_redirect_url(),
      "https://factures.example.org/oauth/google/callback"
    );
    assert!(config.validate().is_ok());

    let settings = config.invoice_settings(true);
    assert_eq!(settings.spreadsheet_id, "sheet-456");
    assert_eq!(settings.drive_folder_id, "folder-123");
    assert!(settings.rules.practice_tax_exempt);
    assert_eq!(settings.rules.variable_amount_product_ids.len(), 1);
    assert_eq!(settings.catalog_cache_ttl, Some(Duration::from_secs(60)));
    assert_eq!(config.invoice_settings(false).catalog_cache_ttl, None);
    assert_eq!(settings.practice.address_lines().len(), 2);
  }

  #[test]
  fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").expect("Failed to parse config");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.practice.name, "Cabinet");
    assert!(config.google.oauth_client_id.is_none());
  }

  #[test]
  fn test_validate_reports_missing_ids() {
    let config = Config::default();
    match config.validate() {
      Err(ConfigLoadError::Missing(names)) => {
        assert_eq!(names, vec!["GOOGLE_FOLDER_ID", "ACCOUNTING_SPREADSHEET_ID"])
      }
      other => panic!("expected missing configuration, got {:?}", other),
    }
  }

  #[test]
  fn test_truthy_flags() {
    assert!(is_truthy("True"));
    assert!(is_truthy(" 1 "));
    assert!(is_truthy("oui"));
    assert!(!is_truthy("0"));
    assert!(!is_truthy(""));
  }
}
