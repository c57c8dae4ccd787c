use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use facturation::application::invoice::{
  IssueInvoiceCommand, IssueInvoiceUseCase, SessionRegistry, SubmissionKey, invoice_request,
};
use facturation::domain::invoice::{
  CatalogRules, DocumentRenderer, EmailSender, FileStore, InvoiceDocument, InvoiceError,
  InvoiceService, InvoiceSettings, LEDGER_HEADER, OutgoingEmail, PracticeProfile,
  RenderedDocument, StepStatus, StoredFile, SubmissionStep, TabularStore,
};

// In-memory spreadsheet: tab name -> rows, header included
#[derive(Default)]
struct FakeSheets {
  tabs: Mutex<Vec<(String, Vec<Vec<String>>)>>,
  calls: AtomicUsize,
}

impl FakeSheets {
  fn with_tab(self, name: &str, rows: &[&[&str]]) -> Self {
    let rows = rows
      .iter()
      .map(|row| row.iter().map(|cell| cell.to_string()).collect())
      .collect();
    self.tabs.lock().unwrap().push((name.to_string(), rows));
    self
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn rows(&self, name: &str) -> Vec<Vec<String>> {
    self
      .tabs
      .lock()
      .unwrap()
      .iter()
      .find(|(tab, _)| tab == name)
      .map(|(_, rows)| rows.clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl TabularStore for FakeSheets {
  async fn list_sheet_titles(&self) -> Result<Vec<String>, InvoiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.tabs.lock().unwrap().iter().map(|(name, _)| name.clone()).collect())
  }

  async fn read_rows(&self, sheet: &str, range: &str) -> Result<Vec<Vec<String>>, InvoiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let rows = self.rows(sheet);
    if range.starts_with("A2") {
      // number column without its header
      return Ok(
        rows
          .into_iter()
          .skip(1)
          .map(|row| row.into_iter().take(1).collect())
          .collect(),
      );
    }
    Ok(rows)
  }

  async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), InvoiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let mut tabs = self.tabs.lock().unwrap();
    match tabs.iter_mut().find(|(tab, _)| tab == sheet) {
      Some((_, rows)) => rows.push(row),
      None => return Err(InvoiceError::TabularStore(format!("no tab {}", sheet))),
    }
    Ok(())
  }

  async fn ensure_header(&self, sheet: &str, header: &[&str]) -> Result<(), InvoiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    let mut tabs = self.tabs.lock().unwrap();
    match tabs.iter_mut().find(|(tab, _)| tab == sheet) {
      Some((_, rows)) if rows.is_empty() => rows.push(header),
      Some(_) => {}
      None => tabs.push((sheet.to_string(), vec![header])),
    }
    Ok(())
  }
}

#[derive(Default)]
struct FakeDrive {
  fail: bool,
  uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl FileStore for FakeDrive {
  async fn upload(
    &self,
    _bytes: Vec<u8>,
    folder_id: &str,
    file_name: &str,
  ) -> Result<StoredFile, InvoiceError> {
    if self.fail {
      return Err(InvoiceError::FileStore("quota exceeded".to_string()));
    }
    let mut uploads = self.uploads.lock().unwrap();
    uploads.push((folder_id.to_string(), file_name.to_string()));
    Ok(StoredFile {
      id: format!("file-{}", uploads.len()),
      link: format!("https://drive.example/file-{}", uploads.len()),
    })
  }
}

#[derive(Default)]
struct FakeMailer {
  sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl EmailSender for FakeMailer {
  async fn send(&self, email: OutgoingEmail) -> Result<(), InvoiceError> {
    self.sent.lock().unwrap().push(email);
    Ok(())
  }
}

struct FakeRenderer;

#[async_trait]
impl DocumentRenderer for FakeRenderer {
  async fn render(&self, document: &InvoiceDocument) -> Result<RenderedDocument, InvoiceError> {
    Ok(RenderedDocument {
      file_name: document.file_name.clone(),
      path: PathBuf::from("/tmp").join(&document.file_name),
      bytes: b"%PDF-1.4".to_vec(),
    })
  }

  fn render_email_html(
    &self,
    document: &InvoiceDocument,
    document_link: &str,
  ) -> Result<String, InvoiceError> {
    Ok(format!("<p>{} {}</p>", document.number, document_link))
  }
}

struct Harness {
  sheets: Arc<FakeSheets>,
  drive: Arc<FakeDrive>,
  mailer: Arc<FakeMailer>,
  service: Arc<InvoiceService>,
}

fn catalog_sheets() -> FakeSheets {
  FakeSheets::default()
    .with_tab(
      "Clients",
      &[
        &["id", "nom", "prenom", "rue", "code postal", "ville", "mail"],
        &["C1", "Martin", "Claire", "1 rue A", "75011", "Paris", "claire@example.org"],
        &["C2", "Durand", "Paul", "", "", "", ""],
      ],
    )
    .with_tab(
      "Produits",
      &[
        &["id", "libelle", "prix_ht", "tva", "prix_ttc"],
        &["P1", "Consultation", "100,00 €", "20%", "120,00 €"],
        &["P3", "Bilan (montant libre)", "0", "20%", "0"],
      ],
    )
}

fn harness(sheets: FakeSheets, drive: FakeDrive) -> Harness {
  let sheets = Arc::new(sheets);
  let drive = Arc::new(drive);
  let mailer = Arc::new(FakeMailer::default());

  let settings = InvoiceSettings {
    spreadsheet_id: "sheet-1".to_string(),
    drive_folder_id: "folder-1".to_string(),
    practice: PracticeProfile {
      name: "Cabinet Test".to_string(),
      sender_email: Some("cabinet@example.org".to_string()),
      accountant_email: Some("compta@example.org".to_string()),
      ..PracticeProfile::default()
    },
    rules: CatalogRules {
      variable_amount_label_marker: Some("montant libre".to_string()),
      ..CatalogRules::default()
    },
    catalog_cache_ttl: None,
  };

  let service = Arc::new(InvoiceService::new(
    sheets.clone(),
    drive.clone(),
    mailer.clone(),
    Arc::new(FakeRenderer),
    settings,
  ));

  Harness {
    sheets,
    drive,
    mailer,
    service,
  }
}

fn december() -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 12, 3).unwrap()
}

fn command(session_id: &str, client_id: &str, product_id: &str, quantity: u32) -> IssueInvoiceCommand {
  IssueInvoiceCommand {
    session_id: session_id.to_string(),
    client_id: client_id.to_string(),
    product_id: product_id.to_string(),
    quantity,
    notes: None,
    manual_amount: None,
    issue_date: Some(december()),
  }
}

#[tokio::test]
async fn test_full_run_numbers_uploads_emails_and_records() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let request = invoice_request("C1", "P1", 2, None, None).unwrap();

  let report = h.service.issue(&request, december()).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.invoice_number.value(), "FACT-202512-0001");
  assert_eq!(report.document_file_name, "FACT-202512-0001_martin_claire.pdf");
  assert_eq!(report.totals.net.to_ledger_string(), "200.00");
  assert_eq!(report.totals.tax.to_ledger_string(), "40.00");
  assert_eq!(report.totals.gross.to_ledger_string(), "240.00");
  assert_eq!(
    report.recipients,
    vec!["claire@example.org".to_string(), "compta@example.org".to_string()]
  );

  assert_eq!(
    h.drive.uploads.lock().unwrap().as_slice(),
    &[(
      "folder-1".to_string(),
      "FACT-202512-0001_martin_claire.pdf".to_string()
    )]
  );

  let sent = h.mailer.sent.lock().unwrap();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].subject, "Votre facture FACT-202512-0001 - Cabinet Test");
  assert_eq!(sent[0].from.as_deref(), Some("cabinet@example.org"));
  assert_eq!(sent[0].attachment.content_type, "application/pdf");

  let ledger = h.sheets.rows("factures");
  assert_eq!(ledger[0], LEDGER_HEADER.map(String::from).to_vec());
  assert_eq!(
    ledger[1],
    vec![
      "FACT-202512-0001",
      "03/12/2025",
      "C1",
      "Martin",
      "Claire",
      "P1",
      "Consultation",
      "2",
      "200.00",
      "40.00",
      "240.00",
      "https://drive.example/file-1",
      "claire@example.org",
    ]
  );
}

#[tokio::test]
async fn test_numbers_follow_the_ledger() {
  let sheets = catalog_sheets().with_tab(
    "factures",
    &[
      &LEDGER_HEADER,
      &["FACT-202511-0042"],
      &["FACT-202512-0007"],
      &["not a number"],
    ],
  );
  let h = harness(sheets, FakeDrive::default());
  let request = invoice_request("C1", "P1", 1, None, None).unwrap();

  let first = h.service.issue(&request, december()).await.unwrap();
  let second = h.service.issue(&request, december()).await.unwrap();

  assert_eq!(first.invoice_number.value(), "FACT-202512-0008");
  assert_eq!(second.invoice_number.value(), "FACT-202512-0009");
  assert_eq!(h.sheets.rows("factures").len(), 6);
}

#[tokio::test]
async fn test_client_without_email_skips_sending() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let request = invoice_request("C2", "P1", 1, None, None).unwrap();

  let report = h.service.issue(&request, december()).await.unwrap();

  assert!(report.is_success());
  assert!(matches!(
    report.status_of(SubmissionStep::Email),
    Some(StepStatus::Skipped(_))
  ));
  assert!(h.mailer.sent.lock().unwrap().is_empty());
  assert_eq!(h.sheets.rows("factures")[1][12], "");
}

#[tokio::test]
async fn test_upload_failure_aborts_remaining_steps() {
  let h = harness(
    catalog_sheets(),
    FakeDrive {
      fail: true,
      ..FakeDrive::default()
    },
  );
  let request = invoice_request("C1", "P1", 1, None, None).unwrap();

  let report = h.service.issue(&request, december()).await.unwrap();

  assert!(!report.is_success());
  assert_eq!(report.failed_step().unwrap().step, SubmissionStep::Upload);
  assert!(matches!(
    report.status_of(SubmissionStep::Document),
    Some(StepStatus::Completed(_))
  ));
  assert!(matches!(
    report.status_of(SubmissionStep::Ledger),
    Some(StepStatus::Skipped(_))
  ));
  assert!(h.mailer.sent.lock().unwrap().is_empty());
  // header only
  assert_eq!(h.sheets.rows("factures").len(), 1);
}

#[tokio::test]
async fn test_variable_amount_product() {
  let h = harness(catalog_sheets(), FakeDrive::default());

  let missing_notes = invoice_request("C1", "P3", 1, None, Some("150")).unwrap();
  assert!(matches!(
    h.service.issue(&missing_notes, december()).await,
    Err(InvoiceError::InvalidSubmission(_))
  ));

  let request =
    invoice_request("C1", "P3", 1, Some("Bilan complet".to_string()), Some("150,00 €")).unwrap();
  let report = h.service.issue(&request, december()).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.invoice_number.value(), "FACT-202512-0001");
  assert_eq!(report.totals.net.to_ledger_string(), "150.00");
  assert_eq!(report.totals.tax.to_ledger_string(), "30.00");
  assert_eq!(report.totals.gross.to_ledger_string(), "180.00");
}

#[tokio::test]
async fn test_unknown_client_fails_before_numbering() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let request = invoice_request("C404", "P1", 1, None, None).unwrap();

  let result = h.service.issue(&request, december()).await;

  assert!(matches!(result, Err(InvoiceError::ClientNotFound(id)) if id == "C404"));
  assert!(h.sheets.rows("factures").is_empty());
}

fn unconfigured(spreadsheet_id: &str, drive_folder_id: &str) -> (Arc<FakeSheets>, InvoiceService) {
  let sheets = Arc::new(catalog_sheets());
  let service = InvoiceService::new(
    sheets.clone(),
    Arc::new(FakeDrive::default()),
    Arc::new(FakeMailer::default()),
    Arc::new(FakeRenderer),
    InvoiceSettings {
      spreadsheet_id: spreadsheet_id.to_string(),
      drive_folder_id: drive_folder_id.to_string(),
      ..InvoiceSettings::default()
    },
  );
  (sheets, service)
}

#[tokio::test]
async fn test_missing_folder_is_a_configuration_error() {
  let (sheets, service) = unconfigured("sheet-1", " ");
  let request = invoice_request("C1", "P1", 1, None, None).unwrap();

  match service.issue(&request, december()).await {
    Err(InvoiceError::Configuration(names)) => assert_eq!(names, "GOOGLE_FOLDER_ID"),
    other => panic!("expected a configuration error, got {:?}", other.map(|r| r.invoice_number)),
  }
  assert_eq!(sheets.calls(), 0);
}

#[tokio::test]
async fn test_missing_spreadsheet_stops_before_any_sheet_call() {
  let (sheets, service) = unconfigured("", "folder-1");
  let request = invoice_request("C1", "P1", 1, None, None).unwrap();

  assert!(matches!(
    service.catalog().await,
    Err(InvoiceError::Configuration(names)) if names == "ACCOUNTING_SPREADSHEET_ID"
  ));
  assert!(matches!(
    service.preview(&request).await,
    Err(InvoiceError::Configuration(_))
  ));
  assert!(matches!(
    service.issue(&request, december()).await,
    Err(InvoiceError::Configuration(_))
  ));

  let use_case = IssueInvoiceUseCase::new(Arc::new(service), Arc::new(SessionRegistry::new()));
  assert!(matches!(
    use_case.execute(command("s1", "C1", "P1", 1)).await,
    Err(InvoiceError::Configuration(_))
  ));
  assert_eq!(sheets.calls(), 0);
  assert!(sheets.rows("factures").is_empty());
}

#[tokio::test]
async fn test_both_identifiers_missing_are_named() {
  let (_, service) = unconfigured(" ", "");
  match service.ensure_configured() {
    Err(InvoiceError::Configuration(names)) => {
      assert_eq!(names, "GOOGLE_FOLDER_ID, ACCOUNTING_SPREADSHEET_ID")
    }
    other => panic!("expected a configuration error, got {:?}", other),
  }
}

#[tokio::test]
async fn test_amount_beyond_decimal_range_is_rejected() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let request = invoice_request(
    "C1",
    "P3",
    1,
    Some("Bilan complet".to_string()),
    Some("79228162514264337593543950335"),
  )
  .unwrap();

  assert!(matches!(
    h.service.preview(&request).await,
    Err(InvoiceError::Validation(_))
  ));
  assert!(matches!(
    h.service.issue(&request, december()).await,
    Err(InvoiceError::Validation(_))
  ));
  assert!(h.drive.uploads.lock().unwrap().is_empty());
  assert!(h.sheets.rows("factures").is_empty());
}

#[tokio::test]
async fn test_identical_resubmission_is_rejected_per_session() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let use_case = IssueInvoiceUseCase::new(h.service.clone(), Arc::new(SessionRegistry::new()));

  let first = use_case.execute(command("s1", "C1", "P1", 1)).await.unwrap();
  assert!(first.success);
  assert_eq!(first.invoice_number, "FACT-202512-0001");

  match use_case.execute(command("s1", "C1", "P1", 1)).await {
    Err(InvoiceError::DuplicateSubmission { invoice_number }) => {
      assert_eq!(invoice_number, "FACT-202512-0001")
    }
    other => panic!("expected duplicate rejection, got {:?}", other.map(|r| r.invoice_number)),
  }

  // a different quantity, or another session, goes through
  let changed = use_case.execute(command("s1", "C1", "P1", 2)).await.unwrap();
  assert_eq!(changed.invoice_number, "FACT-202512-0002");
  let other_session = use_case.execute(command("s2", "C1", "P1", 1)).await.unwrap();
  assert_eq!(other_session.invoice_number, "FACT-202512-0003");
}

#[tokio::test]
async fn test_stray_manual_amount_does_not_bypass_duplicate_check() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let use_case = IssueInvoiceUseCase::new(h.service.clone(), Arc::new(SessionRegistry::new()));

  use_case.execute(command("s1", "C1", "P1", 1)).await.unwrap();

  let repeat = IssueInvoiceCommand {
    manual_amount: Some("45".to_string()),
    ..command("s1", "C1", "P1", 1)
  };
  assert!(matches!(
    use_case.execute(repeat).await,
    Err(InvoiceError::DuplicateSubmission { .. })
  ));
  assert_eq!(h.drive.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_submission_in_progress_is_rejected() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let sessions = Arc::new(SessionRegistry::new());
  let use_case = IssueInvoiceUseCase::new(h.service.clone(), sessions.clone());

  let request = invoice_request("C2", "P1", 5, None, None).unwrap();
  let _permit = sessions.acquire("s1", SubmissionKey::new(&request, false)).unwrap();

  assert!(matches!(
    use_case.execute(command("s1", "C1", "P1", 1)).await,
    Err(InvoiceError::SubmissionInProgress)
  ));
  assert!(h.drive.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_response_lists_every_step() {
  let h = harness(catalog_sheets(), FakeDrive::default());
  let use_case = IssueInvoiceUseCase::new(h.service.clone(), Arc::new(SessionRegistry::new()));

  let response = use_case.execute(command("s1", "C2", "P1", 1)).await.unwrap();

  let statuses: HashMap<String, String> = response
    .steps
    .iter()
    .map(|step| (step.label.clone(), step.status.clone()))
    .collect();
  assert_eq!(statuses.len(), SubmissionStep::ALL.len());
  assert_eq!(
    statuses.values().filter(|status| *status == "skipped").count(),
    1
  );
  assert_eq!(response.issue_date, "03/12/2025");
  assert_eq!(response.gross, "120,00 €");
}
