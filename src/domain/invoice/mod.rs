pub mod catalog;
pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use catalog::{Catalog, CatalogRules, Filtered};
pub use entities::{
  Client, InvoiceDocument, InvoiceTotals, LedgerEntry, PracticeProfile, Product, LEDGER_HEADER,
};
pub use errors::InvoiceError;
pub use ports::{
  AccessTokenProvider, DocumentRenderer, EmailAttachment, EmailSender, FileStore, OutgoingEmail,
  RenderedDocument, StoredFile, TabularStore,
};
pub use services::{
  InvoicePreview, InvoiceRequest, InvoiceService, InvoiceSettings, StepRecord, StepStatus,
  SubmissionReport, SubmissionStep,
};
pub use value_objects::{
  Amount, InvoiceNumber, MAX_QUANTITY, Notes, Quantity, ValueObjectError,
};
