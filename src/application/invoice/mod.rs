pub mod issue_invoice;
pub mod load_catalog;
pub mod preview_invoice;
pub mod session_guard;

pub use issue_invoice::{
  IssueInvoiceCommand, IssueInvoiceResponse, IssueInvoiceUseCase, StepOutcomeDto,
};
pub use load_catalog::{
  ClientOptionDto, LoadCatalogCommand, LoadCatalogResponse, LoadCatalogUseCase, ProductOptionDto,
};
pub use preview_invoice::{
  PreviewInvoiceCommand, PreviewInvoiceResponse, PreviewInvoiceUseCase, invoice_request,
};
pub use session_guard::{SessionRegistry, SubmissionKey, SubmissionPermit};
