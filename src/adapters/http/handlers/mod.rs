pub mod invoices_web;
pub mod oauth;

pub use invoices_web::DocumentDirectory;
pub use oauth::OAuthStates;
