pub mod dtos;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod templates;

// Re-export commonly used types
pub use dtos::{CatalogQuery, InvoiceForm};
pub use errors::ApiError;
pub use handlers::{DocumentDirectory, OAuthStates};
pub use middleware::{SessionId, SessionIdExt, SessionIdMiddleware};
pub use routes::{WebRouteDependencies, configure_health_routes, configure_web_routes};
pub use templates::TemplateEngine;
