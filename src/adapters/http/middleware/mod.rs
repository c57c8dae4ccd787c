pub mod session_id;

pub use session_id::{SESSION_COOKIE, SessionId, SessionIdExt, SessionIdMiddleware};
