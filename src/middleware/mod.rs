mod guard;
mod identity;

pub use guard::{access_guard_middleware, canonical_request_path};
pub use identity::{proxy_identity_middleware, session_from_headers};
