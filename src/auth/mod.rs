//! Session records and the sign-in redirect contract.
//!
//! Authentication itself happens elsewhere. This module describes what a
//! signed-in user looks like to access checks and how the original
//! destination travels through the sign-in page and back.

pub mod redirect;
mod session;

pub use redirect::{is_safe_return_path, query_param, return_destination, with_return_param};
pub use session::SessionUser;
