//! IMAP command handlers for the fake server.
//!
//! Each handler lives in its own module and processes a single IMAP
//! command (CAPABILITY, LOGIN, AUTHENTICATE, ID, LIST, SELECT/EXAMINE,
//! FETCH, NOOP, LOGOUT).

mod fetch;
mod login;
mod logout;
mod noop;
mod select;

pub use authenticate::{decode_plain, handle_authenticate};
pub use capability::handle_capability;
pub use fetch::{FetchRequest, handle_fetch};
pub use id::handle_id;
pub use list::handle_list;
pub use login::handle_login;
pub use logout::handle_logout;
pub use noop::handle_noop;
pub use select::handle_select;
