//! Declared external mailboxes and the account list format.

pub mod parser;
pub mod record;

pub use parser::{encode_line, load_accounts, parse_accounts};
pub use record::{assign_keys, AccountKey, AccountRecord, Endpoint, Protocol};
