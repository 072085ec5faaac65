//! Input schema for IAT trial tables
//!
//! Raw rows (JSON, NDJSON or CSV) are parsed into an untyped [`RawTable`] and
//! then checked against the fixed column set by the [`SchemaValidator`].

mod raw_row;
mod validator;

pub use raw_row::*;
pub use validator::*;
