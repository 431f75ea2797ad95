//! Tabular Input
//!
//! Parses uploaded tabular files into raw, untyped records. Nothing about the
//! shape of an upload is trusted here: column order, column set and cell types
//! are whatever the client sent.

mod cell;
mod error;
mod reader;
mod record;

pub use cell::Cell;
pub use error::InputError;
pub use reader::{parse_upload, read_csv, read_json, ReaderConfig, UploadFormat};
pub use record::{RawRecord, RawTable};
