//! Transcript documents and cell extraction.
//!
//! A transcript is decoded from its JSON serialization, checked against the
//! envelope schema, and then split into tagged cells plus a metadata header.

mod extract;
mod parser;

pub use extract::{preview, CellExtractor, Extraction, FrontEnd, EMPTY_PREVIEW};
pub use parser::{CellMetadata, CellSource, Document, DocumentError, DocumentMetadata, RawCell};
