//! ASCII PLY point-cloud writing and reading

mod header;
mod reader;
mod writer;

pub use header::{PlyHeader, PlyLayout, SYNTHESIZED_COMMENT, read_header, rewrite_vertex_count};
pub use reader::{PlyCloud, read_ply};
pub use writer::{PlySink, PlyWriter, WriterState};

use thiserror::Error;

/// Errors that can occur while writing or reading PLY files.
#[derive(Debug, Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed PLY header: {0}")]
    Header(String),

    #[error("PLY parsing error: {0}")]
    Parse(String),

    #[error("Missing '{property}' at vertex {index}")]
    MissingProperty { property: &'static str, index: usize },

    #[error("Writer is {actual:?}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: WriterState,
    },
}
