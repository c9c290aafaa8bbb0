pub mod types;
pub mod confidence;
pub mod sanitize;
pub mod pdf;
pub mod layout;
pub mod structured;
pub mod table_detect;
pub mod orchestrator;

pub use types::*;
pub use confidence::*;
pub use sanitize::*;
pub use pdf::*;
pub use structured::*;
pub use table_detect::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Page {page} content stream unreadable: {reason}")]
    PageContent { page: usize, reason: String },
}
