//! Fault taxonomy for the render worker

use crate::cache::RenderHandle;

/// Errors from worker operations.
///
/// Every component returns `Result<_, Fault>`; nothing below the binary's
/// top-level boundary terminates the process. The control side has no error
/// channel; worker-process death is its only failure signal.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// Malformed frame, unknown command, or unparsable argument.
    #[error("protocol: {detail}")]
    Protocol { detail: String },

    /// Document cannot be opened, authenticated, or a page is missing.
    #[error("document: {detail}")]
    Document { detail: String },

    /// A handle that does not name a live rendered page.
    #[error("unknown render handle {0}")]
    InvalidHandle(RenderHandle),

    #[error("channel i/o: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),
}

impl Fault {
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn document(detail: impl Into<String>) -> Self {
        Self::Document {
            detail: detail.into(),
        }
    }
}
