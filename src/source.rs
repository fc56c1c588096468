//! Text sources
//!
//! The pipeline receives one opaque string per document and does not care
//! whether it came from OCR or a direct text layer. OCR/image/PDF backends
//! live behind this contract, outside the core; the crate ships only a
//! plain-text-file source.

use crate::error::{MailroomError, Result};
use std::path::Path;

/// Raw document text plus optional per-page offsets
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,

    /// Byte offsets where pages begin, when the backend knows them
    pub page_offsets: Vec<usize>,
}

impl SourceText {
    pub fn single(text: String) -> Self {
        Self {
            text,
            page_offsets: Vec::new(),
        }
    }
}

/// Resolves a document reference to raw text
pub trait TextSource: Send + Sync {
    fn fetch(&self, reference: &Path) -> Result<SourceText>;
}

/// Reads plain-text files; anything needing OCR is rejected as unsupported
#[derive(Debug, Default)]
pub struct PlainTextSource;

const TEXT_EXTENSIONS: [&str; 3] = ["txt", "text", "md"];

impl TextSource for PlainTextSource {
    fn fetch(&self, reference: &Path) -> Result<SourceText> {
        let extension = reference
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(MailroomError::UnsupportedFile(format!(
                "{} (only plain text is read directly; image/PDF extraction requires an external OCR text source)",
                reference.display()
            )));
        }

        Ok(SourceText::single(std::fs::read_to_string(reference)?))
    }
}
