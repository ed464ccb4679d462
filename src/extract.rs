//! PDF text extraction.
//!
//! Documents are read page by page. A page that fails to decode is skipped
//! with a warning; a document that fails to open, or yields no text at all,
//! is skipped and recorded in the [`ExtractionReport`]. A decoder that panics
//! on a malformed file counts as a failure to open. Extraction of a batch
//! never fails as a whole: an empty [`ExtractionReport::text`] is the signal
//! that nothing usable was found, and callers reject it.

use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::error::QaError;
use crate::models::PdfDocument;

/// Outcome of decoding a single page.
#[derive(Debug)]
pub struct PageText {
    pub number: u32,
    pub text: Result<String, QaError>,
}

impl PageText {
    fn has_text(&self) -> bool {
        matches!(&self.text, Ok(text) if !text.trim().is_empty())
    }
}

/// Turns PDF bytes into per-page text.
///
/// An `Err` means the document could not be opened at all.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, QaError>;
}

/// Page-wise extraction with `lopdf`, falling back to `pdf-extract` when
/// `lopdf` cannot open the file or finds no text in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPdfExtractor;

impl PdfTextExtractor for DefaultPdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, QaError> {
        match extract_with_lopdf(bytes) {
            Ok(pages) if pages.iter().any(PageText::has_text) => Ok(pages),
            Ok(_) => {
                debug!("lopdf found no text, retrying with pdf-extract");
                extract_with_pdf_extract(bytes)
            }
            Err(lopdf_err) => extract_with_pdf_extract(bytes).map_err(|fallback_err| {
                QaError::Extraction(format!("{}; fallback: {}", lopdf_err, fallback_err))
            }),
        }
    }
}

fn extract_with_lopdf(bytes: &[u8]) -> Result<Vec<PageText>, QaError> {
    let document = Document::load_mem(bytes).map_err(|e| QaError::Extraction(e.to_string()))?;

    Ok(document
        .get_pages()
        .into_keys()
        .map(|number| PageText {
            number,
            text: document
                .extract_text(&[number])
                .map_err(|e| QaError::Extraction(e.to_string())),
        })
        .collect())
}

fn extract_with_pdf_extract(bytes: &[u8]) -> Result<Vec<PageText>, QaError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| QaError::Extraction(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            number: i as u32 + 1,
            text: Ok(text),
        })
        .collect())
}

/// A document that contributed nothing to the text blob.
#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Concatenated text of every document that yielded any.
    pub text: String,
    /// Names of documents that contributed text, in input order.
    pub processed: Vec<String>,
    pub skipped: Vec<SkippedDocument>,
}

impl ExtractionReport {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Marker placed before each document's text when separators are enabled.
pub fn document_marker(name: &str) -> String {
    format!("\n\n--- Document: {} ---\n\n", name)
}

/// Runs the extractor on one document, turning a decoder panic into an error.
fn open_pages(
    extractor: &dyn PdfTextExtractor,
    doc: &PdfDocument,
) -> Result<Vec<PageText>, QaError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract_pages(&doc.bytes)));
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(QaError::Extraction(format!("PDF decoder panicked: {}", message)))
        }
    }
}

/// Extracts and concatenates the text of `documents` in input order.
pub fn extract_documents(
    extractor: &dyn PdfTextExtractor,
    documents: &[PdfDocument],
    with_separators: bool,
) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    for doc in documents {
        let pages = match open_pages(extractor, doc) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(document = %doc.name, error = %e, "skipping unreadable PDF");
                report.skipped.push(SkippedDocument {
                    name: doc.name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let mut body = String::new();
        for page in pages {
            match page.text {
                Ok(text) if !text.trim().is_empty() => {
                    body.push_str(&text);
                    body.push('\n');
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(document = %doc.name, page = page.number, error = %e, "skipping page");
                }
            }
        }

        if body.trim().is_empty() {
            warn!(document = %doc.name, "no text extracted");
            report.skipped.push(SkippedDocument {
                name: doc.name.clone(),
                reason: "no extractable text".to_string(),
            });
            continue;
        }

        if with_separators {
            report.text.push_str(&document_marker(&doc.name));
        }
        report.text.push_str(&body);
        report.processed.push(doc.name.clone());
    }

    report
}
