//! `pdfqa ingest`: extraction and chunking without embedding or LLM calls.
//!
//! Prints what an upload of the same files would produce, so a document that
//! yields no text shows up before anyone asks a question about it.

use anyhow::{bail, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assistant::validate_uploads;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::extract::{extract_documents, DefaultPdfExtractor, PdfTextExtractor};
use crate::files::read_documents;

pub async fn run_ingest(config: &Config, paths: &[PathBuf], show_chunks: bool) -> Result<()> {
    let mut stdout = std::io::stdout();
    ingest_to(
        Arc::new(DefaultPdfExtractor),
        config,
        paths,
        show_chunks,
        &mut stdout,
    )
    .await
}

async fn ingest_to(
    extractor: Arc<dyn PdfTextExtractor>,
    config: &Config,
    paths: &[PathBuf],
    show_chunks: bool,
    out: &mut impl Write,
) -> Result<()> {
    let documents = read_documents(paths)?;
    validate_uploads(&documents)?;

    let separators = config.extraction.document_separators;
    let report = tokio::task::spawn_blocking(move || {
        extract_documents(extractor.as_ref(), &documents, separators)
    })
    .await?;

    writeln!(out, "ingest")?;
    for name in &report.processed {
        writeln!(out, "  ok: {}", name)?;
    }
    for skipped in &report.skipped {
        writeln!(out, "  skipped: {} ({})", skipped.name, skipped.reason)?;
    }

    if report.is_empty() {
        bail!("No text could be extracted from the given PDFs");
    }

    let chunks = chunk_text(&report.text, &config.chunking);
    writeln!(out, "  characters: {}", report.text.chars().count())?;
    writeln!(out, "  chunks: {}", chunks.len())?;

    if show_chunks {
        for chunk in &chunks {
            writeln!(
                out,
                "--- chunk {} ({} chars, {}) ---\n{}",
                chunk.chunk_index,
                chunk.text.chars().count(),
                &chunk.hash[..12],
                chunk.text
            )?;
        }
    }

    writeln!(out, "ok")?;
    Ok(())
}
