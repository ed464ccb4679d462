//! Loading PDFs from local paths for the terminal commands.
//!
//! A file argument is taken as-is, whatever its extension, so a stray
//! `notes.txt` is rejected by upload validation rather than silently
//! dropped. A directory argument is walked recursively and contributes every
//! `*.pdf` file below it, in file-name order.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::PdfDocument;

/// Expands `paths` into the list of files to load.
pub fn collect_pdf_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        let walker = WalkDir::new(path).sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            let is_pdf = PdfDocument::has_pdf_name(&entry.file_name().to_string_lossy());
            if entry.file_type().is_file() && is_pdf {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

/// Reads every file under `paths` into memory.
pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<PdfDocument>> {
    collect_pdf_paths(paths)?
        .iter()
        .map(|path| read_document(path))
        .collect()
}

fn read_document(path: &Path) -> Result<PdfDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(PdfDocument::new(name, bytes))
}
