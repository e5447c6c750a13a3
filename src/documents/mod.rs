// Document loading
// Turns the PDF corpus into one raw text string for the chunker

#[cfg(test)]
mod tests;

use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{QaError, Result};

/// Anything that can produce the raw corpus text
pub trait DocumentSource: Send + Sync {
    /// Read the whole corpus as a single string
    fn load_text(&self) -> Result<String>;

    /// Human-readable origin, used in logs
    fn describe(&self) -> String;
}

/// A directory of PDF files, read in file-name order
#[derive(Debug, Clone)]
pub struct PdfDirectory {
    dir: PathBuf,
}

impl PdfDirectory {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentSource for PdfDirectory {
    #[inline]
    fn load_text(&self) -> Result<String> {
        let files = list_pdf_files(&self.dir)?;
        info!(
            "Extracting text from {} PDF files in {}",
            files.len(),
            self.dir.display()
        );

        let mut text = String::new();
        for file in &files {
            for page in extract_pdf_pages(file)? {
                text.push_str(&page);
            }
        }

        info!("Extracted {} characters of corpus text", text.chars().count());
        Ok(text)
    }

    #[inline]
    fn describe(&self) -> String {
        format!("PDF directory {}", self.dir.display())
    }
}

/// An in-memory corpus
#[derive(Debug, Clone)]
pub struct StaticText {
    text: String,
}

impl StaticText {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl DocumentSource for StaticText {
    #[inline]
    fn load_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    #[inline]
    fn describe(&self) -> String {
        format!("in-memory text ({} bytes)", self.text.len())
    }
}

/// List the `*.pdf` files of a directory, sorted by file name
///
/// A missing directory and a directory without PDFs both yield
/// `NoDocumentsFound`.
#[inline]
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(QaError::NoDocumentsFound {
                dir: dir.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(QaError::NoDocumentsFound {
            dir: dir.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Extract the text of every page of a PDF, in page order
///
/// A page whose text cannot be extracted contributes an empty string.
#[inline]
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let document = Document::load(path).map_err(|e| {
        QaError::Document(format!("Failed to parse PDF {}: {}", path.display(), e))
    })?;

    let pages = document.get_pages();
    debug!("{}: {} pages", path.display(), pages.len());

    let texts = pages
        .keys()
        .map(|&page_number| {
            document.extract_text(&[page_number]).unwrap_or_else(|e| {
                warn!(
                    "No extractable text on page {} of {}: {}",
                    page_number,
                    path.display(),
                    e
                );
                String::new()
            })
        })
        .collect();

    Ok(texts)
}
