//! Text extraction: pull the text layer of every page via pdfium.
//!
//! pdfium is a blocking C++ library with thread-local state, so all work runs
//! inside `tokio::task::spawn_blocking`. No layout analysis or OCR is done:
//! pages are read in order and joined with a newline after each.

use crate::error::ActError;
use crate::output::{DocumentMetadata, ExtractedDocument};
use crate::pipeline::input::PdfInput;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Directory holding an existing libpdfium, checked before the system library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Extract the text of every page in `input`.
///
/// # Errors
/// * [`ActError::EmptyDocument`] when no page has any text
/// * [`ActError::PasswordRequired`] / [`ActError::WrongPassword`] for
///   encrypted documents
/// * [`ActError::CorruptPdf`] when pdfium cannot parse the bytes
pub async fn extract_pdf(
    input: PdfInput,
    password: Option<String>,
) -> Result<ExtractedDocument, ActError> {
    tokio::task::spawn_blocking(move || {
        let (text, metadata) = extract_blocking(&input, password.as_deref())?;
        Ok(ExtractedDocument::from_pdf(text, input.name, metadata))
    })
    .await
    .map_err(|e| ActError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read document metadata without extracting text.
pub async fn read_metadata(
    input: PdfInput,
    password: Option<String>,
) -> Result<DocumentMetadata, ActError> {
    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = load_document(&pdfium, &input, password.as_deref())?;
        Ok(document_metadata(&document))
    })
    .await
    .map_err(|e| ActError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Join page texts the way the report expects: a newline after every page,
/// then trim the whole thing.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for page in pages {
        text.push_str(page.as_ref());
        text.push('\n');
    }
    text.trim().to_string()
}

fn extract_blocking(
    input: &PdfInput,
    password: Option<&str>,
) -> Result<(String, DocumentMetadata), ActError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, input, password)?;
    let metadata = document_metadata(&document);
    info!("PDF loaded: {} pages", metadata.page_count);

    let mut page_texts = Vec::with_capacity(metadata.page_count);
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ActError::ExtractionFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?
            .all();
        if text.trim().is_empty() {
            warn!("Page {} has no text layer", idx + 1);
        }
        debug!("Page {}: {} chars", idx + 1, text.len());
        page_texts.push(text);
    }

    let text = join_pages(&page_texts);
    if text.is_empty() {
        return Err(ActError::EmptyDocument {
            source_name: input.name.clone(),
            pages: metadata.page_count,
        });
    }

    Ok((text, metadata))
}

/// Bind to `$PDFIUM_LIB_PATH` if set, otherwise to the system library.
fn bind_pdfium() -> Result<Pdfium, ActError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(dir) if !dir.is_empty() => {
            debug!("Binding pdfium from {}", dir);
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ActError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    input: &'a PdfInput,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ActError> {
    pdfium
        .load_pdf_from_byte_slice(&input.bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ActError::WrongPassword {
                        source_name: input.name.clone(),
                    }
                } else {
                    ActError::PasswordRequired {
                        source_name: input.name.clone(),
                    }
                }
            } else {
                ActError::CorruptPdf {
                    source_name: input.name.clone(),
                    detail: err_str,
                }
            }
        })
}

fn document_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}
