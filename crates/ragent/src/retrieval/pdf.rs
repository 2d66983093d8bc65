use lopdf::Document;
use serde_json::json;
use std::path::Path;
use tracing::{debug, warn};

use super::SourceDocument;
use crate::errors::{RagError, RagResult};

/// Read a PDF into one document per page.
///
/// Each document carries `source`, `page` (1-based) and `total_pages` metadata.
/// Pages whose text cannot be extracted are skipped with a warning.
pub fn load_pdf(path: &Path) -> RagResult<Vec<SourceDocument>> {
    let document = Document::load(path).map_err(|e| {
        RagError::configuration(format!("failed to open {}: {}", path.display(), e))
    })?;

    let pages = document.get_pages();
    let total_pages = pages.len();
    let source = path.display().to_string();
    let mut documents = Vec::with_capacity(total_pages);

    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => documents.push(
                SourceDocument::new(text)
                    .with_metadata("source", json!(source))
                    .with_metadata("page", json!(page_number))
                    .with_metadata("total_pages", json!(total_pages)),
            ),
            Err(e) => warn!(page = page_number, error = %e, "skipping unreadable page"),
        }
    }

    debug!(source = %source, pages = documents.len(), "loaded pdf");
    Ok(documents)
}
