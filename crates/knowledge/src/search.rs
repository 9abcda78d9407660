//! Document similarity search.

use crate::embeddings::EmbeddingProvider;
use crate::store::Store;
use crate::types::Document;
use gamefi_core::{AppError, AppResult};
use tracing::{debug, instrument};

/// Embed `text` and return the nearest documents, closest first.
#[instrument(skip(embedder, store, text))]
pub async fn search_documents(
    embedder: &dyn EmbeddingProvider,
    store: &dyn Store,
    text: &str,
    limit: usize,
) -> AppResult<Vec<Document>> {
    if text.trim().is_empty() {
        return Err(AppError::Retrieval("Search text is empty".to_string()));
    }
    if limit == 0 {
        return Ok(Vec::new());
    }

    let embedding = embedder.embed(text).await?;
    let documents = store.similar_documents(&embedding, limit).await?;
    debug!(matches = documents.len(), "Document search complete");
    Ok(documents)
}

/// Render documents as numbered `Document n` blocks.
pub fn render_documents(documents: &[Document]) -> String {
    let mut out = String::new();
    for (i, doc) in documents.iter().enumerate() {
        out.push_str(&format!("Document {}:\n", i + 1));
        out.push_str(&format!("Collection Slug: {}\n", doc.collection_slug));
        out.push_str(&format!("CID: {}\n", doc.cid));
        out.push_str(&format!("Content: {}\n", doc.content));
        out.push('\n');
    }
    out
}
