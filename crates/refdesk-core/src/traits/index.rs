//! Read-only access to the document/vector store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{DocumentInfo, FaqHit, ManualHit};

/// Read-only view over the two document collections and their
/// supporting tables. Implementations must not mutate stored state.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Nearest manual chunks for `embedding` within `category`, ordered
    /// by ascending inner-product distance, at most `limit` rows.
    async fn manual_candidates(
        &self,
        embedding: &[f32],
        category: i16,
        limit: i64,
    ) -> Result<Vec<ManualHit>>;

    /// Nearest FAQ entries, same contract as `manual_candidates`.
    async fn faq_candidates(
        &self,
        embedding: &[f32],
        category: i16,
        limit: i64,
    ) -> Result<Vec<FaqHit>>;

    /// Provenance lookup; `None` when the document row is missing.
    async fn document_info(&self, id: Uuid) -> Result<Option<DocumentInfo>>;

    /// Document id for a file name within a category.
    async fn document_id(&self, file_name: &str, category: i16) -> Result<Option<Uuid>>;

    /// All TOC blobs for a category joined by a blank line; empty
    /// string when the category has none.
    async fn toc_text(&self, category: i16) -> Result<String>;

    /// Manual chunk text for a page range, ordered by page then chunk,
    /// joined by a space.
    async fn chunk_text_for_pages(
        &self,
        document_id: Uuid,
        start_page: i32,
        end_page: i32,
    ) -> Result<String>;

    /// Distinct category ids present in the link table.
    async fn available_category_ids(&self) -> Result<Vec<i16>>;
}
