//! The search engine: probe, format, dedup, exclude, cap, order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use refdesk_core::CategoryMap;
use refdesk_core::config::SearchConfig;
use refdesk_core::error::{RefdeskError, Result};
use refdesk_core::traits::DocumentIndex;
use refdesk_core::types::{DocumentKind, Evidence, PageRange, SearchHit};

/// Tuning knobs for one engine instance.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Declared vector width; mismatches fail before any query.
    pub embedding_dim: usize,
    pub manual_cap: usize,
    pub faq_cap: usize,
    /// Over-fetch count so enough candidates survive filtering.
    pub probe_limit: i64,
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            embedding_dim: config.embedding_dim,
            manual_cap: config.manual_top_k,
            faq_cap: config.faq_top_k,
            probe_limit: config.probe_limit,
        }
    }
}

/// Retrieval engine over an injected document index.
pub struct SearchEngine {
    index: Arc<dyn DocumentIndex>,
    categories: CategoryMap,
    options: SearchOptions,
}

impl SearchEngine {
    pub fn new(index: Arc<dyn DocumentIndex>, categories: CategoryMap, options: SearchOptions) -> Self {
        Self { index, categories, options }
    }

    pub fn category_name(&self, id: i16) -> Option<&str> {
        self.categories.name_of(id)
    }

    /// Configured categories that actually have documents in the store.
    pub async fn available_categories(&self) -> Result<BTreeMap<String, i16>> {
        let present = self.index.available_category_ids().await?;
        Ok(self.categories.available(&present))
    }

    /// TOC text for a category, for the first-pass prompt.
    pub async fn toc_text(&self, category: i16) -> Result<String> {
        self.index.toc_text(category).await
    }

    /// Manual chunk text for each first-pass page range, used as
    /// reference context in the final prompt. Ranges whose file name
    /// resolves to no document are skipped.
    pub async fn context_for_ranges(
        &self,
        ranges: &[PageRange],
        category: i16,
    ) -> Result<Vec<String>> {
        let mut texts = Vec::with_capacity(ranges.len());
        for range in ranges {
            match self.index.document_id(&range.file_name, category).await? {
                Some(document_id) => {
                    let text = self
                        .index
                        .chunk_text_for_pages(document_id, range.start_page, range.end_page)
                        .await?;
                    texts.push(text);
                }
                None => {
                    tracing::warn!(
                        file_name = %range.file_name,
                        category,
                        "first-pass range names an unknown document, skipping"
                    );
                }
            }
        }
        Ok(texts)
    }

    /// Core search: bounded, deduplicated, exclusion-filtered evidence
    /// from both collections, each list ordered by ascending distance.
    pub async fn search(
        &self,
        embedding: &[f32],
        category: i16,
        exclusions: &[PageRange],
    ) -> Result<Evidence> {
        if embedding.len() != self.options.embedding_dim {
            return Err(RefdeskError::Validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.options.embedding_dim,
                embedding.len()
            )));
        }

        // Unknown category mirrors "no matches": empty, not an error.
        // (A missing category field is rejected at the transport layer.)
        let Some(category_name) = self.categories.name_of(category) else {
            tracing::debug!(category, "category not configured, returning empty evidence");
            return Ok(Evidence::default());
        };
        let category_name = category_name.to_string();

        // Independent reads; issue both probes concurrently.
        let (manual_rows, faq_rows) = tokio::join!(
            self.index
                .manual_candidates(embedding, category, self.options.probe_limit),
            self.index
                .faq_candidates(embedding, category, self.options.probe_limit),
        );
        let manual_rows = manual_rows?;
        let faq_rows = faq_rows?;

        // Resolve provenance once per distinct document.
        let mut doc_ids: Vec<Uuid> = manual_rows
            .iter()
            .map(|r| r.document_id)
            .chain(faq_rows.iter().map(|r| r.document_id))
            .collect();
        doc_ids.sort_unstable();
        doc_ids.dedup();

        let mut file_names: HashMap<Uuid, Option<String>> = HashMap::with_capacity(doc_ids.len());
        let mut unresolved = 0usize;
        for id in doc_ids {
            let info = self.index.document_info(id).await?;
            if info.is_none() {
                unresolved += 1;
            }
            file_names.insert(id, info.map(|d| d.file_name));
        }
        if unresolved > 0 {
            // A hit with unresolved provenance is still evidence, but
            // worth surfacing for observability.
            tracing::warn!(unresolved, category, "chunks reference missing document rows");
        }

        let mut manual_results: Vec<SearchHit> = Vec::with_capacity(self.options.manual_cap);
        let mut seen_pages: HashSet<(Option<String>, Option<Uuid>, i32)> = HashSet::new();
        for row in manual_rows {
            // Checked before accepting, so a cap of zero admits nothing.
            if manual_results.len() >= self.options.manual_cap {
                break;
            }
            let file_name = file_names.get(&row.document_id).cloned().flatten();
            if is_excluded(file_name.as_deref(), row.page, exclusions) {
                continue;
            }
            // Unresolved rows keep their document id in the key so two
            // orphan documents sharing a page number stay distinct.
            let orphan_id = file_name.is_none().then_some(row.document_id);
            let key = (file_name.clone(), orphan_id, row.page);
            if !seen_pages.insert(key) {
                continue;
            }
            manual_results.push(format_hit(
                file_name,
                row.page,
                None,
                row.text,
                row.distance,
                &category_name,
                DocumentKind::Manual,
            ));
        }

        let mut faq_results: Vec<SearchHit> = Vec::with_capacity(self.options.faq_cap);
        let mut seen_entries: HashSet<(Option<String>, Option<Uuid>, i32, Option<i32>)> =
            HashSet::new();
        for row in faq_rows {
            if faq_results.len() >= self.options.faq_cap {
                break;
            }
            let file_name = file_names.get(&row.document_id).cloned().flatten();
            if is_excluded(file_name.as_deref(), row.page, exclusions) {
                continue;
            }
            let orphan_id = file_name.is_none().then_some(row.document_id);
            let key = (file_name.clone(), orphan_id, row.page, row.faq_no);
            if !seen_entries.insert(key) {
                continue;
            }
            faq_results.push(format_hit(
                file_name,
                row.page,
                row.faq_no,
                row.text,
                row.distance,
                &category_name,
                DocumentKind::Faq,
            ));
        }

        // Probe order is already ascending, but the final output must
        // be non-decreasing regardless of upstream interleavings.
        sort_by_distance(&mut manual_results);
        sort_by_distance(&mut faq_results);

        // Text lists are derived AFTER ordering so they stay parallel.
        let manual_texts = manual_results.iter().map(|r| r.chunk_text.clone()).collect();
        let faq_texts = faq_results.iter().map(|r| r.chunk_text.clone()).collect();

        tracing::info!(
            category,
            manual = manual_results.len(),
            faq = faq_results.len(),
            "search assembled evidence"
        );

        Ok(Evidence { manual_results, faq_results, manual_texts, faq_texts })
    }
}

fn sort_by_distance(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// A hit without provenance can never match an exclusion entry.
fn is_excluded(file_name: Option<&str>, page: i32, exclusions: &[PageRange]) -> bool {
    match file_name {
        Some(name) => exclusions.iter().any(|range| range.covers(name, page)),
        None => false,
    }
}

fn format_hit(
    file_name: Option<String>,
    page: i32,
    faq_no: Option<i32>,
    chunk_text: String,
    distance: f64,
    category_name: &str,
    kind: DocumentKind,
) -> SearchHit {
    let (link_text, link) = match file_name.as_deref() {
        Some(name) => (
            Some(format!("/{}/{category_name}/{name}, p.{page}", kind.as_str())),
            Some(format!("pdf/{}/{category_name}/{name}?page={page}", kind.as_str())),
        ),
        None => (None, None),
    };
    SearchHit {
        file_name,
        page,
        faq_no,
        chunk_text,
        distance,
        category: category_name.to_string(),
        document_type: kind,
        link_text,
        link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use refdesk_core::types::{DocumentInfo, FaqHit, ManualHit};

    const CATEGORY: i16 = 2; // 収納

    /// In-memory index double; counts probes so tests can assert that
    /// validation failures never reach the store.
    #[derive(Default)]
    struct FakeIndex {
        manual: Vec<ManualHit>,
        faq: Vec<FaqHit>,
        documents: HashMap<Uuid, DocumentInfo>,
        category: i16,
        probes: AtomicUsize,
    }

    impl FakeIndex {
        fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentIndex for FakeIndex {
        async fn manual_candidates(
            &self,
            _embedding: &[f32],
            category: i16,
            limit: i64,
        ) -> Result<Vec<ManualHit>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if category != self.category {
                return Ok(vec![]);
            }
            Ok(self.manual.iter().take(limit as usize).cloned().collect())
        }

        async fn faq_candidates(
            &self,
            _embedding: &[f32],
            category: i16,
            limit: i64,
        ) -> Result<Vec<FaqHit>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if category != self.category {
                return Ok(vec![]);
            }
            Ok(self.faq.iter().take(limit as usize).cloned().collect())
        }

        async fn document_info(&self, id: Uuid) -> Result<Option<DocumentInfo>> {
            Ok(self.documents.get(&id).cloned())
        }

        async fn document_id(&self, file_name: &str, _category: i16) -> Result<Option<Uuid>> {
            Ok(self
                .documents
                .iter()
                .find(|(_, d)| d.file_name == file_name)
                .map(|(id, _)| *id))
        }

        async fn toc_text(&self, _category: i16) -> Result<String> {
            Ok(String::new())
        }

        async fn chunk_text_for_pages(&self, _id: Uuid, _start: i32, _end: i32) -> Result<String> {
            Ok(String::new())
        }

        async fn available_category_ids(&self) -> Result<Vec<i16>> {
            Ok(vec![self.category])
        }
    }

    fn categories() -> CategoryMap {
        let mapping = [("収納".to_string(), 2i16), ("保全".to_string(), 3i16)]
            .into_iter()
            .collect();
        CategoryMap::new(&mapping)
    }

    fn options() -> SearchOptions {
        SearchOptions { embedding_dim: 3072, manual_cap: 4, faq_cap: 3, probe_limit: 50 }
    }

    fn embedding() -> Vec<f32> {
        vec![0.1; 3072]
    }

    fn manual_hit(doc: Uuid, page: i32, distance: f64) -> ManualHit {
        ManualHit {
            document_id: doc,
            chunk_no: 1,
            page,
            text: format!("manual text p{page} d{distance}"),
            distance,
        }
    }

    fn faq_hit(doc: Uuid, page: i32, faq_no: Option<i32>, distance: f64) -> FaqHit {
        FaqHit {
            document_id: doc,
            page,
            faq_no,
            text: format!("faq text p{page} n{faq_no:?}"),
            distance,
        }
    }

    fn engine_with(index: FakeIndex) -> (SearchEngine, Arc<FakeIndex>) {
        let index = Arc::new(index);
        let engine = SearchEngine::new(index.clone(), categories(), options());
        (engine, index)
    }

    fn doc(documents: &mut HashMap<Uuid, DocumentInfo>, file_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        documents.insert(
            id,
            DocumentInfo {
                file_path: format!("/data/pdf/manual/収納/{file_name}"),
                file_name: file_name.to_string(),
            },
        );
        id
    }

    #[tokio::test]
    async fn test_same_page_chunks_collapse_to_first_by_distance() {
        // Five near-duplicate chunks on page 3 and two on page 7 of
        // guide.pdf: page 3 must yield exactly one record.
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = vec![
            manual_hit(guide, 3, -0.95),
            manual_hit(guide, 3, -0.94),
            manual_hit(guide, 3, -0.93),
            manual_hit(guide, 3, -0.92),
            manual_hit(guide, 3, -0.91),
            manual_hit(guide, 7, -0.80),
            manual_hit(guide, 7, -0.79),
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert_eq!(evidence.manual_results.len(), 2);
        assert_eq!(evidence.manual_results[0].page, 3);
        assert_eq!(evidence.manual_results[0].distance, -0.95);
        assert_eq!(evidence.manual_results[1].page, 7);
    }

    #[tokio::test]
    async fn test_cap_invariant_holds_under_many_distinct_pages() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = (1..=20)
            .map(|page| manual_hit(guide, page, -1.0 + page as f64 * 0.01))
            .collect();
        let faq = (1..=20)
            .map(|page| faq_hit(guide, page, Some(page), -1.0 + page as f64 * 0.01))
            .collect();
        let (engine, _) = engine_with(FakeIndex {
            manual,
            faq,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert_eq!(evidence.manual_results.len(), 4);
        assert_eq!(evidence.faq_results.len(), 3);
    }

    #[tokio::test]
    async fn test_dedup_keys_unique_across_accepted_results() {
        let mut documents = HashMap::new();
        let a = doc(&mut documents, "a.pdf");
        let b = doc(&mut documents, "b.pdf");
        let manual = vec![
            manual_hit(a, 1, -0.9),
            manual_hit(b, 1, -0.89), // same page, different file: distinct
            manual_hit(a, 1, -0.88), // duplicate of first
            manual_hit(a, 2, -0.87),
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        let keys: HashSet<_> = evidence
            .manual_results
            .iter()
            .map(|r| r.page_key())
            .collect();
        assert_eq!(keys.len(), evidence.manual_results.len());
        assert_eq!(evidence.manual_results.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_caps_admit_nothing() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = (1..=5)
            .map(|page| manual_hit(guide, page, -1.0 + page as f64 * 0.01))
            .collect();
        let faq = (1..=5)
            .map(|page| faq_hit(guide, page, Some(page), -1.0 + page as f64 * 0.01))
            .collect();
        let index = FakeIndex {
            manual,
            faq,
            documents,
            category: CATEGORY,
            ..Default::default()
        };
        let engine = SearchEngine::new(
            Arc::new(index),
            categories(),
            SearchOptions { manual_cap: 0, faq_cap: 0, ..options() },
        );

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert!(evidence.manual_results.is_empty());
        assert!(evidence.faq_results.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_page_dropped_even_when_closest() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = vec![
            manual_hit(guide, 12, -0.99), // inside exclusion, best distance
            manual_hit(guide, 20, -0.50),
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let exclusions = vec![PageRange {
            file_name: "guide.pdf".into(),
            start_page: 10,
            end_page: 15,
        }];
        let evidence = engine.search(&embedding(), CATEGORY, &exclusions).await.unwrap();
        assert_eq!(evidence.manual_results.len(), 1);
        assert_eq!(evidence.manual_results[0].page, 20);
    }

    #[tokio::test]
    async fn test_exclusion_applies_to_faq_results_too() {
        let mut documents = HashMap::new();
        let faq_doc = doc(&mut documents, "faq.pdf");
        let faq = vec![
            faq_hit(faq_doc, 12, Some(1), -0.99),
            faq_hit(faq_doc, 30, Some(2), -0.50),
        ];
        let (engine, _) = engine_with(FakeIndex {
            faq,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let exclusions = vec![PageRange {
            file_name: "faq.pdf".into(),
            start_page: 10,
            end_page: 15,
        }];
        let evidence = engine.search(&embedding(), CATEGORY, &exclusions).await.unwrap();
        assert_eq!(evidence.faq_results.len(), 1);
        assert_eq!(evidence.faq_results[0].page, 30);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_any_probe() {
        let (engine, index) = engine_with(FakeIndex {
            category: CATEGORY,
            ..Default::default()
        });

        let short = vec![0.1f32; 1536];
        let err = engine.search(&short, CATEGORY, &[]).await.unwrap_err();
        assert!(matches!(err, RefdeskError::Validation(_)));
        assert_eq!(index.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_category_returns_empty_not_error() {
        let (engine, _) = engine_with(FakeIndex {
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), 99, &[]).await.unwrap();
        assert!(evidence.is_empty());
        assert!(evidence.manual_texts.is_empty());
        assert!(evidence.faq_texts.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_faq_entries_on_one_page_both_kept() {
        let mut documents = HashMap::new();
        let faq_doc = doc(&mut documents, "faq.pdf");
        let faq = vec![
            faq_hit(faq_doc, 4, Some(1), -0.9),
            faq_hit(faq_doc, 4, Some(2), -0.8),
            faq_hit(faq_doc, 4, Some(1), -0.7), // duplicate entry
        ];
        let (engine, _) = engine_with(FakeIndex {
            faq,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert_eq!(evidence.faq_results.len(), 2);
        assert_eq!(evidence.faq_results[0].faq_no, Some(1));
        assert_eq!(evidence.faq_results[1].faq_no, Some(2));
    }

    #[tokio::test]
    async fn test_missing_document_yields_null_provenance_and_batch_survives() {
        let mut documents = HashMap::new();
        let known = doc(&mut documents, "known.pdf");
        let orphan = Uuid::new_v4(); // no document row
        let manual = vec![manual_hit(orphan, 5, -0.9), manual_hit(known, 6, -0.8)];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert_eq!(evidence.manual_results.len(), 2);
        assert_eq!(evidence.manual_results[0].file_name, None);
        assert_eq!(evidence.manual_results[0].link, None);
        assert_eq!(evidence.manual_results[1].file_name.as_deref(), Some("known.pdf"));
    }

    #[tokio::test]
    async fn test_orphan_documents_on_same_page_stay_distinct() {
        // Two chunks on page 5 from different missing documents are
        // different evidence; only same-document orphans collapse.
        let orphan_a = Uuid::new_v4();
        let orphan_b = Uuid::new_v4();
        let manual = vec![
            manual_hit(orphan_a, 5, -0.9),
            manual_hit(orphan_b, 5, -0.8),
            manual_hit(orphan_a, 5, -0.7), // same orphan, same page
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        assert_eq!(evidence.manual_results.len(), 2);
        assert!(evidence.manual_results.iter().all(|r| r.file_name.is_none()));
    }

    #[tokio::test]
    async fn test_output_ordered_by_ascending_distance() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        // Out-of-order probe result; the engine must still emit a
        // non-decreasing sequence.
        let manual = vec![
            manual_hit(guide, 1, -0.5),
            manual_hit(guide, 2, -0.9),
            manual_hit(guide, 3, -0.7),
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        let distances: Vec<f64> = evidence.manual_results.iter().map(|r| r.distance).collect();
        let mut sorted = distances.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(distances, sorted);
    }

    #[tokio::test]
    async fn test_text_lists_parallel_to_records_after_sorting() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = vec![
            manual_hit(guide, 1, -0.5),
            manual_hit(guide, 2, -0.9),
        ];
        let faq = vec![
            faq_hit(guide, 1, Some(2), -0.3),
            faq_hit(guide, 2, Some(7), -0.6),
        ];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            faq,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        for (record, text) in evidence.manual_results.iter().zip(&evidence.manual_texts) {
            assert_eq!(&record.chunk_text, text);
        }
        for (record, text) in evidence.faq_results.iter().zip(&evidence.faq_texts) {
            assert_eq!(&record.chunk_text, text);
        }
    }

    #[tokio::test]
    async fn test_links_carry_category_and_page() {
        let mut documents = HashMap::new();
        let guide = doc(&mut documents, "guide.pdf");
        let manual = vec![manual_hit(guide, 3, -0.9)];
        let (engine, _) = engine_with(FakeIndex {
            manual,
            documents,
            category: CATEGORY,
            ..Default::default()
        });

        let evidence = engine.search(&embedding(), CATEGORY, &[]).await.unwrap();
        let hit = &evidence.manual_results[0];
        assert_eq!(hit.link_text.as_deref(), Some("/manual/収納/guide.pdf, p.3"));
        assert_eq!(hit.link.as_deref(), Some("pdf/manual/収納/guide.pdf?page=3"));
        assert_eq!(hit.category, "収納");
    }

    #[tokio::test]
    async fn test_available_categories_intersects_store() {
        let (engine, _) = engine_with(FakeIndex {
            category: CATEGORY,
            ..Default::default()
        });

        let available = engine.available_categories().await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available.get("収納"), Some(&2));
    }
}
