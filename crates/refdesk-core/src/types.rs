//! Shared data types.
//!
//! Raw rows (`ManualHit`, `FaqHit`) come straight out of the ANN
//! probes; the engine formats them into `SearchHit` records and
//! assembles the final `Evidence` set. All of these are per-request
//! and never persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document kind stored in `document_table.document_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Manual,
    Faq,
    Toc,
}

impl DocumentKind {
    /// Numeric value used in the document table.
    pub fn as_i16(self) -> i16 {
        match self {
            DocumentKind::Manual => 1,
            DocumentKind::Faq => 2,
            DocumentKind::Toc => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Manual => "manual",
            DocumentKind::Faq => "faq",
            DocumentKind::Toc => "toc",
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = crate::RefdeskError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "manual" => Ok(DocumentKind::Manual),
            "faq" => Ok(DocumentKind::Faq),
            "toc" => Ok(DocumentKind::Toc),
            other => Err(crate::RefdeskError::Validation(format!(
                "invalid document type: {other}"
            ))),
        }
    }
}

/// Raw manual-collection probe row.
#[derive(Debug, Clone)]
pub struct ManualHit {
    pub document_id: Uuid,
    pub chunk_no: i32,
    pub page: i32,
    pub text: String,
    /// Inner-product distance; smaller is more similar.
    pub distance: f64,
}

/// Raw FAQ-collection probe row.
#[derive(Debug, Clone)]
pub struct FaqHit {
    pub document_id: Uuid,
    pub page: i32,
    /// Identifier parsed out of the source text at ingestion; may be null.
    pub faq_no: Option<i32>,
    pub text: String,
    pub distance: f64,
}

/// Provenance of a probe row, resolved via the document table.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub file_path: String,
    pub file_name: String,
}

/// A page range already covered by the TOC-guided first pass.
///
/// Hits whose file name matches and whose page falls inside
/// `[start_page, end_page]` (inclusive) are suppressed from the
/// second-pass results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub file_name: String,
    pub start_page: i32,
    pub end_page: i32,
}

impl PageRange {
    pub fn covers(&self, file_name: &str, page: i32) -> bool {
        self.file_name == file_name && self.start_page <= page && page <= self.end_page
    }
}

/// A formatted, deduplicated search result sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Null when the owning document row is missing (unresolved
    /// provenance — the hit is still evidence).
    pub file_name: Option<String>,
    pub page: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faq_no: Option<i32>,
    pub chunk_text: String,
    pub distance: f64,
    pub category: String,
    pub document_type: DocumentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl SearchHit {
    /// Manual dedup identity: multiple chunks on one page are
    /// near-duplicates of intent and collapse to the first by distance.
    pub fn page_key(&self) -> (Option<&str>, i32) {
        (self.file_name.as_deref(), self.page)
    }

    /// FAQ dedup identity: distinct entries on one page are distinct facts.
    pub fn entry_key(&self) -> (Option<&str>, i32, Option<i32>) {
        (self.file_name.as_deref(), self.page, self.faq_no)
    }
}

/// Final bounded evidence set handed to the generation stage.
///
/// `manual_texts[i]` is always `manual_results[i].chunk_text`; the
/// parallel lists exist so the prompt builder can consume plain text
/// without re-walking the records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Evidence {
    pub manual_results: Vec<SearchHit>,
    pub faq_results: Vec<SearchHit>,
    pub manual_texts: Vec<String>,
    pub faq_texts: Vec<String>,
}

impl Evidence {
    /// True when zero results survived filtering for both collections.
    pub fn is_empty(&self) -> bool {
        self.manual_results.is_empty() && self.faq_results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_round_trip() {
        assert_eq!(DocumentKind::Manual.as_i16(), 1);
        assert_eq!(DocumentKind::Faq.as_i16(), 2);
        assert_eq!(DocumentKind::Toc.as_i16(), 3);
        assert_eq!("manual".parse::<DocumentKind>().unwrap(), DocumentKind::Manual);
        assert_eq!("faq".parse::<DocumentKind>().unwrap(), DocumentKind::Faq);
        assert!("xlsx".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_page_range_covers_inclusive_bounds() {
        let range = PageRange {
            file_name: "guide.pdf".into(),
            start_page: 10,
            end_page: 15,
        };
        assert!(range.covers("guide.pdf", 10));
        assert!(range.covers("guide.pdf", 12));
        assert!(range.covers("guide.pdf", 15));
        assert!(!range.covers("guide.pdf", 9));
        assert!(!range.covers("guide.pdf", 16));
        assert!(!range.covers("other.pdf", 12));
    }

    #[test]
    fn test_evidence_empty() {
        let ev = Evidence::default();
        assert!(ev.is_empty());
    }
}
