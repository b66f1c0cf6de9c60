//! Parsing of the first-pass model reply.
//!
//! The model is asked to answer with labelled line triples:
//!
//! ```text
//! PDFファイル名: filename1.pdf
//! PDF開始ページ: 10
//! PDF終了ページ: 15
//! ```
//!
//! Model output drifts, so the parser is tolerant: unrecognized lines
//! are ignored, a malformed or incomplete block is dropped without
//! taking its neighbors down, and an empty result is a normal outcome.

use serde::Serialize;

use refdesk_core::types::PageRange;

const FILE_LABEL: &str = "PDFファイル名:";
const START_LABEL: &str = "PDF開始ページ:";
const END_LABEL: &str = "PDF終了ページ:";

/// One document region the first pass pointed at, enriched with
/// presentation links for the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PdfReference {
    pub file_name: String,
    pub category: String,
    pub start_page: i32,
    pub end_page: i32,
    pub link: String,
    pub link_text: String,
}

impl PdfReference {
    fn from_range(range: &PageRange, category_name: &str) -> Self {
        Self {
            file_name: range.file_name.clone(),
            category: category_name.to_string(),
            start_page: range.start_page,
            end_page: range.end_page,
            link: format!(
                "pdf/manual/{category_name}/{}?start_page={}&end_page={}",
                range.file_name, range.start_page, range.end_page
            ),
            link_text: format!(
                "/manual/{category_name}/{}, p.{}-p.{}",
                range.file_name, range.start_page, range.end_page
            ),
        }
    }
}

/// Decorate parsed ranges with links for the `pdf_info` payload.
pub fn describe_ranges(ranges: &[PageRange], category_name: &str) -> Vec<PdfReference> {
    ranges
        .iter()
        .map(|range| PdfReference::from_range(range, category_name))
        .collect()
}

#[derive(Default)]
struct Block {
    file_name: Option<String>,
    start_page: Option<i32>,
    end_page: Option<i32>,
    malformed: bool,
}

impl Block {
    fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.start_page.is_none() && self.end_page.is_none()
    }

    fn finish(self) -> Option<PageRange> {
        if self.malformed {
            return None;
        }
        Some(PageRange {
            file_name: self.file_name?,
            start_page: self.start_page?,
            end_page: self.end_page?,
        })
    }
}

/// Extract complete (file, start, end) blocks from a first-pass reply.
pub fn parse_page_ranges(reply: &str) -> Vec<PageRange> {
    let mut ranges = Vec::new();
    let mut current = Block::default();

    for line in reply.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(FILE_LABEL) {
            // A new file name closes the previous block.
            if !current.is_empty() {
                if let Some(range) = std::mem::take(&mut current).finish() {
                    ranges.push(range);
                }
            }
            let name = rest.trim();
            if name.is_empty() {
                current.malformed = true;
            } else {
                current.file_name = Some(name.to_string());
            }
        } else if let Some(rest) = line.strip_prefix(START_LABEL) {
            match rest.trim().parse::<i32>() {
                Ok(page) => current.start_page = Some(page),
                Err(_) => current.malformed = true,
            }
        } else if let Some(rest) = line.strip_prefix(END_LABEL) {
            match rest.trim().parse::<i32>() {
                Ok(page) => current.end_page = Some(page),
                Err(_) => current.malformed = true,
            }
        }
        // Anything else (prose, blank lines) passes through untouched.
    }

    if let Some(range) = current.finish() {
        ranges.push(range);
    }

    if ranges.is_empty() {
        tracing::debug!("first-pass reply yielded no usable page ranges");
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_two_well_formed_blocks() {
        let reply = "\
PDFファイル名: guide.pdf
PDF開始ページ: 10
PDF終了ページ: 15

PDFファイル名: handbook.pdf
PDF開始ページ: 5
PDF終了ページ: 7
";
        let ranges = parse_page_ranges(reply);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].file_name, "guide.pdf");
        assert_eq!(ranges[0].start_page, 10);
        assert_eq!(ranges[0].end_page, 15);
        assert_eq!(ranges[1].file_name, "handbook.pdf");
    }

    #[test]
    fn test_ignores_surrounding_prose() {
        let reply = "\
関連が高いのは以下の通りです。

PDFファイル名: guide.pdf
PDF開始ページ: 3
PDF終了ページ: 4

以上です。
";
        let ranges = parse_page_ranges(reply);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_page, 3);
    }

    #[test]
    fn test_malformed_page_number_drops_only_that_block() {
        let reply = "\
PDFファイル名: bad.pdf
PDF開始ページ: ten
PDF終了ページ: 15

PDFファイル名: good.pdf
PDF開始ページ: 1
PDF終了ページ: 2
";
        let ranges = parse_page_ranges(reply);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].file_name, "good.pdf");
    }

    #[test]
    fn test_incomplete_trailing_block_is_dropped() {
        let reply = "\
PDFファイル名: guide.pdf
PDF開始ページ: 10
";
        assert!(parse_page_ranges(reply).is_empty());
    }

    #[test]
    fn test_missing_file_name_drops_block() {
        let reply = "\
PDF開始ページ: 10
PDF終了ページ: 15
";
        assert!(parse_page_ranges(reply).is_empty());
    }

    #[test]
    fn test_empty_reply_is_empty_result() {
        assert!(parse_page_ranges("").is_empty());
        assert!(parse_page_ranges("該当なし").is_empty());
    }

    #[test]
    fn test_indented_labels_still_recognized() {
        let reply = "    PDFファイル名: guide.pdf\n    PDF開始ページ: 2\n    PDF終了ページ: 9\n";
        let ranges = parse_page_ranges(reply);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].end_page, 9);
    }

    #[test]
    fn test_reference_links() {
        let range = PageRange {
            file_name: "guide.pdf".into(),
            start_page: 10,
            end_page: 15,
        };
        let refs = describe_ranges(std::slice::from_ref(&range), "収納");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].link, "pdf/manual/収納/guide.pdf?start_page=10&end_page=15");
        assert_eq!(refs[0].link_text, "/manual/収納/guide.pdf, p.10-p.15");
        assert_eq!(refs[0].category, "収納");
    }
}
