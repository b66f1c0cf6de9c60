//! The two searchable collections and their fixed probe SQL.
//!
//! Table and column names are statically known; nothing from
//! configuration is ever interpolated into query structure.

/// Which collection an ANN probe targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Manual,
    Faq,
}

/// Manual probe: ascending inner-product distance over the HNSW
/// halfvec index, scoped by the category link table.
const MANUAL_PROBE_SQL: &str = "\
SELECT t.document_table_id, t.chunk_no, t.document_page, t.chunk_text, \
       (t.embedding::halfvec(3072) <#> $1::halfvec(3072))::float8 AS distance \
FROM pdf_manual_table t \
JOIN document_category_table c ON t.document_table_id = c.document_table_id \
WHERE c.business_category = $2 \
ORDER BY distance ASC \
LIMIT $3";

const FAQ_PROBE_SQL: &str = "\
SELECT t.document_table_id, t.document_page, t.faq_no, t.chunk_text, \
       (t.embedding::halfvec(3072) <#> $1::halfvec(3072))::float8 AS distance \
FROM pdf_faq_table t \
JOIN document_category_table c ON t.document_table_id = c.document_table_id \
WHERE c.business_category = $2 \
ORDER BY distance ASC \
LIMIT $3";

impl Collection {
    pub fn probe_sql(self) -> &'static str {
        match self {
            Collection::Manual => MANUAL_PROBE_SQL,
            Collection::Faq => FAQ_PROBE_SQL,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Collection::Manual => "pdf_manual_table",
            Collection::Faq => "pdf_faq_table",
        }
    }
}
