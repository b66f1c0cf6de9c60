//! Business-category resolver.
//!
//! A small bidirectional lookup built once at startup from the
//! configured name -> id mapping. Categories partition which documents
//! are searchable together; the gateway only advertises categories
//! that actually have documents in the store.

use std::collections::{BTreeMap, HashMap};

/// Bidirectional category name <-> id map.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    by_name: HashMap<String, i16>,
    by_id: HashMap<i16, String>,
    /// Display order as configured.
    ordered: Vec<(String, i16)>,
}

impl CategoryMap {
    pub fn new(mapping: &BTreeMap<String, i16>) -> Self {
        let mut by_name = HashMap::with_capacity(mapping.len());
        let mut by_id = HashMap::with_capacity(mapping.len());
        let mut ordered = Vec::with_capacity(mapping.len());
        for (name, &id) in mapping {
            by_name.insert(name.clone(), id);
            by_id.insert(id, name.clone());
            ordered.push((name.clone(), id));
        }
        Self { by_name, by_id, ordered }
    }

    /// Display name for a category id, if configured.
    pub fn name_of(&self, id: i16) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Numeric id for a display name, if configured.
    pub fn id_of(&self, name: &str) -> Option<i16> {
        self.by_name.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Configured categories restricted to ids actually present in the
    /// store; categories with no documents are omitted.
    pub fn available(&self, present_ids: &[i16]) -> BTreeMap<String, i16> {
        self.ordered
            .iter()
            .filter(|(_, id)| present_ids.contains(id))
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }
}
