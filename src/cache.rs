use crate::types::{PostalCode, ZoneFeature};
use std::collections::HashMap;
use std::sync::Arc;

/// Session-lifetime store of fetched zone geometries.
///
/// First write wins: once a postal code is present its entry is never replaced or evicted.
#[derive(Debug, Default)]
pub struct GeometryCache {
    entries: HashMap<PostalCode, Arc<ZoneFeature>>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&Arc<ZoneFeature>> {
        self.entries.get(code)
    }

    /// Inserts `feature` under `code` unless an entry exists. Returns the cached entry.
    pub fn put(&mut self, code: PostalCode, feature: Arc<ZoneFeature>) -> Arc<ZoneFeature> {
        Arc::clone(self.entries.entry(code).or_insert(feature))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
