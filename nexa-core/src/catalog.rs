//! Catalog collaborator interface.
//!
//! The persistent library catalog is owned by another subsystem; the
//! playback core only reads from it through this trait. `MemoryCatalog`
//! is an in-process implementation used by tests and embedded setups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ItemId, MediaKind, MediaPart, MediaPartId, MediaSourceFacts};
use crate::Result;

/// Display-level facts about a library item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: ItemId,
    pub kind: MediaKind,
    pub title: String,
    pub parent_title: Option<String>,
    pub duration_ms: Option<u64>,
    pub thumb_url: Option<String>,
    /// Direct playback URL for items that need no transcoding (images).
    pub direct_image_url: Option<String>,
}

/// Opaque filter handed through from seeds to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub filter: String,
    pub sort: Option<String>,
}

/// Read-only catalog lookups the playback core depends on.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Display facts for one item.
    async fn item(&self, id: &ItemId) -> Result<Option<ItemSummary>>;

    /// Full media facts for planning playback of one item.
    async fn source_facts(&self, id: &ItemId) -> Result<Option<MediaSourceFacts>>;

    /// One media part by id.
    async fn part(&self, id: &MediaPartId) -> Result<Option<MediaPart>>;

    /// Ordered children of a container item (album tracks, season
    /// episodes, show seasons flattened, collection members).
    async fn children(&self, container: &ItemId) -> Result<Vec<ItemId>>;

    /// A page of a library section, optionally filtered/sorted.
    async fn section_items(
        &self,
        section_id: &str,
        filter: Option<&CatalogFilter>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ItemId>>;

    /// Total section size when cheap to compute, `None` otherwise.
    async fn section_count(
        &self,
        section_id: &str,
        filter: Option<&CatalogFilter>,
    ) -> Result<Option<u64>>;
}

/// In-memory catalog for tests and embedded use.
#[derive(Default)]
pub struct MemoryCatalog {
    items: parking_lot::RwLock<HashMap<ItemId, ItemSummary>>,
    facts: parking_lot::RwLock<HashMap<ItemId, MediaSourceFacts>>,
    parts: parking_lot::RwLock<HashMap<MediaPartId, MediaPart>>,
    children: parking_lot::RwLock<HashMap<ItemId, Vec<ItemId>>>,
    sections: parking_lot::RwLock<HashMap<String, Vec<ItemId>>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_item(&self, summary: ItemSummary) {
        self.items.write().insert(summary.id.clone(), summary);
    }

    pub fn insert_facts(&self, facts: MediaSourceFacts) {
        self.parts
            .write()
            .insert(facts.part.id.clone(), facts.part.clone());
        self.facts.write().insert(facts.item_id.clone(), facts);
    }

    pub fn insert_children(&self, container: ItemId, ids: Vec<ItemId>) {
        self.children.write().insert(container, ids);
    }

    pub fn insert_section(&self, section_id: &str, ids: Vec<ItemId>) {
        self.sections.write().insert(section_id.to_string(), ids);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn item(&self, id: &ItemId) -> Result<Option<ItemSummary>> {
        Ok(self.items.read().get(id).cloned())
    }

    async fn source_facts(&self, id: &ItemId) -> Result<Option<MediaSourceFacts>> {
        Ok(self.facts.read().get(id).cloned())
    }

    async fn part(&self, id: &MediaPartId) -> Result<Option<MediaPart>> {
        Ok(self.parts.read().get(id).cloned())
    }

    async fn children(&self, container: &ItemId) -> Result<Vec<ItemId>> {
        Ok(self.children.read().get(container).cloned().unwrap_or_default())
    }

    async fn section_items(
        &self,
        section_id: &str,
        _filter: Option<&CatalogFilter>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ItemId>> {
        let sections = self.sections.read();
        let Some(ids) = sections.get(section_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn section_count(
        &self,
        section_id: &str,
        _filter: Option<&CatalogFilter>,
    ) -> Result<Option<u64>> {
        Ok(self
            .sections
            .read()
            .get(section_id)
            .map(|ids| ids.len() as u64))
    }
}
