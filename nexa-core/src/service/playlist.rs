//! Playlist generator service.
//!
//! Resolves seeds into materialized item sequences (a snapshot, not a live
//! query), serves paged chunks, and advances the cursor atomically. Large
//! library/filter seeds materialize lazily in chunk-size batches.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogFilter};
use crate::config::PlaylistConfig;
use crate::models::{
    GeneratorId, ItemId, PlaylistCursor, PlaylistGenerator, PlaylistItem, SeedDescriptor,
    SeedKind, SessionId, ShuffleState, StepOutcome,
};
use crate::repository::GeneratorRepository;
use crate::service::locks::SessionLocks;
use crate::{Error, Result};

/// One item of a chunk window, with display fields for UI paging.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkItem {
    /// Position in the (permuted) playback order.
    pub index: i64,
    pub item_id: ItemId,
    pub title: String,
    pub parent_title: Option<String>,
    pub duration_ms: Option<u64>,
    pub thumb_url: Option<String>,
    /// Precomputed playback URL for items that skip planning (images).
    pub playback_url: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub items: Vec<ChunkItem>,
    pub current_index: i64,
    pub total_count: i64,
    pub has_more: bool,
    pub shuffle: bool,
    pub repeat: bool,
}

/// Result of a navigation step (next/previous/jump/mode toggle).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatePayload {
    pub generator_id: GeneratorId,
    pub ended: bool,
    pub item: Option<PlaylistItem>,
    pub current_index: i64,
    pub total_count: i64,
    pub shuffle: bool,
    pub repeat: bool,
}

#[derive(Clone)]
pub struct PlaylistService {
    repo: GeneratorRepository,
    catalog: Arc<dyn Catalog>,
    config: PlaylistConfig,
    locks: SessionLocks,
}

impl PlaylistService {
    #[must_use]
    pub fn new(
        repo: GeneratorRepository,
        catalog: Arc<dyn Catalog>,
        config: PlaylistConfig,
        locks: SessionLocks,
    ) -> Self {
        Self {
            repo,
            catalog,
            config,
            locks,
        }
    }

    /// Expand a seed into a new generator owned by `session_id`.
    ///
    /// Item order is fixed here; later catalog mutations do not reorder.
    pub async fn create(
        &self,
        session_id: &SessionId,
        seed: SeedDescriptor,
    ) -> Result<(PlaylistGenerator, Option<PlaylistItem>)> {
        let chunk_size = self.config.chunk_size as u64;
        let (ids, total_count) = self.resolve_seed(&seed, chunk_size).await?;
        if ids.is_empty() {
            return Err(Error::NotFound("Seed resolves to no items".to_string()));
        }

        let now = Utc::now();
        let generator_id = GeneratorId::new();
        let items: Vec<PlaylistItem> = ids
            .iter()
            .enumerate()
            .map(|(i, item_id)| PlaylistItem {
                generator_id: generator_id.clone(),
                sort_order: i as i64,
                item_id: item_id.clone(),
                media_part_id: None,
                served: false,
                cohort: None,
            })
            .collect();

        let total = match total_count {
            Some(total) => Some(total as usize),
            None => None,
        };
        let start = (seed.start_index as usize).min(items.len().saturating_sub(1));
        let mut cursor = PlaylistCursor::restore(start, items.len(), total, seed.repeat, None);
        if seed.shuffle {
            cursor.set_shuffle(true, rand::random());
        }

        let generator = PlaylistGenerator {
            id: generator_id,
            session_id: session_id.clone(),
            seed,
            cursor: cursor.cursor() as i64,
            total_count: cursor.total_count(),
            chunk_size: self.config.chunk_size,
            shuffle: cursor.is_shuffled(),
            repeat: cursor.repeat(),
            shuffle_state: cursor.shuffle_state().cloned(),
            expires_at: now + chrono::Duration::days(self.config.expiry_days),
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(&generator).await?;
        self.repo.insert_items(&items).await?;

        let current = match cursor.current_sort_order() {
            Some(sort_order) => Some(items[sort_order].clone()),
            None => None,
        };

        tracing::info!(
            generator_id = %generator.id,
            session_id = %session_id,
            total = generator.total_count,
            shuffle = generator.shuffle,
            "playlist generator created"
        );

        Ok((generator, current))
    }

    pub async fn get(&self, generator_id: &GeneratorId) -> Result<PlaylistGenerator> {
        self.repo
            .get(generator_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Generator {generator_id} not found")))
    }

    /// The item the cursor currently points at.
    pub async fn current(&self, generator_id: &GeneratorId) -> Result<NavigatePayload> {
        let generator = self.get(generator_id).await?;
        let materialized = self.repo.count_items(generator_id).await? as usize;
        let cursor = restore_cursor(&generator, materialized);
        let item = match cursor.current_sort_order() {
            Some(sort_order) => self.repo.item_at(generator_id, sort_order as i64).await?,
            None => None,
        };
        Ok(payload(&generator, &cursor, item, false))
    }

    /// Advance by one (`forward`) or step back, atomically under the
    /// owning session's lock.
    pub async fn step(&self, generator_id: &GeneratorId, forward: bool) -> Result<NavigatePayload> {
        let generator = self.get(generator_id).await?;
        let lock = self.locks.for_session(&generator.session_id);
        let _guard = lock.lock().await;
        self.step_unlocked(generator_id, forward).await
    }

    /// Step variant for callers already holding the session lock.
    pub(crate) async fn step_unlocked(
        &self,
        generator_id: &GeneratorId,
        forward: bool,
    ) -> Result<NavigatePayload> {
        let mut generator = self.get(generator_id).await?;
        let materialized = self.repo.count_items(generator_id).await? as usize;
        let mut cursor = restore_cursor(&generator, materialized);

        let outcome = loop {
            let outcome = if forward { cursor.next() } else { cursor.previous() };
            match outcome {
                StepOutcome::NeedsFetch => {
                    let added = self.materialize_more(&mut generator, &mut cursor).await?;
                    if added == 0 {
                        cursor.freeze_total();
                    }
                }
                other => break other,
            }
        };

        self.finish_step(&mut generator, &cursor, outcome).await
    }

    /// Absolute jump to a position in the (permuted) sequence, atomically
    /// under the owning session's lock.
    pub async fn jump(&self, generator_id: &GeneratorId, position: i64) -> Result<NavigatePayload> {
        let generator = self.get(generator_id).await?;
        let lock = self.locks.for_session(&generator.session_id);
        let _guard = lock.lock().await;
        self.jump_unlocked(generator_id, position).await
    }

    /// Jump variant for callers already holding the session lock.
    pub(crate) async fn jump_unlocked(
        &self,
        generator_id: &GeneratorId,
        position: i64,
    ) -> Result<NavigatePayload> {
        if position < 0 {
            return Err(Error::InvalidInput(format!(
                "jump index {position} out of range"
            )));
        }
        let mut generator = self.get(generator_id).await?;
        let materialized = self.repo.count_items(generator_id).await? as usize;
        let mut cursor = restore_cursor(&generator, materialized);

        let outcome = loop {
            match cursor.jump(position as usize) {
                StepOutcome::NeedsFetch => {
                    let added = self.materialize_more(&mut generator, &mut cursor).await?;
                    if added == 0 {
                        cursor.freeze_total();
                    }
                }
                other => break other,
            }
        };

        if outcome == StepOutcome::Ended {
            return Err(Error::InvalidInput(format!(
                "jump index {position} out of range"
            )));
        }
        self.finish_step(&mut generator, &cursor, outcome).await
    }

    /// Toggle shuffle and/or repeat under the owning session's lock. The
    /// current item is preserved.
    pub async fn set_modes(
        &self,
        generator_id: &GeneratorId,
        shuffle: Option<bool>,
        repeat: Option<bool>,
    ) -> Result<NavigatePayload> {
        let generator = self.get(generator_id).await?;
        let lock = self.locks.for_session(&generator.session_id);
        let _guard = lock.lock().await;

        // Reload now that the lock is held
        let mut generator = self.get(generator_id).await?;
        let materialized = self.repo.count_items(generator_id).await? as usize;
        let mut cursor = restore_cursor(&generator, materialized);

        if let Some(enabled) = shuffle {
            cursor.set_shuffle(enabled, rand::random());
        }
        if let Some(repeat) = repeat {
            cursor.set_repeat(repeat);
        }

        store_cursor(&mut generator, &cursor);
        self.repo.update(&generator).await?;

        let item = match cursor.current_sort_order() {
            Some(sort_order) => self.repo.item_at(generator_id, sort_order as i64).await?,
            None => None,
        };
        Ok(payload(&generator, &cursor, item, false))
    }

    /// A contiguous window of the permuted sequence for UI paging.
    pub async fn chunk(
        &self,
        generator_id: &GeneratorId,
        start_index: i64,
        limit: i64,
    ) -> Result<ChunkPayload> {
        if start_index < 0 || limit < 0 {
            return Err(Error::InvalidInput("chunk window out of range".to_string()));
        }
        let generator = self.get(generator_id).await?;
        let materialized = self.repo.count_items(generator_id).await? as usize;
        let cursor = restore_cursor(&generator, materialized);

        let limit = (limit as usize).min(self.config.chunk_size as usize).max(1);
        let start = start_index as usize;
        let end = (start + limit).min(materialized);

        let mut positions: Vec<(usize, i64)> = Vec::new();
        for position in start..end {
            if let Some(sort_order) = cursor.sort_order_at(position) {
                positions.push((position, sort_order as i64));
            }
        }

        let sort_orders: Vec<i64> = positions.iter().map(|(_, s)| *s).collect();
        let rows = self.repo.items_at(generator_id, &sort_orders).await?;
        let by_sort: HashMap<i64, &PlaylistItem> =
            rows.iter().map(|item| (item.sort_order, item)).collect();

        let mut items = Vec::with_capacity(positions.len());
        for (position, sort_order) in &positions {
            let Some(row) = by_sort.get(sort_order) else {
                continue;
            };
            let summary = self.catalog.item(&row.item_id).await?;
            items.push(match summary {
                Some(summary) => ChunkItem {
                    index: *position as i64,
                    item_id: row.item_id.clone(),
                    title: summary.title,
                    parent_title: summary.parent_title,
                    duration_ms: summary.duration_ms,
                    thumb_url: summary.thumb_url,
                    playback_url: summary.direct_image_url,
                },
                None => ChunkItem {
                    index: *position as i64,
                    item_id: row.item_id.clone(),
                    title: String::new(),
                    parent_title: None,
                    duration_ms: None,
                    thumb_url: None,
                    playback_url: None,
                },
            });
        }

        let has_more = match generator.total_count {
            total if total >= 0 => (end as i64) < total,
            _ => true,
        };

        Ok(ChunkPayload {
            items,
            current_index: generator.cursor,
            total_count: generator.total_count,
            has_more,
            shuffle: generator.shuffle,
            repeat: generator.repeat,
        })
    }

    pub async fn delete_for_session(&self, session_id: &SessionId) -> Result<()> {
        self.repo.delete_for_session(session_id).await
    }

    pub async fn sweep_expired(&self) -> Result<u64> {
        self.repo.delete_expired(Utc::now()).await
    }

    async fn finish_step(
        &self,
        generator: &mut PlaylistGenerator,
        cursor: &PlaylistCursor,
        outcome: StepOutcome,
    ) -> Result<NavigatePayload> {
        store_cursor(generator, cursor);
        self.repo.update(generator).await?;

        match outcome {
            StepOutcome::At { sort_order, .. } => {
                let item = self.repo.item_at(&generator.id, sort_order as i64).await?;
                if item.is_some() {
                    self.repo.mark_served(&generator.id, sort_order as i64).await?;
                }
                Ok(payload(generator, cursor, item, false))
            }
            _ => Ok(payload(generator, cursor, None, true)),
        }
    }

    /// Materialize another chunk for lazy seeds. Returns the number of new
    /// items; a short fetch freezes the total.
    async fn materialize_more(
        &self,
        generator: &mut PlaylistGenerator,
        cursor: &mut PlaylistCursor,
    ) -> Result<usize> {
        let (section_id, filter) = match &generator.seed.kind {
            SeedKind::Library { section_id } => (section_id.clone(), None),
            SeedKind::Filter {
                section_id,
                filter,
                sort,
            } => (
                section_id.clone(),
                Some(CatalogFilter {
                    filter: filter.clone(),
                    sort: sort.clone(),
                }),
            ),
            // Finite seeds are fully materialized at creation
            _ => return Ok(0),
        };

        let offset = cursor.materialized() as u64;
        let chunk_size = generator.chunk_size as u64;
        let ids = self
            .catalog
            .section_items(&section_id, filter.as_ref(), offset, chunk_size)
            .await?;

        if !ids.is_empty() {
            let items: Vec<PlaylistItem> = ids
                .iter()
                .enumerate()
                .map(|(i, item_id)| PlaylistItem {
                    generator_id: generator.id.clone(),
                    sort_order: offset as i64 + i as i64,
                    item_id: item_id.clone(),
                    media_part_id: None,
                    served: false,
                    cohort: None,
                })
                .collect();
            self.repo.insert_items(&items).await?;
            cursor.extend_materialized(offset as usize + ids.len());
        }

        if (ids.len() as u64) < chunk_size {
            cursor.freeze_total();
        }

        Ok(ids.len())
    }

    async fn resolve_seed(
        &self,
        seed: &SeedDescriptor,
        chunk_size: u64,
    ) -> Result<(Vec<ItemId>, Option<u64>)> {
        match &seed.kind {
            SeedKind::Single { item_id } => {
                Ok((vec![item_id.clone()], Some(1)))
            }
            SeedKind::Album { item_id }
            | SeedKind::Season { item_id }
            | SeedKind::Show { item_id }
            | SeedKind::Artist { item_id }
            | SeedKind::Collection { item_id } => {
                let ids = self.catalog.children(item_id).await?;
                let total = ids.len() as u64;
                Ok((ids, Some(total)))
            }
            SeedKind::Explicit { item_ids } => {
                if item_ids.is_empty() {
                    return Err(Error::InvalidInput(
                        "Explicit seed carries no item ids".to_string(),
                    ));
                }
                Ok((item_ids.clone(), Some(item_ids.len() as u64)))
            }
            SeedKind::Library { section_id } => {
                let ids = self
                    .catalog
                    .section_items(section_id, None, 0, chunk_size)
                    .await?;
                let total = self.catalog.section_count(section_id, None).await?;
                Ok((ids, total))
            }
            SeedKind::Filter {
                section_id,
                filter,
                sort,
            } => {
                let filter = CatalogFilter {
                    filter: filter.clone(),
                    sort: sort.clone(),
                };
                let ids = self
                    .catalog
                    .section_items(section_id, Some(&filter), 0, chunk_size)
                    .await?;
                let total = self.catalog.section_count(section_id, Some(&filter)).await?;
                Ok((ids, total))
            }
        }
    }
}

fn restore_cursor(generator: &PlaylistGenerator, materialized: usize) -> PlaylistCursor {
    let total = if generator.total_count >= 0 {
        Some(generator.total_count as usize)
    } else {
        None
    };
    let shuffle = if generator.shuffle {
        generator.shuffle_state.clone().or_else(|| {
            // Shuffle flag without a blob: rebuild deterministically empty
            Some(ShuffleState::new(0, materialized))
        })
    } else {
        None
    };
    PlaylistCursor::restore(
        generator.cursor.max(0) as usize,
        materialized,
        total,
        generator.repeat,
        shuffle,
    )
}

fn store_cursor(generator: &mut PlaylistGenerator, cursor: &PlaylistCursor) {
    generator.cursor = cursor.cursor() as i64;
    generator.total_count = cursor.total_count();
    generator.shuffle = cursor.is_shuffled();
    generator.repeat = cursor.repeat();
    generator.shuffle_state = cursor.shuffle_state().cloned();
}

fn payload(
    generator: &PlaylistGenerator,
    cursor: &PlaylistCursor,
    item: Option<PlaylistItem>,
    ended: bool,
) -> NavigatePayload {
    NavigatePayload {
        generator_id: generator.id.clone(),
        ended,
        item,
        current_index: cursor.cursor() as i64,
        total_count: cursor.total_count(),
        shuffle: cursor.is_shuffled(),
        repeat: cursor.repeat(),
    }
}
