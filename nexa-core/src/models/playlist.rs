//! Playlist generators: a seed-driven cursor over an ordered item sequence.
//!
//! `PlaylistCursor` is the pure navigation model (permutation, repeat,
//! bounds); persistence and seed resolution live in the repository and
//! service layers. Shuffle is a permutation over the index space, never a
//! rewrite of sort orders.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::id::{GeneratorId, ItemId, MediaPartId, SessionId};

/// What a generator is seeded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum SeedKind {
    Single { item_id: ItemId },
    Album { item_id: ItemId },
    Season { item_id: ItemId },
    Show { item_id: ItemId },
    Artist { item_id: ItemId },
    Collection { item_id: ItemId },
    Explicit { item_ids: Vec<ItemId> },
    Library { section_id: String },
    Filter { section_id: String, filter: String, sort: Option<String> },
}

/// Full seed descriptor, stored as JSON with the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDescriptor {
    #[serde(flatten)]
    pub kind: SeedKind,
    #[serde(default)]
    pub start_index: u32,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// Persisted generator record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistGenerator {
    pub id: GeneratorId,
    pub session_id: SessionId,
    pub seed: SeedDescriptor,
    /// 0-based position in the (permuted) sequence.
    pub cursor: i64,
    /// -1 = unknown, may grow.
    pub total_count: i64,
    pub chunk_size: u32,
    pub shuffle: bool,
    pub repeat: bool,
    /// Permutation state when shuffle is on. Persisted as a compact blob.
    pub shuffle_state: Option<ShuffleState>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One materialized item of a generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub generator_id: GeneratorId,
    /// Contiguous 0-based position, unique within the generator.
    pub sort_order: i64,
    pub item_id: ItemId,
    /// Pre-selected part, when the seed resolution already chose one.
    pub media_part_id: Option<MediaPartId>,
    pub served: bool,
    /// Grouping tag (disc number, season, ...).
    pub cohort: Option<String>,
}

/// Seeded permutation over the materialized index space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuffleState {
    pub seed: u64,
    pub permutation: Vec<u32>,
}

impl ShuffleState {
    /// Build a fresh permutation over `[0, len)`.
    #[must_use]
    pub fn new(seed: u64, len: usize) -> Self {
        let mut permutation: Vec<u32> = (0..len as u32).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        permutation.shuffle(&mut rng);
        Self { seed, permutation }
    }

    /// Extend the permutation when more items were materialized. The new
    /// indices are shuffled among themselves (seeded by the base seed and
    /// the previous length) and appended, so already-played positions keep
    /// their mapping.
    pub fn grow(&mut self, new_len: usize) {
        let old_len = self.permutation.len();
        if new_len <= old_len {
            return;
        }
        let mut tail: Vec<u32> = (old_len as u32..new_len as u32).collect();
        let mut rng = StdRng::seed_from_u64(self.seed ^ old_len as u64);
        tail.shuffle(&mut rng);
        self.permutation.extend(tail);
    }
}

/// Result of a cursor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The cursor now sits at `cursor`; the item is the one with
    /// `sort_order` in the underlying (unpermuted) sequence.
    At { cursor: usize, sort_order: usize },
    /// The materialized window is exhausted but the total is unknown.
    /// Materialize another chunk, then retry the step.
    NeedsFetch,
    /// Past the last item with repeat off.
    Ended,
}

/// Pure cursor over a (possibly permuted) item sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistCursor {
    cursor: usize,
    /// Number of items materialized so far.
    materialized: usize,
    /// `None` = unknown, may grow beyond `materialized`.
    total: Option<usize>,
    repeat: bool,
    shuffle: Option<ShuffleState>,
}

impl PlaylistCursor {
    #[must_use]
    pub fn new(materialized: usize, total: Option<usize>, repeat: bool) -> Self {
        Self {
            cursor: 0,
            materialized,
            total,
            repeat,
            shuffle: None,
        }
    }

    /// Rebuild from persisted generator state.
    #[must_use]
    pub fn restore(
        cursor: usize,
        materialized: usize,
        total: Option<usize>,
        repeat: bool,
        shuffle: Option<ShuffleState>,
    ) -> Self {
        Self {
            cursor: cursor.min(materialized.saturating_sub(1)),
            materialized,
            total,
            repeat,
            shuffle,
        }
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn repeat(&self) -> bool {
        self.repeat
    }

    #[must_use]
    pub const fn is_shuffled(&self) -> bool {
        self.shuffle.is_some()
    }

    #[must_use]
    pub fn shuffle_state(&self) -> Option<&ShuffleState> {
        self.shuffle.as_ref()
    }

    #[must_use]
    pub const fn materialized(&self) -> usize {
        self.materialized
    }

    /// Total as stored: -1 when unknown.
    #[must_use]
    pub fn total_count(&self) -> i64 {
        self.total.map_or(-1, |t| t as i64)
    }

    /// The underlying sort order at a cursor position.
    #[must_use]
    pub fn sort_order_at(&self, position: usize) -> Option<usize> {
        if position >= self.materialized {
            return None;
        }
        match &self.shuffle {
            Some(state) => state.permutation.get(position).map(|&i| i as usize),
            None => Some(position),
        }
    }

    /// Sort order of the current item.
    #[must_use]
    pub fn current_sort_order(&self) -> Option<usize> {
        self.sort_order_at(self.cursor)
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }

    /// Record that more items were materialized (unknown-total seeds).
    pub fn extend_materialized(&mut self, new_len: usize) {
        if new_len <= self.materialized {
            return;
        }
        self.materialized = new_len;
        if let Some(state) = &mut self.shuffle {
            state.grow(new_len);
        }
    }

    /// Mark the materialization complete: the total is now known.
    pub fn freeze_total(&mut self) {
        self.total = Some(self.materialized);
    }

    fn outcome_at(&self, position: usize) -> StepOutcome {
        match self.sort_order_at(position) {
            Some(sort_order) => StepOutcome::At {
                cursor: position,
                sort_order,
            },
            None => StepOutcome::Ended,
        }
    }

    /// Advance by one. Past the end: repeat wraps to 0, otherwise `Ended`.
    /// Exhausting the materialized window before the (known or unknown)
    /// total asks the caller to fetch another chunk first.
    pub fn next(&mut self) -> StepOutcome {
        let candidate = self.cursor + 1;
        if candidate < self.materialized {
            self.cursor = candidate;
            return self.outcome_at(self.cursor);
        }
        match self.total {
            Some(total) if candidate >= total => {
                if self.repeat && self.materialized > 0 {
                    self.cursor = 0;
                    return self.outcome_at(self.cursor);
                }
                StepOutcome::Ended
            }
            _ => StepOutcome::NeedsFetch,
        }
    }

    /// Step back by one. At the start: repeat wraps to the last item,
    /// otherwise the cursor stays put and the current item is returned.
    pub fn previous(&mut self) -> StepOutcome {
        if self.cursor > 0 {
            self.cursor -= 1;
        } else if self.repeat && self.materialized > 0 {
            self.cursor = self.materialized - 1;
        }
        self.outcome_at(self.cursor)
    }

    /// Absolute jump. Out-of-range positions are rejected.
    pub fn jump(&mut self, position: usize) -> StepOutcome {
        if position >= self.materialized {
            return match self.total {
                Some(total) if position >= total => StepOutcome::Ended,
                _ => StepOutcome::NeedsFetch,
            };
        }
        self.cursor = position;
        self.outcome_at(self.cursor)
    }

    /// Toggle shuffle, preserving the current item at the current cursor.
    ///
    /// Enabling builds a seeded permutation and swaps so the current item's
    /// index lands at the cursor position. Disabling moves the cursor to the
    /// current item's underlying index.
    pub fn set_shuffle(&mut self, enabled: bool, seed: u64) {
        match (enabled, self.shuffle.is_some()) {
            (true, false) => {
                let current = self.current_sort_order();
                let mut state = ShuffleState::new(seed, self.materialized);
                if let Some(current) = current {
                    if let Some(target) = state
                        .permutation
                        .iter()
                        .position(|&i| i as usize == current)
                    {
                        state.permutation.swap(self.cursor, target);
                    }
                }
                self.shuffle = Some(state);
            }
            (false, true) => {
                if let Some(current) = self.current_sort_order() {
                    self.cursor = current;
                }
                self.shuffle = None;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_next_and_ended() {
        let mut cursor = PlaylistCursor::new(3, Some(3), false);
        assert_eq!(cursor.current_sort_order(), Some(0));
        assert_eq!(
            cursor.next(),
            StepOutcome::At {
                cursor: 1,
                sort_order: 1
            }
        );
        assert_eq!(
            cursor.next(),
            StepOutcome::At {
                cursor: 2,
                sort_order: 2
            }
        );
        assert_eq!(cursor.next(), StepOutcome::Ended);
        // Cursor stays within bounds after Ended
        assert_eq!(cursor.cursor(), 2);
    }

    #[test]
    fn test_repeat_wraps_to_zero() {
        let mut cursor = PlaylistCursor::new(5, Some(5), true);
        for _ in 0..4 {
            cursor.next();
        }
        assert_eq!(cursor.cursor(), 4);
        assert_eq!(
            cursor.next(),
            StepOutcome::At {
                cursor: 0,
                sort_order: 0
            }
        );
    }

    #[test]
    fn test_previous_at_start() {
        let mut cursor = PlaylistCursor::new(3, Some(3), false);
        assert_eq!(
            cursor.previous(),
            StepOutcome::At {
                cursor: 0,
                sort_order: 0
            }
        );

        let mut wrapping = PlaylistCursor::new(3, Some(3), true);
        assert_eq!(
            wrapping.previous(),
            StepOutcome::At {
                cursor: 2,
                sort_order: 2
            }
        );
    }

    #[test]
    fn test_jump_bounds() {
        let mut cursor = PlaylistCursor::new(4, Some(4), false);
        assert_eq!(
            cursor.jump(2),
            StepOutcome::At {
                cursor: 2,
                sort_order: 2
            }
        );
        assert_eq!(cursor.jump(4), StepOutcome::Ended);
        assert_eq!(cursor.cursor(), 2);
    }

    #[test]
    fn test_unknown_total_requests_fetch() {
        let mut cursor = PlaylistCursor::new(2, None, false);
        cursor.next();
        assert_eq!(cursor.next(), StepOutcome::NeedsFetch);

        // Materializing more lets the step proceed
        cursor.extend_materialized(4);
        assert_eq!(
            cursor.next(),
            StepOutcome::At {
                cursor: 2,
                sort_order: 2
            }
        );

        // Freezing the total turns exhaustion into Ended
        cursor.next();
        cursor.freeze_total();
        assert_eq!(cursor.next(), StepOutcome::Ended);
    }

    #[test]
    fn test_known_total_partial_materialization_fetches() {
        let mut cursor = PlaylistCursor::new(2, Some(5), false);
        cursor.next();
        assert_eq!(cursor.next(), StepOutcome::NeedsFetch);
        cursor.extend_materialized(5);
        assert_eq!(
            cursor.next(),
            StepOutcome::At {
                cursor: 2,
                sort_order: 2
            }
        );
        assert_eq!(cursor.jump(7), StepOutcome::Ended);
    }

    #[test]
    fn test_shuffle_preserves_current_item() {
        let mut cursor = PlaylistCursor::new(5, Some(5), true);
        cursor.next();
        cursor.next();
        let current = cursor.current_sort_order().unwrap();
        assert_eq!(current, 2);

        cursor.set_shuffle(true, 42);
        // Same item, same cursor position
        assert_eq!(cursor.cursor(), 2);
        assert_eq!(cursor.current_sort_order(), Some(current));

        // The permutation covers all indices exactly once
        let state = cursor.shuffle_state().unwrap();
        let mut seen: Vec<u32> = state.permutation.clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        // Disabling moves the cursor back to the underlying index
        cursor.set_shuffle(false, 0);
        assert_eq!(cursor.current_sort_order(), Some(current));
        assert_eq!(cursor.cursor(), current);
    }

    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let a = ShuffleState::new(7, 10);
        let b = ShuffleState::new(7, 10);
        assert_eq!(a.permutation, b.permutation);

        let c = ShuffleState::new(8, 10);
        // Different seeds almost surely differ for 10 items
        assert_ne!(a.permutation, c.permutation);
    }

    #[test]
    fn test_shuffle_grow_keeps_existing_prefix() {
        let mut state = ShuffleState::new(3, 6);
        let prefix = state.permutation.clone();
        state.grow(10);
        assert_eq!(&state.permutation[..6], &prefix[..]);
        let mut all: Vec<u32> = state.permutation.clone();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn test_shuffled_walk_visits_every_item_once() {
        let mut cursor = PlaylistCursor::new(8, Some(8), false);
        cursor.set_shuffle(true, 99);
        let mut visited = vec![cursor.current_sort_order().unwrap()];
        while let StepOutcome::At { sort_order, .. } = cursor.next() {
            visited.push(sort_order);
        }
        visited.sort_unstable();
        assert_eq!(visited, (0..8).collect::<Vec<usize>>());
    }

    #[test]
    fn test_seed_descriptor_json_shape() {
        let seed = SeedDescriptor {
            kind: SeedKind::Library {
                section_id: "music".to_string(),
            },
            start_index: 0,
            shuffle: true,
            repeat: false,
        };
        let json = serde_json::to_value(&seed).unwrap();
        assert_eq!(json["type"], "library");
        assert_eq!(json["sectionId"], "music");
        assert_eq!(json["shuffle"], true);

        let back: SeedDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, seed);
    }
}
