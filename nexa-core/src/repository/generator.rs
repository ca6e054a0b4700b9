use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{
        GeneratorId, ItemId, MediaPartId, PlaylistGenerator, PlaylistItem, SeedDescriptor,
        SessionId, ShuffleState,
    },
    Error, Result,
};

/// Playlist generator repository: the generator record plus its
/// materialized items. `sort_order` stays contiguous `[0, N)`; shuffle
/// state is a separate blob and never rewrites item rows.
#[derive(Clone)]
pub struct GeneratorRepository {
    pool: PgPool,
}

impl GeneratorRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, generator: &PlaylistGenerator) -> Result<()> {
        sqlx::query(
            "INSERT INTO playlist_generators
                 (id, session_id, seed, cursor_index, total_count, chunk_size,
                  shuffle, repeat, shuffle_state, expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(generator.id.as_str())
        .bind(generator.session_id.as_str())
        .bind(sqlx::types::Json(&generator.seed))
        .bind(generator.cursor)
        .bind(generator.total_count)
        .bind(generator.chunk_size as i32)
        .bind(generator.shuffle)
        .bind(generator.repeat)
        .bind(generator.shuffle_state.as_ref().map(sqlx::types::Json))
        .bind(generator.expires_at)
        .bind(generator.created_at)
        .bind(generator.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &GeneratorId) -> Result<Option<PlaylistGenerator>> {
        let row = sqlx::query(
            "SELECT id, session_id, seed, cursor_index, total_count, chunk_size,
                    shuffle, repeat, shuffle_state, expires_at, created_at, updated_at
             FROM playlist_generators
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_generator(row)?)),
            None => Ok(None),
        }
    }

    /// Whole-record update of the navigation state.
    pub async fn update(&self, generator: &PlaylistGenerator) -> Result<()> {
        let result = sqlx::query(
            "UPDATE playlist_generators
             SET cursor_index = $2, total_count = $3, shuffle = $4, repeat = $5,
                 shuffle_state = $6, expires_at = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(generator.id.as_str())
        .bind(generator.cursor)
        .bind(generator.total_count)
        .bind(generator.shuffle)
        .bind(generator.repeat)
        .bind(generator.shuffle_state.as_ref().map(sqlx::types::Json))
        .bind(generator.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Generator {} not found",
                generator.id
            )));
        }
        Ok(())
    }

    /// Append materialized items. Sort orders must continue the existing
    /// contiguous range.
    pub async fn insert_items(&self, items: &[PlaylistItem]) -> Result<()> {
        for item in items {
            sqlx::query(
                "INSERT INTO playlist_generator_items
                     (generator_id, sort_order, item_id, media_part_id, served, cohort)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.generator_id.as_str())
            .bind(item.sort_order)
            .bind(item.item_id.as_str())
            .bind(item.media_part_id.as_ref().map(MediaPartId::as_str))
            .bind(item.served)
            .bind(item.cohort.as_deref())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// A contiguous window of items by sort order.
    pub async fn items_range(
        &self,
        generator_id: &GeneratorId,
        start: i64,
        limit: i64,
    ) -> Result<Vec<PlaylistItem>> {
        let rows = sqlx::query(
            "SELECT generator_id, sort_order, item_id, media_part_id, served, cohort
             FROM playlist_generator_items
             WHERE generator_id = $1 AND sort_order >= $2
             ORDER BY sort_order
             LIMIT $3",
        )
        .bind(generator_id.as_str())
        .bind(start)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_item(row)).collect()
    }

    /// Items at an explicit set of sort orders (chunking under shuffle).
    pub async fn items_at(
        &self,
        generator_id: &GeneratorId,
        sort_orders: &[i64],
    ) -> Result<Vec<PlaylistItem>> {
        let rows = sqlx::query(
            "SELECT generator_id, sort_order, item_id, media_part_id, served, cohort
             FROM playlist_generator_items
             WHERE generator_id = $1 AND sort_order = ANY($2)
             ORDER BY sort_order",
        )
        .bind(generator_id.as_str())
        .bind(sort_orders)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_item(row)).collect()
    }

    pub async fn item_at(
        &self,
        generator_id: &GeneratorId,
        sort_order: i64,
    ) -> Result<Option<PlaylistItem>> {
        let row = sqlx::query(
            "SELECT generator_id, sort_order, item_id, media_part_id, served, cohort
             FROM playlist_generator_items
             WHERE generator_id = $1 AND sort_order = $2",
        )
        .bind(generator_id.as_str())
        .bind(sort_order)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_item(row)?)),
            None => Ok(None),
        }
    }

    pub async fn count_items(&self, generator_id: &GeneratorId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM playlist_generator_items WHERE generator_id = $1",
        )
        .bind(generator_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn mark_served(
        &self,
        generator_id: &GeneratorId,
        sort_order: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE playlist_generator_items SET served = TRUE
             WHERE generator_id = $1 AND sort_order = $2",
        )
        .bind(generator_id.as_str())
        .bind(sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop the generator and its items.
    pub async fn delete(&self, id: &GeneratorId) -> Result<bool> {
        sqlx::query("DELETE FROM playlist_generator_items WHERE generator_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM playlist_generators WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_session(&self, session_id: &SessionId) -> Result<()> {
        let rows = sqlx::query("SELECT id FROM playlist_generators WHERE session_id = $1")
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let id = GeneratorId::from_string(row.try_get("id")?);
            self.delete(&id).await?;
        }
        Ok(())
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let rows = sqlx::query(
            "DELETE FROM playlist_generators WHERE expires_at < $1 RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        for row in &rows {
            let id: String = row.try_get("id")?;
            sqlx::query("DELETE FROM playlist_generator_items WHERE generator_id = $1")
                .bind(&id)
                .execute(&self.pool)
                .await?;
        }
        Ok(rows.len() as u64)
    }

    fn row_to_generator(&self, row: PgRow) -> Result<PlaylistGenerator> {
        let seed: serde_json::Value = row.try_get("seed")?;
        let seed: SeedDescriptor = serde_json::from_value(seed)
            .map_err(|e| Error::Internal(format!("stored seed failed to parse: {e}")))?;
        let shuffle_state: Option<serde_json::Value> = row.try_get("shuffle_state")?;
        let shuffle_state: Option<ShuffleState> = match shuffle_state {
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                Error::Internal(format!("stored shuffle state failed to parse: {e}"))
            })?),
            None => None,
        };
        let chunk_size: i32 = row.try_get("chunk_size")?;

        Ok(PlaylistGenerator {
            id: GeneratorId::from_string(row.try_get("id")?),
            session_id: SessionId::from_string(row.try_get("session_id")?),
            seed,
            cursor: row.try_get("cursor_index")?,
            total_count: row.try_get("total_count")?,
            chunk_size: chunk_size.max(1) as u32,
            shuffle: row.try_get("shuffle")?,
            repeat: row.try_get("repeat")?,
            shuffle_state,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(&self, row: PgRow) -> Result<PlaylistItem> {
        let media_part_id: Option<String> = row.try_get("media_part_id")?;
        Ok(PlaylistItem {
            generator_id: GeneratorId::from_string(row.try_get("generator_id")?),
            sort_order: row.try_get("sort_order")?,
            item_id: ItemId::from_string(row.try_get("item_id")?),
            media_part_id: media_part_id.map(MediaPartId::from_string),
            served: row.try_get("served")?,
            cohort: row.try_get("cohort")?,
        })
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_items_stay_contiguous() {
        // Integration test placeholder
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_delete_cascades_to_items() {
        // Integration test placeholder
    }
}
