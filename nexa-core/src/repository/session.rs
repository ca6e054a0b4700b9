use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{GeneratorId, ItemId, MediaPartId, PlaybackSession, PlaybackState, SessionId},
    Error, Result,
};

/// Playback session repository. Sessions are written as whole records.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, session: &PlaybackSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO playback_sessions
                 (id, user_id, device_id, current_item_id, current_part_id, generator_id,
                  capability_version, playhead_ms, state, originator, context,
                  last_heartbeat_at, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(session.id.as_str())
        .bind(&session.user_id)
        .bind(session.device_id.as_deref())
        .bind(session.current_item_id.as_ref().map(ItemId::as_str))
        .bind(session.current_part_id.as_ref().map(MediaPartId::as_str))
        .bind(session.generator_id.as_ref().map(GeneratorId::as_str))
        .bind(session.capability_version)
        .bind(session.playhead_ms as i64)
        .bind(session.state.as_str())
        .bind(session.originator.as_deref())
        .bind(session.context.as_ref().map(sqlx::types::Json))
        .bind(session.last_heartbeat_at)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &SessionId) -> Result<Option<PlaybackSession>> {
        let row = sqlx::query(
            "SELECT id, user_id, device_id, current_item_id, current_part_id, generator_id,
                    capability_version, playhead_ms, state, originator, context,
                    last_heartbeat_at, expires_at, created_at
             FROM playback_sessions
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// Whole-record update.
    pub async fn update(&self, session: &PlaybackSession) -> Result<()> {
        let result = sqlx::query(
            "UPDATE playback_sessions
             SET current_item_id = $2, current_part_id = $3, generator_id = $4,
                 capability_version = $5, playhead_ms = $6, state = $7,
                 originator = $8, context = $9, last_heartbeat_at = $10, expires_at = $11
             WHERE id = $1",
        )
        .bind(session.id.as_str())
        .bind(session.current_item_id.as_ref().map(ItemId::as_str))
        .bind(session.current_part_id.as_ref().map(MediaPartId::as_str))
        .bind(session.generator_id.as_ref().map(GeneratorId::as_str))
        .bind(session.capability_version)
        .bind(session.playhead_ms as i64)
        .bind(session.state.as_str())
        .bind(session.originator.as_deref())
        .bind(session.context.as_ref().map(sqlx::types::Json))
        .bind(session.last_heartbeat_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Session {} not found", session.id)));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &SessionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playback_sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove everything past its expiry; returns the removed session ids
    /// so the caller can clean dependent records.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<Vec<SessionId>> {
        let rows = sqlx::query(
            "DELETE FROM playback_sessions WHERE expires_at < $1 RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(SessionId::from_string(row.try_get("id")?)))
            .collect()
    }

    /// Live session count for the metrics gauge.
    pub async fn count_active(&self, now: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM playback_sessions
             WHERE expires_at >= $1 AND state <> 'ended'",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    fn row_to_session(&self, row: PgRow) -> Result<PlaybackSession> {
        let state: String = row.try_get("state")?;
        let state: PlaybackState = state
            .parse()
            .map_err(|e: String| Error::Internal(format!("stored session state: {e}")))?;
        let item_id: Option<String> = row.try_get("current_item_id")?;
        let part_id: Option<String> = row.try_get("current_part_id")?;
        let generator_id: Option<String> = row.try_get("generator_id")?;
        let playhead_ms: i64 = row.try_get("playhead_ms")?;
        let context: Option<serde_json::Value> = row.try_get("context")?;

        Ok(PlaybackSession {
            id: SessionId::from_string(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            device_id: row.try_get("device_id")?,
            current_item_id: item_id.map(ItemId::from_string),
            current_part_id: part_id.map(MediaPartId::from_string),
            generator_id: generator_id.map(GeneratorId::from_string),
            capability_version: row.try_get("capability_version")?,
            playhead_ms: playhead_ms.max(0) as u64,
            state,
            originator: row.try_get("originator")?,
            context,
            last_heartbeat_at: row.try_get("last_heartbeat_at")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
