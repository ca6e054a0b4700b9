use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{
        JobId, MediaPartId, SessionId, StreamProtocol, TranscodeJobRecord, TranscodeJobState,
    },
    Error, Result,
};

/// Durable transcode job records, kept for correlation and inspection.
/// The live worker state is owned by the transcode manager.
#[derive(Clone)]
pub struct TranscodeJobRepository {
    pool: PgPool,
}

impl TranscodeJobRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &TranscodeJobRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO transcode_jobs
                 (id, session_id, part_id, variant_key, protocol, state,
                  output_dir, last_ping_at, error, current_segment, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET
                 state = EXCLUDED.state,
                 last_ping_at = EXCLUDED.last_ping_at,
                 error = EXCLUDED.error,
                 current_segment = EXCLUDED.current_segment",
        )
        .bind(record.id.as_str())
        .bind(record.session_id.as_str())
        .bind(record.part_id.as_str())
        .bind(&record.variant_key)
        .bind(record.protocol.as_str())
        .bind(record.state.as_str())
        .bind(&record.output_dir)
        .bind(record.last_ping_at)
        .bind(record.error.as_deref())
        .bind(record.current_segment)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<TranscodeJobRecord>> {
        let row = sqlx::query(
            "SELECT id, session_id, part_id, variant_key, protocol, state,
                    output_dir, last_ping_at, error, current_segment, created_at
             FROM transcode_jobs
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_record(row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM transcode_jobs WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_session(&self, session_id: &SessionId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM transcode_jobs WHERE session_id = $1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn row_to_record(&self, row: PgRow) -> Result<TranscodeJobRecord> {
        let protocol: String = row.try_get("protocol")?;
        let protocol = match protocol.as_str() {
            "dash" => StreamProtocol::Dash,
            "hls" => StreamProtocol::Hls,
            "progressive" => StreamProtocol::Progressive,
            other => {
                return Err(Error::Internal(format!(
                    "stored job protocol unknown: {other}"
                )))
            }
        };
        let state: String = row.try_get("state")?;
        let state: TranscodeJobState = state
            .parse()
            .map_err(|e: String| Error::Internal(format!("stored job state: {e}")))?;

        Ok(TranscodeJobRecord {
            id: JobId::from_string(row.try_get("id")?),
            session_id: SessionId::from_string(row.try_get("session_id")?),
            part_id: MediaPartId::from_string(row.try_get("part_id")?),
            variant_key: row.try_get("variant_key")?,
            protocol,
            state,
            output_dir: row.try_get("output_dir")?,
            last_ping_at: row.try_get("last_ping_at")?,
            error: row.try_get("error")?,
            current_segment: row.try_get("current_segment")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_upsert_updates_state() {
        // Integration test placeholder
    }
}
