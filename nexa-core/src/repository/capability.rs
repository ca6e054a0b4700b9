use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{CapabilityProfile, ClientCapabilities, SessionId},
    Error, Result,
};

/// Capability profile repository: append-only version chain per session.
#[derive(Clone)]
pub struct CapabilityRepository {
    pool: PgPool,
}

impl CapabilityRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Head (maximum-version) profile of a session, if any was declared.
    pub async fn head(&self, session_id: &SessionId) -> Result<Option<CapabilityProfile>> {
        let row = sqlx::query(
            "SELECT session_id, version, device_id, device_name, capabilities, declared_at
             FROM capability_profiles
             WHERE session_id = $1
             ORDER BY version DESC
             LIMIT 1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_profile(row)?)),
            None => Ok(None),
        }
    }

    /// Append a new version. The `(session_id, version)` unique constraint
    /// turns a concurrent duplicate append into a `ConcurrencyConflict`.
    pub async fn insert(&self, profile: &CapabilityProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO capability_profiles
                 (session_id, version, device_id, device_name, capabilities, declared_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(profile.session_id.as_str())
        .bind(profile.version)
        .bind(profile.device_id.as_deref())
        .bind(profile.device_name.as_deref())
        .bind(sqlx::types::Json(&profile.capabilities))
        .bind(profile.declared_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drop a session's whole version chain.
    pub async fn delete_for_session(&self, session_id: &SessionId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM capability_profiles WHERE session_id = $1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn row_to_profile(&self, row: PgRow) -> Result<CapabilityProfile> {
        let capabilities: serde_json::Value = row.try_get("capabilities")?;
        let capabilities: ClientCapabilities =
            serde_json::from_value(capabilities).map_err(|e| {
                Error::Internal(format!("stored capability body failed to parse: {e}"))
            })?;

        Ok(CapabilityProfile {
            session_id: SessionId::from_string(row.try_get("session_id")?),
            version: row.try_get("version")?,
            device_id: row.try_get("device_id")?,
            device_name: row.try_get("device_name")?,
            capabilities,
            declared_at: row.try_get("declared_at")?,
        })
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_head_returns_max_version() {
        // Integration test placeholder
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_duplicate_version_conflicts() {
        // Unique (session_id, version) must reject concurrent appends
    }
}
