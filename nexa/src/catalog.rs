//! Read-only catalog adapter.
//!
//! The library scanner owns these tables; the playback core only reads
//! them. Schema agreement lives with the scanner's migrations.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use nexa_core::catalog::{Catalog, CatalogFilter, ItemSummary};
use nexa_core::models::{
    ItemId, MediaKind, MediaPart, MediaPartId, MediaSourceFacts, MediaStream, StreamKind,
    TrickplayFacts,
};
use nexa_core::{Error, Result};

#[derive(Clone)]
pub struct DbCatalog {
    pool: PgPool,
}

impl DbCatalog {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_summary(row: &PgRow) -> Result<ItemSummary> {
        let kind: String = row.try_get("kind")?;
        let duration_ms: Option<i64> = row.try_get("duration_ms")?;
        Ok(ItemSummary {
            id: ItemId::from_string(row.try_get("id")?),
            kind: parse_kind(&kind)?,
            title: row.try_get("title")?,
            parent_title: row.try_get("parent_title")?,
            duration_ms: duration_ms.map(|d| d.max(0) as u64),
            thumb_url: row.try_get("thumb_url")?,
            direct_image_url: row.try_get("image_url")?,
        })
    }

    fn row_to_part(row: &PgRow) -> Result<MediaPart> {
        let duration_ms: i64 = row.try_get("duration_ms")?;
        let size_bytes: Option<i64> = row.try_get("size_bytes")?;
        let keyframes: Option<Vec<i64>> = row.try_get("keyframes_ms")?;
        Ok(MediaPart {
            id: MediaPartId::from_string(row.try_get("id")?),
            item_id: ItemId::from_string(row.try_get("item_id")?),
            path: row.try_get("path")?,
            container: row.try_get("container")?,
            duration_ms: duration_ms.max(0) as u64,
            size_bytes: size_bytes.map(|s| s.max(0) as u64),
            direct_url: row.try_get("direct_url")?,
            keyframes_ms: keyframes
                .unwrap_or_default()
                .into_iter()
                .filter(|k| *k >= 0)
                .map(|k| k as u64)
                .collect(),
        })
    }

    fn row_to_stream(row: &PgRow) -> Result<MediaStream> {
        let kind: String = row.try_get("kind")?;
        let kind = match kind.as_str() {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            other => {
                return Err(Error::Internal(format!("unknown stream kind: {other}")))
            }
        };
        let index: i32 = row.try_get("stream_index")?;
        let bitrate: Option<i64> = row.try_get("bitrate")?;
        let width: Option<i32> = row.try_get("width")?;
        let height: Option<i32> = row.try_get("height")?;
        let bit_depth: Option<i32> = row.try_get("bit_depth")?;
        let ref_frames: Option<i32> = row.try_get("ref_frames")?;
        let channels: Option<i32> = row.try_get("channels")?;
        let sample_rate: Option<i32> = row.try_get("sample_rate")?;
        Ok(MediaStream {
            index: index.max(0) as u32,
            kind,
            codec: row.try_get("codec")?,
            profile: row.try_get("profile")?,
            level: row.try_get("level")?,
            bitrate: bitrate.map(|b| b.max(0) as u64),
            width: width.map(|v| v.max(0) as u32),
            height: height.map(|v| v.max(0) as u32),
            frame_rate: row.try_get("frame_rate")?,
            bit_depth: bit_depth.map(|v| v.max(0) as u32),
            color_space: row.try_get("color_space")?,
            ref_frames: ref_frames.map(|v| v.max(0) as u32),
            channels: channels.map(|v| v.max(0) as u32),
            sample_rate: sample_rate.map(|v| v.max(0) as u32),
            language: row.try_get("language")?,
            is_default: row.try_get("is_default")?,
        })
    }

    fn row_to_trickplay(row: &PgRow) -> Result<Option<TrickplayFacts>> {
        let interval_ms: Option<i64> = row.try_get("trickplay_interval_ms")?;
        let Some(interval_ms) = interval_ms else {
            return Ok(None);
        };
        let thumb_width: i32 = row.try_get("trickplay_thumb_width")?;
        let thumb_height: i32 = row.try_get("trickplay_thumb_height")?;
        let tile_cols: i32 = row.try_get("trickplay_tile_cols")?;
        let tile_rows: i32 = row.try_get("trickplay_tile_rows")?;
        let thumb_count: i32 = row.try_get("trickplay_thumb_count")?;
        let template: String = row.try_get("trickplay_sprite_template")?;
        Ok(Some(TrickplayFacts {
            interval_ms: interval_ms.max(0) as u64,
            thumb_width: thumb_width.max(0) as u32,
            thumb_height: thumb_height.max(0) as u32,
            tile_cols: tile_cols.max(0) as u32,
            tile_rows: tile_rows.max(0) as u32,
            thumb_count: thumb_count.max(0) as u32,
            sprite_url_template: template,
        }))
    }
}

fn parse_kind(kind: &str) -> Result<MediaKind> {
    match kind {
        "video" => Ok(MediaKind::Video),
        "audio" => Ok(MediaKind::Audio),
        "photo" => Ok(MediaKind::Photo),
        other => Err(Error::Internal(format!("unknown item kind: {other}"))),
    }
}

#[async_trait]
impl Catalog for DbCatalog {
    async fn item(&self, id: &ItemId) -> Result<Option<ItemSummary>> {
        let row = sqlx::query(
            "SELECT id, kind, title, parent_title, duration_ms, thumb_url, image_url
             FROM library_items
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_summary(&row)?)),
            None => Ok(None),
        }
    }

    async fn source_facts(&self, id: &ItemId) -> Result<Option<MediaSourceFacts>> {
        let part_row = sqlx::query(
            "SELECT id, item_id, path, container, duration_ms, size_bytes, direct_url,
                    keyframes_ms, bitrate,
                    trickplay_interval_ms, trickplay_thumb_width, trickplay_thumb_height,
                    trickplay_tile_cols, trickplay_tile_rows, trickplay_thumb_count,
                    trickplay_sprite_template
             FROM media_parts
             WHERE item_id = $1
             ORDER BY part_index
             LIMIT 1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(part_row) = part_row else {
            return Ok(None);
        };
        let part = Self::row_to_part(&part_row)?;
        let bitrate: Option<i64> = part_row.try_get("bitrate")?;
        let trickplay = Self::row_to_trickplay(&part_row)?;

        let stream_rows = sqlx::query(
            "SELECT stream_index, kind, codec, profile, level, bitrate, width, height,
                    frame_rate, bit_depth, color_space, ref_frames, channels, sample_rate,
                    language, is_default
             FROM media_streams
             WHERE part_id = $1
             ORDER BY stream_index",
        )
        .bind(part.id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let streams = stream_rows
            .iter()
            .map(Self::row_to_stream)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(MediaSourceFacts {
            item_id: id.clone(),
            part,
            streams,
            bitrate: bitrate.map(|b| b.max(0) as u64),
            trickplay,
        }))
    }

    async fn part(&self, id: &MediaPartId) -> Result<Option<MediaPart>> {
        let row = sqlx::query(
            "SELECT id, item_id, path, container, duration_ms, size_bytes, direct_url,
                    keyframes_ms
             FROM media_parts
             WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_part(&row)?)),
            None => Ok(None),
        }
    }

    async fn children(&self, container: &ItemId) -> Result<Vec<ItemId>> {
        let rows = sqlx::query(
            "SELECT id FROM library_items WHERE parent_id = $1 ORDER BY sort_index, id",
        )
        .bind(container.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(ItemId::from_string(row.try_get("id")?)))
            .collect()
    }

    async fn section_items(
        &self,
        section_id: &str,
        filter: Option<&CatalogFilter>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ItemId>> {
        let pattern = filter.map(|f| format!("%{}%", f.filter));
        let rows = sqlx::query(
            "SELECT id FROM library_items
             WHERE section_id = $1 AND parent_id IS NULL
               AND ($2::text IS NULL OR title ILIKE $2)
             ORDER BY sort_title, id
             OFFSET $3 LIMIT $4",
        )
        .bind(section_id)
        .bind(pattern)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(ItemId::from_string(row.try_get("id")?)))
            .collect()
    }

    async fn section_count(
        &self,
        section_id: &str,
        filter: Option<&CatalogFilter>,
    ) -> Result<Option<u64>> {
        let pattern = filter.map(|f| format!("%{}%", f.filter));
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM library_items
             WHERE section_id = $1 AND parent_id IS NULL
               AND ($2::text IS NULL OR title ILIKE $2)",
        )
        .bind(section_id)
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("n")?;
        Ok(Some(count.max(0) as u64))
    }
}
