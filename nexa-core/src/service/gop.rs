//! GoP index lookups: snapping seek targets to keyframe boundaries.
//!
//! Keyframe timestamps come from the catalog's per-part index. When a part
//! has no index yet, the target passes through unchanged and the encoder
//! seeks as best it can.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::models::MediaPartId;
use crate::{Error, Result};

/// Result of a keyframe lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframeLookup {
    pub keyframe_ms: u64,
    /// Typical GoP length around the target, 0 when unknown.
    pub gop_duration_ms: u64,
    pub has_gop_index: bool,
    pub original_target_ms: u64,
}

#[derive(Clone)]
pub struct GopIndexService {
    catalog: Arc<dyn Catalog>,
}

impl GopIndexService {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Nearest keyframe at or before `target_ms` for `part_id`.
    pub async fn nearest_keyframe(
        &self,
        part_id: &MediaPartId,
        target_ms: u64,
    ) -> Result<KeyframeLookup> {
        let part = self
            .catalog
            .part(part_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Media part {part_id} not found")))?;

        Ok(snap_to_keyframe(&part.keyframes_ms, target_ms))
    }
}

/// Pure lookup over an ascending keyframe list.
#[must_use]
pub fn snap_to_keyframe(keyframes_ms: &[u64], target_ms: u64) -> KeyframeLookup {
    if keyframes_ms.is_empty() {
        return KeyframeLookup {
            keyframe_ms: target_ms,
            gop_duration_ms: 0,
            has_gop_index: false,
            original_target_ms: target_ms,
        };
    }

    // Largest keyframe <= target; the first keyframe when the target
    // precedes all of them.
    let position = keyframes_ms.partition_point(|&kf| kf <= target_ms);
    let index = position.saturating_sub(1);
    let keyframe_ms = keyframes_ms[index];

    let gop_duration_ms = if index + 1 < keyframes_ms.len() {
        keyframes_ms[index + 1] - keyframe_ms
    } else if index > 0 {
        keyframe_ms - keyframes_ms[index - 1]
    } else {
        0
    };

    KeyframeLookup {
        keyframe_ms,
        gop_duration_ms,
        has_gop_index: true,
        original_target_ms: target_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::{ItemId, MediaPart, MediaPartId, MediaSourceFacts};

    #[test]
    fn test_snap_exact_hit() {
        let lookup = snap_to_keyframe(&[0, 4000, 8000, 12_000], 8000);
        assert_eq!(lookup.keyframe_ms, 8000);
        assert_eq!(lookup.gop_duration_ms, 4000);
        assert!(lookup.has_gop_index);
    }

    #[test]
    fn test_snap_rounds_down() {
        let lookup = snap_to_keyframe(&[0, 4000, 8000], 7999);
        assert_eq!(lookup.keyframe_ms, 4000);
        assert_eq!(lookup.original_target_ms, 7999);
    }

    #[test]
    fn test_snap_before_first_keyframe() {
        let lookup = snap_to_keyframe(&[1000, 5000], 200);
        assert_eq!(lookup.keyframe_ms, 1000);
    }

    #[test]
    fn test_snap_past_last_keyframe() {
        let lookup = snap_to_keyframe(&[0, 4000, 8000], 60_000);
        assert_eq!(lookup.keyframe_ms, 8000);
        assert_eq!(lookup.gop_duration_ms, 4000);
    }

    #[test]
    fn test_no_index_passes_through() {
        let lookup = snap_to_keyframe(&[], 12_345);
        assert_eq!(lookup.keyframe_ms, 12_345);
        assert_eq!(lookup.gop_duration_ms, 0);
        assert!(!lookup.has_gop_index);
    }

    #[tokio::test]
    async fn test_lookup_through_catalog() {
        let catalog = MemoryCatalog::new();
        let part_id = MediaPartId::from_string("part00000001".to_string());
        let item_id = ItemId::from_string("item00000001".to_string());
        catalog.insert_facts(MediaSourceFacts {
            item_id: item_id.clone(),
            part: MediaPart {
                id: part_id.clone(),
                item_id,
                path: "/library/a.mkv".to_string(),
                container: "mkv".to_string(),
                duration_ms: 60_000,
                size_bytes: None,
                direct_url: "/parts/a".to_string(),
                keyframes_ms: vec![0, 4000, 8000],
            },
            streams: vec![],
            bitrate: None,
            trickplay: None,
        });

        let service = GopIndexService::new(catalog);
        let lookup = service.nearest_keyframe(&part_id, 5000).await.unwrap();
        assert_eq!(lookup.keyframe_ms, 4000);

        let missing = MediaPartId::from_string("part00000404".to_string());
        assert!(service.nearest_keyframe(&missing, 0).await.is_err());
    }
}
