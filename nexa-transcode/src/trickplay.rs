//! Trickplay WebVTT sidecars.
//!
//! Scrub previews are pre-generated sprite sheets; the catalog reports
//! their geometry and this module emits the WebVTT cue list mapping time
//! ranges onto `#xywh` sprite regions.

use std::fmt::Write as _;

use nexa_core::models::TrickplayFacts;

/// Build the trickplay WebVTT for a part.
#[must_use]
pub fn build_trickplay_vtt(facts: &TrickplayFacts, duration_ms: u64) -> String {
    let mut out = String::from("WEBVTT\n\n");
    let per_sheet = u64::from(facts.tile_cols) * u64::from(facts.tile_rows);
    if per_sheet == 0 || facts.interval_ms == 0 {
        return out;
    }

    for thumb in 0..u64::from(facts.thumb_count) {
        let start_ms = thumb * facts.interval_ms;
        if start_ms >= duration_ms {
            break;
        }
        let end_ms = ((thumb + 1) * facts.interval_ms).min(duration_ms);

        let sheet = thumb / per_sheet;
        let within = thumb % per_sheet;
        let col = within % u64::from(facts.tile_cols);
        let row = within / u64::from(facts.tile_cols);
        let x = col * u64::from(facts.thumb_width);
        let y = row * u64::from(facts.thumb_height);

        let url = facts.sprite_url_template.replace("{index}", &sheet.to_string());
        let _ = writeln!(out, "{} --> {}", timestamp(start_ms), timestamp(end_ms));
        let _ = writeln!(
            out,
            "{url}#xywh={x},{y},{},{}",
            facts.thumb_width, facts.thumb_height
        );
        out.push('\n');
    }
    out
}

fn timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> TrickplayFacts {
        TrickplayFacts {
            interval_ms: 10_000,
            thumb_width: 320,
            thumb_height: 180,
            tile_cols: 2,
            tile_rows: 2,
            thumb_count: 6,
            sprite_url_template: "/trickplay/part1/sheet-{index}.jpg".to_string(),
        }
    }

    #[test]
    fn test_cues_cover_duration_in_order() {
        let vtt = build_trickplay_vtt(&facts(), 55_000);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:10.000"));
        // Final cue clamps to the media duration
        assert!(vtt.contains("00:00:50.000 --> 00:00:55.000"));
    }

    #[test]
    fn test_sprite_regions_walk_the_grid() {
        let vtt = build_trickplay_vtt(&facts(), 60_000);
        assert!(vtt.contains("sheet-0.jpg#xywh=0,0,320,180"));
        assert!(vtt.contains("sheet-0.jpg#xywh=320,0,320,180"));
        assert!(vtt.contains("sheet-0.jpg#xywh=0,180,320,180"));
        assert!(vtt.contains("sheet-0.jpg#xywh=320,180,320,180"));
        // Fifth thumbnail rolls onto the next sheet
        assert!(vtt.contains("sheet-1.jpg#xywh=0,0,320,180"));
    }

    #[test]
    fn test_degenerate_geometry_yields_header_only() {
        let mut facts = facts();
        facts.tile_cols = 0;
        assert_eq!(build_trickplay_vtt(&facts, 60_000), "WEBVTT\n\n");
    }
}
