// results.rs - Result Normalization & Ordering
// Turns the loosely-typed records returned by the search endpoint into
// `VodResult` entities, then sorts and groups them for the pickers.
//
// Key Features:
// - Lenient field extraction (numbers sent as strings, alternate key names)
// - Title inference when a record carries no series metadata
// - Deterministic ordering: series before movies
// - Show → season → episode grouping for the hierarchical picker

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::identity::{self, QueryFilter};

/// Result cap used by the legacy digit-reaction flow (digits 1-9 plus 0).
pub const LEGACY_RESULT_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series,
}

impl ContentKind {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "series" | "show" | "tv" | "episode" => ContentKind::Series,
            _ => ContentKind::Movie,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Series => "series",
        }
    }
}

impl Default for ContentKind {
    fn default() -> Self {
        ContentKind::Movie
    }
}

/// One discoverable piece of content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VodResult {
    pub id: String,
    pub title: String,
    pub category: String,
    pub duration: String,
    pub year: Option<u32>,
    pub rating: String,
    pub stream_id: String,
    pub size_bytes: Option<u64>,
    pub size_human: Option<String>,
    pub kind: ContentKind,
    pub series_title: String,
    /// 0 means unknown.
    pub season: u32,
    /// 0 means unknown.
    pub episode: u32,
    pub episode_title: String,
}

impl VodResult {
    /// Whether a download or cache request can be issued for this result.
    pub fn is_actionable(&self) -> bool {
        !self.stream_id.trim().is_empty()
    }

    pub fn is_series(&self) -> bool {
        self.kind == ContentKind::Series
    }

    /// Series title when known, otherwise the raw title.
    pub fn display_series(&self) -> &str {
        if self.series_title.is_empty() {
            &self.title
        } else {
            &self.series_title
        }
    }
}

// ============================================================================
// RECORD FIELD HELPERS
// ============================================================================

fn text_field(record: &Value, keys: &[&str]) -> String {
    for key in keys {
        match record.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => continue,
        }
    }
    String::new()
}

fn int_field(record: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        let parsed = match record.get(*key) {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_some() {
            return parsed;
        }
    }
    None
}

/// Negative or missing numbers collapse to 0 ("unknown").
fn ordinal_field(record: &Value, keys: &[&str]) -> u32 {
    int_field(record, keys)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Convert one raw API record into a result entity.
pub fn normalize_record(record: &Value) -> VodResult {
    let title = text_field(record, &["title", "name"]);
    let kind_raw = text_field(record, &["type", "kind", "content_type"]);
    let mut result = VodResult {
        id: text_field(record, &["id", "content_id"]),
        title: title.clone(),
        category: text_field(record, &["category", "genre"]),
        duration: text_field(record, &["duration", "runtime"]),
        year: int_field(record, &["year", "release_year"])
            .and_then(|y| u32::try_from(y).ok())
            .filter(|y| *y > 0),
        rating: text_field(record, &["rating"]),
        stream_id: text_field(record, &["stream_id", "streamId", "stream"]),
        size_bytes: int_field(record, &["size", "size_bytes"]).and_then(|s| u64::try_from(s).ok()),
        size_human: Some(text_field(record, &["size_human", "size_readable"]))
            .filter(|s| !s.is_empty()),
        kind: ContentKind::parse(&kind_raw),
        series_title: text_field(record, &["series_title", "series", "show"]),
        season: ordinal_field(record, &["season"]),
        episode: ordinal_field(record, &["episode"]),
        episode_title: text_field(record, &["episode_title"]),
    };

    let has_series_metadata =
        !result.series_title.is_empty() || result.season > 0 || result.episode > 0;
    if has_series_metadata && kind_raw.is_empty() {
        result.kind = ContentKind::Series;
    }
    if !has_series_metadata {
        if let Some(parts) = identity::infer_title(&title) {
            result.series_title = parts.series;
            result.season = parts.season;
            result.episode = parts.episode;
            if result.episode_title.is_empty() {
                result.episode_title = parts.episode_title;
            }
            // An SxxEyy marker is strong enough evidence to override an absent kind.
            if kind_raw.is_empty() {
                result.kind = ContentKind::Series;
            }
        }
    }

    if result.is_series() && result.series_title.is_empty() {
        result.series_title = result.title.clone();
    }

    if result.size_human.is_none() {
        result.size_human = result.size_bytes.map(human_size);
    }

    result
}

pub fn normalize_records(records: &[Value]) -> Vec<VodResult> {
    records.iter().map(normalize_record).collect()
}

/// Render a byte count with binary units, e.g. `1.4 GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// ============================================================================
// ORDERING
// ============================================================================

fn compare_results(a: &VodResult, b: &VodResult) -> Ordering {
    let rank = |r: &VodResult| if r.is_series() { 0 } else { 1 };
    rank(a)
        .cmp(&rank(b))
        .then_with(|| match (a.is_series(), b.is_series()) {
            (true, true) => a
                .series_title
                .to_lowercase()
                .cmp(&b.series_title.to_lowercase())
                .then(a.season.cmp(&b.season))
                .then(a.episode.cmp(&b.episode))
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
            _ => a
                .title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.year.cmp(&b.year)),
        })
        // Final tiebreak keeps the order independent of input order.
        .then_with(|| a.stream_id.cmp(&b.stream_id))
        .then_with(|| a.id.cmp(&b.id))
}

/// Stable sort: series (by series title, season, episode, title) then movies (by title, year).
pub fn sort_results(results: &mut [VodResult]) {
    results.sort_by(compare_results);
}

/// Full pipeline used by the search commands: normalize, filter by the query, sort, cap.
pub fn prepare_results(records: &[Value], query: &str, cap: Option<usize>) -> Vec<VodResult> {
    let filter = QueryFilter::parse(query);
    let mut results = identity::filter_results(normalize_records(records), &filter);
    sort_results(&mut results);
    if let Some(cap) = cap {
        results.truncate(cap);
    }
    results
}

// ============================================================================
// SHOW GROUPING
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonGroup {
    pub number: u32,
    pub episodes: Vec<VodResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowGroup {
    pub title: String,
    pub seasons: Vec<SeasonGroup>,
}

impl ShowGroup {
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }
}

/// Bucket series results into show → season → episodes.
/// Movies are skipped; shows are ordered case-insensitively, seasons ascending,
/// episodes by number with the title as tiebreak.
pub fn group_by_show(results: &[VodResult]) -> Vec<ShowGroup> {
    let mut shows: Vec<ShowGroup> = Vec::new();

    for result in results.iter().filter(|r| r.is_series()) {
        let title = result.display_series().to_string();
        let key = title.to_lowercase();
        let show = match shows.iter().position(|s| s.title.to_lowercase() == key) {
            Some(idx) => &mut shows[idx],
            None => {
                shows.push(ShowGroup {
                    title,
                    seasons: Vec::new(),
                });
                let last = shows.len() - 1;
                &mut shows[last]
            }
        };

        match show.seasons.iter_mut().find(|s| s.number == result.season) {
            Some(season) => season.episodes.push(result.clone()),
            None => show.seasons.push(SeasonGroup {
                number: result.season,
                episodes: vec![result.clone()],
            }),
        }
    }

    shows.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    for show in &mut shows {
        show.seasons.sort_by_key(|s| s.number);
        for season in &mut show.seasons {
            season.episodes.sort_by(|a, b| {
                a.episode
                    .cmp(&b.episode)
                    .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            });
        }
    }

    shows
}
