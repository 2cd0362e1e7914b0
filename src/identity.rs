// identity.rs - Identity Inference
// Best-effort parsing of free-text queries and messy release titles into
// (series, season, episode, episode title) identity.
//
// Nothing in here fails: an unparseable title simply yields no identity and
// a query without season/episode markers yields zeros ("unknown").

use once_cell::sync::Lazy;
use regex::Regex;

use crate::results::VodResult;

// Query tokens: `s2e4`, `S02E04`
static SEASON_EPISODE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^s(\d{1,2})e(\d{1,2})$").expect("Invalid season/episode token regex")
});

// Query tokens given separately: `s2` `e4`
static SEASON_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^s(\d{1,2})$").expect("Invalid season token regex"));
static EPISODE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^e(\d{1,2})$").expect("Invalid episode token regex"));

// Release titles. The series name is everything before the marker, minus any
// quality/encoding tags sitting directly in front of it. Accepted markers:
// S01E02, S01x02, S01×02. Whatever follows the marker (after an optional
// dash/colon) is the episode title.
static TITLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*
        (?P<series>.+?)
        [\s._\-]+
        (?:[\[(]?(?:\d{3,4}p|4k|uhd|hdr(?:10)?|x26[45]|h\.?26[45]|hevc|web-?dl|webrip|bluray|hdtv)[\])]?[\s._\-]+)*
        s(?P<season>\d{1,2})
        \s*(?:e|x|×)\s*
        (?P<episode>\d{1,3})
        (?:[\s._]*[-–—:|]+)?
        [\s._]*
        (?P<title>.*?)
        \s*$",
    )
    .expect("Invalid title inference regex")
});

/// Structured identity recovered from a release title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleParts {
    pub series: String,
    pub season: u32,
    pub episode: u32,
    pub episode_title: String,
}

/// Split a raw title into series, season, episode and trailing episode title.
pub fn infer_title(raw: &str) -> Option<TitleParts> {
    let caps = TITLE_PATTERN.captures(raw)?;

    let series = tidy_series(caps.name("series")?.as_str());
    if series.is_empty() {
        return None;
    }

    let season = caps.name("season")?.as_str().parse().ok()?;
    let episode = caps.name("episode")?.as_str().parse().ok()?;
    let episode_title = caps
        .name("title")
        .map(|m| {
            m.as_str()
                .trim_matches(|c: char| c.is_whitespace() || "-–—:|._".contains(c))
                .to_string()
        })
        .unwrap_or_default();

    Some(TitleParts {
        series,
        season,
        episode,
        episode_title,
    })
}

// Dotted scene names ("Breaking.Bad") become spaced names.
fn tidy_series(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || "-._".contains(c));
    if trimmed.contains(char::is_whitespace) {
        trimmed.to_string()
    } else {
        trimmed.replace(|c: char| c == '.' || c == '_', " ")
    }
}

// ============================================================================
// QUERY FILTERS
// ============================================================================

/// Text tokens plus numeric season/episode constraints parsed from a user query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryFilter {
    pub tokens: Vec<String>,
    /// 0 when the query named no season.
    pub season: u32,
    /// 0 when the query named no episode.
    pub episode: u32,
}

impl QueryFilter {
    pub fn parse(query: &str) -> Self {
        let mut filter = QueryFilter::default();

        for token in query.split_whitespace() {
            if let Some(caps) = SEASON_EPISODE_TOKEN.captures(token) {
                filter.season = caps[1].parse().unwrap_or(0);
                filter.episode = caps[2].parse().unwrap_or(0);
            } else if let Some(caps) = SEASON_TOKEN.captures(token) {
                filter.season = caps[1].parse().unwrap_or(0);
            } else if let Some(caps) = EPISODE_TOKEN.captures(token) {
                filter.episode = caps[1].parse().unwrap_or(0);
            } else {
                filter.tokens.push(token.to_lowercase());
            }
        }

        filter
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.season == 0 && self.episode == 0
    }

    /// Every token must appear somewhere in the result's searchable text, and a
    /// requested season/episode must match exactly unless the result's value is unknown.
    pub fn matches(&self, result: &VodResult) -> bool {
        if self.season > 0 && result.season > 0 && result.season != self.season {
            return false;
        }
        if self.episode > 0 && result.episode > 0 && result.episode != self.episode {
            return false;
        }

        let year = result.year.map(|y| y.to_string()).unwrap_or_default();
        let haystack = [
            result.series_title.as_str(),
            result.title.as_str(),
            result.episode_title.as_str(),
            result.category.as_str(),
            year.as_str(),
        ]
        .join(" ")
        .to_lowercase();

        self.tokens.iter().all(|t| haystack.contains(t.as_str()))
    }
}

/// Apply the filter, falling back to the unfiltered list when nothing survives.
pub fn filter_results(results: Vec<VodResult>, filter: &QueryFilter) -> Vec<VodResult> {
    if filter.is_empty() {
        return results;
    }

    let matched: Vec<VodResult> = results.iter().filter(|r| filter.matches(r)).cloned().collect();
    if matched.is_empty() {
        log::debug!(
            "[IDENTITY] Filter {:?} eliminated all {} results, keeping the unfiltered list",
            filter,
            results.len()
        );
        results
    } else {
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::fixtures::{episode, movie};

    #[test]
    fn test_query_without_markers() {
        let filter = QueryFilter::parse("the matrix");
        assert_eq!(filter.tokens, vec!["the", "matrix"]);
        assert_eq!(filter.season, 0);
        assert_eq!(filter.episode, 0);
    }

    #[test]
    fn test_query_with_combined_marker() {
        let filter = QueryFilter::parse("game of thrones s2e4");
        assert_eq!(filter.tokens, vec!["game", "of", "thrones"]);
        assert_eq!(filter.season, 2);
        assert_eq!(filter.episode, 4);
    }

    #[test]
    fn test_query_with_separate_markers() {
        let filter = QueryFilter::parse("Lost S03 E12");
        assert_eq!(filter.tokens, vec!["lost"]);
        assert_eq!(filter.season, 3);
        assert_eq!(filter.episode, 12);
    }

    #[test]
    fn test_infer_title_with_dash() {
        let parts = infer_title("Breaking Bad S01E03 - Bag").expect("should parse");
        assert_eq!(parts.series, "Breaking Bad");
        assert_eq!(parts.season, 1);
        assert_eq!(parts.episode, 3);
        assert_eq!(parts.episode_title, "Bag");
    }

    #[test]
    fn test_infer_title_separator_styles() {
        let x = infer_title("Dark S02x05").expect("x separator");
        assert_eq!((x.season, x.episode), (2, 5));
        assert_eq!(x.episode_title, "");

        let times = infer_title("Dark S02×06: Lost and Found").expect("× separator");
        assert_eq!((times.season, times.episode), (2, 6));
        assert_eq!(times.episode_title, "Lost and Found");
    }

    #[test]
    fn test_infer_title_skips_quality_tags() {
        let parts = infer_title("The Office [1080p] x265 S04E01 Fun Run").expect("should parse");
        assert_eq!(parts.series, "The Office");
        assert_eq!(parts.season, 4);
        assert_eq!(parts.episode, 1);
        assert_eq!(parts.episode_title, "Fun Run");
    }

    #[test]
    fn test_infer_title_dotted_name() {
        let parts = infer_title("Better.Call.Saul.S01E01").expect("should parse");
        assert_eq!(parts.series, "Better Call Saul");
    }

    #[test]
    fn test_infer_title_failure_is_none() {
        assert_eq!(infer_title("The Matrix (1999)"), None);
        assert_eq!(infer_title(""), None);
    }

    #[test]
    fn test_filter_by_tokens_and_numbers() {
        let results = vec![
            episode("Lost", 1, 1, "a"),
            episode("Lost", 2, 4, "b"),
            movie("Lost in Translation", 2003, "c"),
        ];
        let filtered = filter_results(results, &QueryFilter::parse("lost s2e4"));
        let streams: Vec<&str> = filtered.iter().map(|r| r.stream_id.as_str()).collect();
        // The movie has no known season/episode so it is not excluded.
        assert_eq!(streams, vec!["b", "c"]);
    }

    #[test]
    fn test_filter_falls_back_when_empty() {
        let results = vec![movie("Alien", 1979, "a"), movie("Heat", 1995, "b")];
        let filtered = filter_results(results.clone(), &QueryFilter::parse("nonexistent"));
        assert_eq!(filtered, results);
    }

    #[test]
    fn test_filter_matches_year_and_category() {
        let mut alien = movie("Alien", 1979, "a");
        alien.category = "Horror".to_string();
        let results = vec![alien, movie("Heat", 1995, "b")];
        let filtered = filter_results(results, &QueryFilter::parse("horror 1979"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].stream_id, "a");
    }
}
