// paging.rs - Pagination & Rendering Adapter
// Computes the visible window of a selection context and describes it as a
// `PickerView` (options, navigation state, header text). No I/O happens here;
// a `ChatSurface` turns the view into an actual message.

use std::ops::Range;

use crate::results::VodResult;
use crate::store::{PickIntent, Selection, SelectionContext, ShowStage, Surface};

/// The platform refuses more than 25 options in one dropdown.
pub const MAX_PAGE_SIZE: usize = 25;
/// Option labels and descriptions are capped at 100 characters.
pub const MAX_LABEL_LEN: usize = 100;

/// Digit reactions used by the legacy flow, in display order (positions 1..=10).
pub const DIGIT_EMOJIS: [&str; 10] = [
    "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "0️⃣",
];

/// Map a digit reaction to its 1-based list position; "0" means position 10.
pub fn digit_position(emoji: &str) -> Option<usize> {
    DIGIT_EMOJIS.iter().position(|d| *d == emoji).map(|i| i + 1)
}

/// Clamped page plus the half-open `[start, end)` range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub pages: usize,
    pub start: usize,
    pub end: usize,
}

impl PageWindow {
    pub fn compute(total: usize, page_size: usize, requested: usize) -> Self {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let pages = ((total + page_size - 1) / page_size).max(1);
        let page = requested.min(pages - 1);
        let start = (page * page_size).min(total);
        let end = ((page + 1) * page_size).min(total);
        Self {
            page,
            pages,
            start,
            end,
        }
    }

    /// Indices of the visible items, for slicing the full list.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Prev/next state, or `None` when everything fits on one page.
    pub fn navigation(&self) -> Option<Navigation> {
        (self.pages > 1).then(|| Navigation {
            prev_enabled: self.page > 0,
            next_enabled: self.page + 1 < self.pages,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

/// One selectable entry. `value` is opaque to the platform and is echoed back on pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOption {
    pub label: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerView {
    pub header: String,
    pub placeholder: String,
    pub options: Vec<PickOption>,
    pub navigation: Option<Navigation>,
    pub surface: Surface,
}

/// Cut `text` to at most `max` characters, ending with an ellipsis when shortened.
pub fn truncate_label(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// `Series S01E02 — Episode (2008)` for series, `Title (1999)` for movies.
pub fn result_label(result: &VodResult) -> String {
    let mut label = if result.is_series() {
        let mut s = format!(
            "{} S{:02}E{:02}",
            result.display_series(),
            result.season,
            result.episode
        );
        if !result.episode_title.is_empty() {
            s.push_str(" — ");
            s.push_str(&result.episode_title);
        }
        s
    } else {
        result.title.clone()
    };
    if let Some(year) = result.year {
        label.push_str(&format!(" ({})", year));
    }
    truncate_label(&label, MAX_LABEL_LEN)
}

pub fn result_description(result: &VodResult) -> String {
    let size = result.size_human.clone().unwrap_or_default();
    let rating = if result.rating.is_empty() {
        String::new()
    } else {
        format!("★ {}", result.rating)
    };
    let parts: Vec<&str> = [
        result.category.as_str(),
        result.duration.as_str(),
        size.as_str(),
        rating.as_str(),
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect();
    truncate_label(&parts.join(" · "), MAX_LABEL_LEN)
}

// ============================================================================
// OPTION VALUES
// ============================================================================

/// Decoded option value; the variant must match the context's current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickValue {
    Result(usize),
    Show(usize),
    Season(usize),
    Episode(usize),
}

impl PickValue {
    pub fn encode(&self) -> String {
        match self {
            PickValue::Result(i) => format!("result:{}", i),
            PickValue::Show(i) => format!("show:{}", i),
            PickValue::Season(i) => format!("season:{}", i),
            PickValue::Episode(i) => format!("episode:{}", i),
        }
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (kind, index) = raw.split_once(':')?;
        let index = index.parse().ok()?;
        match kind {
            "result" => Some(PickValue::Result(index)),
            "show" => Some(PickValue::Show(index)),
            "season" => Some(PickValue::Season(index)),
            "episode" => Some(PickValue::Episode(index)),
            _ => None,
        }
    }
}

// ============================================================================
// VIEW BUILDING
// ============================================================================

fn intent_suffix(intent: PickIntent) -> String {
    match intent {
        PickIntent::Download => String::new(),
        PickIntent::Cache(days) => format!(" · cache for {} day(s)", days.get()),
    }
}

/// Describe the current page of `context`. The stored page is clamped here too,
/// so a stale index can never address outside the list.
pub fn build_view(context: &SelectionContext) -> PickerView {
    let window = PageWindow::compute(context.selection.len(), context.page_size, context.page);
    let page_note = if window.pages > 1 {
        format!(" (page {}/{})", window.page + 1, window.pages)
    } else {
        String::new()
    };
    let suffix = intent_suffix(context.intent);

    let (header, placeholder, options) = match &context.selection {
        Selection::Flat { results } => {
            let options = results[window.range()]
                .iter()
                .enumerate()
                .map(|(offset, r)| PickOption {
                    label: result_label(r),
                    value: PickValue::Result(window.start + offset).encode(),
                    description: result_description(r),
                })
                .collect();
            (
                format!(
                    "🔎 {} result(s) for `{}`{}{}",
                    results.len(),
                    context.query,
                    suffix,
                    page_note
                ),
                "Choose a title".to_string(),
                options,
            )
        }
        Selection::Hierarchical { shows, stage } => match *stage {
            ShowStage::AwaitingShow => {
                let options = shows[window.range()]
                    .iter()
                    .enumerate()
                    .map(|(offset, show)| PickOption {
                        label: truncate_label(&show.title, MAX_LABEL_LEN),
                        value: PickValue::Show(window.start + offset).encode(),
                        description: format!(
                            "{} season(s) · {} episode(s)",
                            show.seasons.len(),
                            show.episode_count()
                        ),
                    })
                    .collect();
                (
                    format!("📺 {} show(s) for `{}`{}{}", shows.len(), context.query, suffix, page_note),
                    "Choose a show".to_string(),
                    options,
                )
            }
            ShowStage::AwaitingSeason { show } => {
                let group = &shows[show];
                let options = group.seasons[window.range()]
                    .iter()
                    .enumerate()
                    .map(|(offset, season)| PickOption {
                        label: season_label(season.number),
                        value: PickValue::Season(window.start + offset).encode(),
                        description: format!("{} episode(s)", season.episodes.len()),
                    })
                    .collect();
                (
                    format!("📺 **{}**{}{}", group.title, suffix, page_note),
                    "Choose a season".to_string(),
                    options,
                )
            }
            ShowStage::AwaitingEpisode { show, season } => {
                let group = &shows[show];
                let season_group = &group.seasons[season];
                let options = season_group.episodes[window.range()]
                    .iter()
                    .enumerate()
                    .map(|(offset, r)| PickOption {
                        label: result_label(r),
                        value: PickValue::Episode(window.start + offset).encode(),
                        description: result_description(r),
                    })
                    .collect();
                (
                    format!(
                        "📺 **{}** · {}{}{}",
                        group.title,
                        season_label(season_group.number),
                        suffix,
                        page_note
                    ),
                    "Choose an episode".to_string(),
                    options,
                )
            }
        },
    };

    // Reaction pickers have no dropdown, so the numbered list goes in the text.
    let header = match (&context.selection, context.surface) {
        (Selection::Flat { results }, Surface::Reactions) => format!(
            "{}\n\n{}\n\nReact with a number to choose.",
            header,
            legacy_list(&results[window.range()])
        ),
        _ => header,
    };

    PickerView {
        header,
        placeholder,
        options,
        navigation: window.navigation(),
        surface: context.surface,
    }
}

fn season_label(number: u32) -> String {
    if number == 0 {
        "Unknown season".to_string()
    } else {
        format!("Season {}", number)
    }
}

/// Numbered text list for the legacy digit-reaction picker.
pub fn legacy_list(results: &[VodResult]) -> String {
    results
        .iter()
        .zip(DIGIT_EMOJIS.iter())
        .map(|(r, digit)| format!("{} {}", digit, result_label(r)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::fixtures::{episode, movie};
    use crate::results::group_by_show;
    use crate::store::fixtures::flat_context;

    #[test]
    fn test_window_scenario_thirty_items() {
        let w = PageWindow::compute(30, 25, 5);
        assert_eq!(w.pages, 2);
        assert_eq!(w.page, 1);
        assert_eq!((w.start, w.end), (25, 30));
        assert_eq!(w.range().len(), 5);
    }

    #[test]
    fn test_window_sizes_for_every_page() {
        for total in 1..=80usize {
            for page_size in [1usize, 7, 10, 25] {
                let w0 = PageWindow::compute(total, page_size, 0);
                assert_eq!(w0.pages, (total + page_size - 1) / page_size);
                for k in 0..w0.pages {
                    let w = PageWindow::compute(total, page_size, k);
                    assert_eq!(w.range().len(), page_size.min(total - k * page_size));
                }
            }
        }
    }

    #[test]
    fn test_window_empty_list_has_one_page() {
        let w = PageWindow::compute(0, 25, 3);
        assert_eq!(w.pages, 1);
        assert_eq!(w.page, 0);
        assert!(w.range().is_empty());
        assert_eq!(w.navigation(), None);
    }

    #[test]
    fn test_page_size_is_capped() {
        let w = PageWindow::compute(100, 60, 0);
        assert_eq!(w.range().len(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_navigation_flags() {
        let first = PageWindow::compute(60, 25, 0).navigation().expect("multi-page");
        assert!(!first.prev_enabled && first.next_enabled);
        let last = PageWindow::compute(60, 25, 2).navigation().expect("multi-page");
        assert!(last.prev_enabled && !last.next_enabled);
        assert_eq!(PageWindow::compute(25, 25, 0).navigation(), None);
    }

    #[test]
    fn test_labels() {
        let mut ep = episode("Breaking Bad", 1, 3, "s");
        ep.episode_title = "Bag".to_string();
        ep.year = Some(2008);
        assert_eq!(result_label(&ep), "Breaking Bad S01E03 — Bag (2008)");
        assert_eq!(result_label(&movie("The Matrix", 1999, "m")), "The Matrix (1999)");

        let long = movie(&"x".repeat(150), 2000, "m");
        let label = result_label(&long);
        assert_eq!(label.chars().count(), MAX_LABEL_LEN);
        assert!(label.ends_with('…'));
    }

    #[test]
    fn test_digit_positions() {
        assert_eq!(digit_position("1️⃣"), Some(1));
        assert_eq!(digit_position("9️⃣"), Some(9));
        assert_eq!(digit_position("0️⃣"), Some(10));
        assert_eq!(digit_position("👍"), None);
    }

    #[test]
    fn test_pick_value_codec_rejects_garbage() {
        assert_eq!(PickValue::decode("show:4"), Some(PickValue::Show(4)));
        assert_eq!(PickValue::decode("show:-1"), None);
        assert_eq!(PickValue::decode("bogus"), None);
        assert_eq!(PickValue::decode("movie:1"), None);
    }

    #[test]
    fn test_build_view_flat_second_page() {
        let results: Vec<VodResult> = (0..30)
            .map(|i| movie(&format!("Movie {:02}", i), 2000, &format!("s{}", i)))
            .collect();
        let mut ctx = flat_context(1, results);
        ctx.page = 9;
        let view = build_view(&ctx);
        assert_eq!(view.options.len(), 5);
        assert_eq!(view.options[0].value, "result:25");
        assert!(view.header.contains("page 2/2"));
        let nav = view.navigation.expect("two pages");
        assert!(nav.prev_enabled && !nav.next_enabled);
    }

    #[test]
    fn test_reaction_view_lists_digits() {
        let mut ctx = flat_context(1, vec![movie("Heat", 1995, "h"), movie("Ronin", 1998, "r")]);
        ctx.surface = Surface::Reactions;
        let view = build_view(&ctx);
        assert!(view.header.contains("1️⃣ Heat (1995)\n2️⃣ Ronin (1998)"));
        assert_eq!(view.navigation, None);
    }

    #[test]
    fn test_build_view_hierarchy_steps() {
        let shows = group_by_show(&[
            episode("Lost", 1, 1, "a"),
            episode("Lost", 1, 2, "b"),
            episode("Lost", 2, 1, "c"),
        ]);
        let mut ctx = flat_context(1, vec![]);
        ctx.selection = Selection::Hierarchical {
            shows,
            stage: ShowStage::AwaitingSeason { show: 0 },
        };
        let view = build_view(&ctx);
        assert_eq!(view.options.len(), 2);
        assert_eq!(view.options[1].label, "Season 2");
        assert_eq!(view.options[1].value, "season:1");

        if let Selection::Hierarchical { stage, .. } = &mut ctx.selection {
            *stage = ShowStage::AwaitingEpisode { show: 0, season: 0 };
        }
        let view = build_view(&ctx);
        assert_eq!(view.placeholder, "Choose an episode");
        assert_eq!(view.options[1].value, "episode:1");
    }
}
