// dispatch.rs - Interaction Dispatcher
// Opens pickers and routes every later platform event (digit reaction, page
// button, dropdown pick) to the selection context of the message it targets.
//
// Flat flow:          AwaitingPick -> Terminal
// Hierarchical flow:  AwaitingShow -> AwaitingSeason -> AwaitingEpisode -> Terminal
//
// Key Features:
// - Owner check on every event, mismatches dropped without a reply
// - Terminal picks remove the context inside the same write section that
//   resolved them, so duplicate or racing events find nothing
// - Download flow inline, cache flow handed to the `CachePoller`
// - Render failures are logged and end the flow; there is no retry

use chrono::Utc;
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::sync::Arc;

use crate::api::{DownloadRequest, DownloadTicket, VodApi};
use crate::paging::{build_view, digit_position, result_label, PageWindow, PickValue, PickerView, DIGIT_EMOJIS};
use crate::poller::{CachePoller, CacheRequest, PollSettings, PollerHandle};
use crate::results::{group_by_show, VodResult, LEGACY_RESULT_CAP};
use crate::store::{
    EntryAction, PickIntent, Selection, SelectionContext, SelectionStore, ShowStage, Surface,
};
use crate::surface::{ChatSurface, RenderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    Prev,
    Next,
}

/// A platform event that targets a rendered picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    Page {
        message: MessageId,
        actor: UserId,
        direction: PageDirection,
    },
    Pick {
        message: MessageId,
        actor: UserId,
        value: String,
    },
    Reaction {
        message: MessageId,
        actor: UserId,
        emoji: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No context: never stored, already consumed, or swept.
    UnknownMessage,
    NotOwner,
    InvalidValue,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Ignored(IgnoreReason),
    Rerendered,
    Downloaded,
    CacheStarted(PollerHandle),
    Failed,
}

/// What the write section decided; acted on after the lock is released.
enum Step {
    Denied,
    Invalid,
    Rerender(ChannelId, PickerView),
    Terminal {
        channel: ChannelId,
        intent: PickIntent,
        result: VodResult,
    },
}

pub struct Dispatcher {
    store: Arc<dyn SelectionStore>,
    surface: Arc<dyn ChatSurface>,
    api: Arc<dyn VodApi>,
    poller: CachePoller,
    page_size: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SelectionStore>,
        surface: Arc<dyn ChatSurface>,
        api: Arc<dyn VodApi>,
        settings: PollSettings,
        page_size: usize,
    ) -> Self {
        let poller = CachePoller::new(api.clone(), surface.clone(), settings);
        Self {
            store,
            surface,
            api,
            poller,
            page_size,
        }
    }

    pub fn api(&self) -> &Arc<dyn VodApi> {
        &self.api
    }

    // ------------------------------------------------------------------------
    // Opening pickers
    // ------------------------------------------------------------------------

    async fn open(&self, context: SelectionContext) -> Result<MessageId, RenderError> {
        let view = build_view(&context);
        let message = self.surface.send_picker(context.channel, &view).await?;
        log::info!(
            "[DISPATCH] Opened {:?} picker {} for user {} ({} option(s), query '{}')",
            context.surface,
            message,
            context.owner,
            context.selection.len(),
            context.query
        );
        self.store.put(message, context).await;
        Ok(message)
    }

    /// Paginated dropdown over a flat result list. Returns `None` when there is
    /// nothing to pick.
    pub async fn open_flat(
        &self,
        owner: UserId,
        channel: ChannelId,
        query: &str,
        results: Vec<VodResult>,
        intent: PickIntent,
    ) -> Result<Option<MessageId>, RenderError> {
        if results.is_empty() {
            return Ok(None);
        }
        let context = self.context(
            owner,
            channel,
            query,
            intent,
            Surface::Components,
            Selection::Flat { results },
            self.page_size,
        );
        self.open(context).await.map(Some)
    }

    /// Show -> season -> episode browser. Movies in `results` are skipped.
    pub async fn open_shows(
        &self,
        owner: UserId,
        channel: ChannelId,
        query: &str,
        results: &[VodResult],
    ) -> Result<Option<MessageId>, RenderError> {
        let shows = group_by_show(results);
        if shows.is_empty() {
            return Ok(None);
        }
        let context = self.context(
            owner,
            channel,
            query,
            PickIntent::Download,
            Surface::Components,
            Selection::Hierarchical {
                shows,
                stage: ShowStage::AwaitingShow,
            },
            self.page_size,
        );
        self.open(context).await.map(Some)
    }

    /// Numbered list picked with digit reactions, at most ten entries.
    pub async fn open_legacy(
        &self,
        owner: UserId,
        channel: ChannelId,
        query: &str,
        mut results: Vec<VodResult>,
    ) -> Result<Option<MessageId>, RenderError> {
        results.truncate(LEGACY_RESULT_CAP);
        if results.is_empty() {
            return Ok(None);
        }
        let count = results.len();
        let context = self.context(
            owner,
            channel,
            query,
            PickIntent::Download,
            Surface::Reactions,
            Selection::Flat { results },
            LEGACY_RESULT_CAP,
        );
        let message = self.open(context).await?;

        for digit in DIGIT_EMOJIS.iter().take(count) {
            if let Err(e) = self.surface.react(channel, message, digit).await {
                log::warn!("[DISPATCH] Could not add {} to picker {}: {}", digit, message, e);
                break;
            }
        }
        Ok(Some(message))
    }

    #[allow(clippy::too_many_arguments)]
    fn context(
        &self,
        owner: UserId,
        channel: ChannelId,
        query: &str,
        intent: PickIntent,
        surface: Surface,
        selection: Selection,
        page_size: usize,
    ) -> SelectionContext {
        SelectionContext {
            owner,
            channel,
            query: query.to_string(),
            intent,
            surface,
            selection,
            page: 0,
            page_size,
            created: Utc::now(),
        }
    }

    // ------------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------------

    pub async fn handle(&self, event: InteractionEvent) -> DispatchOutcome {
        match event {
            InteractionEvent::Page {
                message,
                actor,
                direction,
            } => self.handle_page(message, actor, direction).await,
            InteractionEvent::Pick {
                message,
                actor,
                value,
            } => match PickValue::decode(&value) {
                Some(value) => self.handle_pick(message, actor, value, Surface::Components).await,
                None => {
                    log::debug!("[DISPATCH] Undecodable pick '{}' on message {}", value, message);
                    DispatchOutcome::Ignored(IgnoreReason::InvalidValue)
                }
            },
            InteractionEvent::Reaction {
                message,
                actor,
                emoji,
            } => match digit_position(&emoji) {
                Some(position) => {
                    self.handle_pick(message, actor, PickValue::Result(position - 1), Surface::Reactions)
                        .await
                }
                None => DispatchOutcome::Ignored(IgnoreReason::InvalidValue),
            },
        }
    }

    async fn handle_page(&self, message: MessageId, actor: UserId, direction: PageDirection) -> DispatchOutcome {
        let mut step = Step::Invalid;
        let found = self
            .store
            .with_entry(message, &mut |ctx: &mut SelectionContext| {
                if !ctx.is_owned_by(actor) {
                    step = Step::Denied;
                    return EntryAction::Keep;
                }
                if ctx.surface != Surface::Components {
                    return EntryAction::Keep;
                }
                let window = PageWindow::compute(ctx.selection.len(), ctx.page_size, ctx.page);
                ctx.page = match direction {
                    PageDirection::Prev => window.page.saturating_sub(1),
                    PageDirection::Next => (window.page + 1).min(window.pages - 1),
                };
                step = Step::Rerender(ctx.channel, build_view(ctx));
                EntryAction::Keep
            })
            .await;

        if !found {
            return self.stale(message);
        }
        self.apply(message, actor, step).await
    }

    async fn handle_pick(
        &self,
        message: MessageId,
        actor: UserId,
        value: PickValue,
        via: Surface,
    ) -> DispatchOutcome {
        let mut step = Step::Invalid;
        let found = self
            .store
            .with_entry(message, &mut |ctx: &mut SelectionContext| {
                if !ctx.is_owned_by(actor) {
                    step = Step::Denied;
                    return EntryAction::Keep;
                }
                if ctx.surface != via {
                    return EntryAction::Keep;
                }
                step = advance(ctx, value);
                match step {
                    Step::Terminal { .. } => EntryAction::Remove,
                    _ => EntryAction::Keep,
                }
            })
            .await;

        if !found {
            return self.stale(message);
        }
        self.apply(message, actor, step).await
    }

    fn stale(&self, message: MessageId) -> DispatchOutcome {
        log::debug!("[DISPATCH] No selection context for message {}, dropping event", message);
        DispatchOutcome::Ignored(IgnoreReason::UnknownMessage)
    }

    async fn apply(&self, message: MessageId, actor: UserId, step: Step) -> DispatchOutcome {
        match step {
            Step::Denied => {
                log::debug!("[DISPATCH] User {} does not own picker {}, ignoring", actor, message);
                DispatchOutcome::Ignored(IgnoreReason::NotOwner)
            }
            Step::Invalid => {
                log::debug!("[DISPATCH] Invalid selection on picker {} by {}", message, actor);
                DispatchOutcome::Ignored(IgnoreReason::InvalidValue)
            }
            Step::Rerender(channel, view) => match self.surface.edit_picker(channel, message, &view).await {
                Ok(()) => DispatchOutcome::Rerendered,
                Err(e) => {
                    log::warn!("[DISPATCH] Re-render of picker {} failed: {}", message, e);
                    DispatchOutcome::Failed
                }
            },
            Step::Terminal {
                channel,
                intent,
                result,
            } => {
                log::info!(
                    "[DISPATCH] User {} picked {} '{}' (stream {}) on message {}",
                    actor,
                    result.kind.as_str(),
                    result.title,
                    result.stream_id,
                    message
                );
                match intent {
                    PickIntent::Download => self.download(actor, channel, message, result).await,
                    PickIntent::Cache(days) => {
                        let notice = format!(
                            "📦 Selected **{}** for caching ({} day(s)).",
                            result_label(&result),
                            days.get()
                        );
                        if let Err(e) = self.surface.edit_text(channel, message, &notice).await {
                            log::warn!("[DISPATCH] Could not close picker {}: {}", message, e);
                            return DispatchOutcome::Failed;
                        }
                        let request = CacheRequest {
                            owner: actor,
                            channel,
                            result,
                            days,
                        };
                        match self.poller.start(request).await {
                            Ok(handle) => DispatchOutcome::CacheStarted(handle),
                            Err(e) => {
                                log::error!("[DISPATCH] Cache flow for picker {} ended early: {}", message, e);
                                DispatchOutcome::Failed
                            }
                        }
                    }
                }
            }
        }
    }

    async fn download(
        &self,
        actor: UserId,
        channel: ChannelId,
        message: MessageId,
        result: VodResult,
    ) -> DispatchOutcome {
        let label = result_label(&result);
        let (text, outcome) = match self.api.resolve_user(actor).await {
            Ok(Some(user)) => {
                let request = DownloadRequest {
                    user_id: user.id,
                    stream_id: result.stream_id.clone(),
                };
                match self.api.request_download(&request).await {
                    Ok(ticket) => (render_ticket(&label, &ticket), DispatchOutcome::Downloaded),
                    Err(e) => {
                        log::error!("[DISPATCH] Download request for stream {} failed: {}", request.stream_id, e);
                        (
                            format!("❌ Could not start the download of **{}**. Please try again later.", label),
                            DispatchOutcome::Failed,
                        )
                    }
                }
            }
            Ok(None) => (
                "❌ Your Discord account is not linked to a streaming account.".to_string(),
                DispatchOutcome::Failed,
            ),
            Err(e) => {
                log::error!("[DISPATCH] Identity lookup for user {} failed: {}", actor, e);
                (
                    "❌ Could not verify your account right now. Please try again later.".to_string(),
                    DispatchOutcome::Failed,
                )
            }
        };

        match self.surface.edit_text(channel, message, &text).await {
            Ok(()) => outcome,
            Err(e) => {
                log::warn!("[DISPATCH] Could not render download result on {}: {}", message, e);
                DispatchOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------------

    pub async fn sweep_expired(&self) -> usize {
        self.store.sweep_expired(Utc::now()).await
    }

    pub async fn open_pickers(&self) -> usize {
        self.store.len().await
    }

    /// Cancel every running cache poll.
    pub fn shutdown(&self) {
        self.poller.shutdown();
    }
}

/// Resolve `value` against the context's current step, mutating the stage for
/// non-terminal hierarchy picks.
fn advance(ctx: &mut SelectionContext, value: PickValue) -> Step {
    let channel = ctx.channel;
    let intent = ctx.intent;
    let terminal = |result: Option<&VodResult>| match result {
        Some(result) if result.is_actionable() => Step::Terminal {
            channel,
            intent,
            result: result.clone(),
        },
        _ => Step::Invalid,
    };

    let next_stage = match (&ctx.selection, value) {
        (Selection::Flat { results }, PickValue::Result(i)) => return terminal(results.get(i)),
        (Selection::Hierarchical { shows, stage }, value) => match (*stage, value) {
            (ShowStage::AwaitingShow, PickValue::Show(i)) if i < shows.len() => {
                ShowStage::AwaitingSeason { show: i }
            }
            (ShowStage::AwaitingSeason { show }, PickValue::Season(i)) if i < shows[show].seasons.len() => {
                ShowStage::AwaitingEpisode { show, season: i }
            }
            (ShowStage::AwaitingEpisode { show, season }, PickValue::Episode(i)) => {
                return terminal(shows[show].seasons[season].episodes.get(i));
            }
            _ => return Step::Invalid,
        },
        _ => return Step::Invalid,
    };

    if let Selection::Hierarchical { stage, .. } = &mut ctx.selection {
        *stage = next_stage;
    }
    ctx.page = 0;
    Step::Rerender(channel, build_view(ctx))
}

fn render_ticket(label: &str, ticket: &DownloadTicket) -> String {
    let mut text = format!("✅ **Download ready:** {}", label);
    if let Some(url) = &ticket.url {
        text.push_str(&format!("\n{}", url));
    }
    if let Some(message) = &ticket.message {
        text.push_str(&format!("\n{}", message));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fakes::{downloading, FakeApi};
    use crate::results::fixtures::{episode, movie};
    use crate::store::{CacheDays, MemorySelectionStore};
    use crate::surface::fakes::{Rendered, RecordingSurface};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const OWNER: UserId = UserId(42);
    const CHANNEL: ChannelId = ChannelId(9);

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        store: Arc<MemorySelectionStore>,
        surface: Arc<RecordingSurface>,
        api: Arc<FakeApi>,
    }

    fn harness_with(api: FakeApi) -> Harness {
        let store = Arc::new(MemorySelectionStore::default());
        let surface = Arc::new(RecordingSurface::new());
        let api = Arc::new(api);
        let settings = PollSettings {
            interval: Duration::from_millis(5),
            deadline: Duration::from_secs(5),
        };
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            surface.clone(),
            api.clone(),
            settings,
            25,
        ));
        Harness {
            dispatcher,
            store,
            surface,
            api,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeApi::linked())
    }

    fn movies(n: usize) -> Vec<VodResult> {
        (0..n)
            .map(|i| movie(&format!("Movie {:02}", i), 2000, &format!("stream-{}", i)))
            .collect()
    }

    fn pick(message: MessageId, actor: UserId, value: &str) -> InteractionEvent {
        InteractionEvent::Pick {
            message,
            actor,
            value: value.to_string(),
        }
    }

    fn page(message: MessageId, actor: UserId, direction: PageDirection) -> InteractionEvent {
        InteractionEvent::Page {
            message,
            actor,
            direction,
        }
    }

    async fn open_movies(h: &Harness, n: usize) -> MessageId {
        h.dispatcher
            .open_flat(OWNER, CHANNEL, "movie", movies(n), PickIntent::Download)
            .await
            .expect("render")
            .expect("non-empty")
    }

    #[tokio::test]
    async fn test_paging_clamps_at_both_ends() {
        let h = harness();
        let msg = open_movies(&h, 30).await;

        let outcome = h.dispatcher.handle(page(msg, OWNER, PageDirection::Prev)).await;
        assert!(matches!(outcome, DispatchOutcome::Rerendered));
        assert_eq!(h.store.get(msg).await.expect("context").page, 0);

        for _ in 0..3 {
            h.dispatcher.handle(page(msg, OWNER, PageDirection::Next)).await;
        }
        assert_eq!(h.store.get(msg).await.expect("context").page, 1);

        let last = h.surface.rendered().pop().expect("edit rendered");
        match last {
            Rendered::PickerEdit(id, view) => {
                assert_eq!(id, msg);
                assert_eq!(view.options.len(), 5);
                assert_eq!(view.options[0].value, "result:25");
            }
            other => panic!("unexpected render {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_users_are_ignored() {
        let h = harness();
        let msg = open_movies(&h, 3).await;

        let outcome = h.dispatcher.handle(pick(msg, UserId(7), "result:0")).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::NotOwner)));
        let outcome = h.dispatcher.handle(page(msg, UserId(7), PageDirection::Next)).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::NotOwner)));

        assert_eq!(h.api.download_count(), 0);
        assert!(h.store.get(msg).await.is_some());
    }

    #[tokio::test]
    async fn test_terminal_pick_consumes_once() {
        let h = harness();
        let msg = open_movies(&h, 3).await;

        let first = h.dispatcher.handle(pick(msg, OWNER, "result:1")).await;
        assert!(matches!(first, DispatchOutcome::Downloaded));
        let second = h.dispatcher.handle(pick(msg, OWNER, "result:1")).await;
        assert!(matches!(second, DispatchOutcome::Ignored(IgnoreReason::UnknownMessage)));
        let stale_page = h.dispatcher.handle(page(msg, OWNER, PageDirection::Next)).await;
        assert!(matches!(stale_page, DispatchOutcome::Ignored(IgnoreReason::UnknownMessage)));

        assert_eq!(h.api.download_count(), 1);
        assert_eq!(h.api.downloads.lock().expect("poisoned")[0].stream_id, "stream-1");
        let text = h.surface.text_edits().pop().expect("download rendered");
        assert!(text.contains("https://vod.local/d/stream-1"));
    }

    #[tokio::test]
    async fn test_racing_picks_start_one_download() {
        let h = harness();
        let msg = open_movies(&h, 3).await;

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                tokio::spawn(async move { dispatcher.handle(pick(msg, OWNER, "result:0")).await })
            })
            .collect();
        let mut downloaded = 0;
        for task in tasks {
            if matches!(task.await.expect("task"), DispatchOutcome::Downloaded) {
                downloaded += 1;
            }
        }
        assert_eq!(downloaded, 1);
        assert_eq!(h.api.download_count(), 1);
    }

    #[tokio::test]
    async fn test_digit_zero_is_tenth_entry() {
        let h = harness();
        let msg = h
            .dispatcher
            .open_legacy(OWNER, CHANNEL, "movie", movies(12))
            .await
            .expect("render")
            .expect("non-empty");

        let reactions = h
            .surface
            .rendered()
            .into_iter()
            .filter(|r| matches!(r, Rendered::Reaction(..)))
            .count();
        assert_eq!(reactions, 10);

        let outcome = h
            .dispatcher
            .handle(InteractionEvent::Reaction {
                message: msg,
                actor: OWNER,
                emoji: "0️⃣".to_string(),
            })
            .await;
        assert!(matches!(outcome, DispatchOutcome::Downloaded));
        assert_eq!(h.api.downloads.lock().expect("poisoned")[0].stream_id, "stream-9");
    }

    #[tokio::test]
    async fn test_digit_past_end_is_ignored() {
        let h = harness();
        let msg = h
            .dispatcher
            .open_legacy(OWNER, CHANNEL, "movie", movies(3))
            .await
            .expect("render")
            .expect("non-empty");

        for emoji in ["0️⃣", "4️⃣", "👍"] {
            let outcome = h
                .dispatcher
                .handle(InteractionEvent::Reaction {
                    message: msg,
                    actor: OWNER,
                    emoji: emoji.to_string(),
                })
                .await;
            assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::InvalidValue)));
        }
        assert!(h.store.get(msg).await.is_some());
        assert_eq!(h.api.download_count(), 0);
    }

    #[tokio::test]
    async fn test_result_without_stream_is_ignored() {
        let h = harness();
        let mut results = movies(2);
        results[0].stream_id.clear();
        let msg = h
            .dispatcher
            .open_flat(OWNER, CHANNEL, "movie", results, PickIntent::Download)
            .await
            .expect("render")
            .expect("non-empty");

        let outcome = h.dispatcher.handle(pick(msg, OWNER, "result:0")).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::InvalidValue)));
        assert!(h.store.get(msg).await.is_some());

        let outcome = h.dispatcher.handle(pick(msg, OWNER, "garbage")).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::InvalidValue)));
    }

    #[tokio::test]
    async fn test_show_season_episode_flow() {
        let h = harness();
        let results = vec![
            movie("Heat", 1995, "heat"),
            episode("Lost", 1, 1, "lost-101"),
            episode("Lost", 1, 2, "lost-102"),
            episode("Lost", 2, 1, "lost-201"),
            episode("Alias", 1, 1, "alias-101"),
        ];
        let msg = h
            .dispatcher
            .open_shows(OWNER, CHANNEL, "lost", &results)
            .await
            .expect("render")
            .expect("has shows");

        // Wrong step for the current stage.
        let outcome = h.dispatcher.handle(pick(msg, OWNER, "episode:0")).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(IgnoreReason::InvalidValue)));

        // Shows are sorted, so Lost is index 1.
        let outcome = h.dispatcher.handle(pick(msg, OWNER, "show:1")).await;
        assert!(matches!(outcome, DispatchOutcome::Rerendered));
        let outcome = h.dispatcher.handle(pick(msg, OWNER, "season:0")).await;
        assert!(matches!(outcome, DispatchOutcome::Rerendered));

        let ctx = h.store.get(msg).await.expect("context");
        assert!(matches!(
            ctx.selection,
            Selection::Hierarchical {
                stage: ShowStage::AwaitingEpisode { show: 1, season: 0 },
                ..
            }
        ));

        let outcome = h.dispatcher.handle(pick(msg, OWNER, "episode:1")).await;
        assert!(matches!(outcome, DispatchOutcome::Downloaded));
        assert_eq!(h.api.downloads.lock().expect("poisoned")[0].stream_id, "lost-102");
        assert!(h.store.get(msg).await.is_none());
    }

    #[tokio::test]
    async fn test_episode_paging_inside_season() {
        let h = harness();
        let results: Vec<VodResult> = (1..=30)
            .map(|n| episode("Lost", 1, n, &format!("e{}", n)))
            .collect();
        let msg = h
            .dispatcher
            .open_shows(OWNER, CHANNEL, "lost", &results)
            .await
            .expect("render")
            .expect("has shows");

        h.dispatcher.handle(pick(msg, OWNER, "show:0")).await;
        h.dispatcher.handle(pick(msg, OWNER, "season:0")).await;
        assert_eq!(h.store.get(msg).await.expect("context").page, 0);

        let outcome = h.dispatcher.handle(page(msg, OWNER, PageDirection::Next)).await;
        assert!(matches!(outcome, DispatchOutcome::Rerendered));
        assert_eq!(h.store.get(msg).await.expect("context").page, 1);

        match h.surface.rendered().pop().expect("edit rendered") {
            Rendered::PickerEdit(id, view) => {
                assert_eq!(id, msg);
                assert_eq!(view.placeholder, "Choose an episode");
                assert_eq!(view.options.len(), 5);
                assert_eq!(view.options[0].value, "episode:25");
            }
            other => panic!("unexpected render {:?}", other),
        }

        let outcome = h.dispatcher.handle(pick(msg, OWNER, "episode:27")).await;
        assert!(matches!(outcome, DispatchOutcome::Downloaded));
        assert_eq!(h.api.downloads.lock().expect("poisoned")[0].stream_id, "e28");
    }

    #[tokio::test]
    async fn test_shows_without_series_opens_nothing() {
        let h = harness();
        let opened = h
            .dispatcher
            .open_shows(OWNER, CHANNEL, "heat", &movies(4))
            .await
            .expect("render");
        assert_eq!(opened, None);
        assert!(h.surface.rendered().is_empty());
    }

    #[tokio::test]
    async fn test_cache_pick_starts_single_job() {
        let h = harness_with(FakeApi::linked().with_progress(vec![downloading(1, 10)]));
        let days = CacheDays::new(3).expect("valid");
        let msg = h
            .dispatcher
            .open_flat(OWNER, CHANNEL, "movie", movies(2), PickIntent::Cache(days))
            .await
            .expect("render")
            .expect("non-empty");

        let handle = match h.dispatcher.handle(pick(msg, OWNER, "result:0")).await {
            DispatchOutcome::CacheStarted(handle) => handle,
            other => panic!("expected cache start, got {:?}", other),
        };
        let again = h.dispatcher.handle(pick(msg, OWNER, "result:0")).await;
        assert!(matches!(again, DispatchOutcome::Ignored(IgnoreReason::UnknownMessage)));

        assert_eq!(h.api.cache_start_count(), 1);
        assert_eq!(h.api.cache_starts.lock().expect("poisoned")[0].days, 3);
        assert_eq!(h.api.download_count(), 0);

        h.dispatcher.shutdown();
        assert_eq!(handle.finished().await, crate::poller::PollEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_render_failure_aborts_page_change() {
        let h = harness();
        let msg = open_movies(&h, 30).await;
        h.surface.fail_edits.store(true, Ordering::SeqCst);

        let outcome = h.dispatcher.handle(page(msg, OWNER, PageDirection::Next)).await;
        assert!(matches!(outcome, DispatchOutcome::Failed));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_old_pickers() {
        let h = harness();
        let msg = open_movies(&h, 2).await;
        assert_eq!(h.dispatcher.open_pickers().await, 1);
        assert_eq!(h.dispatcher.sweep_expired().await, 0);

        let mut ctx = h.store.remove(msg).await.expect("context");
        ctx.created = Utc::now() - chrono::Duration::hours(1);
        h.store.put(msg, ctx).await;
        assert_eq!(h.dispatcher.sweep_expired().await, 1);
        assert_eq!(h.dispatcher.open_pickers().await, 0);
    }
}
