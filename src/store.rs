// store.rs - Selection Context Store
// Holds the state of every in-progress picker, keyed by the id of the message
// that renders it.
//
// Key Features:
// - One context entity per message, flat list or show/season/episode tree
// - Shared reads, exclusive writes (tokio RwLock)
// - Atomic read-modify-write through `with_entry`, so a racing second event
//   for a consumed context sees nothing
// - Per-entry expiry driven by the context's creation time

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::results::{ShowGroup, VodResult};

/// Retention-day bounds accepted by the cache endpoint.
pub const MIN_CACHE_DAYS: u32 = 1;
pub const MAX_CACHE_DAYS: u32 = 14;

/// A validated cache retention period (1-14 days).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDays(u32);

impl CacheDays {
    pub fn new(days: i64) -> Option<Self> {
        let days = u32::try_from(days).ok()?;
        (MIN_CACHE_DAYS..=MAX_CACHE_DAYS)
            .contains(&days)
            .then_some(CacheDays(days))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// What happens once the user makes the terminal pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickIntent {
    Download,
    Cache(CacheDays),
}

/// How the picker is rendered and therefore how it is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Numbered list with digit reactions (capped at 10 results).
    Reactions,
    /// Dropdown plus prev/next buttons.
    Components,
}

/// Cursor through the show/season/episode hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowStage {
    AwaitingShow,
    AwaitingSeason { show: usize },
    AwaitingEpisode { show: usize, season: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Flat { results: Vec<VodResult> },
    Hierarchical { shows: Vec<ShowGroup>, stage: ShowStage },
}

impl Selection {
    /// Number of options at the current step.
    pub fn len(&self) -> usize {
        match self {
            Selection::Flat { results } => results.len(),
            Selection::Hierarchical { shows, stage } => match *stage {
                ShowStage::AwaitingShow => shows.len(),
                ShowStage::AwaitingSeason { show } => {
                    shows.get(show).map(|s| s.seasons.len()).unwrap_or(0)
                }
                ShowStage::AwaitingEpisode { show, season } => shows
                    .get(show)
                    .and_then(|s| s.seasons.get(season))
                    .map(|s| s.episodes.len())
                    .unwrap_or(0),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The state of one message-scoped interactive pick.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionContext {
    pub owner: UserId,
    pub channel: ChannelId,
    pub query: String,
    pub intent: PickIntent,
    pub surface: Surface,
    pub selection: Selection,
    pub page: usize,
    pub page_size: usize,
    pub created: DateTime<Utc>,
}

impl SelectionContext {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

/// Outcome of a `with_entry` closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    Keep,
    Remove,
}

/// How long contexts of each surface live before the sweeper reclaims them.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub reactions: Duration,
    pub components: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            reactions: Duration::minutes(5),
            components: Duration::minutes(15),
        }
    }
}

impl RetentionPolicy {
    fn ttl(&self, surface: Surface) -> Duration {
        match surface {
            Surface::Reactions => self.reactions,
            Surface::Components => self.components,
        }
    }
}

/// Message-keyed storage for selection contexts.
///
/// Implementations must give shared access to readers and exclusive access to
/// writers, and `with_entry` must run its closure and apply the returned
/// action inside one exclusive section.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn put(&self, message: MessageId, context: SelectionContext);

    async fn get(&self, message: MessageId) -> Option<SelectionContext>;

    async fn remove(&self, message: MessageId) -> Option<SelectionContext>;

    /// Run `f` against the entry under the write lock. Returns `false` when the
    /// message has no context (consumed, expired, or never stored).
    async fn with_entry(
        &self,
        message: MessageId,
        f: &mut (dyn for<'a> FnMut(&'a mut SelectionContext) -> EntryAction + Send),
    ) -> bool;

    /// Drop every context older than its retention window; returns how many went.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;

    async fn len(&self) -> usize;
}

/// In-process store backed by a `HashMap` behind a tokio `RwLock`.
pub struct MemorySelectionStore {
    contexts: RwLock<HashMap<MessageId, SelectionContext>>,
    retention: RetentionPolicy,
}

impl MemorySelectionStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            retention,
        }
    }
}

impl Default for MemorySelectionStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

#[async_trait]
impl SelectionStore for MemorySelectionStore {
    async fn put(&self, message: MessageId, context: SelectionContext) {
        let mut contexts = self.contexts.write().await;
        if contexts.insert(message, context).is_some() {
            log::warn!("[STORE] Replaced existing selection context for message {}", message);
        }
    }

    async fn get(&self, message: MessageId) -> Option<SelectionContext> {
        self.contexts.read().await.get(&message).cloned()
    }

    async fn remove(&self, message: MessageId) -> Option<SelectionContext> {
        self.contexts.write().await.remove(&message)
    }

    async fn with_entry(
        &self,
        message: MessageId,
        f: &mut (dyn for<'a> FnMut(&'a mut SelectionContext) -> EntryAction + Send),
    ) -> bool {
        let mut contexts = self.contexts.write().await;
        let action = match contexts.get_mut(&message) {
            Some(context) => f(context),
            None => return false,
        };
        if action == EntryAction::Remove {
            contexts.remove(&message);
        }
        true
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, ctx| now - ctx.created < self.retention.ttl(ctx.surface));
        let removed = before - contexts.len();
        if removed > 0 {
            log::debug!("[STORE] Swept {} expired selection contexts ({} remain)", removed, contexts.len());
        }
        removed
    }

    async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn flat_context(owner: u64, results: Vec<VodResult>) -> SelectionContext {
        SelectionContext {
            owner: UserId(owner),
            channel: ChannelId(1),
            query: "test".to_string(),
            intent: PickIntent::Download,
            surface: Surface::Components,
            selection: Selection::Flat { results },
            page: 0,
            page_size: 25,
            created: Utc::now(),
        }
    }
}
