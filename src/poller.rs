// poller.rs - Cache Job Progress Poller
// Starts a backend cache job for a picked title and keeps one progress message
// up to date until the job is ready, fails, hits the deadline, or is cancelled.
//
// Key Features:
// - Identity resolution and cache-start before anything is rendered
// - Detached polling task per job, 2s interval / 12h deadline by default
// - Cancellation through a child of the poller's shutdown token
// - Poll errors keep the last rendered state; edit failures end the task

use serenity::model::id::{ChannelId, MessageId, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, CacheProgress, CacheStartRequest, CacheStatus, VodApi};
use crate::results::{human_size, VodResult};
use crate::store::CacheDays;
use crate::surface::{ChatSurface, RenderError};

pub const BAR_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            deadline: Duration::from_secs(12 * 60 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheFlowError {
    #[error("user has no linked backend account")]
    Unlinked,
    #[error("could not resolve backend identity: {0}")]
    Identity(#[source] ApiError),
    #[error("cache start rejected: {0}")]
    Start(#[source] ApiError),
    #[error("could not render progress message: {0}")]
    Render(#[from] RenderError),
}

/// How a polling task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEnd {
    Ready,
    Failed,
    DeadlineReached,
    Cancelled,
    RenderFailed,
}

/// Everything the poller needs from a terminal cache pick.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub owner: UserId,
    pub channel: ChannelId,
    pub result: VodResult,
    pub days: CacheDays,
}

/// One in-flight cache operation as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheJob {
    pub stream_id: String,
    pub title: String,
    pub expires: String,
    pub status: CacheStatus,
    pub downloaded: Option<u64>,
    pub total: Option<u64>,
    pub percent: f64,
}

impl CacheJob {
    fn apply(&mut self, progress: &CacheProgress) {
        self.status = progress.status;
        self.downloaded = progress.downloaded.or(self.downloaded);
        self.total = progress.total.or(self.total);
        // Counters carried over from earlier ticks still count; with nothing
        // new to go on the bar stays where it was.
        let merged = CacheProgress {
            status: progress.status,
            downloaded: self.downloaded,
            total: self.total,
            percent: progress.percent.or(Some(self.percent)),
        };
        self.percent = progress_percent(&merged);
    }
}

/// Percent from byte counters when both are known, otherwise the reported percent.
pub fn progress_percent(progress: &CacheProgress) -> f64 {
    let raw = match (progress.downloaded, progress.total) {
        (Some(done), Some(total)) if total > 0 => done as f64 / total as f64 * 100.0,
        _ => progress.percent.unwrap_or(0.0),
    };
    if progress.status == CacheStatus::Ready {
        100.0
    } else {
        raw.clamp(0.0, 100.0)
    }
}

pub fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

pub fn render_job(job: &CacheJob) -> String {
    match job.status {
        CacheStatus::Ready => format!(
            "✅ **Cached:** {}\nAvailable until: {}",
            job.title,
            display_expiry(&job.expires)
        ),
        CacheStatus::Failed => format!("❌ **Caching failed:** {}", job.title),
        CacheStatus::Downloading => {
            let mut text = format!(
                "⏳ **Caching:** {}\n`[{}]` {:.1}%",
                job.title,
                progress_bar(job.percent),
                job.percent
            );
            if let (Some(done), Some(total)) = (job.downloaded, job.total) {
                text.push_str(&format!("\n{} / {}", human_size(done), human_size(total)));
            }
            text.push_str(&format!("\nExpires: {}", display_expiry(&job.expires)));
            text
        }
    }
}

fn display_expiry(expires: &str) -> &str {
    if expires.is_empty() {
        "unknown"
    } else {
        expires
    }
}

fn timeout_notice(job: &CacheJob, deadline: Duration) -> String {
    let secs = deadline.as_secs();
    let span = if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}m", secs / 60)
    };
    format!(
        "{}\n⏱️ Stopped tracking after {}. The cache job may still finish on the server.",
        render_job(job),
        span
    )
}

/// Handle to a running poll task.
#[derive(Debug)]
pub struct PollerHandle {
    pub message: MessageId,
    token: CancellationToken,
    join: JoinHandle<PollEnd>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn finished(self) -> PollEnd {
        self.join.await.unwrap_or_else(|e| {
            log::error!("[CACHE] Poll task for message {} panicked: {}", self.message, e);
            PollEnd::Failed
        })
    }
}

pub struct CachePoller {
    api: Arc<dyn VodApi>,
    surface: Arc<dyn ChatSurface>,
    settings: PollSettings,
    shutdown: CancellationToken,
}

impl CachePoller {
    pub fn new(api: Arc<dyn VodApi>, surface: Arc<dyn ChatSurface>, settings: PollSettings) -> Self {
        Self {
            api,
            surface,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop every poll task started by this poller.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn notify(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self.surface.send_text(channel, text).await {
            log::warn!("[CACHE] Failed to send notice to channel {}: {}", channel, e);
        }
    }

    /// Resolve the user, start the cache job, render the first progress message
    /// and spawn the polling task. Failures are reported in-channel.
    pub async fn start(&self, request: CacheRequest) -> Result<PollerHandle, CacheFlowError> {
        let CacheRequest {
            owner,
            channel,
            result,
            days,
        } = request;

        let user = match self.api.resolve_user(owner).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.notify(
                    channel,
                    "❌ Your Discord account is not linked to a streaming account, so nothing can be cached.",
                )
                .await;
                return Err(CacheFlowError::Unlinked);
            }
            Err(e) => {
                log::error!("[CACHE] Identity lookup for user {} failed: {}", owner, e);
                self.notify(channel, "❌ Could not verify your account right now. Please try again later.")
                    .await;
                return Err(CacheFlowError::Identity(e));
            }
        };

        let start = CacheStartRequest {
            user_id: user.id.clone(),
            stream_id: result.stream_id.clone(),
            kind: result.kind,
            title: result.title.clone(),
            series_title: result.series_title.clone(),
            season: result.season,
            episode: result.episode,
            days: days.get(),
        };
        let ticket = match self.api.start_cache(&start).await {
            Ok(ticket) => ticket,
            Err(e) => {
                log::error!("[CACHE] Cache start for stream {} failed: {}", start.stream_id, e);
                self.notify(
                    channel,
                    &format!("❌ Failed to start caching **{}**. Please try again later.", result.title),
                )
                .await;
                return Err(CacheFlowError::Start(e));
            }
        };

        let job = CacheJob {
            stream_id: result.stream_id.clone(),
            title: crate::paging::result_label(&result),
            expires: ticket.expires,
            status: CacheStatus::Downloading,
            downloaded: None,
            total: None,
            percent: 0.0,
        };
        let message = self.surface.send_text(channel, &render_job(&job)).await?;

        log::info!(
            "[CACHE] Started cache job for stream {} ({} days) for {} ({}), tracking in message {}",
            job.stream_id,
            days.get(),
            user.username,
            owner,
            message
        );

        let token = self.shutdown.child_token();
        let join = tokio::spawn(poll_job(
            self.api.clone(),
            self.surface.clone(),
            channel,
            message,
            job,
            self.settings,
            token.clone(),
        ));

        Ok(PollerHandle {
            message,
            token,
            join,
        })
    }
}

async fn poll_job(
    api: Arc<dyn VodApi>,
    surface: Arc<dyn ChatSurface>,
    channel: ChannelId,
    message: MessageId,
    mut job: CacheJob,
    settings: PollSettings,
    token: CancellationToken,
) -> PollEnd {
    let deadline = Instant::now() + settings.deadline;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("[CACHE] Polling for stream {} cancelled", job.stream_id);
                return PollEnd::Cancelled;
            }
            _ = tokio::time::sleep(settings.interval) => {}
        }

        if Instant::now() >= deadline {
            log::warn!("[CACHE] Stream {} not ready before the deadline, giving up", job.stream_id);
            if let Err(e) = surface
                .edit_text(channel, message, &timeout_notice(&job, settings.deadline))
                .await
            {
                log::warn!("[CACHE] Failed to post timeout notice: {}", e);
            }
            return PollEnd::DeadlineReached;
        }

        match api.cache_progress(&job.stream_id).await {
            Ok(progress) => job.apply(&progress),
            Err(e) => {
                log::warn!("[CACHE] Progress poll for stream {} failed: {}", job.stream_id, e);
                continue;
            }
        }

        if let Err(e) = surface.edit_text(channel, message, &render_job(&job)).await {
            log::error!("[CACHE] Progress message {} could not be updated, stopping: {}", message, e);
            return PollEnd::RenderFailed;
        }

        if job.status.is_terminal() {
            return if job.status == CacheStatus::Ready {
                log::info!("[CACHE] Stream {} is cached", job.stream_id);
                PollEnd::Ready
            } else {
                log::warn!("[CACHE] Backend reported failure for stream {}", job.stream_id);
                PollEnd::Failed
            };
        }
    }
}
