// search.rs - VOD Search Commands
// Prefix commands that run a catalogue search and open an interactive picker
// on the result set.
//
// Commands:
// - search <query>        dropdown picker, download on pick
// - shows <query>         show -> season -> episode browser
// - cache <days> <query>  dropdown picker, cache job on pick
// - find <query>          numbered list picked with digit reactions
//
// Used by: main.rs (command registration)

use serenity::{
    client::Context,
    framework::standard::{macros::command, Args, CommandResult},
    model::channel::Message,
};

use crate::args::{parse_cache_args, require_query};
use crate::results::{prepare_results, VodResult, LEGACY_RESULT_CAP};
use crate::store::PickIntent;
use crate::VodServices;

/// Which picker a search command opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickerKind {
    Flat(PickIntent),
    Shows,
    Legacy,
}

impl PickerKind {
    fn cap(&self) -> Option<usize> {
        match self {
            PickerKind::Legacy => Some(LEGACY_RESULT_CAP),
            _ => None,
        }
    }
}

async fn fetch_results(
    ctx: &Context,
    msg: &Message,
    services: &VodServices,
    query: &str,
    cap: Option<usize>,
) -> CommandResult<Option<Vec<VodResult>>> {
    let records = match services.dispatcher.api().search(query).await {
        Ok(records) => records,
        Err(e) => {
            log::error!("[SEARCH] Search for '{}' failed: {}", query, e);
            msg.reply(ctx, "❌ The search service is unavailable right now. Please try again later.")
                .await?;
            return Ok(None);
        }
    };

    let results = prepare_results(&records, query, cap);
    log::info!(
        "[SEARCH] '{}' by {} ({}): {} raw record(s), {} result(s)",
        query,
        msg.author.name,
        msg.author.id,
        records.len(),
        results.len()
    );
    if results.is_empty() {
        msg.reply(ctx, format!("🔍 No results for `{}`.", query)).await?;
        return Ok(None);
    }
    Ok(Some(results))
}

async fn open_picker(ctx: &Context, msg: &Message, query: &str, kind: PickerKind) -> CommandResult {
    let services = crate::services(ctx).await.ok_or("VOD services are not initialised")?;
    let _typing = ctx.http.start_typing(msg.channel_id.0)?;

    let results = match fetch_results(ctx, msg, &services, query, kind.cap()).await? {
        Some(results) => results,
        None => return Ok(()),
    };

    let dispatcher = &services.dispatcher;
    let (owner, channel) = (msg.author.id, msg.channel_id);
    let opened = match kind {
        PickerKind::Flat(intent) => dispatcher.open_flat(owner, channel, query, results, intent).await,
        PickerKind::Shows => dispatcher.open_shows(owner, channel, query, &results).await,
        PickerKind::Legacy => dispatcher.open_legacy(owner, channel, query, results).await,
    };

    match opened {
        Ok(Some(_)) => {}
        Ok(None) => {
            msg.reply(ctx, format!("📺 No series found for `{}`. Try `{}search` instead.", query, services.config.prefix))
                .await?;
        }
        Err(e) => log::warn!("[SEARCH] Could not render picker for '{}': {}", query, e),
    }
    Ok(())
}

async fn reply_usage(ctx: &Context, msg: &Message, error: impl std::fmt::Display, usage: &str) -> CommandResult {
    let prefix = match crate::services(ctx).await {
        Some(services) => services.config.prefix.clone(),
        None => "!".to_string(),
    };
    msg.reply(ctx, format!("❌ {}\nUsage: `{}{}`", error, prefix, usage)).await?;
    Ok(())
}

#[command]
#[aliases("s")]
/// Search the catalogue and pick a title to download
pub async fn search(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    match require_query(args.rest()) {
        Ok(query) => open_picker(ctx, msg, &query, PickerKind::Flat(PickIntent::Download)).await,
        Err(e) => reply_usage(ctx, msg, e, "search <query>").await,
    }
}

#[command]
#[aliases("browse")]
/// Browse matching series by show, season, then episode
pub async fn shows(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    match require_query(args.rest()) {
        Ok(query) => open_picker(ctx, msg, &query, PickerKind::Shows).await,
        Err(e) => reply_usage(ctx, msg, e, "shows <query>").await,
    }
}

#[command]
/// Search and cache the picked title on the server for 1-14 days
pub async fn cache(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    match parse_cache_args(args.rest()) {
        Ok((days, query)) => open_picker(ctx, msg, &query, PickerKind::Flat(PickIntent::Cache(days))).await,
        Err(e) => reply_usage(ctx, msg, e, "cache <days 1-14> <query>").await,
    }
}

#[command]
#[aliases("f")]
/// Quick search: up to ten results picked with number reactions
pub async fn find(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    match require_query(args.rest()) {
        Ok(query) => open_picker(ctx, msg, &query, PickerKind::Legacy).await,
        Err(e) => reply_usage(ctx, msg, e, "find <query>").await,
    }
}
