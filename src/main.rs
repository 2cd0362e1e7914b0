mod api;
mod args;
mod config;
mod dispatch;
mod help;
mod identity;
mod paging;
mod poller;
mod results;
mod search;
mod store;
mod streams;
mod surface;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    framework::standard::{macros::group, StandardFramework},
    model::application::interaction::{Interaction, InteractionResponseType},
    model::channel::{Reaction, ReactionType},
    model::gateway::Ready,
    prelude::GatewayIntents,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::api::HttpVodApi;
use crate::config::{load_bot_config, BotConfig};
use crate::dispatch::{Dispatcher, InteractionEvent, PageDirection};
use crate::poller::PollSettings;
use crate::store::{MemorySelectionStore, RetentionPolicy};
use crate::surface::{DiscordSurface, NEXT_BUTTON_ID, PICK_MENU_ID, PREV_BUTTON_ID};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Everything commands and event hooks share.
pub struct VodServices {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<BotConfig>,
}

// TypeMap key for the shared VOD services
pub struct VodServicesKey;
impl TypeMapKey for VodServicesKey {
    type Value = Arc<VodServices>;
}

pub async fn services(ctx: &Context) -> Option<Arc<VodServices>> {
    ctx.data.read().await.get::<VodServicesKey>().cloned()
}

// Import all command constants generated by the #[command] macro
use crate::help::HELP_COMMAND;
use crate::search::{CACHE_COMMAND, FIND_COMMAND, SEARCH_COMMAND, SHOWS_COMMAND};
use crate::streams::{BLOCK_COMMAND, DISCONNECT_COMMAND, STATUS_COMMAND};

// Command group declaration - includes all available commands
#[group]
#[commands(help, search, shows, cache, find, status, disconnect, block)]
struct General;

// Event handler implementation
struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        log::info!("[MAIN] Bot connected as {} (ID: {})", ready.user.name, ready.user.id);
        log::info!("[MAIN] Connected to {} guild(s)", ready.guilds.len());
    }

    // Digit picks on legacy `find` pickers
    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let actor = match reaction.user_id {
            Some(id) if id != ctx.cache.current_user_id() => id,
            _ => return,
        };
        let emoji = match &reaction.emoji {
            ReactionType::Unicode(emoji) => emoji.clone(),
            _ => return,
        };
        let services = match services(&ctx).await {
            Some(services) => services,
            None => return,
        };

        let outcome = services
            .dispatcher
            .handle(InteractionEvent::Reaction {
                message: reaction.message_id,
                actor,
                emoji,
            })
            .await;
        log::debug!("[MAIN] Reaction on {} by {}: {:?}", reaction.message_id, actor, outcome);
    }

    // Dropdown picks and prev/next buttons
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let component = match interaction {
            Interaction::MessageComponent(component) => component,
            _ => return,
        };

        // Acknowledge first so the platform's response deadline is never missed.
        if let Err(e) = component
            .create_interaction_response(&ctx.http, |r| r.kind(InteractionResponseType::DeferredUpdateMessage))
            .await
        {
            log::warn!("[MAIN] Could not acknowledge interaction on {}: {}", component.message.id, e);
        }

        let message = component.message.id;
        let actor = component.user.id;
        let event = match component.data.custom_id.as_str() {
            PICK_MENU_ID => match component.data.values.first() {
                Some(value) => InteractionEvent::Pick {
                    message,
                    actor,
                    value: value.clone(),
                },
                None => return,
            },
            PREV_BUTTON_ID => InteractionEvent::Page {
                message,
                actor,
                direction: PageDirection::Prev,
            },
            NEXT_BUTTON_ID => InteractionEvent::Page {
                message,
                actor,
                direction: PageDirection::Next,
            },
            other => {
                log::debug!("[MAIN] Ignoring component '{}' on {}", other, message);
                return;
            }
        };

        let services = match services(&ctx).await {
            Some(services) => services,
            None => return,
        };
        let outcome = services.dispatcher.handle(event).await;
        log::debug!("[MAIN] Component event on {} by {}: {:?}", message, actor, outcome);
    }
}

// Console commands for graceful shutdown
async fn handle_command_line(shutdown_tx: mpsc::Sender<String>, dispatcher: Arc<Dispatcher>) {
    use tokio::io::AsyncWriteExt;
    use tokio::time::sleep;

    println!("📝 Command line interface active. Type 'help' for available commands.");

    // Wait for bot to connect and show connection messages before showing prompt
    sleep(Duration::from_millis(1500)).await;

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    if stdout.write_all(b"\n> ").await.is_err() || stdout.flush().await.is_err() {
        log::error!("[MAIN] Failed to write console prompt");
        return;
    }

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let command = line.trim().to_lowercase();

                match command.as_str() {
                    "quit" | "q" | "exit" => {
                        println!("⏹️  Shutting down bot...");
                        if shutdown_tx.send("quit".to_string()).await.is_err() {
                            log::error!("[MAIN] Failed to send shutdown signal");
                        }
                        break;
                    }
                    "help" | "h" => {
                        println!("🤖 Available commands:");
                        println!("  quit, q, exit  - Stop the bot gracefully");
                        println!("  help, h        - Show this help message");
                        println!("  status         - Show bot status");
                        println!("  sweep          - Drop expired pickers now");
                    }
                    "status" => {
                        println!("🤖 Bot Status: Running");
                        println!("🗂️  Open pickers: {}", dispatcher.open_pickers().await);
                    }
                    "sweep" => {
                        println!("🧹 Swept {} expired picker(s)", dispatcher.sweep_expired().await);
                    }
                    "" => {}
                    _ => {
                        println!("❓ Unknown command: '{}'. Type 'help' for available commands.", command);
                    }
                }

                if stdout.write_all(b"> ").await.is_err() || stdout.flush().await.is_err() {
                    log::error!("[MAIN] Failed to write console prompt");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("[MAIN] Error reading command line: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match load_bot_config() {
        Ok(config) => Arc::new(config),
        Err(error) => {
            log::error!("[CONFIG] {}", error);
            eprintln!("❌ {}", error);
            eprintln!("Create a botconfig.txt with DISCORD_TOKEN, API_BASE_URL and API_KEY (PREFIX optional).");
            return;
        }
    };
    log::info!("[MAIN] Starting bot with prefix '{}'", config.prefix);

    let api = match HttpVodApi::new(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            log::error!("[MAIN] Could not build HTTP client: {}", e);
            return;
        }
    };

    let framework = StandardFramework::new()
        .configure(|c| {
            c.prefix(&config.prefix)
                .case_insensitivity(true)
                .no_dm_prefix(true)
                .with_whitespace(true)
        })
        .after(|_ctx, msg, command_name, result| {
            Box::pin(async move {
                if let Err(e) = result {
                    log::error!(
                        "[MAIN] Command '{}' failed for user {} ({}): {:?}",
                        command_name,
                        msg.author.name,
                        msg.author.id,
                        e
                    );
                }
            })
        })
        .group(&GENERAL_GROUP);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;

    let mut client = match Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .framework(framework)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("[MAIN] Error creating Discord client: {:?}", e);
            eprintln!("Check your token in botconfig.txt file");
            return;
        }
    };

    let store = Arc::new(MemorySelectionStore::new(RetentionPolicy {
        reactions: chrono::Duration::seconds(config.reaction_context_ttl_secs as i64),
        components: chrono::Duration::seconds(config.component_context_ttl_secs as i64),
    }));
    let surface = Arc::new(DiscordSurface::new(client.cache_and_http.http.clone()));
    let settings = PollSettings {
        interval: config.poll_interval(),
        deadline: config.poll_deadline(),
    };
    let dispatcher = Arc::new(Dispatcher::new(store, surface, api, settings, config.page_size));

    {
        let mut data = client.data.write().await;
        data.insert::<VodServicesKey>(Arc::new(VodServices {
            dispatcher: dispatcher.clone(),
            config: config.clone(),
        }));
    }

    // Periodic reclaim of pickers nobody finished
    let sweep_dispatcher = dispatcher.clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let swept = sweep_dispatcher.sweep_expired().await;
            if swept > 0 {
                log::info!("[MAIN] Swept {} expired picker(s)", swept);
            }
        }
    });

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<String>(1);
    let cmd_task = tokio::spawn(handle_command_line(shutdown_tx, dispatcher.clone()));

    println!("🚀 Bot is running...");
    println!("💡 Use 'quit' command to stop gracefully, or press Ctrl+C");
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("[MAIN] Received SIGINT, stopping bot gracefully...");
        }
        shutdown_signal = shutdown_rx.recv() => {
            if let Some(signal) = shutdown_signal {
                log::info!("[MAIN] Received '{}' command, stopping bot gracefully...", signal);
            }
        }
        result = client.start() => {
            if let Err(why) = result {
                log::error!("[MAIN] Client error: {:?}", why);
            }
        }
    }

    // Stop cache pollers and background tasks
    dispatcher.shutdown();
    sweeper.abort();
    cmd_task.abort();
    client.shard_manager.lock().await.shutdown_all().await;

    println!("✅ Bot stopped");
}
