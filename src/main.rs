//! AntiCrash Discord bot entry point.
//!
//! Scans new and edited messages for video files that crash the Discord
//! client and removes them.

use std::sync::Arc;

use serenity::all::{
    ActivityData, Command, CreateMessage, Guild, Interaction, Message, MessageUpdateEvent,
    OnlineStatus, Ready, UnavailableGuild, UserId,
};
use serenity::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anticrash::commands::{is_greeting, SlashCommandHandler, GREETING};
use anticrash::config::AntiCrashConfig;
use anticrash::discord::{presence_text, CrashResponder};
use anticrash::error::{AntiCrashError, Result};
use anticrash::health::{spawn_health_server, HealthState};
use anticrash::models::{CrashIncident, IncidentAuthor};
use anticrash::pipeline::CrashScanner;

/// Shared application state for all handlers.
struct AppState {
    scanner: Arc<CrashScanner>,
    responder: Arc<CrashResponder>,
    command_handler: SlashCommandHandler,
}

impl AppState {
    /// Scan one message and respond if it carries a crash file.
    async fn scan_and_respond(
        &self,
        text: &str,
        attachments: &[String],
        incident: impl FnOnce(String) -> CrashIncident,
    ) {
        let Some(url) = self
            .scanner
            .check_message_for_crash_file(text, attachments)
            .await
        else {
            return;
        };

        let incident = incident(url);
        if let Err(e) = self.responder.handle_crash(&incident).await {
            tracing::error!(
                error = %e,
                message_id = ?incident.message_id,
                "Failed to log crash file"
            );
        }
    }
}

/// Main event handler for the bot.
struct AntiCrashHandler {
    state: Arc<AppState>,
}

impl AntiCrashHandler {
    fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Greet an administrator who mentions only the bot.
    async fn greet(ctx: &Context, msg: &Message) {
        let mentioned: Vec<UserId> = msg.mentions.iter().map(|u| u.id).collect();
        if !is_greeting(&mentioned, ctx.cache.current_user().id) {
            return;
        }

        let is_admin = msg
            .author_permissions(&ctx.cache)
            .is_some_and(|permissions| permissions.administrator());
        if !is_admin {
            return;
        }

        let reply = CreateMessage::new().content(GREETING).reference_message(msg);
        if let Err(e) = msg.channel_id.send_message(&ctx.http, reply).await {
            tracing::warn!(error = %e, channel_id = %msg.channel_id, "Failed to send greeting");
        }
    }

    fn update_presence(ctx: &Context, guilds: usize) {
        ctx.set_presence(
            Some(ActivityData::playing(presence_text(guilds))),
            OnlineStatus::DoNotDisturb,
        );
    }
}

#[serenity::async_trait]
impl EventHandler for AntiCrashHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        Self::greet(&ctx, &msg).await;

        let attachments: Vec<String> = msg.attachments.iter().map(|a| a.url.clone()).collect();

        self.state
            .scan_and_respond(&msg.content, &attachments, |url| {
                CrashIncident::from_message(&msg, url)
            })
            .await;
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if event.content.is_none() && event.attachments.is_none() {
            return;
        }

        let own_id = ctx.cache.current_user().id;
        if event.author.as_ref().is_some_and(|a| a.id == own_id) {
            return;
        }

        let attachments: Vec<String> = event
            .attachments
            .iter()
            .flatten()
            .map(|a| a.url.clone())
            .collect();
        let text = event.content.as_deref().unwrap_or_default();

        self.state
            .scan_and_respond(text, &attachments, |url| CrashIncident {
                channel_id: event.channel_id,
                message_id: Some(event.id),
                author: event.author.as_ref().map(IncidentAuthor::from_user),
                url,
                detected_at: chrono::Utc::now(),
            })
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = self
                .state
                .command_handler
                .handle_command(&ctx, &command)
                .await
            {
                tracing::error!(error = %e, "Failed to handle slash command");
            }
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new == Some(true) {
            tracing::info!(guild_id = %guild.id, name = %guild.name, "Joined guild");
        }
        Self::update_presence(&ctx, ctx.cache.guild_count());
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if !incomplete.unavailable {
            tracing::info!(guild_id = %incomplete.id, "Left guild");
        }
        Self::update_presence(&ctx, ctx.cache.guild_count());
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "AntiCrash bot connected"
        );

        let commands = SlashCommandHandler::register_commands();
        if let Err(e) = Command::set_global_commands(&ctx.http, commands).await {
            tracing::error!(error = %e, "Failed to register slash commands");
        } else {
            tracing::info!("Slash commands registered");
        }

        Self::update_presence(&ctx, ready.guilds.len());
    }
}

/// Load the dotenv file named by the first argument, or `.env` if present.
fn load_env_file() -> Result<()> {
    match std::env::args().nth(1) {
        Some(path) => dotenvy::from_path(&path)
            .map(|_| ())
            .map_err(|e| AntiCrashError::Config(format!("Failed to load {}: {}", path, e))),
        None => {
            let _ = dotenvy::dotenv();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env_file();

    // Supports RUST_LOG, default info
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    env_file?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        "AntiCrash bot starting..."
    );

    let config = match AntiCrashConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "Failed to load configuration");
            return Err(e);
        }
    };
    tracing::info!(
        ffprobe = %config.scan.ffprobe_path.display(),
        reply_to_message = config.reply_to_message,
        log_channel_id = ?config.log_channel_id,
        "Configuration loaded"
    );

    spawn_health_server(
        config.health_port,
        HealthState::new(config.scan.ffprobe_path.display().to_string()),
    );

    let scanner = Arc::new(CrashScanner::from_settings(&config.scan)?);
    tracing::info!("Crash scanner initialized");

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let responder = Arc::new(CrashResponder::new(
        http,
        config.reply_to_message,
        config.log_channel_id,
    ));
    let command_handler = SlashCommandHandler::new(scanner.clone(), responder.clone());

    let state = Arc::new(AppState {
        scanner,
        responder,
        command_handler,
    });

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(AntiCrashHandler::new(state))
        .await
        .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))?;

    tracing::info!("Starting Discord client...");

    client
        .start()
        .await
        .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))?;

    Ok(())
}
