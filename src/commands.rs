//! Slash command handler for AntiCrash.
//!
//! Implements `/anticrash help` and `/anticrash check`.

use std::sync::Arc;

use serenity::all::{
    CommandDataOptionValue, CommandInteraction, CommandOptionType, Context, CreateCommand,
    CreateCommandOption, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, Permissions, UserId,
};

use crate::config::PRODUCT_NAME;
use crate::discord::CrashResponder;
use crate::error::{AntiCrashError, Result};
use crate::models::CrashIncident;
use crate::pipeline::CrashScanner;

/// Colour for informational embeds.
pub const INFO_COLOUR: u32 = 15761961;

/// Colour for a positive check result.
pub const DETECTED_COLOUR: u32 = 15275537;

/// Colour for a negative check result.
pub const CLEAN_COLOUR: u32 = 7143168;

/// Reply to an admin who mentions the bot without a command.
pub const GREETING: &str = "Hello, I'm AntiCrash. Use `/anticrash help` to view available commands. \
                            Please note, commands are Administrator only!";

/// Whether a message mentions only the bot.
pub fn is_greeting(mentioned: &[UserId], bot_id: UserId) -> bool {
    matches!(mentioned, [only] if *only == bot_id)
}

/// Whether the interaction has been acknowledged with a deferred response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Pending,
    Deferred,
}

/// Slash command handler.
pub struct SlashCommandHandler {
    scanner: Arc<CrashScanner>,
    responder: Arc<CrashResponder>,
}

impl SlashCommandHandler {
    /// Create a new slash command handler.
    pub fn new(scanner: Arc<CrashScanner>, responder: Arc<CrashResponder>) -> Self {
        Self { scanner, responder }
    }

    /// Register all slash commands with Discord.
    pub fn register_commands() -> Vec<CreateCommand> {
        vec![Self::create_anticrash_command()]
    }

    /// Create the main /anticrash command with subcommands.
    fn create_anticrash_command() -> CreateCommand {
        CreateCommand::new("anticrash")
            .description("AntiCrash bot commands")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "help",
                "Show available commands and the current setup",
            ))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "check",
                    "Check a link for crash files",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "url",
                        "Link or text to scan",
                    )
                    .required(true),
                ),
            )
    }

    /// Handle an incoming slash command interaction.
    pub async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::is_admin(command) {
            return self
                .respond_error(
                    ctx,
                    command,
                    "You don't have permission to use this command.",
                )
                .await;
        }

        let subcommand = command
            .data
            .options
            .first()
            .map(|o| o.name.as_str())
            .unwrap_or("help");

        let mut state = ResponseState::Pending;
        let result = match subcommand {
            "help" => self.handle_help(ctx, command).await,
            "check" => self.handle_check(ctx, command, &mut state).await,
            _ => self.respond_error(ctx, command, "Unknown subcommand.").await,
        };

        let failure = result.as_ref().err().map(|e| {
            tracing::error!(error = %e, subcommand = subcommand, "Slash command failed");
            e.user_message()
        });
        if let Some(message) = failure {
            let reported = match state {
                ResponseState::Pending => self.respond_error(ctx, command, message).await,
                ResponseState::Deferred => self.edit_error(ctx, command, message).await,
            };
            if let Err(e) = reported {
                tracing::warn!(error = %e, "Failed to report command error to user");
            }
        }

        result
    }

    fn is_admin(command: &CommandInteraction) -> bool {
        command
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .is_some_and(|permissions| permissions.administrator())
    }

    /// Handle /anticrash help.
    async fn handle_help(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let log_channel_id = self.responder.log_channel().map(|c| c.get());
        self.respond_embed(ctx, command, help_embed(log_channel_id))
            .await
    }

    /// Handle /anticrash check. Probing can take longer than the interaction
    /// window, so the response is deferred first. A detection is also posted
    /// to the log channel.
    async fn handle_check(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        state: &mut ResponseState,
    ) -> Result<()> {
        let text = command
            .data
            .options
            .first()
            .and_then(|o| match &o.value {
                CommandDataOptionValue::SubCommand(opts) => opts
                    .iter()
                    .find(|opt| opt.name == "url")
                    .and_then(|opt| opt.value.as_str()),
                _ => None,
            })
            .map(str::to_string);

        let Some(text) = text else {
            return self
                .respond_error(ctx, command, "Please specify a link to check.")
                .await;
        };

        command
            .defer_ephemeral(&ctx.http)
            .await
            .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))?;
        *state = ResponseState::Deferred;

        let found = self.scanner.check_message_for_crash_file(&text, &[]).await;
        tracing::info!(
            user_id = %command.user.id,
            detected = found.is_some(),
            "Manual crash check completed"
        );

        if let Some(url) = &found {
            let incident = CrashIncident::from_check(command.channel_id, &command.user, url);
            if let Err(e) = self.responder.handle_crash(&incident).await {
                tracing::error!(error = %e, "Failed to log checked crash file");
            }
        }

        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new().embed(check_result_embed(found.as_deref())),
            )
            .await
            .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))?;

        Ok(())
    }

    /// Send an ephemeral embed response.
    async fn respond_embed(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        embed: CreateEmbed,
    ) -> Result<()> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .embed(embed)
                .ephemeral(true),
        );
        self.send_response(ctx, command, response).await
    }

    /// Send an error response.
    async fn respond_error(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        message: &str,
    ) -> Result<()> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(error_content(message))
                .ephemeral(true),
        );
        self.send_response(ctx, command, response).await
    }

    /// Replace a deferred response with an error.
    async fn edit_error(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        message: &str,
    ) -> Result<()> {
        command
            .edit_response(&ctx.http, error_edit(message))
            .await
            .map(|_| ())
            .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))
    }

    async fn send_response(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        response: CreateInteractionResponse,
    ) -> Result<()> {
        match command.create_response(&ctx.http, response).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Another instance may respond first
                if e.to_string().contains("already been acknowledged") {
                    Ok(())
                } else {
                    Err(AntiCrashError::DiscordApi(Box::new(e)))
                }
            }
        }
    }
}

/// User-facing error text.
fn error_content(message: &str) -> String {
    format!("❌ {}", message)
}

/// Edit that replaces a deferred "thinking" response with an error.
fn error_edit(message: &str) -> EditInteractionResponse {
    EditInteractionResponse::new().content(error_content(message))
}

/// Log channel status line for the help embed.
pub fn log_channel_status(log_channel_id: Option<u64>) -> String {
    match log_channel_id {
        Some(id) => format!("Currently <#{}>", id),
        None => "Currently disabled".to_string(),
    }
}

/// Build the `/anticrash help` embed.
pub fn help_embed(log_channel_id: Option<u64>) -> CreateEmbed {
    CreateEmbed::new()
        .title(format!("{} v{}", PRODUCT_NAME, env!("CARGO_PKG_VERSION")))
        .description(
            "Detects and deletes video files that crash the Discord client.\n\n\
             **/anticrash help** shows this message\n\
             **/anticrash check** `url` scans a link for crash files",
        )
        .field("Log channel", log_channel_status(log_channel_id), false)
        .colour(INFO_COLOUR)
        .footer(CreateEmbedFooter::new(format!(
            "Built {} ({})",
            env!("BUILD_TIMESTAMP"),
            env!("GIT_COMMIT")
        )))
}

/// Build the `/anticrash check` result embed.
pub fn check_result_embed(found: Option<&str>) -> CreateEmbed {
    match found {
        Some(url) => CreateEmbed::new()
            .title("Crash file detected!")
            .field("File URL", format!("`{}`", url), false)
            .colour(DETECTED_COLOUR),
        None => CreateEmbed::new()
            .title("No crash file(s) found")
            .colour(CLEAN_COLOUR),
    }
}
