//! Discord actions taken when a crash file is found.
//!
//! Optionally replies to the offending message, deletes it, and posts an
//! embed to the configured log channel.

use std::sync::Arc;

use serenity::builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use serenity::model::Timestamp;

use crate::config::PRODUCT_NAME;
use crate::error::{AntiCrashError, Result};
use crate::models::CrashIncident;

/// Embed colour for detection log entries.
pub const LOG_COLOUR: u32 = 11801620;

/// Reply text posted under the offending message.
const REPLY_TEXT: &str = "Crash file detected!";

/// Audit log reason for deletions.
const DELETE_REASON: &str = "Crash file";

/// Performs the moderation response for detected crash files.
pub struct CrashResponder {
    http: Arc<Http>,
    reply_to_message: bool,
    log_channel: Option<ChannelId>,
}

impl CrashResponder {
    /// Create a new CrashResponder.
    pub fn new(http: Arc<Http>, reply_to_message: bool, log_channel_id: Option<u64>) -> Self {
        Self {
            http,
            reply_to_message,
            log_channel: log_channel_id.map(ChannelId::new),
        }
    }

    /// The configured log channel, if any.
    pub fn log_channel(&self) -> Option<ChannelId> {
        self.log_channel
    }

    /// Reply, delete, and log. Reply and delete failures are logged and do not
    /// stop the remaining steps. Incidents without a message are only logged.
    pub async fn handle_crash(&self, incident: &CrashIncident) -> Result<()> {
        let deleted = match incident.message_id {
            Some(message_id) => self.remove_message(incident.channel_id, message_id).await,
            None => false,
        };

        if let Some(log_channel) = self.log_channel {
            let message = CreateMessage::new().embed(build_log_embed(incident, deleted));
            log_channel
                .send_message(&self.http, message)
                .await
                .map_err(|e| AntiCrashError::DiscordApi(Box::new(e)))?;
        }

        Ok(())
    }

    /// Optionally reply to the message, then delete it. Returns whether the
    /// delete succeeded.
    async fn remove_message(&self, channel_id: ChannelId, message_id: MessageId) -> bool {
        if self.reply_to_message {
            let reply = CreateMessage::new()
                .content(REPLY_TEXT)
                .reference_message((channel_id, message_id));

            if let Err(e) = channel_id.send_message(&self.http, reply).await {
                tracing::error!(error = %e, channel_id = %channel_id, "Failed to reply to crash file");
            }
        }

        match self
            .http
            .delete_message(channel_id, message_id, Some(DELETE_REASON))
            .await
        {
            Ok(()) => {
                tracing::info!(
                    message_id = %message_id,
                    channel_id = %channel_id,
                    "Crash file message deleted"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    message_id = %message_id,
                    "Failed to delete crash file message"
                );
                false
            }
        }
    }
}

/// Playing-status text showing how many guilds are protected.
pub fn presence_text(guilds: usize) -> String {
    format!(
        "/anticrash help | Protecting {} guild{}",
        guilds,
        if guilds == 1 { "" } else { "s" }
    )
}

/// Log line describing what happened to the message.
pub fn log_description(incident: &CrashIncident, deleted: bool) -> String {
    format!(
        "**Crash file sent by {} {} in <#{}>**",
        incident.author_mention(),
        if deleted { "deleted" } else { "detected" },
        incident.channel_id
    )
}

/// Build the log channel embed for an incident.
pub fn build_log_embed(incident: &CrashIncident, deleted: bool) -> CreateEmbed {
    let timestamp = Timestamp::from_unix_timestamp(incident.detected_at.timestamp())
        .unwrap_or_else(|_| Timestamp::now());

    let mut embed = CreateEmbed::new()
        .description(log_description(incident, deleted))
        .timestamp(timestamp)
        .colour(LOG_COLOUR)
        .field("File URL", format!("`{}`", incident.url), false);

    if let Some(author) = &incident.author {
        let mut embed_author = CreateEmbedAuthor::new(author.tag.clone());
        if let Some(avatar) = &author.avatar_url {
            embed_author = embed_author.icon_url(avatar.clone());
        }

        embed = embed.author(embed_author).footer(CreateEmbedFooter::new(format!(
            "{} :: Author ID {}",
            PRODUCT_NAME, author.id
        )));
    }

    embed
}
