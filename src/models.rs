//! Core data models for AntiCrash.

use chrono::{DateTime, Utc};
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId, UserId};
use serenity::model::user::User;

/// Final outcome of probing one media URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Per-frame records changed between consecutive lines.
    Crash,
    /// The tool exited without showing the signature.
    Clean,
    /// The file has no index (`moov atom not found`) and cannot be probed.
    Unprobeable,
    /// The probe could not run to completion (spawn failure, timeout).
    Indeterminate,
}

impl ProbeOutcome {
    /// Only a positive signature counts as a crash file.
    ///
    /// ```
    /// use anticrash::models::ProbeOutcome;
    ///
    /// assert!(ProbeOutcome::Crash.is_crash());
    /// assert!(!ProbeOutcome::Unprobeable.is_crash());
    /// assert!(!ProbeOutcome::Indeterminate.is_crash());
    /// ```
    pub fn is_crash(self) -> bool {
        self == ProbeOutcome::Crash
    }
}

/// What the signature scanner decided after seeing one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict {
    /// Keep reading.
    Continue,
    /// Instability signature found.
    Crash,
    /// Missing container index, stop with a negative verdict.
    Unprobeable,
}

/// Author details used for the log embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentAuthor {
    pub id: UserId,
    pub tag: String,
    pub avatar_url: Option<String>,
}

impl IncidentAuthor {
    /// Capture the fields the log embed needs from a Discord user.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            tag: user.tag(),
            avatar_url: user.avatar_url(),
        }
    }
}

/// A detected crash file and the message that carried it.
///
/// `message_id` is `None` for links checked through a command, where there
/// is no message to reply to or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashIncident {
    pub channel_id: ChannelId,
    pub message_id: Option<MessageId>,
    pub author: Option<IncidentAuthor>,
    pub url: String,
    pub detected_at: DateTime<Utc>,
}

impl CrashIncident {
    /// Build an incident for a message that carried `url`.
    pub fn from_message(message: &Message, url: impl Into<String>) -> Self {
        Self {
            channel_id: message.channel_id,
            message_id: Some(message.id),
            author: Some(IncidentAuthor::from_user(&message.author)),
            url: url.into(),
            detected_at: Utc::now(),
        }
    }

    /// Build an incident for a link a user checked by command in `channel_id`.
    pub fn from_check(channel_id: ChannelId, user: &User, url: impl Into<String>) -> Self {
        Self {
            channel_id,
            message_id: None,
            author: Some(IncidentAuthor::from_user(user)),
            url: url.into(),
            detected_at: Utc::now(),
        }
    }

    /// Author mention for log text, or a neutral placeholder.
    pub fn author_mention(&self) -> String {
        self.author
            .as_ref()
            .map(|a| format!("<@{}>", a.id))
            .unwrap_or_else(|| "an unknown user".to_string())
    }
}
