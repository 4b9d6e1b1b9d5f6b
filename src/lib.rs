//! AntiCrash: detects video files that crash the Discord client.
//!
//! Links and attachments in a message are expanded into candidate media
//! URLs (page metadata, short-link lookups), each candidate is probed with
//! ffprobe, and unstable per-frame output marks a crash file.

pub mod commands;
pub mod config;
pub mod detector;
pub mod discord;
pub mod error;
pub mod extractor;
pub mod health;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod resolver;
pub mod shortlink;

#[cfg(test)]
mod test_support;
