use crate::{JobSummary, Notifier, escape_markdown_v2, max_chars, spoiler_block_with_budget};
use async_trait::async_trait;
use error::SyncError;
use http::{HttpClient, RequestOptions};
use model::Platform;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Sends job summaries to a Telegram chat via the Bot API, matching the
/// message shapes (`#Curseforge_Refresh`, `#Modrinth_Queue`, …) the
/// reference implementation's bot produces.
pub struct TelegramNotifier {
    http: Arc<HttpClient>,
    bot_api: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        http: Arc<HttpClient>,
        bot_api: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        TelegramNotifier {
            http,
            bot_api: bot_api.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    async fn send_message(&self, text: &str, parse_mode: Option<&str>) -> Result<i64, SyncError> {
        let url = format!("{}{}/sendMessage", self.bot_api, self.bot_token);
        let mut payload = json!({ "chat_id": self.chat_id, "text": text });
        if let Some(parse_mode) = parse_mode {
            payload["parse_mode"] = json!(parse_mode);
        }
        let body: serde_json::Value = self
            .http
            .post_json(&url, &payload, RequestOptions::default().skip_rate_limit())
            .await?;
        if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            return Err(SyncError::Other(format!("telegram API rejected message: {body}")));
        }
        let message_id = body["result"]["message_id"].as_i64().unwrap_or_default();
        info!(message_id, "message sent to telegram");
        Ok(message_id)
    }

    fn platform_tag(platform: Platform, suffix: &str) -> String {
        let prefix = match platform {
            Platform::CurseForge => "Curseforge",
            Platform::Modrinth => "Modrinth",
        };
        format!("\n#{prefix}_{suffix}")
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, summary: &JobSummary) -> Result<(), SyncError> {
        match summary {
            JobSummary::Refresh { platform, synced, failed_count } => {
                let header = if *failed_count > 0 {
                    format!(
                        "{} cache refresh finished, {} mods refreshed, {} mods failed\n",
                        platform, synced.len(), failed_count
                    )
                } else {
                    format!("{} cache refresh finished, {} mods refreshed\n", platform, synced.len())
                };
                let tag = Self::platform_tag(*platform, "Refresh");
                let mut message = escape_markdown_v2(&header);
                if !synced.is_empty() {
                    message.push_str(&escape_markdown_v2("\nformat: name(id): version count\n"));
                    let lines: Vec<String> = synced.iter().map(|l| l.render()).collect();
                    let budget = max_chars().saturating_sub(message.len() + tag.len());
                    message.push_str(&spoiler_block_with_budget(&lines, budget));
                }
                message.push_str(&tag);
                self.send_message(&message, Some("MarkdownV2")).await?;
            }
            JobSummary::QueueSync { platform, total_captured, newly_discovered } => {
                let header = format!(
                    "captured {total_captured} {platform} mods from the miss queue this run\n{} of them are newly discovered",
                    newly_discovered.len()
                );
                let tag = Self::platform_tag(*platform, "Queue");
                let mut message = escape_markdown_v2(&header);
                if !newly_discovered.is_empty() {
                    message.push_str(&escape_markdown_v2("\nformat: name(id): version count\n"));
                    let lines: Vec<String> = newly_discovered.iter().map(|l| l.render()).collect();
                    let budget = max_chars().saturating_sub(message.len() + tag.len());
                    message.push_str(&spoiler_block_with_budget(&lines, budget));
                }
                message.push_str(&tag);
                self.send_message(&message, Some("MarkdownV2")).await?;
            }
            JobSummary::SearchSync { platform, total_discovered, newly_discovered } => {
                let header = format!("search discovery found {total_discovered} new {platform} projects this run\n");
                let tag = Self::platform_tag(*platform, "Search");
                let mut message = escape_markdown_v2(&header);
                if !newly_discovered.is_empty() {
                    message.push_str(&escape_markdown_v2("\nformat: name(id): version count\n"));
                    let lines: Vec<String> = newly_discovered.iter().map(|l| l.render()).collect();
                    let budget = max_chars().saturating_sub(message.len() + tag.len());
                    message.push_str(&spoiler_block_with_budget(&lines, budget));
                }
                message.push_str(&tag);
                self.send_message(&message, Some("MarkdownV2")).await?;
            }
            JobSummary::Categories { total } => {
                let message = format!("cached curseforge categories, {total} categories total\n#Curseforge_Categories");
                self.send_message(&message, None).await?;
            }
            JobSummary::Tags { categories, loaders, game_versions } => {
                let message = format!(
                    "cached modrinth tags\ncategories: {categories}\nloaders: {loaders}\ngame versions: {game_versions}\n#Modrinth_Tags"
                );
                self.send_message(&message, None).await?;
            }
        }
        Ok(())
    }
}
