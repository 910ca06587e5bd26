// ABOUTME: Chat platform abstraction consumed by the dispatch and waiter layers
// ABOUTME: Defines the ChatClient trait, wire record types, and the incoming event stream

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::pin::Pin;
use tokio_stream::Stream;

/// Uniform message shape returned by every read/search/ask operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub author: String,
    pub author_id: String,
    pub content: String,
    pub timestamp: String,
    pub channel_id: String,
    pub channel_name: String,
    pub guild_id: String,
    pub guild_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub guild_id: String,
    pub guild_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub id: String,
    pub display_name: String,
    pub is_bot: bool,
}

/// Boxed stream of incoming gateway messages, delivered in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = MessageRecord> + Send>>;

/// The chat platform as the bridge sees it: history pages, sends, listings,
/// and a push stream of incoming messages. Everything behind this trait is a
/// collaborator; all correlation and dispatch logic lives on this side.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Fetch a history page, newest first. `before` is an exclusive message-id
    /// cursor for paginating backwards.
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageRecord>>;

    /// Send a message, optionally as a reply. Returns the sent message id.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String>;

    /// Fetch a single message by id. `Ok(None)` when the platform reports it
    /// does not exist.
    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>>;

    /// Look up one channel. `Ok(None)` for unknown channels.
    async fn channel_info(&self, channel_id: &str) -> Result<Option<ChannelRecord>>;

    /// All text channels visible to the bot, across guilds.
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>>;

    /// Text channels of one guild.
    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>>;

    /// Members of one guild, bots included; callers filter.
    async fn guild_members(&self, guild_id: &str) -> Result<Vec<MemberRecord>>;

    /// Incoming-message stream. May only be taken once per client.
    async fn event_stream(&self) -> Result<EventStream>;

    /// The bot's own user id on the platform.
    fn bot_user_id(&self) -> &str;

    fn is_self(&self, user_id: &str) -> bool {
        user_id == self.bot_user_id()
    }

    /// Whether the long-lived platform session is currently established.
    fn is_connected(&self) -> bool {
        true
    }
}
