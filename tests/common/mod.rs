// ABOUTME: Shared test fixtures: an in-memory chat client stub and record builders
// ABOUTME: Used by the dispatcher, waiter, and MCP integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use herald::{ChannelRecord, ChatClient, EventStream, MemberRecord, MessageRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;

pub fn message(id: &str, author_id: &str, content: &str, channel_id: &str) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        author: format!("user-{}", author_id),
        author_id: author_id.to_string(),
        content: content.to_string(),
        timestamp: "2026-02-01T12:00:00Z".to_string(),
        channel_id: channel_id.to_string(),
        channel_name: format!("chan-{}", channel_id),
        guild_id: "1".to_string(),
        guild_name: "guild-one".to_string(),
    }
}

pub fn channel(id: &str, guild_id: &str) -> ChannelRecord {
    ChannelRecord {
        id: id.to_string(),
        name: format!("chan-{}", id),
        guild_id: guild_id.to_string(),
        guild_name: format!("guild-{}", guild_id),
    }
}

pub fn member(id: &str, name: &str, is_bot: bool) -> MemberRecord {
    MemberRecord {
        id: id.to_string(),
        display_name: name.to_string(),
        is_bot,
    }
}

/// In-memory chat client. Histories are newest-first per channel, matching
/// the platform contract; `recent_messages` honors the `before` cursor.
#[derive(Default)]
pub struct StubChatClient {
    pub histories: Mutex<HashMap<String, Vec<MessageRecord>>>,
    pub channels: Mutex<Vec<ChannelRecord>>,
    pub members: Mutex<HashMap<String, Vec<MemberRecord>>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub calls: AtomicUsize,
    pub fail_send: AtomicBool,
    pub event_tx: Mutex<Option<tokio::sync::mpsc::Sender<MessageRecord>>>,
    pub event_rx: Mutex<Option<tokio::sync::mpsc::Receiver<MessageRecord>>>,
}

impl StubChatClient {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        Self {
            event_tx: Mutex::new(Some(tx)),
            event_rx: Mutex::new(Some(rx)),
            ..Default::default()
        }
    }

    pub fn with_history(self, channel_id: &str, messages: Vec<MessageRecord>) -> Self {
        self.histories
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), messages);
        self
    }

    pub fn with_channels(self, channels: Vec<ChannelRecord>) -> Self {
        *self.channels.lock().unwrap() = channels;
        self
    }

    pub fn with_members(self, guild_id: &str, members: Vec<MemberRecord>) -> Self {
        self.members
            .lock()
            .unwrap()
            .insert(guild_id.to_string(), members);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for StubChatClient {
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> anyhow::Result<Vec<MessageRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let histories = self.histories.lock().unwrap();
        let Some(history) = histories.get(channel_id) else {
            return Ok(Vec::new());
        };
        let start = match before {
            Some(cursor) => match history.iter().position(|m| m.id == cursor) {
                Some(pos) => pos + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        _reply_to: Option<&str>,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            anyhow::bail!("send refused by platform");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((channel_id.to_string(), content.to_string()));
        Ok(format!("sent-{}", sent.len()))
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> anyhow::Result<Option<MessageRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let histories = self.histories.lock().unwrap();
        Ok(histories
            .get(channel_id)
            .and_then(|h| h.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn channel_info(&self, channel_id: &str) -> anyhow::Result<Option<ChannelRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == channel_id)
            .cloned())
    }

    async fn list_channels(&self) -> anyhow::Result<Vec<ChannelRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn guild_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.guild_id == guild_id)
            .cloned()
            .collect())
    }

    async fn guild_members(&self, guild_id: &str) -> anyhow::Result<Vec<MemberRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn event_stream(&self) -> anyhow::Result<EventStream> {
        match self.event_rx.lock().unwrap().take() {
            Some(rx) => Ok(Box::pin(ReceiverStream::new(rx))),
            None => anyhow::bail!("event stream already taken"),
        }
    }

    fn bot_user_id(&self) -> &str {
        "999"
    }
}
