// ABOUTME: Discord implementation of the chat client trait using serenity
// ABOUTME: REST calls for history and sends, a gateway task feeding the event stream

use crate::chat::{ChannelRecord, ChatClient, EventStream, MemberRecord, MessageRecord};
use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::all::{
    Channel, ChannelId, ChannelType, Context, EventHandler, GatewayIntents, GetMessages, GuildId,
    Member, Message, MessageId, MessageReference, Ready,
};
use serenity::http::Http;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const EVENT_BUFFER: usize = 256;
const MEMBER_PAGE: u64 = 1000;

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .with_context(|| format!("Invalid Discord id: {}", raw))
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 404
    )
}

fn display_name(member: &Member) -> String {
    member
        .nick
        .clone()
        .or_else(|| member.user.global_name.clone())
        .unwrap_or_else(|| member.user.name.clone())
}

/// Gateway event handler that forwards incoming messages into the bridge.
/// Name resolution here is cache-only and best effort; the ids always carry.
struct GatewayForwarder {
    tx: mpsc::Sender<MessageRecord>,
    connected: Arc<AtomicBool>,
}

#[serenity::async_trait]
impl EventHandler for GatewayForwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.connected.store(true, Ordering::Relaxed);
        tracing::info!(
            bot_user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Discord gateway connected"
        );
    }

    async fn message(&self, ctx: Context, message: Message) {
        let channel_name = ctx
            .cache
            .channel(message.channel_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let (guild_id, guild_name) = match message.guild_id {
            Some(id) => {
                let name = ctx
                    .cache
                    .guild(id)
                    .map(|g| g.name.clone())
                    .unwrap_or_default();
                (id.to_string(), name)
            }
            None => (String::new(), String::new()),
        };

        let record = MessageRecord {
            id: message.id.to_string(),
            author: message.author.name.clone(),
            author_id: message.author.id.to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp.to_string(),
            channel_id: message.channel_id.to_string(),
            channel_name,
            guild_id,
            guild_name,
        };

        if self.tx.send(record).await.is_err() {
            tracing::warn!("Event stream receiver dropped; discarding gateway message");
        }
    }
}

/// Discord client: REST via `Http`, plus a spawned gateway connection that
/// pushes incoming messages into a channel handed out by `event_stream`.
pub struct DiscordClient {
    http: Arc<Http>,
    bot_user_id: String,
    events: Mutex<Option<mpsc::Receiver<MessageRecord>>>,
    connected: Arc<AtomicBool>,
    channel_cache: DashMap<u64, ChannelRecord>,
    guild_names: DashMap<u64, String>,
}

impl DiscordClient {
    /// Authenticate, spawn the gateway task, and return a ready client.
    pub async fn connect(token: &str) -> Result<Self> {
        let http = Arc::new(Http::new(token));
        let current = http
            .get_current_user()
            .await
            .context("Failed to authenticate with Discord")?;
        let bot_user_id = current.id.to_string();
        tracing::info!(bot_user = %current.name, bot_user_id = %bot_user_id, "Discord REST authenticated");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(false));
        let forwarder = GatewayForwarder {
            tx,
            connected: Arc::clone(&connected),
        };

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;
        let mut gateway = serenity::Client::builder(token, intents)
            .event_handler(forwarder)
            .await
            .context("Failed to build Discord gateway client")?;

        let gateway_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            if let Err(err) = gateway.start().await {
                tracing::error!(error = %err, "Discord gateway connection ended");
            }
            gateway_connected.store(false, Ordering::Relaxed);
        });

        Ok(Self {
            http,
            bot_user_id,
            events: Mutex::new(Some(rx)),
            connected,
            channel_cache: DashMap::new(),
            guild_names: DashMap::new(),
        })
    }

    async fn guild_name(&self, guild_id: GuildId) -> String {
        if let Some(name) = self.guild_names.get(&guild_id.get()) {
            return name.clone();
        }
        match self.http.get_guild(guild_id).await {
            Ok(guild) => {
                self.guild_names.insert(guild_id.get(), guild.name.clone());
                guild.name
            }
            Err(err) => {
                tracing::debug!(guild_id = %guild_id, error = %err, "Guild name lookup failed");
                String::new()
            }
        }
    }

    /// Resolve one channel to a record, REST-backed with a local cache.
    /// Non-guild and non-text channels resolve to `None`.
    async fn resolve_channel(&self, channel_id: u64) -> Result<Option<ChannelRecord>> {
        if let Some(record) = self.channel_cache.get(&channel_id) {
            return Ok(Some(record.clone()));
        }
        let channel = match self.http.get_channel(ChannelId::new(channel_id)).await {
            Ok(Channel::Guild(channel)) => channel,
            Ok(_) => return Ok(None),
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(err).context("Failed to fetch channel"),
        };
        if channel.kind != ChannelType::Text {
            return Ok(None);
        }
        let record = ChannelRecord {
            id: channel.id.to_string(),
            name: channel.name.clone(),
            guild_id: channel.guild_id.to_string(),
            guild_name: self.guild_name(channel.guild_id).await,
        };
        self.channel_cache.insert(channel_id, record.clone());
        Ok(Some(record))
    }

    fn record_from(&self, message: &Message, channel: &ChannelRecord) -> MessageRecord {
        MessageRecord {
            id: message.id.to_string(),
            author: message.author.name.clone(),
            author_id: message.author.id.to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp.to_string(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            guild_id: channel.guild_id.clone(),
            guild_name: channel.guild_name.clone(),
        }
    }

    async fn require_channel(&self, channel_id: &str) -> Result<ChannelRecord> {
        self.resolve_channel(parse_id(channel_id)?)
            .await?
            .with_context(|| format!("Unknown channel: {}", channel_id))
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<MessageRecord>> {
        let channel = self.require_channel(channel_id).await?;
        let mut request = GetMessages::new().limit(limit.min(100) as u8);
        if let Some(cursor) = before {
            request = request.before(MessageId::new(parse_id(cursor)?));
        }
        let messages = ChannelId::new(parse_id(channel_id)?)
            .messages(self.http.as_ref(), request)
            .await
            .context("Failed to fetch channel messages")?;
        Ok(messages
            .iter()
            .map(|m| self.record_from(m, &channel))
            .collect())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<String> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let mut builder = serenity::all::CreateMessage::new().content(content);
        if let Some(message_id) = reply_to {
            builder = builder
                .reference_message(MessageReference::from((
                    channel,
                    MessageId::new(parse_id(message_id)?),
                )));
        }
        let sent = channel
            .send_message(self.http.as_ref(), builder)
            .await
            .context("Failed to send message")?;
        Ok(sent.id.to_string())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<MessageRecord>> {
        let Some(channel) = self.resolve_channel(parse_id(channel_id)?).await? else {
            return Ok(None);
        };
        match self
            .http
            .get_message(
                ChannelId::new(parse_id(channel_id)?),
                MessageId::new(parse_id(message_id)?),
            )
            .await
        {
            Ok(message) => Ok(Some(self.record_from(&message, &channel))),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err).context("Failed to fetch message"),
        }
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        self.resolve_channel(parse_id(channel_id)?).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let guilds = self
            .http
            .get_guilds(None, Some(100))
            .await
            .context("Failed to list guilds")?;
        let mut channels = Vec::new();
        for guild in guilds {
            self.guild_names.insert(guild.id.get(), guild.name.clone());
            match self.guild_channels(&guild.id.to_string()).await {
                Ok(mut guild_channels) => channels.append(&mut guild_channels),
                Err(err) => {
                    tracing::warn!(guild_id = %guild.id, error = %err, "Skipping unreadable guild");
                }
            }
        }
        Ok(channels)
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>> {
        let id = GuildId::new(parse_id(guild_id)?);
        let guild_name = self.guild_name(id).await;
        let channels = self
            .http
            .get_channels(id)
            .await
            .context("Failed to list guild channels")?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == ChannelType::Text)
            .map(|c| {
                let record = ChannelRecord {
                    id: c.id.to_string(),
                    name: c.name,
                    guild_id: guild_id.to_string(),
                    guild_name: guild_name.clone(),
                };
                self.channel_cache.insert(c.id.get(), record.clone());
                record
            })
            .collect())
    }

    async fn guild_members(&self, guild_id: &str) -> Result<Vec<MemberRecord>> {
        let id = GuildId::new(parse_id(guild_id)?);
        let mut members = Vec::new();
        let mut after: Option<u64> = None;
        loop {
            let page = self
                .http
                .get_guild_members(id, Some(MEMBER_PAGE), after)
                .await
                .context("Failed to list guild members")?;
            let page_len = page.len() as u64;
            after = page.last().map(|m| m.user.id.get());
            members.extend(page.iter().map(|m| MemberRecord {
                id: m.user.id.to_string(),
                display_name: display_name(m),
                is_bot: m.user.bot,
            }));
            if page_len < MEMBER_PAGE {
                break;
            }
        }
        Ok(members)
    }

    async fn event_stream(&self) -> Result<EventStream> {
        let rx = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match rx {
            Some(rx) => Ok(Box::pin(ReceiverStream::new(rx))),
            None => anyhow::bail!("Event stream already taken"),
        }
    }

    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
