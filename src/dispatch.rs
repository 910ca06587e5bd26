// ABOUTME: Tool dispatcher mapping named tool calls onto the chat client
// ABOUTME: Validates arguments, enforces the access scope, and shapes JSON results

use crate::access::AccessScope;
use crate::chat::{ChannelRecord, ChatClient, MemberRecord};
use crate::error::{BridgeError, BridgeResult};
use crate::url::parse_message_url;
use crate::waiter::ReplyWaiter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// A named tool invocation with raw JSON arguments, as it arrives from
/// either the HTTP surface or an MCP tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Knobs that bound how much work a single tool call may do.
#[derive(Debug, Clone)]
pub struct DispatchLimits {
    pub ask_timeout: Duration,
    pub search_scan_depth: usize,
    pub guild_search_channel_depth: usize,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_secs(300),
            search_scan_depth: 1000,
            guild_search_channel_depth: 500,
        }
    }
}

pub struct ToolDispatcher {
    chat: Arc<dyn ChatClient>,
    scope: AccessScope,
    waiter: Arc<ReplyWaiter>,
    limits: DispatchLimits,
}

fn require_str<'a>(args: &'a Value, field: &'static str) -> BridgeResult<&'a str> {
    match args.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(BridgeError::InvalidArguments { field }),
    }
}

fn optional_str<'a>(args: &'a Value, field: &'static str) -> BridgeResult<Option<&'a str>> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(BridgeError::InvalidArguments { field }),
    }
}

/// Read an optional positive-integer `limit`, clamped into `1..=max`.
fn limit_arg(args: &Value, field: &'static str, default: usize, max: usize) -> BridgeResult<usize> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => match v.as_u64() {
            Some(n) => Ok((n as usize).clamp(1, max)),
            None => Err(BridgeError::InvalidArguments { field }),
        },
    }
}

fn member_json(member: &MemberRecord) -> Value {
    json!({
        "id": member.id,
        "display_name": member.display_name,
    })
}

impl ToolDispatcher {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        scope: AccessScope,
        waiter: Arc<ReplyWaiter>,
        limits: DispatchLimits,
    ) -> Self {
        Self {
            chat,
            scope,
            waiter,
            limits,
        }
    }

    /// Execute one tool call. Every tool validates before touching the
    /// platform, so an invalid call never produces upstream traffic.
    pub async fn dispatch(&self, call: &ToolCall) -> BridgeResult<Value> {
        let args = &call.arguments;
        match call.name.as_str() {
            "get_messages" => self.get_messages(args).await,
            "search_messages" => self.search_messages(args).await,
            "search_guild_messages" => self.search_guild_messages(args).await,
            "get_message_by_url" => self.get_message_by_url(args).await,
            "list_channels" => self.list_channels().await,
            "list_guild_users" => self.list_guild_users(args).await,
            "list_all_users" => self.list_all_users().await,
            "send_message" => self.send_message(args).await,
            "ask_question" => self.ask_question(args).await,
            other => Err(BridgeError::UnknownTool(other.to_string())),
        }
    }

    /// Resolve a channel and check both halves of the scope against it.
    /// The channel allow-list is checked first so a disallowed channel is
    /// rejected without any platform round-trip.
    async fn authorize_channel(&self, channel_id: &str) -> BridgeResult<ChannelRecord> {
        if !self.scope.allows_channel(channel_id) {
            return Err(BridgeError::PermissionDenied);
        }
        let channel = self
            .chat
            .channel_info(channel_id)
            .await
            .map_err(BridgeError::upstream)?
            .ok_or_else(|| BridgeError::NotFound(format!("channel {}", channel_id)))?;
        if !self.scope.allows_guild(&channel.guild_id) {
            return Err(BridgeError::PermissionDenied);
        }
        Ok(channel)
    }

    async fn get_messages(&self, args: &Value) -> BridgeResult<Value> {
        let channel_id = require_str(args, "channel_id")?;
        let limit = limit_arg(args, "limit", 10, 100)?;
        let before = optional_str(args, "before_message_id")?;
        self.authorize_channel(channel_id).await?;
        let messages = self
            .chat
            .recent_messages(channel_id, limit, before)
            .await
            .map_err(BridgeError::upstream)?;
        Ok(serde_json::to_value(messages)?)
    }

    /// Page backwards through channel history, keeping messages whose content
    /// contains the query case-insensitively, until `limit` hits are found or
    /// the scan depth is exhausted.
    async fn scan_channel(
        &self,
        channel_id: &str,
        query: &str,
        limit: usize,
        depth: usize,
    ) -> BridgeResult<Vec<crate::chat::MessageRecord>> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        let mut cursor: Option<String> = None;
        let mut scanned = 0usize;

        while hits.len() < limit && scanned < depth {
            let page_size = (depth - scanned).min(100);
            let page = self
                .chat
                .recent_messages(channel_id, page_size, cursor.as_deref())
                .await
                .map_err(BridgeError::upstream)?;
            if page.is_empty() {
                break;
            }
            scanned += page.len();
            for message in &page {
                if message.content.to_lowercase().contains(&needle) {
                    hits.push(message.clone());
                    if hits.len() == limit {
                        break;
                    }
                }
            }
            cursor = page.last().map(|m| m.id.clone());
        }
        Ok(hits)
    }

    async fn search_messages(&self, args: &Value) -> BridgeResult<Value> {
        let channel_id = require_str(args, "channel_id")?;
        let query = require_str(args, "query")?;
        let limit = limit_arg(args, "limit", 10, 100)?;
        self.authorize_channel(channel_id).await?;
        let hits = self
            .scan_channel(channel_id, query, limit, self.limits.search_scan_depth)
            .await?;
        Ok(serde_json::to_value(hits)?)
    }

    async fn search_guild_messages(&self, args: &Value) -> BridgeResult<Value> {
        let guild_id = require_str(args, "guild_id")?;
        let query = require_str(args, "query")?;
        let limit = limit_arg(args, "limit", 50, 50)?;
        if !self.scope.allows_guild(guild_id) {
            return Err(BridgeError::PermissionDenied);
        }
        let channels: Vec<ChannelRecord> = self
            .chat
            .guild_channels(guild_id)
            .await
            .map_err(BridgeError::upstream)?
            .into_iter()
            .filter(|c| self.scope.allows_channel(&c.id))
            .collect();

        let guild_name = channels
            .first()
            .map(|c| c.guild_name.clone())
            .unwrap_or_default();
        let mut hits = Vec::new();
        let mut channels_searched = 0usize;

        for channel in &channels {
            if hits.len() >= limit {
                break;
            }
            let remaining = limit - hits.len();
            let depth = self
                .limits
                .guild_search_channel_depth
                .min(self.limits.search_scan_depth);
            match self.scan_channel(&channel.id, query, remaining, depth).await {
                Ok(mut found) => {
                    channels_searched += 1;
                    hits.append(&mut found);
                }
                // One unreadable channel must not sink the whole search.
                Err(err) => {
                    tracing::warn!(
                        channel_id = %channel.id,
                        error = %err,
                        "Skipping channel during guild search"
                    );
                }
            }
        }

        let total_found = hits.len();
        Ok(json!({
            "messages": hits,
            "total_found": total_found,
            "channels_searched": channels_searched,
            "query": query,
            "guild_name": guild_name,
        }))
    }

    async fn get_message_by_url(&self, args: &Value) -> BridgeResult<Value> {
        let url = require_str(args, "url")?;
        let reference =
            parse_message_url(url).ok_or(BridgeError::InvalidArguments { field: "url" })?;
        if !self
            .scope
            .is_allowed(&reference.guild_id, &reference.channel_id)
        {
            return Err(BridgeError::PermissionDenied);
        }
        let message = self
            .chat
            .fetch_message(&reference.channel_id, &reference.message_id)
            .await
            .map_err(BridgeError::upstream)?
            .ok_or_else(|| BridgeError::NotFound(format!("message {}", reference.message_id)))?;
        Ok(serde_json::to_value(message)?)
    }

    async fn list_channels(&self) -> BridgeResult<Value> {
        let channels: Vec<ChannelRecord> = self
            .chat
            .list_channels()
            .await
            .map_err(BridgeError::upstream)?
            .into_iter()
            .filter(|c| self.scope.is_allowed(&c.guild_id, &c.id))
            .collect();
        Ok(serde_json::to_value(channels)?)
    }

    async fn list_guild_users(&self, args: &Value) -> BridgeResult<Value> {
        let guild_id = require_str(args, "guild_id")?;
        if !self.scope.allows_guild(guild_id) {
            return Err(BridgeError::PermissionDenied);
        }
        let members: Vec<Value> = self
            .chat
            .guild_members(guild_id)
            .await
            .map_err(BridgeError::upstream)?
            .iter()
            .filter(|m| !m.is_bot)
            .map(member_json)
            .collect();
        Ok(Value::Array(members))
    }

    /// Union of human members across every in-scope guild, deduplicated by
    /// user id. Guild set is derived from the visible channel list so the
    /// scope filtering matches list_channels exactly.
    async fn list_all_users(&self) -> BridgeResult<Value> {
        let channels = self
            .chat
            .list_channels()
            .await
            .map_err(BridgeError::upstream)?;
        let mut guild_ids: Vec<String> = Vec::new();
        for channel in &channels {
            if self.scope.is_allowed(&channel.guild_id, &channel.id)
                && !guild_ids.contains(&channel.guild_id)
            {
                guild_ids.push(channel.guild_id.clone());
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut users: Vec<Value> = Vec::new();
        for guild_id in &guild_ids {
            let members = self
                .chat
                .guild_members(guild_id)
                .await
                .map_err(BridgeError::upstream)?;
            for member in members {
                if !member.is_bot && seen.insert(member.id.clone()) {
                    users.push(member_json(&member));
                }
            }
        }
        Ok(Value::Array(users))
    }

    async fn send_message(&self, args: &Value) -> BridgeResult<Value> {
        let channel_id = require_str(args, "channel_id")?;
        let content = require_str(args, "content")?;
        let reply_to = optional_str(args, "reply_to_message_id")?;
        self.authorize_channel(channel_id).await?;
        let message_id = self
            .chat
            .send_message(channel_id, content, reply_to)
            .await
            .map_err(BridgeError::upstream)?;
        Ok(json!({ "message_id": message_id }))
    }

    async fn ask_question(&self, args: &Value) -> BridgeResult<Value> {
        let channel_id = require_str(args, "channel_id")?;
        let prompt = require_str(args, "prompt")?;
        let target_user_id = optional_str(args, "target_user_id")?;
        let timeout = match args.get("timeout_seconds") {
            None | Some(Value::Null) => self.limits.ask_timeout,
            Some(v) => match v.as_u64() {
                Some(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(BridgeError::InvalidArguments {
                        field: "timeout_seconds",
                    })
                }
            },
        };
        self.authorize_channel(channel_id).await?;
        let reply = self
            .waiter
            .ask_and_wait(
                self.chat.as_ref(),
                channel_id,
                prompt,
                target_user_id,
                timeout,
            )
            .await?;
        Ok(serde_json::to_value(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_str() {
        let args = json!({"channel_id": "42", "blank": ""});
        assert_eq!(require_str(&args, "channel_id").unwrap(), "42");
        assert!(matches!(
            require_str(&args, "missing"),
            Err(BridgeError::InvalidArguments { field: "missing" })
        ));
        assert!(require_str(&args, "blank").is_err());
    }

    #[test]
    fn test_optional_str() {
        let args = json!({"target": "7", "nil": null, "num": 3});
        assert_eq!(optional_str(&args, "target").unwrap(), Some("7"));
        assert_eq!(optional_str(&args, "nil").unwrap(), None);
        assert_eq!(optional_str(&args, "missing").unwrap(), None);
        assert!(optional_str(&args, "num").is_err());
    }

    #[test]
    fn test_limit_arg_defaults_and_clamps() {
        assert_eq!(limit_arg(&json!({}), "limit", 10, 100).unwrap(), 10);
        assert_eq!(
            limit_arg(&json!({"limit": 7}), "limit", 10, 100).unwrap(),
            7
        );
        assert_eq!(
            limit_arg(&json!({"limit": 500}), "limit", 10, 100).unwrap(),
            100
        );
        assert_eq!(
            limit_arg(&json!({"limit": 0}), "limit", 10, 100).unwrap(),
            1
        );
        assert!(limit_arg(&json!({"limit": "ten"}), "limit", 10, 100).is_err());
        assert!(limit_arg(&json!({"limit": -3}), "limit", 10, 100).is_err());
    }

    #[test]
    fn test_tool_call_deserializes_without_arguments() {
        let call: ToolCall = serde_json::from_value(json!({"name": "list_channels"})).unwrap();
        assert_eq!(call.name, "list_channels");
        assert!(call.arguments.is_null());
    }
}
