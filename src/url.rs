// ABOUTME: Parser for canonical Discord message URLs
// ABOUTME: Extracts guild/channel/message ids from https://discord.com/channels/... links

use regex::Regex;
use std::sync::LazyLock;

static MESSAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:www\.)?discord\.(?:com|gg)/channels/(\d+)/(\d+)/(\d+)$")
        .expect("message URL pattern is valid")
});

/// The three ids encoded in a message link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
}

/// Parse a Discord message URL. Accepts the canonical discord.com form and
/// the discord.gg variant; anything else yields None.
pub fn parse_message_url(url: &str) -> Option<MessageRef> {
    let captures = MESSAGE_URL.captures(url.trim())?;
    Some(MessageRef {
        guild_id: captures[1].to_string(),
        channel_id: captures[2].to_string(),
        message_id: captures[3].to_string(),
    })
}
