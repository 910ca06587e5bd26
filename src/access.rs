// ABOUTME: Static guild/channel allow-list policy consulted before any chat-client call
// ABOUTME: Pure and side-effect free; an empty set on a dimension means unrestricted

use std::collections::HashSet;

/// Immutable allow-list scope fixed at process start.
#[derive(Debug, Clone, Default)]
pub struct AccessScope {
    guilds: HashSet<String>,
    channels: HashSet<String>,
}

impl AccessScope {
    pub fn new(
        guilds: impl IntoIterator<Item = String>,
        channels: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            guilds: guilds.into_iter().collect(),
            channels: channels.into_iter().collect(),
        }
    }

    /// Unrestricted scope on both dimensions.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn allows_guild(&self, guild_id: &str) -> bool {
        self.guilds.is_empty() || self.guilds.contains(guild_id)
    }

    pub fn allows_channel(&self, channel_id: &str) -> bool {
        self.channels.is_empty() || self.channels.contains(channel_id)
    }

    /// Both dimensions must pass.
    pub fn is_allowed(&self, guild_id: &str, channel_id: &str) -> bool {
        self.allows_guild(guild_id) && self.allows_channel(channel_id)
    }
}
