// ABOUTME: Rendezvous between outbound questions and future gateway replies
// ABOUTME: Registry of pending asks, each resolved exactly once by event, deadline, or caller abort

use crate::chat::{ChatClient, MessageRecord};
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// One outstanding ask: correlation key plus the channel that delivers the
/// qualifying reply to the suspended caller.
struct Pending {
    channel_id: String,
    target_author: Option<String>,
    tx: oneshot::Sender<MessageRecord>,
}

/// Adapts the push-based gateway feed into per-call request/response.
///
/// The single gateway pump feeds `handle_event`; callers suspend in
/// `ask_and_wait`. Entries are removed from the registry before their result
/// is delivered, so whichever of {matching event, deadline, caller abort}
/// wins the race owns the entry and is the only side that resolves it.
pub struct ReplyWaiter {
    bot_user_id: String,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl ReplyWaiter {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of asks currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.registry().len()
    }

    fn register(
        &self,
        channel_id: &str,
        target_author: Option<&str>,
    ) -> (u64, oneshot::Receiver<MessageRecord>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.registry().insert(
            id,
            Pending {
                channel_id: channel_id.to_string(),
                target_author: target_author.map(str::to_string),
                tx,
            },
        );
        (id, rx)
    }

    fn remove(&self, id: u64) -> bool {
        self.registry().remove(&id).is_some()
    }

    /// Single dispatch point for incoming gateway messages, called in arrival
    /// order. Returns true when the message resolved a pending ask.
    ///
    /// The matching entry is removed under the registry lock before its
    /// oneshot fires, so a second qualifying event finds nothing to resolve.
    pub fn handle_event(&self, message: &MessageRecord) -> bool {
        if message.author_id == self.bot_user_id {
            return false;
        }
        let mut registry = self.registry();
        let matched = registry.iter().find_map(|(&id, pending)| {
            let channel_ok = pending.channel_id == message.channel_id;
            let author_ok = pending
                .target_author
                .as_deref()
                .is_none_or(|target| target == message.author_id);
            (channel_ok && author_ok).then_some(id)
        });
        let Some(id) = matched else {
            return false;
        };
        let Some(entry) = registry.remove(&id) else {
            return false;
        };
        drop(registry);
        // Send only fails if the caller aborted between removal and here;
        // the entry is already gone either way.
        entry.tx.send(message.clone()).is_ok()
    }

    /// Send `prompt` to `channel_id` and suspend until a qualifying reply
    /// arrives or `timeout` elapses. A qualifying reply is the first incoming
    /// message in the channel not authored by the bot, and authored by
    /// `target_author` when one is given.
    pub async fn ask_and_wait(
        &self,
        chat: &dyn ChatClient,
        channel_id: &str,
        prompt: &str,
        target_author: Option<&str>,
        timeout: Duration,
    ) -> BridgeResult<MessageRecord> {
        // Register before sending so a reply landing immediately after the
        // send cannot slip past the registry.
        let (id, mut rx) = self.register(channel_id, target_author);
        let mut guard = PendingGuard {
            waiter: self,
            id,
            armed: true,
        };

        if let Err(err) = chat.send_message(channel_id, prompt, None).await {
            return Err(BridgeError::upstream(err));
        }

        tracing::debug!(
            channel_id = %channel_id,
            target = target_author.unwrap_or("anyone"),
            timeout_secs = timeout.as_secs(),
            "waiting for reply"
        );

        tokio::select! {
            reply = &mut rx => {
                guard.disarm();
                match reply {
                    Ok(message) => Ok(message),
                    // Sender dropped without delivering: the entry was
                    // released externally. The deadline is the authoritative
                    // outcome for the caller.
                    Err(_) => Err(BridgeError::Timeout),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                let owned = self.remove(id);
                guard.disarm();
                if owned {
                    Err(BridgeError::Timeout)
                } else {
                    // The event side won the removal race at the deadline
                    // boundary; its message is already in the channel.
                    rx.try_recv().map_err(|_| BridgeError::Timeout)
                }
            }
        }
    }
}

/// Releases a registered ask when the owning call is dropped before
/// resolution (client disconnect). Best-effort cleanup; the deadline remains
/// the backstop.
struct PendingGuard<'a> {
    waiter: &'a ReplyWaiter,
    id: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.waiter.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, channel_id: &str, author_id: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            author: format!("user-{author_id}"),
            author_id: author_id.to_string(),
            content: "sure".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            channel_id: channel_id.to_string(),
            channel_name: "general".to_string(),
            guild_id: "1".to_string(),
            guild_name: "testers".to_string(),
        }
    }

    #[test]
    fn test_event_without_pending_is_ignored() {
        let waiter = ReplyWaiter::new("bot");
        assert!(!waiter.handle_event(&message("1", "42", "7")));
    }

    #[test]
    fn test_registered_ask_matches_channel() {
        let waiter = ReplyWaiter::new("bot");
        let (_, mut rx) = waiter.register("42", None);
        assert!(!waiter.handle_event(&message("1", "43", "7")));
        assert!(waiter.handle_event(&message("2", "42", "7")));
        assert_eq!(rx.try_recv().unwrap().id, "2");
        assert_eq!(waiter.pending_count(), 0);
    }

    #[test]
    fn test_bot_messages_never_qualify() {
        let waiter = ReplyWaiter::new("bot");
        let (_, _rx) = waiter.register("42", None);
        assert!(!waiter.handle_event(&message("1", "42", "bot")));
        assert_eq!(waiter.pending_count(), 1);
    }

    #[test]
    fn test_target_author_filter() {
        let waiter = ReplyWaiter::new("bot");
        let (_, mut rx) = waiter.register("42", Some("7"));
        assert!(!waiter.handle_event(&message("1", "42", "9")));
        assert!(waiter.handle_event(&message("2", "42", "7")));
        assert_eq!(rx.try_recv().unwrap().author_id, "7");
    }

    #[test]
    fn test_second_qualifying_event_finds_nothing() {
        let waiter = ReplyWaiter::new("bot");
        let (_, _rx) = waiter.register("42", None);
        assert!(waiter.handle_event(&message("1", "42", "7")));
        assert!(!waiter.handle_event(&message("2", "42", "7")));
    }
}
