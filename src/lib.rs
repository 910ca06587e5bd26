// ABOUTME: Root library module exposing all public modules
// ABOUTME: Provides access to the chat trait, dispatcher, waiter, and API server

pub mod access;
pub mod chat;
pub mod config;
pub mod discord;
pub mod dispatch;
pub mod error;
pub mod mcp;
pub mod rate_limit;
pub mod server;
pub mod url;
pub mod waiter;

pub use access::AccessScope;
pub use chat::{ChannelRecord, ChatClient, EventStream, MemberRecord, MessageRecord};
pub use dispatch::{DispatchLimits, ToolCall, ToolDispatcher};
pub use error::{BridgeError, BridgeResult};
pub use rate_limit::{Admission, RateLimiter};
pub use waiter::ReplyWaiter;
