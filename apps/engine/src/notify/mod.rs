//! Outbound collaborators: the chat platform and the event relay.

pub mod chat;
pub mod relay;

pub use chat::{Access, Announcement, ChatError, ChatGateway, LoggingChatGateway};
pub use relay::{EventRelay, LifecycleEvent, RelayEnvelope, Subscription};
