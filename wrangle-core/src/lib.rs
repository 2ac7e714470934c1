// ABOUTME: Command-and-control core for chat-driven service node fleets
// ABOUTME: Topic matching, plugin dispatch, middleware chains and response correlation

pub mod auth;
pub mod cache;
pub mod command;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod management;
pub mod memory;
pub mod middleware;
pub mod notify;
pub mod payload;
pub mod plugin;
pub mod registry;
pub mod reply;
pub mod repository;
pub mod subscription;
pub mod topic;
pub mod transport;

pub use error::{Error, Result, TopicError};

// Re-export the value objects and the seams most callers need
pub use command::Command;
pub use payload::Payload;
pub use plugin::{Plugin, PluginLoader, PluginMetadata, PluginType, StaticPluginLoader};
pub use reply::{Reply, ReplyKind, TranslationRequest};

pub use engine::{DispatchEngine, EngineConfig};
pub use management::ManagementService;
pub use notify::ChatNotifier;
pub use registry::PluginRegistry;
pub use subscription::{Subscription, SubscriptionStore};
pub use transport::{InProcessTransport, InboundMessage, Transport};
