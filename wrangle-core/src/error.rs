// ABOUTME: Error taxonomy for the dispatch core
// ABOUTME: Topic mismatches, lookup failures, timeouts and collaborator errors

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the topic matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// Actual topic and template have a different number of segments
    #[error("not the same topic")]
    NotSameTopic,

    /// The template contains no `+` or `#` wildcard at all
    #[error("not a valid subscription template")]
    NotValidSubscriptionTemplate,

    /// A literal segment of the template does not match the actual topic
    #[error("not the subscribed topic")]
    NotSubscribedTopic,

    /// The number of ids does not match the number of `+` wildcards
    #[error("invalid number of arguments")]
    InvalidArgumentCount,

    /// An id is the empty string
    #[error("ids cannot be an empty string")]
    InvalidIds,
}

/// Errors produced by the dispatch core.
///
/// Decode and topic errors are terminal for the single message that caused
/// them; nothing in this crate retries automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("middleware not found: {0}")]
    MiddlewareNotFound(String),

    #[error("middleware chain aborted: {0}")]
    MiddlewareAborted(String),

    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("plugin execution failed: {0}")]
    PluginExecutionFailed(#[source] anyhow::Error),

    #[error("no known origin for correlation id {0}")]
    CorrelationLost(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("repository error: {0}")]
    Repository(#[source] anyhow::Error),
}

impl Error {
    /// Wrap an opaque collaborator failure.
    pub fn repository(err: anyhow::Error) -> Self {
        Self::Repository(err)
    }

    /// Wrap a plugin execution failure.
    pub fn execution(err: anyhow::Error) -> Self {
        Self::PluginExecutionFailed(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
