//! Notification sink trait.

use async_trait::async_trait;

use crate::Result;

/// How the sink should render a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Markup is interpreted by the transport.
    Rich,
    /// Text is delivered as-is.
    Plain,
}

/// Delivers text messages to a recipient.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, recipient: i64, text: &str, format: MessageFormat) -> Result<()>;
}
