//! Notification dispatch.

use pipewatch_core::{MessageFormat, NotificationSink};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("empty recipient")]
    EmptyRecipient,

    #[error("empty message")]
    EmptyMessage,

    #[error("delivery failed (rich: {rich}; plain: {plain})")]
    Delivery {
        rich: pipewatch_core::Error,
        plain: pipewatch_core::Error,
    },
}

/// Sends watch outcomes through a notification sink, falling back to plain
/// text when rich delivery is rejected.
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn send(&self, recipient: i64, text: &str) -> Result<(), DispatchError> {
        if recipient == 0 {
            return Err(DispatchError::EmptyRecipient);
        }
        if text.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let rich = match self.sink.deliver(recipient, text, MessageFormat::Rich).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!(recipient, error = %rich, "Rich delivery rejected, retrying as plain text");

        match self.sink.deliver(recipient, text, MessageFormat::Plain).await {
            Ok(()) => Ok(()),
            Err(plain) => {
                warn!(recipient, rich = %rich, plain = %plain, "Delivery failed");
                Err(DispatchError::Delivery { rich, plain })
            }
        }
    }
}
