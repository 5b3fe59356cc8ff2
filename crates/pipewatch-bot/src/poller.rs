//! Telegram update polling loop.

use crate::handler::handle_update;
use crate::services::TelegramClient;
use crate::state::BotState;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Long-poll timeout of a single `getUpdates` call.
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed poll.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Poll Telegram forever, handling every message on its own task.
pub async fn run(state: BotState, telegram: Arc<TelegramClient>) {
    info!("Telegram polling loop started");
    let mut offset = 0;

    loop {
        let updates = match telegram.get_updates(offset, POLL_TIMEOUT).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Telegram polling failed");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let state = state.clone();
            tokio::spawn(async move {
                let handled = AssertUnwindSafe(handle_update(&state, &update))
                    .catch_unwind()
                    .await;
                match handled {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(update_id = update.update_id, error = %e, "Failed to handle update");
                    }
                    Err(_) => {
                        error!(update_id = update.update_id, "Update handler panicked");
                    }
                }
            });
        }
    }
}
