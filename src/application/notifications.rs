//! Push-notification dispatch for finished runs.
//!
//! Called by a runner after it stamps `last_update = run epoch`; every
//! user tracking one of the stamped titles gets one message. Delivery is
//! fire-and-forget: failures are logged and skipped, never retried.

use std::sync::Arc;

use crate::domain::repositories::WatermarkStore;
use crate::domain::services::{PushResult, PushSender};
use crate::infrastructure::config::PushoverConfig;

const PUSH_TITLE: &str = "Manga updates";

pub struct NotificationDispatcher {
    store: Arc<dyn WatermarkStore>,
    sender: Arc<dyn PushSender>,
    enabled: bool,
    app_token: Option<String>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn WatermarkStore>,
        sender: Arc<dyn PushSender>,
        config: &PushoverConfig,
    ) -> Self {
        Self {
            store,
            sender,
            enabled: config.enabled,
            app_token: config.app_token.clone(),
        }
    }

    /// Notify every user holding a title stamped with `epoch`.
    pub async fn notify_run(&self, epoch: i64) {
        if !self.enabled {
            tracing::debug!("Push notifications disabled, skipping dispatch");
            return;
        }

        let targets = match self.store.users_to_notify(epoch).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!("Could not resolve notification targets: {:#}", e);
                return;
            }
        };

        for target in targets {
            let app_token = target
                .app_token_override
                .as_deref()
                .or(self.app_token.as_deref());
            let Some(app_token) = app_token else {
                tracing::warn!(
                    "No application token for user {}, skipping notification",
                    target.user_id
                );
                continue;
            };

            let message = update_message(target.updated_count);
            match self
                .sender
                .send(app_token, &target.push_token, &message, Some(PUSH_TITLE))
                .await
            {
                PushResult::Delivered => {
                    tracing::info!(
                        "Notified user {} about {} updated title(s)",
                        target.user_id,
                        target.updated_count
                    );
                }
                PushResult::Rejected => {
                    tracing::warn!(
                        "Push gateway rejected notification for user {}, check tokens",
                        target.user_id
                    );
                }
                PushResult::ApiUnavailable => {
                    tracing::warn!(
                        "Push gateway unavailable, dropping notification for user {}",
                        target.user_id
                    );
                }
            }
        }
    }
}

fn update_message(count: u32) -> String {
    if count == 1 {
        "1 title you follow has new chapters".to_string()
    } else {
        format!("{count} titles you follow have new chapters")
    }
}
