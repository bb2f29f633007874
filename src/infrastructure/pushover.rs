//! Pushover delivery gateway.
//!
//! Delivery failures come back as [`PushResult`] values rather than
//! errors; the dispatcher logs and moves on, it never retries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::domain::services::{PushResult, PushSender};

pub struct PushoverClient {
    client: Client,
    api_url: String,
}

impl PushoverClient {
    pub fn new(api_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create push gateway client")?;
        Ok(Self { client, api_url })
    }
}

/// The gateway's acknowledgement body; `status == 1` means accepted.
#[derive(Debug, Deserialize)]
struct PushoverAck {
    #[serde(default)]
    status: i32,
}

fn classify(status: StatusCode, ack: Option<PushoverAck>) -> PushResult {
    if status.is_client_error() {
        return PushResult::Rejected;
    }
    match ack {
        Some(ack) if status.is_success() && ack.status == 1 => PushResult::Delivered,
        _ => PushResult::ApiUnavailable,
    }
}

#[async_trait]
impl PushSender for PushoverClient {
    async fn send(
        &self,
        app_token: &str,
        user_token: &str,
        message: &str,
        title: Option<&str>,
    ) -> PushResult {
        let mut form = vec![
            ("token", app_token),
            ("user", user_token),
            ("message", message),
        ];
        if let Some(title) = title {
            form.push(("title", title));
        }

        let response = match self.client.post(&self.api_url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Push gateway unreachable: {}", e);
                return PushResult::ApiUnavailable;
            }
        };

        let status = response.status();
        let ack = response.json::<PushoverAck>().await.ok();
        let result = classify(status, ack);
        if result != PushResult::Delivered {
            tracing::warn!("Push delivery not accepted (HTTP {}): {:?}", status, result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_ack_is_delivered() {
        let result = classify(StatusCode::OK, Some(PushoverAck { status: 1 }));
        assert_eq!(result, PushResult::Delivered);
    }

    #[test]
    fn client_errors_are_rejections() {
        let result = classify(StatusCode::BAD_REQUEST, Some(PushoverAck { status: 0 }));
        assert_eq!(result, PushResult::Rejected);
        assert_eq!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, None),
            PushResult::Rejected
        );
    }

    #[test]
    fn anything_else_is_api_unavailable() {
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, None),
            PushResult::ApiUnavailable
        );
        // 2xx without a protocol-conforming ack body.
        assert_eq!(
            classify(StatusCode::OK, Some(PushoverAck { status: 0 })),
            PushResult::ApiUnavailable
        );
        assert_eq!(classify(StatusCode::OK, None), PushResult::ApiUnavailable);
    }
}
