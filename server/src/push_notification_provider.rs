// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Push provider that relays a device wake-up to the notification server
//! the owning user registered with.

use async_trait::async_trait;
use rdvbackend::push::{PushNotificationError, PushNotificationProvider, PushTarget};
use reqwest::{Client, StatusCode};

#[derive(Debug, Clone)]
pub struct ProductionPushNotificationProvider {
    client: Client,
}

impl ProductionPushNotificationProvider {
    pub fn new() -> Result<Self, PushNotificationError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PushNotificationError::InvalidConfiguration(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushNotificationProvider for ProductionPushNotificationProvider {
    async fn notify(&self, target: &PushTarget) -> Result<(), PushNotificationError> {
        let response = self
            .client
            .post(&target.server)
            .header("content-type", "application/octet-stream")
            .body(target.token.clone())
            .send()
            .await
            .map_err(|e| PushNotificationError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(PushNotificationError::UnexpectedStatus(format!(
                "{status} from {}",
                target.server
            ))),
        }
    }
}
