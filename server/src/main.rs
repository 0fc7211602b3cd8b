// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::TcpListener;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rdvbackend::{storage::Storage, Rendezvous};
use rdvserver::{
    configurations::get_configuration, push_notification_provider::ProductionPushNotificationProvider,
    run, telemetry,
};
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".into());
    let configuration = get_configuration(&config_path)
        .unwrap_or_else(|e| panic!("Could not load configuration {config_path}: {e}"));

    telemetry::init("rdvserver", configuration.log_file.as_deref())?;

    let storage = Storage::new(&configuration.data_folder)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let push_provider = ProductionPushNotificationProvider::new()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let service = Rendezvous::new(storage, push_provider, configuration.development)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    if configuration.development {
        // In development the admin token is printed so local tooling can
        // drive the admin surface without reading the snapshot.
        let token = service
            .admin_token()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        info!(token = URL_SAFE_NO_PAD.encode(token.as_slice()), "admin token");
    }

    let address = format!("{}:{}", configuration.host, configuration.port);
    let listener = TcpListener::bind(&address)
        .unwrap_or_else(|e| panic!("Failed to bind to {address}: {e}"));
    run(listener, service, configuration.static_files.clone())?.await
}
