// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rendezvous server: HTTP adapter over the core service.

pub mod configurations;
pub mod endpoints;
pub mod push_notification_provider;
pub mod telemetry;

use std::{net::TcpListener, path::PathBuf};

use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use rdvbackend::{push::PushNotificationProvider, Rendezvous};
use tracing_actix_web::TracingLogger;

use crate::endpoints::{admin, device, ping, topic, user};

/// Configure and run the server application.
pub fn run<P: PushNotificationProvider>(
    listener: TcpListener,
    service: Rendezvous<P>,
    static_files: Option<PathBuf>,
) -> Result<Server, std::io::Error> {
    let service_data = Data::new(service);

    tracing::info!(
        address = %listener.local_addr().expect("Could not get local address"),
        "Starting server",
    );

    let server = HttpServer::new(move || {
        let mut app = App::new()
            .wrap(TracingLogger::default())
            .app_data(service_data.clone())
            .route("/ping", web::get().to(ping))
            // Admin surface
            .route("/admin/renew", web::get().to(admin::renew::<P>))
            .route("/admin/reset", web::get().to(admin::reset::<P>))
            .route("/admin/accounts", web::get().to(admin::accounts::<P>))
            .route("/admin/allow", web::post().to(admin::allow::<P>))
            .route("/admin/delete", web::post().to(admin::delete_user::<P>))
            // User lifecycle
            .route("/user/register", web::post().to(user::register::<P>))
            .route("/user/info", web::get().to(user::info::<P>))
            .route("/user/delete", web::post().to(user::delete::<P>))
            // Device lifecycle
            .route("/device/register", web::post().to(device::register::<P>))
            .route("/device/push", web::post().to(device::push_token::<P>))
            .route("/device/delete", web::post().to(device::delete::<P>))
            // Prekeys
            .route("/device/prekeys", web::post().to(device::add_prekeys::<P>))
            .route("/user/prekeys", web::get().to(user::prekeys::<P>))
            // Topic keys
            .route("/user/topickeys", web::post().to(user::add_topic_keys::<P>))
            .route("/user/topickey", web::get().to(user::topic_key::<P>))
            .route("/users/topickey", web::post().to(user::topic_keys::<P>))
            // Topics
            .route("/topic/create", web::post().to(topic::create::<P>))
            .route("/topic/message", web::post().to(topic::message::<P>))
            .route("/topic/range/{topic_id}", web::get().to(topic::range::<P>))
            .route(
                "/files/{topic_id}/{message_id}",
                web::get().to(topic::file::<P>),
            )
            // Download
            .route("/device/messages", web::get().to(device::messages::<P>));
        if let Some(directory) = &static_files {
            app = app.service(actix_files::Files::new("/", directory).index_file("index.html"));
        }
        app
    })
    .listen(listener)?
    .run();
    Ok(server)
}
