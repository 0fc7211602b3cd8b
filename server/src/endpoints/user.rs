// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User lifecycle, prekey and topic-key endpoints.

use actix_web::{
    web::{self, Data},
    HttpRequest, HttpResponse,
};
use rdvbackend::{push::PushNotificationProvider, Rendezvous};
use rdvprotos::{
    InternalUser, RegistrationBundle, TopicKeyBundle, TopicKeyRequest,
};

use super::{
    auth_token, decode_body, device_key, numeric_header, proto_response, required_header,
    token_response, user_key, ApiError,
};

#[tracing::instrument(name = "Register user", skip_all)]
pub(crate) async fn register<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let mut bundle: RegistrationBundle = decode_body(&body)?;
    // The pin header, when present, overrides the bundle field.
    if let Ok(pin) = required_header(&request, "pin") {
        bundle.pin = pin
            .parse()
            .map_err(|_| ApiError(rdvcommon::ServiceError::InvalidRequest("invalid pin")))?;
    }
    let token = service.register_user(bundle).await?;
    Ok(token_response(token))
}

#[tracing::instrument(name = "Get user info", skip_all)]
pub(crate) async fn info<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let record = service.get_user_info(&user, &device, &token).await?;
    Ok(proto_response(record))
}

#[tracing::instrument(name = "Delete user", skip_all)]
pub(crate) async fn delete<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let record: InternalUser = decode_body(&body)?;
    service.delete_user(record).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Get device prekeys", skip_all)]
pub(crate) async fn prekeys<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let count = numeric_header(&request, "count")?;
    let bundle = service.get_pre_keys(&user, &device, &token, count).await?;
    Ok(proto_response(bundle))
}

#[tracing::instrument(name = "Add topic keys", skip_all)]
pub(crate) async fn add_topic_keys<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let bundle: TopicKeyBundle = decode_body(&body)?;
    service.add_topic_keys(bundle).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Get topic key", skip_all)]
pub(crate) async fn topic_key<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let receiver = super::header_user_key(&request, "receiver")?;
    let application = required_header(&request, "app")?;
    let key = service
        .get_topic_key(&user, &device, &token, &receiver, application)
        .await?;
    Ok(proto_response(key))
}

#[tracing::instrument(name = "Get topic keys", skip_all)]
pub(crate) async fn topic_keys<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: TopicKeyRequest = decode_body(&body)?;
    let response = service.get_topic_keys(request).await?;
    Ok(proto_response(response))
}
