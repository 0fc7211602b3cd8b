// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Device lifecycle, push-token registration, prekey upload and the
//! download endpoint.

use actix_web::{
    web::{self, Data},
    HttpRequest, HttpResponse,
};
use rdvbackend::{push::PushNotificationProvider, Rendezvous};
use rdvprotos::{DevicePrekeyUploadRequest, InternalUser};

use super::{
    auth_token, decode_body, device_key, proto_response, token_response, user_key, ApiError,
};

#[tracing::instrument(name = "Register device", skip_all)]
pub(crate) async fn register<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let record: InternalUser = decode_body(&body)?;
    let token = service.register_device(record).await?;
    Ok(token_response(token))
}

#[tracing::instrument(name = "Delete device", skip_all)]
pub(crate) async fn delete<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let record: InternalUser = decode_body(&body)?;
    service.delete_device(record).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Set push token", skip_all)]
pub(crate) async fn push_token<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    service
        .set_push_token(&user, &device, &token, &body)
        .await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Add device prekeys", skip_all)]
pub(crate) async fn add_prekeys<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: DevicePrekeyUploadRequest = decode_body(&body)?;
    service.add_pre_keys(request).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Get messages for device", skip_all)]
pub(crate) async fn messages<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let download = service
        .get_messages_for_device(&user, &device, &token)
        .await?;
    Ok(proto_response(download))
}
