// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Topic endpoints: creation, update upload, range reads and file
//! retrieval.

use std::str::FromStr;

use actix_web::{
    web::{self, Data},
    HttpRequest, HttpResponse,
};
use rdvbackend::{push::PushNotificationProvider, Rendezvous};
use rdvcommon::{
    identifiers::{MessageId, TopicId},
    ServiceError,
};
use rdvprotos::{Topic, TopicUpdateUpload};

use super::{
    auth_token, decode_body, device_key, numeric_header, proto_response, user_key, ApiError,
};

#[tracing::instrument(name = "Create topic", skip_all)]
pub(crate) async fn create<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let topic: Topic = decode_body(&body)?;
    service.create_topic(&user, &device, &token, topic).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "Add message", skip_all)]
pub(crate) async fn message<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let upload: TopicUpdateUpload = decode_body(&body)?;
    let chain = service.add_message(upload).await?;
    Ok(proto_response(chain))
}

#[tracing::instrument(name = "Get messages in range", skip_all)]
pub(crate) async fn range<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let topic_id = parse_topic_id(&path)?;
    let start = numeric_header(&request, "start")?;
    let count = numeric_header(&request, "count")?;
    let chain = service
        .get_messages_in_range(&user, &device, &token, &topic_id, start, count)
        .await?;
    Ok(proto_response(chain))
}

#[tracing::instrument(name = "Get file", skip_all)]
pub(crate) async fn file<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let user = user_key(&request)?;
    let device = device_key(&request)?;
    let token = auth_token(&request)?;
    let (topic_id, message_id) = path.into_inner();
    let topic_id = parse_topic_id(&topic_id)?;
    let message_id = MessageId::from_str(&message_id)
        .map_err(|_| ApiError(ServiceError::InvalidRequest("invalid message id")))?;
    let bytes = service
        .get_file(&user, &device, &token, &topic_id, &message_id)
        .await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}

fn parse_topic_id(segment: &str) -> Result<TopicId, ApiError> {
    TopicId::from_str(segment).map_err(|_| ApiError(ServiceError::InvalidRequest("invalid topic id")))
}
