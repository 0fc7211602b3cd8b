// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The HTTP surface. Small opaque parameters travel in headers
//! (URL-safe base64 for binary values), topic and message ids travel as
//! base32 path segments, and bodies carry the wire-schema records.

pub(crate) mod admin;
pub(crate) mod device;
pub(crate) mod topic;
pub(crate) mod user;

use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use prost::Message;
use rdvcommon::{
    identifiers::{AuthToken, DeviceKey, UserKey},
    ServiceError,
};

/// Wraps [`ServiceError`] to map error kinds onto HTTP status codes.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ServiceError);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            ServiceError::ResourceNotAvailable => StatusCode::NOT_FOUND,
            ServiceError::InvalidSignature => StatusCode::NOT_ACCEPTABLE,
            ServiceError::ResourceAlreadyExists => StatusCode::CONFLICT,
            ServiceError::RequestOutdated => StatusCode::GONE,
            ServiceError::InvalidKeyUpload(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

/// Responds 200 to liveness probes.
pub(crate) async fn ping() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub(crate) fn required_header<'a>(
    request: &'a HttpRequest,
    name: &'static str,
) -> Result<&'a str, ApiError> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError(ServiceError::InvalidRequest(
            "missing or malformed header",
        )))
}

fn header_bytes(request: &HttpRequest, name: &'static str) -> Result<Vec<u8>, ApiError> {
    URL_SAFE_NO_PAD
        .decode(required_header(request, name)?)
        .map_err(|_| ApiError(ServiceError::InvalidRequest("header is not valid base64")))
}

pub(crate) fn user_key(request: &HttpRequest) -> Result<UserKey, ApiError> {
    header_user_key(request, "user")
}

pub(crate) fn header_user_key(
    request: &HttpRequest,
    name: &'static str,
) -> Result<UserKey, ApiError> {
    UserKey::try_from(header_bytes(request, name)?.as_slice())
        .map_err(|_| ApiError(ServiceError::InvalidRequest("user key must be 32 bytes")))
}

pub(crate) fn device_key(request: &HttpRequest) -> Result<DeviceKey, ApiError> {
    DeviceKey::try_from(header_bytes(request, "device")?.as_slice())
        .map_err(|_| ApiError(ServiceError::InvalidRequest("device key must be 32 bytes")))
}

pub(crate) fn auth_token(request: &HttpRequest) -> Result<AuthToken, ApiError> {
    AuthToken::try_from(header_bytes(request, "auth")?.as_slice())
        .map_err(|_| ApiError(ServiceError::InvalidRequest("auth token must be 16 bytes")))
}

pub(crate) fn numeric_header(request: &HttpRequest, name: &'static str) -> Result<u32, ApiError> {
    required_header(request, name)?
        .parse()
        .map_err(|_| ApiError(ServiceError::InvalidRequest("header is not a number")))
}

/// Decodes a wire-schema request body.
pub(crate) fn decode_body<T: Message + Default>(body: &[u8]) -> Result<T, ApiError> {
    T::decode(body).map_err(|_| ApiError(ServiceError::InvalidRequest("malformed request body")))
}

/// A response carrying one encoded wire-schema record.
pub(crate) fn proto_response<T: Message>(record: T) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(record.encode_to_vec())
}

pub(crate) fn token_response(token: AuthToken) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(token.to_vec())
}
