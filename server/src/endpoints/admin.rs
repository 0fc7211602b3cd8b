// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Admin endpoints, all gated on the `auth` header carrying the admin
//! token.

use actix_web::{web::Data, HttpRequest, HttpResponse};
use rdvbackend::{push::PushNotificationProvider, Rendezvous};

use super::{auth_token, proto_response, required_header, token_response, ApiError};

#[tracing::instrument(name = "Renew admin token", skip_all)]
pub(crate) async fn renew<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = auth_token(&request)?;
    let new_token = service.renew_admin_token(&token).await?;
    Ok(token_response(new_token))
}

#[tracing::instrument(name = "Reset server", skip_all)]
pub(crate) async fn reset<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = auth_token(&request)?;
    service.reset_all(&token).await?;
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(name = "List accounts", skip_all)]
pub(crate) async fn accounts<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = auth_token(&request)?;
    let listing = service.list_accounts(&token).await?;
    Ok(HttpResponse::Ok().content_type("text/plain").body(listing))
}

#[tracing::instrument(name = "Allow user", skip_all)]
pub(crate) async fn allow<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = auth_token(&request)?;
    let name = required_header(&request, "username")?;
    let allowed = service.allow_user(&token, name).await?;
    Ok(proto_response(allowed))
}

#[tracing::instrument(name = "Delete user as admin", skip_all)]
pub(crate) async fn delete_user<P: PushNotificationProvider>(
    service: Data<Rendezvous<P>>,
    request: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = auth_token(&request)?;
    let user = super::user_key(&request)?;
    service.delete_user_as_admin(&token, &user).await?;
    Ok(HttpResponse::Ok().finish())
}
