// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core of the Rendezvous server.
//!
//! [`Rendezvous`] owns the in-memory [`registry::Registry`] and the
//! [`storage::Storage`] blob tree behind one exclusive lock, per the
//! concurrency contract: all registry and storage mutations are serialized,
//! push notifications go out after the lock is released, and a snapshot of
//! the registry is scheduled inside every mutating request.

pub mod handlers;
pub mod push;
pub mod registry;
pub mod storage;
pub mod validator;

use std::sync::{Mutex, MutexGuard};

use prost::Message;
use rdvcommon::{identifiers::AuthToken, ServiceError};
use rdvprotos::ManagementData;
use tracing::{info, warn};

use push::{PushNotificationProvider, PushTarget};
use registry::Registry;
use storage::Storage;

pub struct Rendezvous<P> {
    state: Mutex<ServerState>,
    push: P,
    development: bool,
}

pub struct ServerState {
    pub registry: Registry,
    pub storage: Storage,
}

impl ServerState {
    /// Persists the registry if it is dirty. Failure is logged and
    /// swallowed: the per-entity blobs remain authoritative for everything
    /// except the admin token and the allowed-user table.
    fn snapshot(&mut self) {
        if !self.registry.take_dirty() {
            return;
        }
        let bytes = self.registry.management_data().encode_to_vec();
        if let Err(e) = self.storage.write_snapshot(&bytes) {
            warn!("failed to write registry snapshot: {e}");
        }
    }

    /// Persists the registry, propagating failure. Used where the snapshot
    /// itself is the durable record, e.g. for admin tokens and pins.
    fn snapshot_strict(&mut self) -> Result<(), ServiceError> {
        if !self.registry.take_dirty() {
            return Ok(());
        }
        let bytes = self.registry.management_data().encode_to_vec();
        self.storage.write_snapshot(&bytes)
    }
}

impl<P: PushNotificationProvider> Rendezvous<P> {
    /// Builds the service on top of an initialized storage tree, restoring
    /// the registry from the persisted snapshot when one exists.
    pub fn new(storage: Storage, push: P, development: bool) -> Result<Self, ServiceError> {
        let registry = match storage.read_snapshot()? {
            Some(bytes) => Registry::restore(ManagementData::decode(bytes.as_slice())?)?,
            None => {
                let registry = Registry::new(AuthToken::random());
                info!("no registry snapshot found, starting fresh");
                registry
            }
        };
        let service = Self {
            state: Mutex::new(ServerState { registry, storage }),
            push,
            development,
        };
        // Persist the freshly minted state so the admin token survives an
        // immediate restart.
        service.lock()?.snapshot();
        Ok(service)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServerState>, ServiceError> {
        self.state
            .lock()
            .map_err(|_| ServiceError::Internal("server state lock poisoned".into()))
    }

    /// Delivers push notifications for a committed mutation. Failures are
    /// logged only; the commit stands.
    async fn notify_all(&self, targets: Vec<PushTarget>) {
        for target in targets {
            if let Err(e) = self.push.notify(&target).await {
                warn!(server = %target.server, "push notification failed: {e}");
            }
        }
    }

    /// The current admin token. Exposed so the binary can print it when a
    /// fresh one was generated, and for tests.
    pub fn admin_token(&self) -> Result<AuthToken, ServiceError> {
        Ok(*self.lock()?.registry.admin_token())
    }
}
