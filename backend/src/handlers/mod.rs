// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request handlers, one per operation of the protocol. Each handler
//! authenticates, validates, commits registry and storage under the state
//! lock, snapshots, and finally wakes the affected devices through the
//! push adapter.

mod admin;
mod device;
mod download;
mod prekey;
mod topic;
mod topic_key;
mod user;
