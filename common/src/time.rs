// SPDX-FileCopyrightText: 2025 Rendezvous Contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Epoch-second timestamps and the application-level staleness gates.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Mutations whose payload carries a timestamp are rejected when the
/// timestamp is further than this from the server clock.
pub const FRESHNESS_WINDOW_SECONDS: u64 = 60;

/// Lifetime of a registration pin issued by the admin surface.
pub const PIN_EXPIRY_SECONDS: u64 = 60 * 60 * 32 * 7;

/// Seconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    pub fn seconds(&self) -> u64 {
        self.0
    }

    /// Whether `self` lies within the freshness window around `now`.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        now.0.abs_diff(self.0) <= FRESHNESS_WINDOW_SECONDS
    }

    pub fn adding(&self, seconds: u64) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn is_before(&self, other: Timestamp) -> bool {
        self.0 < other.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_window_edges() {
        let now = Timestamp::from_seconds(10_000);
        assert!(Timestamp::from_seconds(10_000).is_fresh(now));
        assert!(Timestamp::from_seconds(10_000 - FRESHNESS_WINDOW_SECONDS).is_fresh(now));
        assert!(Timestamp::from_seconds(10_000 + FRESHNESS_WINDOW_SECONDS).is_fresh(now));
        assert!(!Timestamp::from_seconds(10_000 - FRESHNESS_WINDOW_SECONDS - 1).is_fresh(now));
        assert!(!Timestamp::from_seconds(10_000 + FRESHNESS_WINDOW_SECONDS + 1).is_fresh(now));
    }
}
