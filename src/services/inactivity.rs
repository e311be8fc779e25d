// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inactivity auto-logout.
//!
//! A countdown that is reset to a fixed ceiling by qualifying input events
//! and decremented by a 1-second watchdog. Reaching zero is terminal: the
//! session is signed out and only a fresh login arms a new timer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::db::UserRecordStore;
use crate::services::identity::AuthProvider;
use crate::services::session::SessionManager;
use crate::services::session_cache::KvStore;

/// Watchdog granularity.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Input events that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    MouseMove,
    MouseDown,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Active { remaining: Duration },
    Expired,
}

#[derive(Debug, Clone)]
pub struct InactivityTimer {
    ceiling: Duration,
    state: TimerState,
}

impl InactivityTimer {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            ceiling,
            state: TimerState::Active { remaining: ceiling },
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Reset the countdown. Has no effect once expired.
    pub fn record(&mut self, _kind: ActivityKind) -> bool {
        match self.state {
            TimerState::Active { .. } => {
                self.state = TimerState::Active {
                    remaining: self.ceiling,
                };
                true
            }
            TimerState::Expired => false,
        }
    }

    /// Advance the countdown by `elapsed`. Returns `true` only on the tick
    /// that causes expiry.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        let TimerState::Active { remaining } = self.state else {
            return false;
        };

        let remaining = remaining.saturating_sub(elapsed);
        if remaining.is_zero() {
            self.state = TimerState::Expired;
            true
        } else {
            self.state = TimerState::Active { remaining };
            false
        }
    }

    /// Start over from the ceiling (fresh login).
    pub fn rearm(&mut self) {
        self.state = TimerState::Active {
            remaining: self.ceiling,
        };
    }
}

/// Spawn the 1-second watchdog that forces sign-out when the session has
/// been idle for the configured ceiling. The task runs until aborted.
pub fn spawn_inactivity_watchdog<A, S, K>(manager: Arc<SessionManager<A, S, K>>) -> JoinHandle<()>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            interval.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last);
            last = now;

            if manager.expire_if_idle(elapsed).await {
                tracing::info!("Session expired after inactivity");
            }
        }
    })
}
