// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - authentication and session logic.

pub mod identity;
pub mod inactivity;
pub mod password;
pub mod session;
pub mod session_cache;

pub use identity::{AuthProvider, IdentityToolkitClient, ProviderAccount, ProviderError};
pub use inactivity::{spawn_inactivity_watchdog, ActivityKind, InactivityTimer, TimerState};
pub use session::{SessionManager, SessionOptions};
pub use session_cache::{FileKvStore, KvStore, MemoryKvStore, SessionCache};
