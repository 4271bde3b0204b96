// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor configuration
//!
//! Per-actor settings. A [`Config`] is attached to the [`ActorSystem`](crate::ActorSystem)
//! and used for every actor it starts, unless a specific one is passed to
//! [`start_actor_with`](crate::ActorSystem::start_actor_with).
//!

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Default mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;
/// Default deadline of [`ActorRef::call`](crate::ActorRef::call).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(7);
/// Default startup budget of the init callback.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens to the ticker and the idle timer after a handler panic is recovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicTimers {
    /// Drop the ticker and the idle timer. The next completed callback arms the idle
    /// timer again.
    #[default]
    Clear,
    /// Keep the ticker and rearm the idle timer with the default duration.
    Keep,
}

/// Actor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bounded mailbox size. Values below 1 are raised to 1.
    pub mailbox_capacity: usize,
    /// Default idle timeout. `None` or a zero duration disables the idle timer unless a
    /// reply asks for one.
    pub idle_timeout: Option<Duration>,
    /// Deadline used by `call`.
    pub call_timeout: Duration,
    /// Startup budget for `init`.
    pub init_timeout: Duration,
    /// Timer policy after a recovered panic.
    pub panic_timers: PanicTimers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            panic_timers: PanicTimers::Clear,
        }
    }
}

impl Config {
    /// Sets the mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Sets the default idle timeout. A zero duration disables it.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the deadline used by `call`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the startup budget of `init`.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Sets the timer policy after a recovered panic.
    pub fn with_panic_timers(mut self, policy: PanicTimers) -> Self {
        self.panic_timers = policy;
        self
    }

    pub(crate) fn capacity(&self) -> usize {
        self.mailbox_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mailbox_capacity, 1000);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.call_timeout, Duration::from_secs(7));
        assert_eq!(config.init_timeout, Duration::from_secs(10));
        assert_eq!(config.panic_timers, PanicTimers::Clear);
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_mailbox_capacity(0)
            .with_idle_timeout(Duration::ZERO)
            .with_panic_timers(PanicTimers::Keep);
        assert_eq!(config.capacity(), 1);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.panic_timers, PanicTimers::Keep);

        let config = config.with_idle_timeout(Duration::from_millis(50));
        assert_eq!(config.idle_timeout, Some(Duration::from_millis(50)));
    }
}
