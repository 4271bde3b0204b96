// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Named wait groups
//!
//! A [`Waiter`] is a named up/down counter used to track spawned work and to wait for it to
//! drain during shutdown. [`Waiters`] is the registry that maps names to waiters, so that
//! independently initialized subsystems can register a synchronization point and shutdown
//! code can wait on it by name, without handing references around.
//!
//! The registry is an ordinary value: clone it to share it, or create a fresh one per test.
//!
//! ```ignore
//! let waiters = Waiters::new();
//! waiters.new_waiter("flush")?;
//! waiters.add_and_spawn("flush", "disk", async move { flush().await })?;
//! // ...
//! waiters.wait("flush", "shutdown").await;
//! ```
//!

use crate::{Error, supervision::panic_message};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::FutureExt;
use tokio::{sync::watch, task::JoinHandle};

use tracing::{debug, error, info, warn};

use std::{
    backtrace::Backtrace,
    fmt::{self, Debug, Display},
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

/// Default bound of [`Waiter::wait`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(7);

/// Named counter of outstanding work.
#[derive(Clone)]
pub struct Waiter {
    name: Arc<str>,
    counter: Arc<watch::Sender<usize>>,
    timeout: Duration,
}

impl Waiter {
    fn new(name: &str, timeout: Duration) -> Self {
        let (counter, _) = watch::channel(0);
        Self {
            name: Arc::from(name),
            counter: Arc::new(counter),
            timeout,
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outstanding work.
    pub fn count(&self) -> usize {
        *self.counter.borrow()
    }

    /// Adds `n` units of outstanding work.
    pub fn add(&self, n: usize, reason: impl Display) {
        debug!("[{}] add count {} for {}", self.name, n, reason);
        self.counter.send_modify(|count| *count += n);
    }

    /// Marks one unit of work as done.
    pub fn done_one(&self, reason: impl Display) {
        self.done(1, reason);
    }

    /// Marks `n` units of work as done. The counter never goes below zero.
    pub fn done(&self, n: usize, reason: impl Display) {
        debug!("[{}] done {} for {}", self.name, n, reason);
        self.counter.send_modify(|count| match count.checked_sub(n) {
            Some(left) => *count = left,
            None => {
                error!(
                    "[{}] done {} for {} with only {} outstanding",
                    self.name, n, reason, count
                );
                *count = 0;
            }
        });
    }

    /// Adds one unit of work and runs `work` on a new task. The unit is marked done when
    /// the task ends, whether `work` completes or panics. Panics are logged, never
    /// propagated.
    pub fn add_and_spawn<F, R>(&self, reason: R, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
        R: Display + Send + 'static,
    {
        self.add(1, &reason);
        self.run(reason, work)
    }

    /// Runs `work` on a new task and marks one unit done when it ends. Pair it with a
    /// previous [`Waiter::add`].
    pub fn run<F, R>(&self, reason: R, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
        R: Display + Send + 'static,
    {
        let waiter = self.clone();
        tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(work).catch_unwind().await {
                error!(
                    "[{}]:[{}] panic: {}, stack: {}",
                    waiter.name,
                    reason,
                    panic_message(payload.as_ref()),
                    Backtrace::capture()
                );
            }
            waiter.done_one(&reason);
        })
    }

    /// Waits until the counter reaches zero or the bounded timeout elapses. Returns true
    /// if the counter drained.
    pub async fn wait(&self, reason: impl Display) -> bool {
        info!("[{}] wait for {}", self.name, reason);
        let mut receiver = self.counter.subscribe();
        let drained = matches!(
            tokio::time::timeout(
                self.timeout,
                receiver.wait_for(|count| *count == 0)
            )
            .await,
            Ok(Ok(_))
        );
        if drained {
            info!("[{}] wait returned {}", self.name, reason);
        } else {
            warn!(
                "[{}] wait for {} timed out with {} outstanding",
                self.name,
                reason,
                self.count()
            );
        }
        drained
    }

    /// Waits until the counter reaches zero, without bound.
    pub async fn wait_infinity(&self, reason: impl Display) {
        info!("[{}] wait infinity for {}", self.name, reason);
        let mut receiver = self.counter.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await;
        info!("[{}] wait infinity returned {}", self.name, reason);
    }
}

impl Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("name", &self.name)
            .field("count", &self.count())
            .finish()
    }
}

/// Registry of named waiters.
#[derive(Clone, Debug)]
pub struct Waiters {
    waiters: Arc<DashMap<String, Waiter>>,
    timeout: Duration,
}

impl Default for Waiters {
    fn default() -> Self {
        Self::new()
    }
}

impl Waiters {
    /// Empty registry with the default wait bound.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_WAIT_TIMEOUT)
    }

    /// Empty registry whose waiters give up waiting after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            waiters: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Registers a new waiter. Registering a name twice is a configuration error: the
    /// previous waiter must be deleted first.
    pub fn new_waiter(&self, name: &str) -> Result<Waiter, Error> {
        match self.waiters.entry(name.to_owned()) {
            Entry::Occupied(_) => {
                error!("create {} already in use", name);
                Err(Error::WaiterExists(name.to_owned()))
            }
            Entry::Vacant(entry) => {
                info!("create {}", name);
                let waiter = Waiter::new(name, self.timeout);
                entry.insert(waiter.clone());
                Ok(waiter)
            }
        }
    }

    /// Returns the waiter registered under `name`, creating it if needed.
    pub fn may_waiter(&self, name: &str) -> Waiter {
        self.waiters
            .entry(name.to_owned())
            .or_insert_with(|| {
                info!("create {}", name);
                Waiter::new(name, self.timeout)
            })
            .value()
            .clone()
    }

    /// Removes the registration, if any. Clones of the waiter keep working.
    pub fn del_waiter(&self, name: &str) {
        if self.waiters.remove(name).is_some() {
            info!("delete {}", name);
        }
    }

    /// Looks a waiter up.
    pub fn fetch(&self, name: &str) -> Option<Waiter> {
        self.waiters.get(name).map(|waiter| waiter.value().clone())
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.waiters.contains_key(name)
    }

    /// See [`Waiter::add_and_spawn`].
    pub fn add_and_spawn<F, R>(
        &self,
        name: &str,
        reason: R,
        work: F,
    ) -> Result<JoinHandle<()>, Error>
    where
        F: Future<Output = ()> + Send + 'static,
        R: Display + Send + 'static,
    {
        Ok(self.expect(name, &reason)?.add_and_spawn(reason, work))
    }

    /// See [`Waiter::add`].
    pub fn add(
        &self,
        name: &str,
        n: usize,
        reason: impl Display,
    ) -> Result<(), Error> {
        self.expect(name, &reason)?.add(n, reason);
        Ok(())
    }

    /// See [`Waiter::done`].
    pub fn done(
        &self,
        name: &str,
        n: usize,
        reason: impl Display,
    ) -> Result<(), Error> {
        self.expect(name, &reason)?.done(n, reason);
        Ok(())
    }

    /// Bounded wait on the named waiter. An unknown name has nothing to wait for.
    pub async fn wait(&self, name: &str, reason: impl Display) -> bool {
        match self.fetch(name) {
            Some(waiter) => waiter.wait(reason).await,
            None => true,
        }
    }

    /// Unbounded wait on the named waiter.
    pub async fn wait_infinity(&self, name: &str, reason: impl Display) {
        if let Some(waiter) = self.fetch(name) {
            waiter.wait_infinity(reason).await;
        }
    }

    fn expect(&self, name: &str, reason: &impl Display) -> Result<Waiter, Error> {
        self.fetch(name).ok_or_else(|| {
            error!("{} not found for {}", name, reason);
            Error::WaiterNotFound(name.to_owned())
        })
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use tracing_test::traced_test;

    #[test]
    fn test_duplicate_waiter_is_rejected() {
        let waiters = Waiters::new();
        waiters.new_waiter("x").unwrap();
        assert_eq!(
            waiters.new_waiter("x").unwrap_err(),
            Error::WaiterExists("x".to_owned())
        );
        waiters.del_waiter("x");
        assert!(waiters.new_waiter("x").is_ok());
    }

    #[test]
    fn test_may_waiter_shares_the_counter() {
        let waiters = Waiters::new();
        let first = waiters.may_waiter("shared");
        let second = waiters.may_waiter("shared");
        first.add(2, "test");
        assert_eq!(second.count(), 2);
        second.done_one("test");
        assert_eq!(first.count(), 1);
    }

    #[test]
    #[traced_test]
    fn test_done_never_goes_negative() {
        let waiters = Waiters::new();
        let waiter = waiters.may_waiter("w");
        waiter.add(1, "test");
        waiter.done(3, "test");
        assert_eq!(waiter.count(), 0);
        assert!(logs_contain("with only 1 outstanding"));
    }

    #[test]
    fn test_unknown_waiter() {
        let waiters = Waiters::new();
        assert_eq!(
            waiters.add("missing", 1, "test").unwrap_err(),
            Error::WaiterNotFound("missing".to_owned())
        );
        assert!(
            waiters
                .add_and_spawn("missing", "test", async {})
                .is_err()
        );
        // Deleting an unknown name is a no-op.
        waiters.del_waiter("missing");
        assert!(!waiters.contains("missing"));
    }

    #[tokio::test]
    async fn test_add_and_spawn_restores_the_counter() {
        let waiters = Waiters::new();
        let waiter = waiters.new_waiter("work").unwrap();
        waiter.add(1, "baseline");

        let handle = waiters
            .add_and_spawn("work", "ok", async {
                tokio::task::yield_now().await;
            })
            .unwrap();
        handle.await.unwrap();
        assert_eq!(waiter.count(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_add_and_spawn_contains_panics() {
        let waiters = Waiters::new();
        let waiter = waiters.new_waiter("work").unwrap();

        let handle = waiter.add_and_spawn("boom", async {
            panic!("worker exploded");
        });
        assert!(handle.await.is_ok());
        assert_eq!(waiter.count(), 0);
        assert!(logs_contain("worker exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_gives_up() {
        let waiters = Waiters::with_timeout(Duration::from_secs(2));
        let waiter = waiters.new_waiter("stuck").unwrap();
        waiter.add_and_spawn("forever", std::future::pending::<()>());

        let start = tokio::time::Instant::now();
        assert!(!waiters.wait("stuck", "shutdown").await);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(waiter.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_when_drained() {
        let waiters = Waiters::new();
        let waiter = waiters.new_waiter("drain").unwrap();
        waiter.add_and_spawn("sleep", async {
            tokio::time::sleep(Duration::from_millis(300)).await;
        });

        let start = tokio::time::Instant::now();
        assert!(waiter.wait("shutdown").await);
        assert!(start.elapsed() < DEFAULT_WAIT_TIMEOUT);
        assert_eq!(waiter.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_infinity_waits_for_zero() {
        let waiters = Waiters::with_timeout(Duration::from_millis(10));
        let waiter = waiters.new_waiter("long").unwrap();
        waiter.add(1, "manual");

        let releaser = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            releaser.done_one("manual");
        });

        let start = tokio::time::Instant::now();
        waiters.wait_infinity("long", "shutdown").await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(waiter.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_on_unknown_name_returns_at_once() {
        let waiters = Waiters::new();
        assert!(waiters.wait("nobody", "shutdown").await);
        waiters.wait_infinity("nobody", "shutdown").await;
    }
}
