// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Panic supervision
//!
//! A panic inside a callback never takes the loop down by itself: it is caught, logged
//! and then handed to the actor's [`SupervisionStrategy`], which decides whether the loop
//! resumes (optionally after a backoff) or stops with
//! [`StopReason::Panic`](crate::StopReason::Panic). Only consecutive panics count; a
//! callback that completes resets the counter.
//!

use std::{
    any::Any,
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use backoff::backoff::Backoff as InnerBackoff;

/// Retry budget and pause between consecutive panics.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Number of consecutive panics tolerated before the actor stops.
    fn max_retries(&self) -> usize;
    /// Pause before resuming after a panic, if any.
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// What the loop does after a recovered panic.
#[derive(Debug)]
pub enum SupervisionStrategy {
    /// Stop on the first panic.
    Stop,
    /// Resume while the retry budget allows it.
    Resume(Box<dyn RetryStrategy>),
}

impl Default for SupervisionStrategy {
    /// Resume forever, without pause.
    fn default() -> Self {
        SupervisionStrategy::Resume(Box::new(NoIntervalStrategy::new(
            usize::MAX,
        )))
    }
}

/// Decision taken for one panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PanicAction {
    Resume(Option<Duration>),
    Stop,
}

impl SupervisionStrategy {
    /// Decides what to do after the `panics`-th consecutive panic (1-based).
    pub(crate) fn on_panic(&mut self, panics: usize) -> PanicAction {
        match self {
            SupervisionStrategy::Stop => PanicAction::Stop,
            SupervisionStrategy::Resume(strategy) => {
                if panics <= strategy.max_retries() {
                    PanicAction::Resume(strategy.next_backoff())
                } else {
                    PanicAction::Stop
                }
            }
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Resume immediately.
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl RetryStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// Resume after a fixed pause.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    max_retries: usize,
    duration: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_retries: usize, duration: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            duration,
        }
    }
}

impl RetryStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// Resume after an exponentially growing pause.
#[derive(Debug, Default)]
pub struct ExponentialBackoffStrategy {
    max_retries: usize,
    inner: Arc<Mutex<backoff::ExponentialBackoff>>,
}

impl ExponentialBackoffStrategy {
    pub fn new(max_retries: usize) -> Self {
        ExponentialBackoffStrategy {
            max_retries,
            inner: Arc::new(Mutex::new(backoff::ExponentialBackoff::default())),
        }
    }
}

impl RetryStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|mut eb| eb.next_backoff())
    }
}
