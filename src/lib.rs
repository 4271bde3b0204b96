// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Generic server actors for the Rush framework.
//! Provides single-threaded actors driven by casts, calls, tickers and idle timeouts,
//! plus named waiters for graceful shutdown of spawned work.

pub use actor::{
    ACTOR_WAITER, Actor, ActorComponent, ActorContext, ActorRef, ActorSystem,
    Caller, Component, Config, Error as ActorError, ExponentialBackoffStrategy,
    FixedIntervalStrategy, Handler, Message, NoIntervalStrategy, Outcome,
    PanicTimers, Reply, Response, RetryStrategy, StopReason,
    SupervisionStrategy, TimerHandle, Waiter, Waiters,
};
