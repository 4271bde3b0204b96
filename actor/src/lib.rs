// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Generic server actors
//!
//! A small runtime for long-lived, single-threaded actors in the style of a generic
//! server. Each actor owns its state, runs on its own tokio task and reacts to four kinds
//! of events, one at a time:
//!
//! - **Casts**: one-way messages, delivered in FIFO order.
//! - **Calls**: request/response with a deadline covering both the enqueue and the reply.
//! - **Ticks**: periodic events while a ticker is installed.
//! - **Idle timeouts**: fired when nothing happened for a configured duration.
//!
//! Every callback returns a [`Reply`]: the result handed back to a caller (or a
//! deferred marker, when the answer is sent later through a [`Caller`]), an optional
//! override of the next idle timeout and a stop flag.
//!
//! Panics inside callbacks are contained: they are logged with a backtrace, the pending
//! caller receives [`Error::Panicked`], and the [`SupervisionStrategy`] of the actor
//! decides whether the loop resumes.
//!
//! ## Waiters
//!
//! [`Waiters`] is a registry of named counters used to wait, bounded or not, for groups of
//! background tasks to finish. The [`ActorSystem`] counts its actor loops with the
//! [`ACTOR_WAITER`] waiter, which makes [`ActorSystem::shutdown`] a graceful stop.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{Actor, ActorContext, ActorSystem, Handler, Message, Reply, Response};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct Heartbeat {
//!     beats: u64,
//! }
//!
//! #[derive(Debug, Clone)]
//! enum HeartbeatMsg {
//!     Beats,
//! }
//!
//! impl Message for HeartbeatMsg {}
//!
//! #[async_trait]
//! impl Actor for Heartbeat {
//!     type Init = Duration;
//!     type Message = HeartbeatMsg;
//!     type Response = u64;
//!
//!     async fn init(&mut self, period: Duration, ctx: &mut ActorContext<Self>) -> Reply<u64> {
//!         ctx.reference().start_ticker(period);
//!         Reply::ok(0)
//!     }
//!
//!     async fn tick(&mut self, _ctx: &mut ActorContext<Self>) -> Reply {
//!         self.beats += 1;
//!         Reply::none()
//!     }
//! }
//!
//! #[async_trait]
//! impl Handler<Heartbeat> for Heartbeat {
//!     async fn handle(
//!         &mut self,
//!         _msg: HeartbeatMsg,
//!         _ctx: &mut ActorContext<Heartbeat>,
//!     ) -> Reply<u64> {
//!         Reply::ok(self.beats)
//!     }
//! }
//!
//! let system = ActorSystem::default();
//! let (heartbeat, _) = system
//!     .start_actor("heartbeat", Heartbeat { beats: 0 }, Duration::from_millis(100))
//!     .await?;
//! tokio::time::sleep(Duration::from_millis(350)).await;
//! assert_eq!(heartbeat.call(HeartbeatMsg::Beats).await?, 3);
//! system.shutdown().await;
//! ```
//!

mod actor;
mod component;
mod config;
mod envelope;
mod error;
mod reply;
mod runner;
mod supervision;
mod system;
mod waiter;

/// Lifecycle hooks of an actor: `init`, `tick`, `timeout` and `stop`.
///
/// See [`Handler`] for the mailbox side.
pub use actor::Actor;

/// Context handed to every callback: the actor's own reference, the system and, while a
/// call is being handled, its [`Caller`].
pub use actor::ActorContext;

/// Reference to a running actor. Cast, call, delayed cast, ticker control and stop.
pub use actor::ActorRef;

/// Mailbox handler of an actor.
pub use actor::Handler;

/// Marker for mailbox payloads.
pub use actor::Message;

/// Marker for call results.
pub use actor::Response;

/// Why an actor stopped.
pub use actor::StopReason;

/// Cancelable handle of a delayed cast.
pub use actor::TimerHandle;

/// Uniform start/stop lifecycle for process orchestration.
pub use component::{ActorComponent, Component};

/// Actor configuration and its defaults.
pub use config::{
    Config, DEFAULT_CALL_TIMEOUT, DEFAULT_INIT_TIMEOUT, DEFAULT_MAILBOX_CAPACITY,
    PanicTimers,
};

/// Single-use handle used to answer a call, possibly later.
pub use envelope::Caller;

/// Error type and numeric codes.
pub use error::*;

/// Result of a callback.
pub use reply::{Outcome, Reply};

/// Panic supervision.
pub use supervision::{
    ExponentialBackoffStrategy, FixedIntervalStrategy, NoIntervalStrategy,
    RetryStrategy, SupervisionStrategy,
};

/// Actor registry and lifecycle owner.
pub use system::{ACTOR_WAITER, ActorSystem};

/// Named counters for waiting on groups of tasks.
pub use waiter::{DEFAULT_WAIT_TIMEOUT, Waiter, Waiters};
