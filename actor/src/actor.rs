// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the [`Actor`] and [`Handler`] traits that application code
//! implements, the [`ActorContext`] handed to every callback and the [`ActorRef`] used to
//! talk to a running actor.
//!
//! An actor owns its state (`self`) and is only reachable through four kinds of events,
//! all processed one at a time on the actor's own task:
//!
//! - **casts**: one-way messages ([`ActorRef::cast`], [`ActorRef::after_cast`]),
//! - **calls**: request/response with a deadline ([`ActorRef::call`], [`ActorRef::time_call`]),
//! - **ticks**: periodic events while a ticker runs ([`ActorRef::start_ticker`]),
//! - **idle timeouts**: fired when nothing happened for the configured duration.
//!
//! Every callback returns a [`Reply`], which also tells the loop which idle timeout to arm
//! next and whether to stop.
//!
//! # Example
//!
//! ```ignore
//! use actor::{Actor, ActorContext, ActorSystem, Handler, Message, Reply, Response};
//! use async_trait::async_trait;
//!
//! struct Counter {
//!     value: u64,
//! }
//!
//! enum CounterMsg {
//!     Add(u64),
//!     Get,
//! }
//!
//! impl Message for CounterMsg {}
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     type Init = u64;
//!     type Message = CounterMsg;
//!     type Response = u64;
//!
//!     async fn init(&mut self, start: u64, _ctx: &mut ActorContext<Self>) -> Reply<u64> {
//!         self.value = start;
//!         Reply::ok(start)
//!     }
//! }
//!
//! #[async_trait]
//! impl Handler<Counter> for Counter {
//!     async fn handle(&mut self, msg: CounterMsg, _ctx: &mut ActorContext<Counter>) -> Reply<u64> {
//!         match msg {
//!             CounterMsg::Add(n) => self.value += n,
//!             CounterMsg::Get => {}
//!         }
//!         Reply::ok(self.value)
//!     }
//! }
//!
//! let system = ActorSystem::default();
//! let (counter, _) = system.start_actor("counter", Counter { value: 0 }, 5).await?;
//! counter.cast(CounterMsg::Add(3));
//! assert_eq!(counter.call(CounterMsg::Get).await?, 8);
//! ```
//!

use crate::{
    Error,
    envelope::{Caller, Envelope, InterruptSender, MailboxSender},
    reply::Reply,
    supervision::SupervisionStrategy,
    system::ActorSystem,
};

use async_trait::async_trait;

use tokio::{
    runtime::Handle,
    select,
    sync::mpsc::error::TrySendError,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, warn};

use std::{
    fmt::{self, Display},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Marker for mailbox payloads. Usually an enum listing everything the actor understands.
pub trait Message: Send + 'static {}

/// Marker for call results.
pub trait Response: Send + 'static {}

impl Response for () {}

/// Why an actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A callback returned a reply with the stop flag.
    Returned,
    /// The supervision strategy gave up after a panic.
    Panic,
    /// Stop requested from outside, or system shutdown.
    Shutdown,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Returned => write!(f, "ret"),
            StopReason::Panic => write!(f, "panic"),
            StopReason::Shutdown => write!(f, "done"),
        }
    }
}

/// Lifecycle hooks of an actor. The state of the actor is `self`; the loop never looks
/// inside it.
#[async_trait]
pub trait Actor: Handler<Self> + Send + Sized + 'static {
    /// Message passed to [`Actor::init`].
    type Init: Send + 'static;
    /// Mailbox payload.
    type Message: Message;
    /// Result of calls (and of `init`).
    type Response: Response;

    /// Strategy applied when a callback panics. Resumes forever by default.
    fn supervision_strategy() -> SupervisionStrategy {
        SupervisionStrategy::default()
    }

    /// Runs once, before any other callback. Its result answers the start request; the
    /// request is attached as the caller, so the answer may also be deferred.
    async fn init(
        &mut self,
        init: Self::Init,
        ctx: &mut ActorContext<Self>,
    ) -> Reply<Self::Response>;

    /// Runs on every tick while a ticker is installed.
    async fn tick(&mut self, _ctx: &mut ActorContext<Self>) -> Reply {
        Reply::none()
    }

    /// Runs when no event happened for the armed idle timeout.
    async fn timeout(&mut self, _ctx: &mut ActorContext<Self>) -> Reply {
        Reply::none()
    }

    /// Runs exactly once when the actor stops.
    async fn stop(&mut self, _reason: StopReason, _ctx: &mut ActorContext<Self>) {}
}

/// Mailbox handler of an actor.
#[async_trait]
pub trait Handler<A: Actor>: Send {
    /// Handles a cast or a call. For casts the result is discarded; for calls it is sent
    /// back to the caller unless it is [`Reply::deferred`].
    async fn handle(
        &mut self,
        message: A::Message,
        ctx: &mut ActorContext<A>,
    ) -> Reply<A::Response>;
}

/// Context handed to every callback.
pub struct ActorContext<A: Actor> {
    reference: ActorRef<A>,
    system: ActorSystem,
    caller: Option<Caller<A::Response>>,
}

impl<A: Actor> ActorContext<A> {
    pub(crate) fn new(reference: ActorRef<A>, system: ActorSystem) -> Self {
        Self {
            reference,
            system,
            caller: None,
        }
    }

    /// Name of the actor.
    pub fn name(&self) -> &str {
        self.reference.name()
    }

    /// Reference to the actor itself, to cast to itself or drive its own ticker.
    pub fn reference(&self) -> &ActorRef<A> {
        &self.reference
    }

    /// The system running the actor.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// True while dispatching a call whose caller has not been taken.
    pub fn has_caller(&self) -> bool {
        self.caller.is_some()
    }

    /// Takes the caller of the call being dispatched, to answer it later. Only available
    /// while handling a call (or `init`). Return [`Reply::deferred`] afterwards.
    pub fn take_caller(&mut self) -> Option<Caller<A::Response>> {
        self.caller.take()
    }

    pub(crate) fn set_caller(&mut self, caller: Caller<A::Response>) {
        self.caller = Some(caller);
    }
}

/// Reference to a running actor.
pub struct ActorRef<A: Actor> {
    name: Arc<str>,
    mailbox: MailboxSender<A>,
    interrupts: InterruptSender,
    stopped: Arc<AtomicBool>,
    token: CancellationToken,
    call_timeout: Duration,
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn new(
        name: Arc<str>,
        mailbox: MailboxSender<A>,
        interrupts: InterruptSender,
        stopped: Arc<AtomicBool>,
        token: CancellationToken,
        call_timeout: Duration,
    ) -> Self {
        Self {
            name,
            mailbox,
            interrupts,
            stopped,
            token,
            call_timeout,
        }
    }

    /// Name of the actor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the actor has stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sends a fire-and-forget message to the actor.
    ///
    /// Casts are handled in the order they were sent, after any envelope already queued.
    /// The handler result is discarded; use [`ActorRef::call`] to get an answer.
    ///
    /// # Blocking
    ///
    /// `cast` never blocks and is safe to use from synchronous code. When the mailbox is
    /// full the envelope is handed to a new task on the current tokio runtime, which
    /// waits for room. Outside a runtime there is nothing to wait on, so the cast is
    /// logged and dropped.
    ///
    /// # Stopped actors
    ///
    /// Casting to a stopped actor does not fail: the message is logged and dropped.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// counter.cast(CounterMsg::Add(3));
    /// counter.cast(CounterMsg::Add(4));
    /// assert_eq!(counter.call(CounterMsg::Get).await?, 7);
    /// ```
    ///
    pub fn cast(&self, message: A::Message) {
        debug!("Casting message to actor {}.", self.name);
        match self.mailbox.try_send(Envelope::Cast { message }) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                let Ok(runtime) = Handle::try_current() else {
                    error!(
                        "Mailbox of actor {} is full and no runtime is available, dropping the cast.",
                        self.name
                    );
                    return;
                };
                debug!(
                    "Mailbox of actor {} is full, casting from a new task.",
                    self.name
                );
                let mailbox = self.mailbox.clone();
                let name = self.name.clone();
                runtime.spawn(async move {
                    if mailbox.send(envelope).await.is_err() {
                        warn!(
                            "Failed to cast message to actor {}: mailbox closed.",
                            name
                        );
                    }
                });
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    "Failed to cast message to actor {}: mailbox closed.",
                    self.name
                );
            }
        }
    }

    /// Call with the configured deadline.
    pub async fn call(
        &self,
        message: A::Message,
    ) -> Result<A::Response, Error> {
        self.time_call(message, self.call_timeout).await
    }

    /// Sends a request and waits for its answer, within `timeout`.
    ///
    /// The deadline starts when `time_call` is invoked and covers two phases:
    ///
    /// 1. **Enqueue**: waiting for room in the mailbox. If the deadline passes first the
    ///    result is [`Error::EnqueueTimeout`] and the request is never seen by the actor.
    /// 2. **Handle**: waiting for the reply. If the deadline passes first the result is
    ///    [`Error::HandleTimeout`]; the handler may still run to completion and its
    ///    answer is dropped.
    ///
    /// # Errors
    ///
    /// Besides the two timeouts:
    ///
    /// * [`Error::Stopped`] - The actor is stopped, or stopped with the call still queued.
    /// * [`Error::Panicked`] - The handler panicked while handling the call.
    /// * [`Error::NoReply`] - The handler deferred the answer and dropped the caller.
    /// * Any error returned by the handler, unchanged.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// match counter.time_call(CounterMsg::Get, Duration::from_millis(500)).await {
    ///     Ok(total) => println!("total {}", total),
    ///     Err(error) if error.is_timeout() => println!("counter is busy"),
    ///     Err(error) => return Err(error),
    /// }
    /// ```
    ///
    pub async fn time_call(
        &self,
        message: A::Message,
        timeout: Duration,
    ) -> Result<A::Response, Error> {
        debug!("Calling actor {}.", self.name);
        let (caller, receiver) = Caller::channel(&self.name);
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        select! {
            _ = &mut deadline => {
                warn!("Call to actor {} timed out before it was enqueued.", self.name);
                return Err(Error::EnqueueTimeout(self.name.to_string()));
            }
            sent = self.mailbox.send(Envelope::Call { caller, message }) => {
                if sent.is_err() {
                    warn!("Failed to call actor {}: mailbox closed.", self.name);
                    return Err(Error::Stopped(self.name.to_string()));
                }
            }
        }

        select! {
            _ = &mut deadline => {
                warn!("Call to actor {} timed out waiting for the reply.", self.name);
                Err(Error::HandleTimeout(self.name.to_string()))
            }
            reply = receiver => {
                reply.unwrap_or_else(|_| {
                    debug!("Actor {} dropped the call.", self.name);
                    Err(Error::NoReply(self.name.to_string()))
                })
            }
        }
    }

    /// Casts `message` once `delay` has elapsed. The returned handle cancels the delivery.
    pub fn after_cast(
        &self,
        delay: Duration,
        message: A::Message,
    ) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        let actor = self.clone();
        tokio::spawn(async move {
            select! {
                _ = timer.token.cancelled() => {
                    debug!("Delayed cast to actor {} cancelled.", actor.name);
                }
                _ = sleep(delay) => {
                    if timer.settle() {
                        actor.cast(message);
                    }
                }
            }
        });
        handle
    }

    /// Installs (or replaces) a ticker with the given period. A zero period removes it.
    /// Applied asynchronously by the loop.
    pub fn start_ticker(&self, period: Duration) {
        if self.is_stopped() {
            debug!("Actor {} is stopped, ignoring ticker {:?}.", self.name, period);
            return;
        }
        if self.interrupts.send(period).is_err() {
            warn!(
                "Failed to send ticker {:?} to actor {}: channel closed.",
                period, self.name
            );
        }
    }

    /// Removes the ticker.
    pub fn stop_ticker(&self) {
        self.start_ticker(Duration::ZERO);
    }

    /// Asks the actor to stop. The stop hook runs with [`StopReason::Shutdown`]. Repeated
    /// requests are logged and ignored.
    pub fn stop(&self) {
        if self.is_stopped() || self.token.is_cancelled() {
            warn!("Actor {} is already stopping.", self.name);
            return;
        }
        debug!("Stopping actor {} from handle reference.", self.name);
        self.token.cancel();
    }

    /// Resolves once the actor has stopped and released its mailbox.
    pub async fn closed(&self) {
        self.mailbox.closed().await;
    }
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            mailbox: self.mailbox.clone(),
            interrupts: self.interrupts.clone(),
            stopped: self.stopped.clone(),
            token: self.token.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<A: Actor> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Cancelable handle of a delayed cast.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
    settled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the timer as fired or cancelled. Only the first caller wins.
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    /// Cancels the delivery. Returns true if the cast had not been queued yet.
    pub fn cancel(&self) -> bool {
        if self.settle() {
            self.token.cancel();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Returned.to_string(), "ret");
        assert_eq!(StopReason::Panic.to_string(), "panic");
        assert_eq!(StopReason::Shutdown.to_string(), "done");
    }

    #[test]
    fn test_timer_handle_settles_once() {
        let handle = TimerHandle::new();
        let clone = handle.clone();
        assert!(clone.settle());
        assert!(!handle.cancel());
        assert!(!handle.token.is_cancelled());

        let handle = TimerHandle::new();
        assert!(handle.cancel());
        assert!(handle.token.is_cancelled());
        assert!(!handle.cancel());
    }
}
