// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor loop
//!
//! The [`ActorRunner`] owns an actor and drives it on a dedicated task. Each iteration
//! waits on every event source at once and handles exactly one event:
//!
//! - **Stop requests**: the actor's cancellation token (child of the system token).
//! - **Interrupts**: ticker changes sent through [`ActorRef::start_ticker`].
//! - **Ticks**: the installed ticker, if any.
//! - **Mail**: calls and casts, in FIFO order.
//! - **Idle timeout**: the armed deadline, if any.
//!
//! When several sources are ready at once one of them is picked at random, so a busy
//! ticker cannot starve the mailbox. A pending stop request is checked before every wait.
//!
//! Timers are kept in a [`TimerState`] mutated only by the loop. After every handled event
//! the idle deadline is re-armed with the override of the returned [`Reply`] or the actor
//! default.
//!
//! Callbacks run under a panic guard: a panic is logged, answered to the pending caller
//! with [`Error::Panicked`] and handed to the supervision strategy of the actor.
//!

use crate::{
    Error,
    actor::{Actor, ActorContext, ActorRef, StopReason},
    config::{Config, PanicTimers},
    envelope::{Caller, Envelope, InterruptReceiver, MailboxReceiver, mailbox},
    reply::{Directive, Outcome, Reply},
    supervision::{PanicAction, SupervisionStrategy, panic_message},
    system::ActorSystem,
};

use futures::FutureExt;

use tokio::{
    select,
    sync::mpsc,
    time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use std::{
    any::Any,
    backtrace::Backtrace,
    future::pending,
    mem,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Timers of an actor.
#[derive(Debug, Default)]
pub(crate) enum TimerState {
    /// No ticker, no idle deadline.
    #[default]
    Idle,
    /// Idle deadline armed.
    Timeout { deadline: Instant },
    /// Ticker installed.
    Tick { ticker: Interval },
    /// Both.
    TickAndTimeout { ticker: Interval, deadline: Instant },
}

impl TimerState {
    fn from_parts(ticker: Option<Interval>, deadline: Option<Instant>) -> Self {
        match (ticker, deadline) {
            (None, None) => TimerState::Idle,
            (None, Some(deadline)) => TimerState::Timeout { deadline },
            (Some(ticker), None) => TimerState::Tick { ticker },
            (Some(ticker), Some(deadline)) => {
                TimerState::TickAndTimeout { ticker, deadline }
            }
        }
    }

    fn into_parts(self) -> (Option<Interval>, Option<Instant>) {
        match self {
            TimerState::Idle => (None, None),
            TimerState::Timeout { deadline } => (None, Some(deadline)),
            TimerState::Tick { ticker } => (Some(ticker), None),
            TimerState::TickAndTimeout { ticker, deadline } => {
                (Some(ticker), Some(deadline))
            }
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            TimerState::Timeout { deadline }
            | TimerState::TickAndTimeout { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    fn ticker_mut(&mut self) -> Option<&mut Interval> {
        match self {
            TimerState::Tick { ticker }
            | TimerState::TickAndTimeout { ticker, .. } => Some(ticker),
            _ => None,
        }
    }

    /// Replaces the ticker, keeping the deadline.
    pub(crate) fn with_ticker(self, ticker: Option<Interval>) -> Self {
        let (_, deadline) = self.into_parts();
        Self::from_parts(ticker, deadline)
    }

    /// Replaces the deadline, keeping the ticker.
    pub(crate) fn with_deadline(self, deadline: Option<Instant>) -> Self {
        let (ticker, _) = self.into_parts();
        Self::from_parts(ticker, deadline)
    }
}

/// Ticker firing every `period`, first tick one period from now.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn idle_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// One loop event.
enum Event<A: Actor> {
    Shutdown,
    Interrupt(Option<Duration>),
    Tick,
    Mail(Option<Envelope<A>>),
    Timeout,
}

/// What the loop does after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop(StopReason),
}

type PanicPayload = Box<dyn Any + Send>;

/// Drives one actor.
pub(crate) struct ActorRunner<A: Actor> {
    name: Arc<str>,
    actor: A,
    ctx: ActorContext<A>,
    mailbox: MailboxReceiver<A>,
    interrupts: InterruptReceiver,
    timers: TimerState,
    idle_timeout: Option<Duration>,
    panic_timers: PanicTimers,
    strategy: SupervisionStrategy,
    panics: usize,
    stopped: Arc<AtomicBool>,
    token: CancellationToken,
}

impl<A: Actor> ActorRunner<A> {
    /// Creates the runner and the reference of a new actor.
    pub(crate) fn create(
        name: &str,
        actor: A,
        system: &ActorSystem,
        config: &Config,
    ) -> (Self, ActorRef<A>) {
        debug!("Creating new actor runner {}.", name);
        let name: Arc<str> = Arc::from(name);
        let (sender, receiver) = mailbox::<A>(config.capacity());
        let (interrupt_sender, interrupt_receiver) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let token = system.child_token();
        let reference = ActorRef::new(
            name.clone(),
            sender,
            interrupt_sender,
            stopped.clone(),
            token.clone(),
            config.call_timeout,
        );
        let ctx = ActorContext::new(reference.clone(), system.clone());
        let runner = Self {
            name,
            actor,
            ctx,
            mailbox: receiver,
            interrupts: interrupt_receiver,
            timers: TimerState::Idle,
            idle_timeout: config.idle_timeout.filter(|timeout| !timeout.is_zero()),
            panic_timers: config.panic_timers,
            strategy: A::supervision_strategy(),
            panics: 0,
            stopped,
            token,
        };
        (runner, reference)
    }

    /// Runs `init` and then the event loop until the actor stops.
    ///
    /// `init` runs first, with `starter` attached as the caller, so its reply (or a
    /// deferred answer) resolves the start request. If `init` asks to stop, fails or
    /// panics, the actor terminates without entering the loop.
    ///
    /// # Event selection
    ///
    /// Each iteration handles exactly one event. A stop request already pending is
    /// handled first; otherwise the loop waits on every source at once and, when more
    /// than one is ready, `select!` picks one at random. Fairness matters here: with
    /// [`MissedTickBehavior::Skip`] a `tick` callback slower than its period finds the
    /// next tick already due, and a fixed priority would never read the mailbox again.
    ///
    /// # Termination
    ///
    /// The loop ends when a callback returns a stopping [`Reply`], when the supervision
    /// strategy gives up after a panic, or when the actor token is cancelled (by
    /// [`ActorRef::stop`] or system shutdown). In every case [`ActorRunner::terminate`]
    /// runs the stop hook once, unregisters the actor and answers queued calls with
    /// [`Error::Stopped`].
    ///
    /// # Arguments
    ///
    /// * `init` - Message handed to [`Actor::init`].
    /// * `starter` - Caller of the start request.
    pub(crate) async fn run(mut self, init: A::Init, starter: Caller<A::Response>) {
        debug!("Initializing actor {}.", self.name);
        if let Flow::Stop(reason) = self.init(init, starter).await {
            self.terminate(reason).await;
            return;
        }

        info!("Actor {} is running.", self.name);
        loop {
            if self.token.is_cancelled() {
                self.terminate(StopReason::Shutdown).await;
                break;
            }

            let deadline = self.timers.deadline();
            let event = select! {
                _ = self.token.cancelled() => Event::Shutdown,
                period = self.interrupts.recv() => Event::Interrupt(period),
                _ = next_tick(self.timers.ticker_mut()) => Event::Tick,
                envelope = self.mailbox.recv() => Event::Mail(envelope),
                _ = idle_deadline(deadline) => Event::Timeout,
            };

            let flow = match event {
                Event::Shutdown => Flow::Stop(StopReason::Shutdown),
                Event::Interrupt(Some(period)) => {
                    self.interrupt(period);
                    Flow::Continue
                }
                Event::Tick => self.tick().await,
                Event::Mail(Some(envelope)) => self.dispatch(envelope).await,
                Event::Timeout => self.timeout().await,
                Event::Interrupt(None) | Event::Mail(None) => {
                    Flow::Stop(StopReason::Shutdown)
                }
            };

            if let Flow::Stop(reason) = flow {
                self.terminate(reason).await;
                break;
            }
        }
    }

    async fn init(
        &mut self,
        init: A::Init,
        starter: Caller<A::Response>,
    ) -> Flow {
        self.ctx.set_caller(starter);
        let result = AssertUnwindSafe(self.actor.init(init, &mut self.ctx))
            .catch_unwind()
            .await;
        let caller = self.ctx.take_caller();
        match result {
            Ok(reply) => {
                let failed = matches!(reply.outcome(), Outcome::Reply(Err(_)));
                let flow = self.answer(caller, reply);
                if failed {
                    warn!("Actor {} failed to initialize.", self.name);
                    Flow::Stop(StopReason::Returned)
                } else {
                    flow
                }
            }
            Err(payload) => {
                self.log_panic("init", payload.as_ref());
                if let Some(caller) = caller {
                    caller.send_reply(Err(Error::Panicked(self.name.to_string())));
                }
                Flow::Stop(StopReason::Panic)
            }
        }
    }

    fn interrupt(&mut self, period: Duration) {
        let timers = mem::take(&mut self.timers);
        if period.is_zero() {
            debug!("Actor {} stops ticking.", self.name);
            self.timers = timers.with_ticker(None);
        } else {
            debug!("Actor {} ticks every {:?}.", self.name, period);
            self.timers = timers.with_ticker(Some(ticker(period)));
        }
        self.rearm(None);
    }

    async fn tick(&mut self) -> Flow {
        let result = AssertUnwindSafe(self.actor.tick(&mut self.ctx))
            .catch_unwind()
            .await;
        self.settle("tick", result).await
    }

    async fn timeout(&mut self) -> Flow {
        debug!("Actor {} is idle.", self.name);
        self.timers = mem::take(&mut self.timers).with_deadline(None);
        let result = AssertUnwindSafe(self.actor.timeout(&mut self.ctx))
            .catch_unwind()
            .await;
        self.settle("timeout", result).await
    }

    async fn dispatch(&mut self, envelope: Envelope<A>) -> Flow {
        debug!("Actor {} handling {}.", self.name, envelope.kind());
        let message = match envelope {
            Envelope::Call { caller, message } => {
                self.ctx.set_caller(caller);
                message
            }
            Envelope::Cast { message } => message,
        };

        let result = AssertUnwindSafe(self.actor.handle(message, &mut self.ctx))
            .catch_unwind()
            .await;
        let caller = self.ctx.take_caller();
        match result {
            Ok(reply) => self.answer(caller, reply),
            Err(payload) => {
                if let Some(caller) = caller {
                    caller.send_reply(Err(Error::Panicked(self.name.to_string())));
                }
                self.recover("handle", payload).await
            }
        }
    }

    /// Delivers the outcome of a call-bearing callback and applies its directive.
    fn answer(
        &mut self,
        caller: Option<Caller<A::Response>>,
        reply: Reply<A::Response>,
    ) -> Flow {
        let (outcome, directive) = reply.into_parts();
        match (caller, outcome) {
            (Some(caller), Outcome::Reply(result)) => caller.send_reply(result),
            (Some(_), Outcome::Deferred) => {
                warn!(
                    "Actor {} deferred a reply without keeping the caller.",
                    self.name
                );
            }
            (None, _) => {}
        }
        self.apply(directive)
    }

    async fn settle(
        &mut self,
        callback: &str,
        result: Result<Reply, PanicPayload>,
    ) -> Flow {
        match result {
            Ok(reply) => {
                let (_, directive) = reply.into_parts();
                self.apply(directive)
            }
            Err(payload) => self.recover(callback, payload).await,
        }
    }

    fn apply(&mut self, directive: Directive) -> Flow {
        self.panics = 0;
        if directive.stop {
            Flow::Stop(StopReason::Returned)
        } else {
            self.rearm(directive.idle_timeout);
            Flow::Continue
        }
    }

    /// Arms the idle deadline with `timeout`, or the actor default. A zero duration
    /// disables the idle timer.
    fn rearm(&mut self, timeout: Option<Duration>) {
        let deadline = timeout
            .or(self.idle_timeout)
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);
        self.timers = mem::take(&mut self.timers).with_deadline(deadline);
    }

    async fn recover(&mut self, callback: &str, payload: PanicPayload) -> Flow {
        self.log_panic(callback, payload.as_ref());
        self.panics += 1;
        match self.panic_timers {
            PanicTimers::Clear => self.timers = TimerState::Idle,
            PanicTimers::Keep => self.rearm(None),
        }

        match self.strategy.on_panic(self.panics) {
            PanicAction::Resume(pause) => {
                if let Some(pause) = pause {
                    debug!("Actor {} resumes in {:?}.", self.name, pause);
                    select! {
                        _ = sleep(pause) => {}
                        _ = self.token.cancelled() => {}
                    }
                }
                Flow::Continue
            }
            PanicAction::Stop => {
                error!(
                    "Actor {} gave up after {} consecutive panics.",
                    self.name, self.panics
                );
                Flow::Stop(StopReason::Panic)
            }
        }
    }

    fn log_panic(&self, callback: &str, payload: &(dyn Any + Send)) {
        error!(
            "Actor {} panicked in {}: {}, stack: {}",
            self.name,
            callback,
            panic_message(payload),
            Backtrace::capture()
        );
    }

    /// Stops the actor: runs the stop hook, unregisters it and answers queued calls.
    async fn terminate(&mut self, reason: StopReason) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("Actor {} stopped more than once.", self.name);
            return;
        }
        debug!("Stopping actor {}: {}.", self.name, reason);

        let result = AssertUnwindSafe(self.actor.stop(reason, &mut self.ctx))
            .catch_unwind()
            .await;
        if let Err(payload) = result {
            self.log_panic("stop", payload.as_ref());
        }

        self.ctx.system().remove_actor(&self.name);
        self.timers = TimerState::Idle;
        self.interrupts.close();
        self.mailbox.close();
        while let Ok(envelope) = self.mailbox.try_recv() {
            if let Envelope::Call { caller, .. } = envelope {
                caller.send_reply(Err(Error::Stopped(self.name.to_string())));
            }
        }
        info!("Actor {} stopped: {}.", self.name, reason);
    }
}
