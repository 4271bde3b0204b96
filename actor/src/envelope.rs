// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Envelopes
//!
//! Wire shapes travelling through an actor's mailbox. A call carries a private, single-use
//! reply channel wrapped in a [`Caller`]; a cast carries only the payload.
//!

use crate::{Error, actor::Actor};

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, warn};

use std::time::Duration;

/// Mailbox entry.
pub(crate) enum Envelope<A: Actor> {
    /// Request expecting exactly one reply.
    Call {
        caller: Caller<A::Response>,
        message: A::Message,
    },
    /// One-way message.
    Cast { message: A::Message },
}

impl<A: Actor> Envelope<A> {
    /// Kind name used in logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Envelope::Call { .. } => "call",
            Envelope::Cast { .. } => "cast",
        }
    }
}

/// Mailbox sender side.
pub(crate) type MailboxSender<A> = mpsc::Sender<Envelope<A>>;

/// Mailbox receiver side, owned by the actor loop.
pub(crate) type MailboxReceiver<A> = mpsc::Receiver<Envelope<A>>;

/// Creates a bounded mailbox.
pub(crate) fn mailbox<A: Actor>(
    capacity: usize,
) -> (MailboxSender<A>, MailboxReceiver<A>) {
    mpsc::channel(capacity)
}

/// Sender side of the interrupt channel. Carries ticker periods, `Duration::ZERO` stops
/// the ticker.
pub(crate) type InterruptSender = mpsc::UnboundedSender<Duration>;

/// Receiver side of the interrupt channel.
pub(crate) type InterruptReceiver = mpsc::UnboundedReceiver<Duration>;

/// Handle on the party waiting for the answer of a call.
///
/// The loop answers automatically unless the handler returned
/// [`Reply::deferred`](crate::Reply::deferred). To answer later, take the caller with
/// [`ActorContext::take_caller`](crate::ActorContext::take_caller) and call
/// [`Caller::send_reply`] from anywhere, once.
#[derive(Debug)]
pub struct Caller<R> {
    actor: String,
    sender: oneshot::Sender<Result<R, Error>>,
}

impl<R> Caller<R> {
    pub(crate) fn channel(
        actor: &str,
    ) -> (Self, oneshot::Receiver<Result<R, Error>>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                actor: actor.to_owned(),
                sender,
            },
            receiver,
        )
    }

    /// Sends the answer. If the caller already gave up (deadline elapsed), the answer is
    /// dropped and logged.
    pub fn send_reply(self, result: Result<R, Error>) {
        debug!("Sending reply from actor {}.", self.actor);
        if self.sender.send(result).is_err() {
            warn!(
                "Caller of actor {} is gone, dropping the reply.",
                self.actor
            );
        }
    }

    /// True if the caller stopped waiting.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_caller_delivers_once() {
        let (caller, receiver) = Caller::<u32>::channel("test");
        assert!(!caller.is_closed());
        caller.send_reply(Ok(7));
        assert_eq!(receiver.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_reply_to_gone_caller_is_swallowed() {
        let (caller, receiver) = Caller::<u32>::channel("test");
        drop(receiver);
        assert!(caller.is_closed());
        caller.send_reply(Ok(7));
        assert!(logs_contain("Caller of actor test is gone"));
    }
}
