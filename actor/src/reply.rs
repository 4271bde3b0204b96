// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Reply envelope
//!
//! Every callback of an actor returns a [`Reply`]. Besides the result handed back to a
//! caller, it tells the loop how to continue: which idle timeout to arm next and whether
//! the actor must stop.
//!

use crate::Error;

use std::time::Duration;

/// What a callback produced for its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    /// Answer the caller (if any) with this result.
    Reply(Result<R, Error>),
    /// The handler keeps the caller and answers later through
    /// [`Caller::send_reply`](crate::Caller::send_reply).
    Deferred,
}

/// Outcome of one handled event.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<R = ()> {
    outcome: Outcome<R>,
    idle_timeout: Option<Duration>,
    stop: bool,
}

/// Loop instructions extracted from a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Directive {
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) stop: bool,
}

impl<R> Reply<R> {
    /// Creates a reply from a result.
    pub fn new(result: Result<R, Error>) -> Self {
        Self {
            outcome: Outcome::Reply(result),
            idle_timeout: None,
            stop: false,
        }
    }

    /// Successful reply.
    pub fn ok(value: R) -> Self {
        Self::new(Ok(value))
    }

    /// Failed reply.
    pub fn err(error: Error) -> Self {
        Self::new(Err(error))
    }

    /// The answer will be sent later, out of band.
    pub fn deferred() -> Self {
        Self {
            outcome: Outcome::Deferred,
            idle_timeout: None,
            stop: false,
        }
    }

    /// Overrides the idle timeout armed after this callback. A zero duration falls back
    /// to the actor default.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Stops the actor once this reply has been delivered.
    pub fn and_stop(mut self) -> Self {
        self.stop = true;
        self
    }

    /// The outcome.
    pub fn outcome(&self) -> &Outcome<R> {
        &self.outcome
    }

    /// The result, unless the reply is deferred.
    pub fn result(&self) -> Option<&Result<R, Error>> {
        match &self.outcome {
            Outcome::Reply(result) => Some(result),
            Outcome::Deferred => None,
        }
    }

    /// Next idle timeout override. `None` means the actor default.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// True if the actor stops after this reply.
    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    /// True if the answer is deferred.
    pub fn is_deferred(&self) -> bool {
        matches!(self.outcome, Outcome::Deferred)
    }

    pub(crate) fn into_parts(self) -> (Outcome<R>, Directive) {
        (
            self.outcome,
            Directive {
                idle_timeout: self.idle_timeout,
                stop: self.stop,
            },
        )
    }
}

impl Reply<()> {
    /// Empty, non-stopping reply.
    pub fn none() -> Self {
        Self::ok(())
    }

    /// Empty reply that stops the actor.
    pub fn stop() -> Self {
        Self::none().and_stop()
    }
}

impl Default for Reply<()> {
    fn default() -> Self {
        Self::none()
    }
}

impl<R> From<Result<R, Error>> for Reply<R> {
    fn from(result: Result<R, Error>) -> Self {
        Self::new(result)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_reply_accessors() {
        let reply = Reply::ok(5).with_idle_timeout(Duration::from_secs(1));
        assert_eq!(reply.result(), Some(&Ok(5)));
        assert_eq!(reply.idle_timeout(), Some(Duration::from_secs(1)));
        assert!(!reply.is_stopped());
        assert!(!reply.is_deferred());

        let reply: Reply<u32> = Reply::deferred().and_stop();
        assert!(reply.is_deferred());
        assert!(reply.is_stopped());
        assert_eq!(reply.result(), None);
    }

    #[test]
    fn test_zero_idle_timeout_means_default() {
        let reply = Reply::none().with_idle_timeout(Duration::ZERO);
        let (outcome, directive) = reply.into_parts();
        assert_eq!(outcome, Outcome::Reply(Ok(())));
        assert_eq!(directive.idle_timeout, None);
        assert!(!directive.stop);
    }

    #[test]
    fn test_from_result() {
        let reply: Reply<u8> = Err(Error::Functional("bad".to_owned())).into();
        assert_eq!(
            reply.result(),
            Some(&Err(Error::Functional("bad".to_owned())))
        );
        assert!(Reply::stop().is_stopped());
    }
}
