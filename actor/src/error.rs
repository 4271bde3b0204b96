// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Every failure the runtime reports to a caller is an [`Error`]. Each variant carries a
//! numeric classification code (see [`Error::code`]) so callers can tell "never got in"
//! ([`Error::EnqueueTimeout`]) from "got in but never answered" ([`Error::HandleTimeout`])
//! from "never started" ([`Error::InitTimeout`]) without matching on strings.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code for a call that could not be enqueued before its deadline.
pub const ERR_ENQUEUE_TIMEOUT: u32 = 1001;
/// Code for a call that was enqueued but not answered before its deadline.
pub const ERR_HANDLE_TIMEOUT: u32 = 1002;
/// Code for an actor whose init callback did not finish in time.
pub const ERR_INIT_TIMEOUT: u32 = 1003;
/// Code for a request addressed to a stopped actor.
pub const ERR_STOPPED: u32 = 1004;
/// Code for a call whose reply channel was dropped without an answer.
pub const ERR_NO_REPLY: u32 = 1005;
/// Code for a call whose handler panicked.
pub const ERR_PANICKED: u32 = 1006;
/// Code for a duplicate actor name.
pub const ERR_EXISTS: u32 = 1007;
/// Code for a duplicate waiter registration.
pub const ERR_WAITER_EXISTS: u32 = 1101;
/// Code for a lookup of an unknown waiter.
pub const ERR_WAITER_NOT_FOUND: u32 = 1102;
/// Code for functional errors without a dedicated classification.
pub const ERR_FUNCTIONAL: u32 = 100001;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The mailbox of the actor did not accept the call before the deadline.
    #[error("Call to actor {0} timed out before it was enqueued.")]
    EnqueueTimeout(String),
    /// The actor accepted the call but did not answer before the deadline.
    #[error("Call to actor {0} timed out waiting for the reply.")]
    HandleTimeout(String),
    /// The init callback of the actor did not complete within the startup budget.
    #[error("Actor {0} init timed out.")]
    InitTimeout(String),
    /// The actor is stopped and no longer accepts requests.
    #[error("Actor {0} is stopped.")]
    Stopped(String),
    /// The actor dropped the call without answering it.
    #[error("Actor {0} dropped the call without replying.")]
    NoReply(String),
    /// The handler panicked while processing the request.
    #[error("Actor {0} panicked while handling the request.")]
    Panicked(String),
    /// An actor with the same name is already running.
    #[error("Actor {0} exists.")]
    Exists(String),
    /// A waiter with the same name is already registered.
    #[error("Waiter {0} already in use.")]
    WaiterExists(String),
    /// No waiter is registered under the name.
    #[error("Waiter {0} not found.")]
    WaiterNotFound(String),
    /// Error declared by handler code, with its own classification code.
    #[error("{message} (code {code})")]
    Code {
        /// Numeric classification.
        code: u32,
        /// Human readable message.
        message: String,
    },
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// Creates a handler-declared error with a custom code.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Error::Code {
            code,
            message: message.into(),
        }
    }

    /// Numeric classification of the error.
    pub fn code(&self) -> u32 {
        match self {
            Error::EnqueueTimeout(_) => ERR_ENQUEUE_TIMEOUT,
            Error::HandleTimeout(_) => ERR_HANDLE_TIMEOUT,
            Error::InitTimeout(_) => ERR_INIT_TIMEOUT,
            Error::Stopped(_) => ERR_STOPPED,
            Error::NoReply(_) => ERR_NO_REPLY,
            Error::Panicked(_) => ERR_PANICKED,
            Error::Exists(_) => ERR_EXISTS,
            Error::WaiterExists(_) => ERR_WAITER_EXISTS,
            Error::WaiterNotFound(_) => ERR_WAITER_NOT_FOUND,
            Error::Code { code, .. } => *code,
            Error::Functional(_) => ERR_FUNCTIONAL,
        }
    }

    /// True for the deadline errors (enqueue, handle and init).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::EnqueueTimeout(_) | Error::HandleTimeout(_) | Error::InitTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::EnqueueTimeout("a".to_owned()),
            Error::HandleTimeout("a".to_owned()),
            Error::InitTimeout("a".to_owned()),
            Error::Stopped("a".to_owned()),
            Error::NoReply("a".to_owned()),
            Error::Panicked("a".to_owned()),
        ];
        for (i, left) in errors.iter().enumerate() {
            for right in errors.iter().skip(i + 1) {
                assert_ne!(left.code(), right.code());
            }
        }
    }

    #[test]
    fn test_custom_code() {
        let error = Error::new(42, "out of stock");
        assert_eq!(error.code(), 42);
        assert_eq!(error.to_string(), "out of stock (code 42)");
        assert!(!error.is_timeout());
        assert!(Error::HandleTimeout("a".to_owned()).is_timeout());
    }
}
