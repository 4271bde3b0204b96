// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The [`ActorSystem`] starts actors, keeps a registry of them by name and stops them all
//! on shutdown. Every actor loop runs on a task counted by the `actors` waiter, so
//! [`ActorSystem::shutdown`] can wait for every loop to finish.
//!

use crate::{
    Error,
    actor::{Actor, ActorRef},
    config::Config,
    envelope::Caller,
    runner::ActorRunner,
    waiter::{Waiter, Waiters},
};

use dashmap::{DashMap, mapref::entry::Entry};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use std::{any::Any, sync::Arc};

/// Name of the waiter counting running actor loops.
pub const ACTOR_WAITER: &str = "actors";

/// Actor system.
#[derive(Clone)]
pub struct ActorSystem {
    /// The actors running in this actor system.
    actors: Arc<DashMap<String, Box<dyn Any + Send + Sync + 'static>>>,
    /// Counts the running actor loops.
    runners: Waiter,
    waiters: Waiters,
    config: Config,
    token: CancellationToken,
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ActorSystem {
    /// Creates a system with its own waiter registry.
    pub fn new(config: Config) -> Self {
        Self::with_waiters(config, Waiters::default())
    }

    /// Creates a system sharing an existing waiter registry.
    pub fn with_waiters(config: Config, waiters: Waiters) -> Self {
        let runners = waiters.may_waiter(ACTOR_WAITER);
        Self {
            actors: Arc::new(DashMap::new()),
            runners,
            waiters,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Default configuration of the actors started by this system.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Waiter registry of this system.
    pub fn waiters(&self) -> &Waiters {
        &self.waiters
    }

    /// True once [`ActorSystem::shutdown`] was requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Starts an actor with the system configuration. See [`ActorSystem::start_actor_with`].
    pub async fn start_actor<A: Actor>(
        &self,
        name: &str,
        actor: A,
        init: A::Init,
    ) -> Result<(ActorRef<A>, A::Response), Error> {
        self.start_actor_with(name, actor, init, self.config.clone())
            .await
    }

    /// Starts an actor and waits for its `init` to answer.
    ///
    /// # Errors
    ///
    /// - [`Error::Exists`] if an actor with that name is running.
    /// - [`Error::Stopped`] if the system is shutting down.
    /// - [`Error::InitTimeout`] if `init` did not answer within `init_timeout`; the actor
    ///   is stopped.
    /// - The error returned by `init`, or [`Error::Panicked`] if it panicked; the actor
    ///   stops by itself.
    pub async fn start_actor_with<A: Actor>(
        &self,
        name: &str,
        actor: A,
        init: A::Init,
        config: Config,
    ) -> Result<(ActorRef<A>, A::Response), Error> {
        if self.is_shutdown() {
            warn!("Actor system is shutting down, actor {} not started.", name);
            return Err(Error::Stopped(name.to_owned()));
        }

        let (runner, reference) = match self.actors.entry(name.to_owned()) {
            Entry::Occupied(_) => {
                error!("Actor {} already exists!", name);
                return Err(Error::Exists(name.to_owned()));
            }
            Entry::Vacant(entry) => {
                let (runner, reference) =
                    ActorRunner::create(name, actor, self, &config);
                entry.insert(Box::new(reference.clone()));
                (runner, reference)
            }
        };

        let (starter, receiver) = Caller::channel(name);
        self.runners
            .add_and_spawn(name.to_owned(), runner.run(init, starter));

        match timeout(config.init_timeout, receiver).await {
            Ok(Ok(Ok(response))) => {
                debug!("Actor {} started.", name);
                Ok((reference, response))
            }
            Ok(Ok(Err(error))) => {
                warn!("Actor {} failed to start: {}", name, error);
                Err(error)
            }
            Ok(Err(_)) => {
                error!("Actor {} dropped its start request.", name);
                Err(Error::NoReply(name.to_owned()))
            }
            Err(_) => {
                error!(
                    "Actor {} init timed out after {:?}.",
                    name, config.init_timeout
                );
                reference.stop();
                Err(Error::InitTimeout(name.to_owned()))
            }
        }
    }

    /// Retrieves a running actor. Returns `None` if there is no actor with that name or
    /// it is of another type.
    pub fn get_actor<A: Actor>(&self, name: &str) -> Option<ActorRef<A>> {
        self.actors
            .get(name)
            .and_then(|any| any.downcast_ref::<ActorRef<A>>().cloned())
    }

    /// True if an actor with that name is running.
    pub fn contains_actor(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    /// Names of the running actors.
    pub fn actor_names(&self) -> Vec<String> {
        self.actors.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn remove_actor(&self, name: &str) {
        self.actors.remove(name);
    }

    /// Stops every actor and waits (bounded by the waiter timeout) for their loops to end.
    /// Returns true if every loop ended in time.
    pub async fn shutdown(&self) -> bool {
        info!("Stopping actor system...");
        self.token.cancel();
        let drained = self.runners.wait("shutdown").await;
        if drained {
            info!("Actor system stopped.");
        } else {
            warn!(
                "Actor system stopped with {} actors still running.",
                self.runners.count()
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{
        actor::{ActorContext, Handler, Message, StopReason},
        reply::Reply,
    };

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use std::{sync::Mutex, time::Duration};

    #[derive(Debug, Clone)]
    struct Ping;

    impl Message for Ping {}

    #[derive(Default)]
    struct Starter {
        delay: Option<Duration>,
        fail: bool,
        stops: Arc<Mutex<Vec<StopReason>>>,
    }

    #[async_trait]
    impl Actor for Starter {
        type Init = u32;
        type Message = Ping;
        type Response = ();

        async fn init(
            &mut self,
            _init: u32,
            _ctx: &mut ActorContext<Self>,
        ) -> Reply {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Reply::err(Error::Functional("bad init".to_owned()))
            } else {
                Reply::none()
            }
        }

        async fn stop(
            &mut self,
            reason: StopReason,
            _ctx: &mut ActorContext<Self>,
        ) {
            self.stops.lock().unwrap().push(reason);
        }
    }

    #[async_trait]
    impl Handler<Starter> for Starter {
        async fn handle(
            &mut self,
            _msg: Ping,
            _ctx: &mut ActorContext<Starter>,
        ) -> Reply {
            Reply::none()
        }
    }

    struct Other;

    #[async_trait]
    impl Actor for Other {
        type Init = ();
        type Message = Ping;
        type Response = ();

        async fn init(&mut self, _init: (), _ctx: &mut ActorContext<Self>) -> Reply {
            Reply::none()
        }
    }

    #[async_trait]
    impl Handler<Other> for Other {
        async fn handle(
            &mut self,
            _msg: Ping,
            _ctx: &mut ActorContext<Other>,
        ) -> Reply {
            Reply::none()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_duplicate_name_rejected() {
        let system = ActorSystem::default();
        system
            .start_actor("unique", Starter::default(), 1)
            .await
            .unwrap();

        let result = system.start_actor("unique", Starter::default(), 2).await;
        assert_eq!(result.err(), Some(Error::Exists("unique".to_owned())));
        assert!(logs_contain("Actor unique already exists!"));
        assert_eq!(system.actor_names(), vec!["unique".to_owned()]);
    }

    #[tokio::test]
    async fn test_get_actor_checks_type() {
        let system = ActorSystem::default();
        system.start_actor("other", Other, ()).await.unwrap();

        assert!(system.get_actor::<Other>("other").is_some());
        assert!(system.get_actor::<Starter>("other").is_none());
        assert!(system.get_actor::<Other>("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_init_timeout_stops_actor() {
        let system = ActorSystem::default();
        let stops = Arc::new(Mutex::new(vec![]));
        let actor = Starter {
            delay: Some(Duration::from_secs(1)),
            fail: false,
            stops: stops.clone(),
        };
        let config = Config::default().with_init_timeout(Duration::from_millis(100));

        let result = system.start_actor_with("slow", actor, 0, config).await;
        assert_eq!(result.err(), Some(Error::InitTimeout("slow".to_owned())));
        assert!(logs_contain("Actor slow init timed out"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*stops.lock().unwrap(), vec![StopReason::Shutdown]);
        assert!(!system.contains_actor("slow"));
    }

    #[tokio::test]
    async fn test_init_error_stops_actor() {
        let system = ActorSystem::default();
        let stops = Arc::new(Mutex::new(vec![]));
        let actor = Starter {
            delay: None,
            fail: true,
            stops: stops.clone(),
        };

        let result = system.start_actor("broken", actor, 0).await;
        assert_eq!(
            result.err(),
            Some(Error::Functional("bad init".to_owned()))
        );

        assert!(system.waiters().wait(ACTOR_WAITER, "test").await);
        assert_eq!(*stops.lock().unwrap(), vec![StopReason::Returned]);
        assert!(!system.contains_actor("broken"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_shutdown_stops_every_actor() {
        let system = ActorSystem::default();
        let stops = Arc::new(Mutex::new(vec![]));
        for name in ["a", "b", "c"] {
            let actor = Starter {
                delay: None,
                fail: false,
                stops: stops.clone(),
            };
            system.start_actor(name, actor, 0).await.unwrap();
        }
        assert_eq!(system.waiters().fetch(ACTOR_WAITER).unwrap().count(), 3);

        assert!(system.shutdown().await);
        assert_eq!(stops.lock().unwrap().len(), 3);
        assert!(
            stops
                .lock()
                .unwrap()
                .iter()
                .all(|reason| *reason == StopReason::Shutdown)
        );
        assert!(system.actor_names().is_empty());
        assert!(logs_contain("Actor system stopped."));

        let result = system.start_actor("late", Other, ()).await;
        assert_eq!(result.err(), Some(Error::Stopped("late".to_owned())));
    }
}
