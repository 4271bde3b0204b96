// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Managed components
//!
//! A process usually wires many actors together and wants to start and stop them the
//! same way. [`Component`] is that uniform lifecycle; [`ActorComponent`] adapts any
//! [`Actor`] to it.
//!

use crate::{
    Error,
    actor::{Actor, ActorRef},
    config::Config,
    system::ActorSystem,
};

use async_trait::async_trait;

use tracing::{debug, warn};

/// Lifecycle driven by a process-level orchestrator.
#[async_trait]
pub trait Component: Send {
    /// Start message.
    type Init: Send + 'static;
    /// Result of a successful start.
    type Output: Send;

    /// Name of the component.
    fn name(&self) -> &str;

    /// Checked before `start`. Returning false skips the component.
    fn pre_run(&self, _init: &Self::Init) -> bool {
        true
    }

    /// Starts the component.
    async fn start(&mut self, init: Self::Init) -> Result<Self::Output, Error>;

    /// Runs before `stop`.
    async fn pre_stop(&mut self) {}

    /// Stops the component and waits until it is down.
    async fn stop(&mut self);
}

/// Runs an actor as a [`Component`].
pub struct ActorComponent<A: Actor> {
    name: String,
    system: ActorSystem,
    config: Config,
    actor: Option<A>,
    reference: Option<ActorRef<A>>,
}

impl<A: Actor> ActorComponent<A> {
    /// Component starting `actor` as `name` on `system`, with the system configuration.
    pub fn new(name: &str, system: &ActorSystem, actor: A) -> Self {
        Self {
            name: name.to_owned(),
            config: system.config().clone(),
            system: system.clone(),
            actor: Some(actor),
            reference: None,
        }
    }

    /// Overrides the actor configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Reference to the running actor.
    pub fn reference(&self) -> Option<&ActorRef<A>> {
        self.reference.as_ref()
    }
}

#[async_trait]
impl<A: Actor> Component for ActorComponent<A> {
    type Init = A::Init;
    type Output = A::Response;

    fn name(&self) -> &str {
        &self.name
    }

    fn pre_run(&self, _init: &A::Init) -> bool {
        self.actor.is_some() && !self.system.contains_actor(&self.name)
    }

    async fn start(&mut self, init: A::Init) -> Result<A::Response, Error> {
        let Some(actor) = self.actor.take() else {
            warn!("Component {} was already started.", self.name);
            return Err(Error::Exists(self.name.clone()));
        };
        let (reference, response) = self
            .system
            .start_actor_with(&self.name, actor, init, self.config.clone())
            .await?;
        self.reference = Some(reference);
        Ok(response)
    }

    async fn pre_stop(&mut self) {
        debug!("Component {} is stopping.", self.name);
    }

    async fn stop(&mut self) {
        if let Some(reference) = self.reference.take() {
            reference.stop();
            reference.closed().await;
            debug!("Component {} stopped.", self.name);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{
        actor::{ActorContext, Handler, Message, Response},
        reply::Reply,
    };

    #[derive(Debug, Clone)]
    enum CounterMsg {
        Add(u64),
        Get,
    }

    impl Message for CounterMsg {}

    #[derive(Debug, Clone, PartialEq)]
    struct Total(u64);

    impl Response for Total {}

    struct Counter {
        value: u64,
    }

    #[async_trait]
    impl Actor for Counter {
        type Init = u64;
        type Message = CounterMsg;
        type Response = Total;

        async fn init(
            &mut self,
            start: u64,
            _ctx: &mut ActorContext<Self>,
        ) -> Reply<Total> {
            self.value = start;
            Reply::ok(Total(start))
        }
    }

    #[async_trait]
    impl Handler<Counter> for Counter {
        async fn handle(
            &mut self,
            msg: CounterMsg,
            _ctx: &mut ActorContext<Counter>,
        ) -> Reply<Total> {
            if let CounterMsg::Add(n) = msg {
                self.value += n;
            }
            Reply::ok(Total(self.value))
        }
    }

    #[tokio::test]
    async fn test_actor_component_lifecycle() {
        let system = ActorSystem::default();
        let mut component =
            ActorComponent::new("counter", &system, Counter { value: 0 });
        assert_eq!(component.name(), "counter");
        assert!(component.pre_run(&5));

        assert_eq!(component.start(5).await, Ok(Total(5)));
        assert!(!component.pre_run(&5));
        assert_eq!(
            component.start(1).await,
            Err(Error::Exists("counter".to_owned()))
        );

        let counter = component.reference().cloned().unwrap();
        counter.cast(CounterMsg::Add(3));
        assert_eq!(counter.call(CounterMsg::Get).await, Ok(Total(8)));

        component.pre_stop().await;
        component.stop().await;
        assert!(counter.is_stopped());
        assert!(component.reference().is_none());
        assert!(!system.contains_actor("counter"));
    }
}
