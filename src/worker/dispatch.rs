//! Lifecycle dispatch table: event name -> handler.

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use tracing::debug;

use super::interceptor::Interceptor;
use super::outcome::{Fetched, InstallReport, SweepReport};
use crate::cache::CacheStorage;
use crate::error::{Result, WorkerError};
use crate::http::Request;
use crate::network::Network;

/// Lifecycle events delivered by the host.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
  Install,
  Activate,
  Fetch(Request),
}

impl LifecycleEvent {
  /// Name the handler is registered under.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Install => "install",
      Self::Activate => "activate",
      Self::Fetch(_) => "fetch",
    }
  }
}

/// What a handler hands back to the host once its future resolves.
#[derive(Debug, Clone)]
pub enum Completion {
  Installed(InstallReport),
  Activated(SweepReport),
  Responded(Fetched),
}

/// A lifecycle handler. The returned future is awaited by the dispatcher.
pub type Handler<S, N> =
  for<'a> fn(&'a Interceptor<S, N>, LifecycleEvent) -> BoxFuture<'a, Result<Completion>>;

pub struct Dispatcher<S: CacheStorage, N: Network> {
  handlers: BTreeMap<&'static str, Handler<S, N>>,
}

impl<S, N> Dispatcher<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// An empty table; every event is unknown until registered.
  pub fn new() -> Self {
    Self {
      handlers: BTreeMap::new(),
    }
  }

  /// Table with the install, activate and fetch handlers registered.
  pub fn with_defaults() -> Self {
    let mut dispatcher = Self::new();
    dispatcher.register("install", handle_install::<S, N>);
    dispatcher.register("activate", handle_activate::<S, N>);
    dispatcher.register("fetch", handle_fetch::<S, N>);
    dispatcher
  }

  /// Register `handler` for `event`, returning the handler it replaced.
  pub fn register(&mut self, event: &'static str, handler: Handler<S, N>) -> Option<Handler<S, N>> {
    self.handlers.insert(event, handler)
  }

  /// Registered event names, sorted.
  #[allow(dead_code)]
  pub fn events(&self) -> Vec<&'static str> {
    self.handlers.keys().copied().collect()
  }

  /// Run the handler for `event` to completion.
  pub async fn dispatch(
    &self,
    interceptor: &Interceptor<S, N>,
    event: LifecycleEvent,
  ) -> Result<Completion> {
    let name = event.name();
    let handler = self
      .handlers
      .get(name)
      .ok_or_else(|| WorkerError::UnknownEvent(name.to_string()))?;

    debug!(event = name, "Dispatching lifecycle event");
    handler(interceptor, event).await
  }
}

impl<S, N> Default for Dispatcher<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  fn default() -> Self {
    Self::with_defaults()
  }
}

fn handle_install<S, N>(
  interceptor: &Interceptor<S, N>,
  _event: LifecycleEvent,
) -> BoxFuture<'_, Result<Completion>>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  Box::pin(async move { interceptor.on_install().await.map(Completion::Installed) })
}

fn handle_activate<S, N>(
  interceptor: &Interceptor<S, N>,
  _event: LifecycleEvent,
) -> BoxFuture<'_, Result<Completion>>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  Box::pin(async move { interceptor.on_activate().await.map(Completion::Activated) })
}

fn handle_fetch<S, N>(
  interceptor: &Interceptor<S, N>,
  event: LifecycleEvent,
) -> BoxFuture<'_, Result<Completion>>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  Box::pin(async move {
    match event {
      LifecycleEvent::Fetch(request) => interceptor
        .on_fetch(request)
        .await
        .map(Completion::Responded),
      other => Err(WorkerError::Lifecycle(format!(
        "fetch handler received '{}' event",
        other.name()
      ))),
    }
  })
}
