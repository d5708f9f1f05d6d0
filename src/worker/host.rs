//! Worker host: drives the lifecycle in order and decides which requests are intercepted.

use tracing::{error, info};

use super::dispatch::{Completion, Dispatcher, LifecycleEvent};
use super::interceptor::Interceptor;
use super::outcome::{Fetched, InstallReport, SweepReport};
use crate::cache::CacheStorage;
use crate::error::{Result, WorkerError};
use crate::http::Request;
use crate::network::Network;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, install not attempted yet
  Parsed,
  Installing,
  /// Seeded, waiting for activation
  Installed,
  Activating,
  /// Controls the page; fetches are intercepted
  Activated,
  /// Install failed; this version never activates
  Redundant,
}

pub struct WorkerHost<S: CacheStorage, N: Network> {
  interceptor: Interceptor<S, N>,
  dispatcher: Dispatcher<S, N>,
  state: WorkerState,
}

impl<S, N> WorkerHost<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  /// A freshly registered worker.
  pub fn new(interceptor: Interceptor<S, N>) -> Self {
    Self {
      interceptor,
      dispatcher: Dispatcher::with_defaults(),
      state: WorkerState::Parsed,
    }
  }

  /// Resume a worker from what is already in cache storage.
  ///
  /// Installed when every seed resource is present in the current bucket; activated
  /// when, in addition, an activation has been recorded for it. Stale buckets that
  /// survived the sweep do not matter.
  pub fn attach(interceptor: Interceptor<S, N>) -> Result<Self> {
    let settings = interceptor.settings();
    let storage = interceptor.storage();

    let mut seeded = storage.has(&settings.cache_name)?;
    for url in &settings.seed {
      if !seeded {
        break;
      }
      seeded = storage
        .match_in(&settings.cache_name, &Request::get(url.clone()))?
        .is_some();
    }

    let state = if !seeded {
      WorkerState::Parsed
    } else if storage.is_activated(&settings.cache_name)? {
      WorkerState::Activated
    } else {
      WorkerState::Installed
    };

    Ok(Self {
      state,
      ..Self::new(interceptor)
    })
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn interceptor(&self) -> &Interceptor<S, N> {
    &self.interceptor
  }

  /// Run the install handler. A failure makes this worker redundant.
  pub async fn install(&mut self) -> Result<InstallReport> {
    if self.state != WorkerState::Parsed {
      return Err(WorkerError::Lifecycle(format!(
        "cannot install a worker in state {:?}",
        self.state
      )));
    }

    self.state = WorkerState::Installing;
    let outcome = self
      .dispatcher
      .dispatch(&self.interceptor, LifecycleEvent::Install)
      .await;

    match outcome {
      Ok(Completion::Installed(report)) => {
        self.state = WorkerState::Installed;
        info!(bucket = %report.bucket, "Worker installed");
        Ok(report)
      }
      Ok(other) => {
        self.state = WorkerState::Redundant;
        Err(unexpected("install", &other))
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        error!(error = %e, "Install failed, previous cache stays in control");
        Err(e)
      }
    }
  }

  /// Run the activate handler. Only an installed worker can activate.
  pub async fn activate(&mut self) -> Result<SweepReport> {
    if self.state != WorkerState::Installed {
      return Err(WorkerError::Lifecycle(format!(
        "cannot activate a worker in state {:?}; install must succeed first",
        self.state
      )));
    }

    self.state = WorkerState::Activating;
    let outcome = self
      .dispatcher
      .dispatch(&self.interceptor, LifecycleEvent::Activate)
      .await;

    match outcome {
      Ok(Completion::Activated(report)) => {
        self.state = WorkerState::Activated;
        info!(bucket = %self.interceptor.settings().cache_name, "Worker activated");
        Ok(report)
      }
      Ok(other) => {
        self.state = WorkerState::Installed;
        Err(unexpected("activate", &other))
      }
      Err(e) => {
        self.state = WorkerState::Installed;
        Err(e)
      }
    }
  }

  /// Fetch on behalf of the page. Until activation the page is not controlled,
  /// so requests go straight to the network.
  pub async fn fetch(&self, request: Request) -> Result<Fetched> {
    if self.state != WorkerState::Activated {
      let response = self.interceptor.network().fetch(&request).await?;
      return Ok(Fetched::from_network(response));
    }

    match self
      .dispatcher
      .dispatch(&self.interceptor, LifecycleEvent::Fetch(request))
      .await?
    {
      Completion::Responded(fetched) => Ok(fetched),
      other => Err(unexpected("fetch", &other)),
    }
  }
}

fn unexpected(event: &str, completion: &Completion) -> WorkerError {
  WorkerError::Lifecycle(format!(
    "{} handler completed with unexpected result {:?}",
    event, completion
  ))
}
