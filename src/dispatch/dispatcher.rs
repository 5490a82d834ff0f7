// src/dispatch/dispatcher.rs — Request dispatch pipeline
//
// keys → route → bypass / short-circuit → space → application → submit.
// Every stage either hands over to the next or ends the request with a
// terminal status. The request's held resources are released exactly once,
// whichever way it ends: here for synchronous dispatch, by the job itself
// for asynchronous dispatch.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::dispatch::interceptor::InterceptorChain;
use crate::dispatch::request::Request;
use crate::dispatch::response::{Response, Status};
use crate::dispatch::visitor::RequestVisitor;
use crate::infra::config::KeysConfig;
use crate::infra::errors::{Result, RoutingError, SpaceportError};
use crate::space::executor::{Job, Mode};
use crate::space::{Application, Space, Spaces};

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The chain ran to completion (sync mode).
    Completed,
    /// The job was accepted and owns the response (async mode).
    Accepted,
    /// Marked bypassed upstream; nothing was written.
    Bypassed,
    /// An upstream stage supplied the response; it was written as is.
    ShortCircuited(Status),
    /// Terminal failure; an error body with this status was written.
    Failed(Status),
}

impl Outcome {
    pub fn status(&self) -> Option<Status> {
        match self {
            Outcome::Completed => None,
            Outcome::Accepted => Some(Status::Accepted),
            Outcome::Bypassed => None,
            Outcome::ShortCircuited(s) | Outcome::Failed(s) => Some(*s),
        }
    }
}

enum Stage {
    Bypassed,
    ShortCircuit(Status, Vec<u8>),
    Ready {
        space: Arc<Space>,
        app: Arc<Application>,
    },
}

/// Releases the request when dropped.
struct ReleaseGuard(Arc<Request>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct Dispatcher {
    keys: RwLock<KeysConfig>,
    spaces: Arc<Spaces>,
    visitor: Arc<dyn RequestVisitor>,
    chain: Arc<InterceptorChain>,
}

impl Dispatcher {
    pub fn new(
        keys: KeysConfig,
        spaces: Arc<Spaces>,
        visitor: Arc<dyn RequestVisitor>,
        chain: InterceptorChain,
    ) -> Self {
        Self {
            keys: RwLock::new(keys),
            spaces,
            visitor,
            chain: Arc::new(chain),
        }
    }

    /// Rotate the server's credential material.
    pub fn set_keys(&self, keys: KeysConfig) {
        *self.keys.write() = keys;
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    pub async fn dispatch(
        &self,
        request: Arc<Request>,
        response: Arc<dyn Response>,
        mode: Mode,
    ) -> Outcome {
        let mut guard = Some(ReleaseGuard(request.clone()));

        let result = match self.prepare(&request) {
            Ok(Stage::Bypassed) => {
                tracing::debug!("Request {} bypassed", request.id());
                Ok(Outcome::Bypassed)
            }
            Ok(Stage::ShortCircuit(status, body)) => {
                response.write(status, &body);
                Ok(Outcome::ShortCircuited(status))
            }
            Ok(Stage::Ready { space, app }) => {
                self.submit(&space, app, &request, &response, mode, &mut guard)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let status = e.status();
                self.log_failure(&request, &e);
                response.send_error(status, &e.to_string());
                Outcome::Failed(status)
            }
        }
    }

    fn prepare(&self, request: &Request) -> Result<Stage> {
        if let Some(expires_at) = self.keys.read().expires_at {
            if expires_at < Utc::now() {
                return Err(SpaceportError::CredentialsExpired(expires_at));
            }
        }

        let route = match request.route() {
            Some(route) => route,
            None => {
                let route = self.visitor.visit(request)?;
                request.set_route(route.clone());
                route
            }
        };

        if request.is_bypassed() {
            return Ok(Stage::Bypassed);
        }
        if let Some((status, body)) = request.take_short_circuit() {
            return Ok(Stage::ShortCircuit(status, body));
        }

        let space = self
            .spaces
            .get(&route.space)
            .ok_or_else(|| RoutingError::SpaceNotFound(route.space.clone()))?;
        if !space.is_started() {
            return Err(RoutingError::SpaceUnavailable(route.space).into());
        }

        let app = space
            .application(&route.app)
            .ok_or_else(|| RoutingError::AppNotFound {
                space: route.space.clone(),
                app: route.app.clone(),
            })?;
        if !app.is_running() {
            return Err(RoutingError::AppUnavailable {
                space: route.space,
                app: route.app,
            }
            .into());
        }

        Ok(Stage::Ready { space, app })
    }

    async fn submit(
        &self,
        space: &Space,
        app: Arc<Application>,
        request: &Arc<Request>,
        response: &Arc<dyn Response>,
        mode: Mode,
        guard: &mut Option<ReleaseGuard>,
    ) -> Result<Outcome> {
        let executor = space
            .executor()
            .ok_or_else(|| RoutingError::SpaceUnavailable(space.namespace().to_string()))?;

        let release = match mode {
            Mode::Async => guard.take(),
            Mode::Sync => None,
        };
        let chain = self.chain.clone();
        let job_request = request.clone();
        let job_response = response.clone();
        let label = format!("{} {}", request.verb(), request.path());
        let job = Job::new(request.id(), &label, async move {
            let _release = release;
            chain
                .run(&app, &job_request, job_response.as_ref())
                .await
        });

        executor.submit(job, mode).await?;
        Ok(match mode {
            Mode::Sync => Outcome::Completed,
            Mode::Async => Outcome::Accepted,
        })
    }

    fn log_failure(&self, request: &Request, error: &SpaceportError) {
        match error {
            SpaceportError::Execution(cause) => {
                let thread = std::thread::current();
                tracing::error!(
                    request = request.id(),
                    thread = thread.name().unwrap_or("unnamed"),
                    thread_id = ?thread.id(),
                    "Execution of {} {} failed: {cause}",
                    request.verb(),
                    request.path()
                );
            }
            SpaceportError::CredentialsExpired(_) => {
                tracing::warn!(request = request.id(), "{error}");
            }
            _ => tracing::debug!(request = request.id(), "{error}"),
        }
    }
}
