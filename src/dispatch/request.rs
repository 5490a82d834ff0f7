// src/dispatch/request.rs — Abstract request handed over by a transport binding

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dispatch::response::Status;

/// Where a request goes: tenant space, application, and the sub-resource path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub space: String,
    pub app: String,
    pub resource: Vec<String>,
}

impl Route {
    pub fn new(space: &str, app: &str, resource: &[&str]) -> Self {
        Self {
            space: space.to_string(),
            app: app.to_string(),
            resource: resource.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn resource_path(&self) -> String {
        self.resource.join("/")
    }
}

type Release = Box<dyn FnOnce() + Send>;

pub struct Request {
    id: String,
    verb: String,
    endpoint: String,
    path: String,
    timestamp: DateTime<Utc>,
    headers: BTreeMap<String, String>,
    internal: bool,
    route: RwLock<Option<Route>>,
    bypass: AtomicBool,
    short_circuit: Mutex<Option<(Status, Vec<u8>)>>,
    releasables: Mutex<Vec<Release>>,
    released: AtomicBool,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("verb", &self.verb)
            .field("endpoint", &self.endpoint)
            .field("path", &self.path)
            .field("route", &*self.route.read())
            .finish()
    }
}

impl Request {
    /// An inbound request; its route is derived by the request visitor.
    pub fn new(verb: &str, endpoint: &str, path: &str) -> Self {
        Self::build(verb, endpoint, path, false, None)
    }

    /// A request raised inside the server with its route already known.
    /// The visitor is skipped for these.
    pub fn internal(verb: &str, route: Route) -> Self {
        let path = format!("/{}/{}/{}", route.space, route.app, route.resource_path());
        Self::build(verb, "", &path, true, Some(route))
    }

    fn build(verb: &str, endpoint: &str, path: &str, internal: bool, route: Option<Route>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            verb: verb.to_uppercase(),
            endpoint: endpoint.to_string(),
            path: path.to_string(),
            timestamp: Utc::now(),
            headers: BTreeMap::new(),
            internal,
            route: RwLock::new(route),
            bypass: AtomicBool::new(false),
            short_circuit: Mutex::new(None),
            releasables: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn route(&self) -> Option<Route> {
        self.route.read().clone()
    }

    pub fn set_route(&self, route: Route) {
        *self.route.write() = Some(route);
    }

    /// Mark the request as handled elsewhere; dispatch stops without writing.
    pub fn bypass(&self) {
        self.bypass.store(true, Ordering::SeqCst);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::SeqCst)
    }

    /// Answer the request up front; dispatch writes this and stops.
    pub fn short_circuit(&self, status: Status, body: impl Into<Vec<u8>>) {
        *self.short_circuit.lock() = Some((status, body.into()));
    }

    pub fn take_short_circuit(&self) -> Option<(Status, Vec<u8>)> {
        self.short_circuit.lock().take()
    }

    /// Register something to free once the request is done (upload streams,
    /// temp files, ...).
    pub fn on_release(&self, release: impl FnOnce() + Send + 'static) {
        self.releasables.lock().push(Box::new(release));
    }

    /// Free held resources. Only the first call does anything; it returns
    /// true.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let releasables = std::mem::take(&mut *self.releasables.lock());
        for release in releasables {
            release();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}
