// tests/dispatch_test.rs — Integration test: request dispatch through a booted server

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use spaceport::dispatch::{
    BufferedResponse, Flow, Interceptor, Outcome, Request, RequestVisitor, Response, Route,
    Status,
};
use spaceport::infra::config::{Config, ExecutorConfig, KeysConfig, SpaceConfig};
use spaceport::infra::errors::RoutingError;
use spaceport::space::executor::Mode;
use spaceport::space::Application;
use spaceport::Server;

// ─── Fixtures ───────────────────────────────────────────────────────────────

/// Application handler: behaves according to the first resource token.
struct Handler {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Interceptor for Handler {
    fn name(&self) -> &str {
        "handler"
    }

    async fn intercept(
        &self,
        app: &Application,
        request: &Request,
        response: &dyn Response,
    ) -> anyhow::Result<Flow> {
        let route = request.route().unwrap_or_else(|| Route::new("", "", &[]));
        self.seen
            .lock()
            .push(format!("{}/{}:{}", app.space(), app.namespace(), route.resource_path()));
        match route.resource.first().map(String::as_str) {
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                response.write(Status::Ok, b"late");
            }
            Some("fail") => anyhow::bail!("order service exploded"),
            _ => response.write(Status::Ok, route.resource_path().as_bytes()),
        }
        Ok(Flow::Continue)
    }
}

/// Stops the chain for DELETE requests before they reach the handler.
struct Guard;

#[async_trait]
impl Interceptor for Guard {
    fn name(&self) -> &str {
        "guard"
    }

    async fn intercept(
        &self,
        _app: &Application,
        request: &Request,
        response: &dyn Response,
    ) -> anyhow::Result<Flow> {
        if request.verb() == "DELETE" {
            response.send_error(Status::Forbidden, "read-only");
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

/// Visitor that counts calls and routes everything to acme/shop.
struct CountingVisitor(Arc<AtomicUsize>);

impl RequestVisitor for CountingVisitor {
    fn visit(&self, _request: &Request) -> Result<Route, RoutingError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Route::new("acme", "shop", &["counted"]))
    }
}

struct Fixture {
    server: Arc<Server>,
    seen: Arc<Mutex<Vec<String>>>,
}

fn config() -> Config {
    let mut config = Config::default();
    config.plugins.home = Some(std::env::temp_dir().join("spaceport-dispatch-no-plugins"));

    let mut acme = SpaceConfig::new("acme");
    acme.apps = vec!["shop".into(), "admin".into()];
    acme.executor = Some(ExecutorConfig {
        workers: 2,
        queue: 2,
        timeout_ms: 200,
        await_termination_ms: 50,
    });
    config.spaces.push(acme);

    let mut dormant = SpaceConfig::new("dormant");
    dormant.apps = vec!["shop".into()];
    dormant.start = false;
    config.spaces.push(dormant);
    config
}

fn fixture() -> Fixture {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = Server::builder(config())
        .interceptor(Arc::new(Guard))
        .interceptor(Arc::new(Handler { seen: seen.clone() }))
        .build();
    server.boot().unwrap();
    Fixture { server, seen }
}

/// A request whose releases are counted.
fn counted_request(verb: &str, path: &str) -> (Arc<Request>, Arc<AtomicUsize>) {
    let request = Arc::new(Request::new(verb, "api.example.com", path));
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    request.on_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (request, released)
}

async fn dispatch(
    server: &Server,
    request: &Arc<Request>,
    mode: Mode,
) -> (Outcome, Arc<BufferedResponse>) {
    let response = Arc::new(BufferedResponse::new());
    let outcome = server
        .dispatch(request.clone(), response.clone() as Arc<dyn Response>, mode)
        .await;
    (outcome, response)
}

// ─── Routing and availability ───────────────────────────────────────────────

#[tokio::test]
async fn test_sync_dispatch_reaches_application() {
    let f = fixture();
    let (request, released) = counted_request("get", "/acme/shop/orders/42");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(response.status(), Some(Status::Ok));
    assert_eq!(response.body_string(), "orders/42");
    assert_eq!(*f.seen.lock(), vec!["acme/shop:orders/42"]);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_space_is_not_found() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/globex/shop/orders");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::NotFound));
    assert_eq!(response.status(), Some(Status::NotFound));
    assert!(response.body_string().contains("globex"));
    assert!(f.seen.lock().is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unresolvable_route_is_not_found() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/acme");

    let (outcome, _) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::NotFound));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stopped_space_is_unavailable() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/dormant/shop/orders");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::Unavailable));
    assert_eq!(response.status(), Some(Status::Unavailable));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_and_stopped_application() {
    let f = fixture();
    let (missing, _) = counted_request("GET", "/acme/billing/invoices");
    let (outcome, _) = dispatch(&f.server, &missing, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::NotFound));

    f.server.stop_application("acme", "shop").unwrap();
    let (stopped, released) = counted_request("GET", "/acme/shop/orders");
    let (outcome, _) = dispatch(&f.server, &stopped, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::Unavailable));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // other applications in the space are unaffected
    let (admin, _) = counted_request("GET", "/acme/admin/users");
    let (outcome, _) = dispatch(&f.server, &admin, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);

    f.server.start_application("acme", "shop").unwrap();
    let (again, _) = counted_request("GET", "/acme/shop/orders");
    let (outcome, _) = dispatch(&f.server, &again, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
}

#[tokio::test]
async fn test_expired_keys_are_forbidden_even_for_valid_routes() {
    let f = fixture();
    f.server.set_keys(KeysConfig {
        access_key: Some("k-1".into()),
        expires_at: Some(Utc::now() - ChronoDuration::hours(1)),
    });
    let (request, released) = counted_request("GET", "/acme/shop/orders");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::Forbidden));
    assert_eq!(response.status(), Some(Status::Forbidden));
    assert!(f.seen.lock().is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);

    f.server.set_keys(KeysConfig {
        access_key: Some("k-2".into()),
        expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
    });
    let (renewed, _) = counted_request("GET", "/acme/shop/orders");
    let (outcome, _) = dispatch(&f.server, &renewed, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
}

// ─── Upstream answers ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_bypassed_request_writes_nothing() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/acme/shop/orders");
    request.bypass();

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Bypassed);
    assert_eq!(response.writes(), 0);
    assert!(f.seen.lock().is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_short_circuit_emits_payload_as_is() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/acme/shop/orders");
    request.short_circuit(Status::Ok, "cached orders");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::ShortCircuited(Status::Ok));
    assert_eq!(response.writes(), 1);
    assert_eq!(response.body_string(), "cached orders");
    assert!(f.seen.lock().is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_interceptor_can_stop_the_chain() {
    let f = fixture();
    let (request, _) = counted_request("DELETE", "/acme/shop/orders/1");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(response.status(), Some(Status::Forbidden));
    assert!(f.seen.lock().is_empty());
}

// ─── Execution outcomes ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_handler_failure_is_bad_request() {
    let f = fixture();
    let (request, released) = counted_request("POST", "/acme/shop/fail");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::BadRequest));
    assert!(response.body_string().contains("order service exploded"));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_is_request_timeout() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/acme/shop/slow");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::RequestTimeout));
    assert_eq!(response.writes(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_dispatch_ends_once_and_releases_once() {
    let mut config = config();
    config.spaces[0].executor = Some(ExecutorConfig {
        workers: 2,
        queue: 2,
        timeout_ms: 10_000,
        await_termination_ms: 50,
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = Server::builder(config)
        .interceptor(Arc::new(Handler { seen: seen.clone() }))
        .build();
    server.boot().unwrap();

    let (request, released) = counted_request("GET", "/acme/shop/slow");
    let response = Arc::new(BufferedResponse::new());
    let running = {
        let server = server.clone();
        let request = request.clone();
        let response = response.clone();
        tokio::spawn(async move {
            server
                .dispatch(request, response as Arc<dyn Response>, Mode::Sync)
                .await
        })
    };

    while seen.lock().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(server.interrupt("acme", request.id()));

    let outcome = running.await.unwrap();
    assert_eq!(outcome, Outcome::Failed(Status::Cancelled));
    assert_eq!(response.status(), Some(Status::Cancelled));
    assert_eq!(response.status().map(|s| s.code()), Some(507));
    assert_eq!(response.writes(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(!server.interrupt("acme", request.id()));
}

#[tokio::test]
async fn test_async_dispatch_is_accepted_and_job_owns_the_response() {
    let f = fixture();
    let (request, released) = counted_request("GET", "/acme/shop/orders/7");

    let (outcome, response) = dispatch(&f.server, &request, Mode::Async).await;
    assert_eq!(outcome, Outcome::Accepted);
    assert_eq!(outcome.status(), Some(Status::Accepted));

    for _ in 0..200 {
        if request.is_released() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(response.body_string(), "orders/7");
    assert_eq!(response.writes(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_internal_request_skips_visitor() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = Server::builder(config())
        .visitor(Arc::new(CountingVisitor(calls.clone())))
        .interceptor(Arc::new(Handler { seen: seen.clone() }))
        .build();
    server.boot().unwrap();

    let internal = Arc::new(Request::internal("get", Route::new("acme", "admin", &["jobs"])));
    let (outcome, response) = dispatch(&server, &internal, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(response.body_string(), "jobs");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (inbound, _) = counted_request("GET", "/whatever");
    let (outcome, response) = dispatch(&server, &inbound, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(response.body_string(), "counted");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *seen.lock(),
        vec!["acme/admin:jobs", "acme/shop:counted"]
    );
}

#[tokio::test]
async fn test_stopped_space_rejects_after_shutdown() {
    let f = fixture();
    f.server.stop_space("acme").await.unwrap();
    let (request, released) = counted_request("GET", "/acme/shop/orders");

    let (outcome, _) = dispatch(&f.server, &request, Mode::Sync).await;
    assert_eq!(outcome, Outcome::Failed(Status::Unavailable));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
