// src/dispatch/response.rs — Abstract response and terminal statuses
//
// Transport bindings implement `Response`; the dispatcher only ever
// writes a status plus a body through it.

use parking_lot::Mutex;
use serde::Serialize;

/// Logical outcome statuses. Codes follow HTTP where one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Ok,
    Accepted,
    BadRequest,
    Forbidden,
    NotFound,
    RequestTimeout,
    Unavailable,
    /// Execution cancelled by the space's concurrency policy.
    Cancelled,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Accepted => 202,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::RequestTimeout => 408,
            Status::Unavailable => 503,
            // existing clients expect 507 here
            Status::Cancelled => 507,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Accepted => "Accepted",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::RequestTimeout => "Request Timeout",
            Status::Unavailable => "Service Unavailable",
            Status::Cancelled => "Cancelled",
        }
    }

    pub fn is_error(&self) -> bool {
        self.code() >= 400
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Error body written for terminal failures.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody<'a> {
    pub status: u16,
    pub error: &'a str,
    pub message: &'a str,
}

pub trait Response: Send + Sync {
    /// Write a complete response.
    fn write(&self, status: Status, body: &[u8]);

    /// Write a terminal error.
    fn send_error(&self, status: Status, message: &str) {
        let body = ErrorBody {
            status: status.code(),
            error: status.reason(),
            message,
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        self.write(status, &bytes);
    }
}

/// In-memory response. Used by embedders that bridge to a transport after
/// dispatch, and by tests.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    inner: Mutex<Written>,
}

#[derive(Debug, Default)]
struct Written {
    status: Option<Status>,
    body: Vec<u8>,
    writes: usize,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<Status> {
        self.inner.lock().status
    }

    pub fn body(&self) -> Vec<u8> {
        self.inner.lock().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().body).into_owned()
    }

    /// How many times the response was written.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }
}

impl Response for BufferedResponse {
    fn write(&self, status: Status, body: &[u8]) {
        let mut inner = self.inner.lock();
        inner.status = Some(status);
        inner.body = body.to_vec();
        inner.writes += 1;
    }
}
