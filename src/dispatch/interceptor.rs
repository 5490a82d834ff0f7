// src/dispatch/interceptor.rs — Interceptor chain run inside a space's worker

use async_trait::async_trait;
use std::sync::Arc;

use crate::dispatch::request::Request;
use crate::dispatch::response::Response;
use crate::space::Application;

/// Whether the chain goes on after an interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn intercept(
        &self,
        app: &Application,
        request: &Request,
        response: &dyn Response,
    ) -> anyhow::Result<Flow>;
}

/// Interceptors in the order they run. The last one is normally the
/// application's own handler.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn run(
        &self,
        app: &Application,
        request: &Request,
        response: &dyn Response,
    ) -> anyhow::Result<()> {
        for interceptor in &self.interceptors {
            if interceptor.intercept(app, request, response).await? == Flow::Stop {
                tracing::debug!(
                    "Request {} stopped by interceptor {}",
                    request.id(),
                    interceptor.name()
                );
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::response::{BufferedResponse, Status};
    use parking_lot::Mutex;

    struct Step {
        name: &'static str,
        flow: Flow,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for Step {
        fn name(&self) -> &str {
            self.name
        }

        async fn intercept(
            &self,
            _app: &Application,
            _request: &Request,
            response: &dyn Response,
        ) -> anyhow::Result<Flow> {
            self.seen.lock().push(self.name);
            if self.flow == Flow::Stop {
                response.write(Status::Ok, self.name.as_bytes());
            }
            Ok(self.flow)
        }
    }

    #[tokio::test]
    async fn test_stop_ends_chain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let step = |name, flow| {
            Arc::new(Step {
                name,
                flow,
                seen: seen.clone(),
            }) as Arc<dyn Interceptor>
        };
        let chain = InterceptorChain::new()
            .with(step("auth", Flow::Continue))
            .with(step("cache", Flow::Stop))
            .with(step("handler", Flow::Continue));

        let app = Application::new("acme", "shop");
        let request = Request::new("GET", "h", "/acme/shop");
        let response = BufferedResponse::new();
        chain.run(&app, &request, &response).await.unwrap();

        assert_eq!(*seen.lock(), vec!["auth", "cache"]);
        assert_eq!(response.body_string(), "cache");
        assert_eq!(chain.names(), vec!["auth", "cache", "handler"]);
    }
}
