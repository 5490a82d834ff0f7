// src/dispatch/visitor.rs — Derive a request's route from its endpoint and path
//
// Each of space, api and resource is read from either the endpoint's host
// tokens (split on `.`) or the path tokens (split on `/`), at a configured
// index. The resource takes every token from its index onward.

use crate::dispatch::request::{Request, Route};
use crate::infra::config::{Placeholder, RoutingConfig, TargetConfig};
use crate::infra::errors::RoutingError;

pub trait RequestVisitor: Send + Sync {
    fn visit(&self, request: &Request) -> Result<Route, RoutingError>;
}

pub struct DefaultRequestVisitor {
    config: RoutingConfig,
}

#[derive(Clone, Copy)]
enum Target {
    Space,
    Api,
    Resource,
}

impl Target {
    fn name(&self) -> &'static str {
        match self {
            Target::Space => "space",
            Target::Api => "api",
            Target::Resource => "resource",
        }
    }

    fn default_index(&self) -> usize {
        match self {
            Target::Space => 0,
            Target::Api => 1,
            Target::Resource => 2,
        }
    }
}

fn tokens(s: &str, sep: char) -> Vec<&str> {
    s.split(sep).filter(|t| !t.is_empty()).collect()
}

impl DefaultRequestVisitor {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    fn target(&self, target: Target) -> &TargetConfig {
        match target {
            Target::Space => &self.config.space,
            Target::Api => &self.config.api,
            Target::Resource => &self.config.resource,
        }
    }

    fn name_of(
        &self,
        target: Target,
        endpoint: &[&str],
        path: &[&str],
    ) -> Result<String, RoutingError> {
        let cfg = self.target(target);
        let raw = match &cfg.value {
            Some(v) => v.clone(),
            None => {
                let list = pick(cfg, endpoint, path);
                let index = cfg.index.unwrap_or(target.default_index());
                list.get(index)
                    .map(|t| t.to_string())
                    .ok_or_else(|| RoutingError::Unresolved {
                        target: target.name().to_string(),
                        reason: format!(
                            "no {} token at index {index}",
                            placeholder_name(cfg.placeholder)
                        ),
                    })?
            }
        };
        Ok(cfg.mapping.get(&raw).cloned().unwrap_or(raw))
    }

    fn resource_of(&self, endpoint: &[&str], path: &[&str]) -> Vec<String> {
        let cfg = self.target(Target::Resource);
        if let Some(v) = &cfg.value {
            return tokens(v, '/').into_iter().map(String::from).collect();
        }
        let list = pick(cfg, endpoint, path);
        let index = cfg.index.unwrap_or(Target::Resource.default_index());
        list.iter().skip(index).map(|t| t.to_string()).collect()
    }

    /// Inverse of `visit`: the endpoint and path a request for
    /// `space`/`api`/`service` should carry to route back to it.
    pub fn guess(&self, host: &str, space: &str, api: &str, service: &str) -> (String, String) {
        let mut endpoint = host.to_string();
        let mut path = format!("/{}", service.trim_start_matches('/'));
        if self.config.api.placeholder == Placeholder::Path {
            path = format!("/{api}{path}");
        }
        if self.config.space.placeholder == Placeholder::Path {
            path = format!("/{space}{path}");
        } else {
            endpoint = format!("{space}.{endpoint}");
        }
        (endpoint, path)
    }
}

fn pick<'a>(cfg: &TargetConfig, endpoint: &'a [&'a str], path: &'a [&'a str]) -> &'a [&'a str] {
    match cfg.placeholder {
        Placeholder::Endpoint => endpoint,
        Placeholder::Path => path,
    }
}

fn placeholder_name(p: Placeholder) -> &'static str {
    match p {
        Placeholder::Endpoint => "endpoint",
        Placeholder::Path => "path",
    }
}

impl RequestVisitor for DefaultRequestVisitor {
    fn visit(&self, request: &Request) -> Result<Route, RoutingError> {
        let path = self
            .config
            .statics
            .get(request.path())
            .map(String::as_str)
            .unwrap_or(request.path());
        let path = path.trim_matches('/');

        let endpoint = tokens(request.endpoint(), '.');
        let path = tokens(path, '/');

        let route = Route {
            space: self.name_of(Target::Space, &endpoint, &path)?,
            app: self.name_of(Target::Api, &endpoint, &path)?,
            resource: self.resource_of(&endpoint, &path),
        };
        tracing::debug!(
            "Request {} routed to {}/{} [{}]",
            request.id(),
            route.space,
            route.app,
            route.resource_path()
        );
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::TargetConfig;

    fn endpoint_space() -> RoutingConfig {
        let mut c = RoutingConfig::default();
        c.space = TargetConfig {
            placeholder: Placeholder::Endpoint,
            index: Some(0),
            ..Default::default()
        };
        c.api.index = Some(0);
        c.resource.index = Some(1);
        c
    }

    #[test]
    fn test_default_path_routing() {
        let v = DefaultRequestVisitor::new(RoutingConfig::default());
        let route = v
            .visit(&Request::new("GET", "localhost", "/acme/shop/orders/42/"))
            .unwrap();
        assert_eq!(route, Route::new("acme", "shop", &["orders", "42"]));
    }

    #[test]
    fn test_space_from_endpoint_with_mapping() {
        let mut c = endpoint_space();
        c.space.mapping.insert("www".into(), "public".into());
        let v = DefaultRequestVisitor::new(c);

        let route = v
            .visit(&Request::new("GET", "acme.example.com", "/shop/orders"))
            .unwrap();
        assert_eq!(route, Route::new("acme", "shop", &["orders"]));

        let route = v
            .visit(&Request::new("GET", "www.example.com", "/site"))
            .unwrap();
        assert_eq!(route.space, "public");
        assert!(route.resource.is_empty());
    }

    #[test]
    fn test_literal_value_skips_lookup() {
        let mut c = RoutingConfig::default();
        c.space.value = Some("acme".into());
        c.api.index = Some(0);
        c.resource.index = Some(1);
        let v = DefaultRequestVisitor::new(c);
        let route = v.visit(&Request::new("GET", "h", "/shop/a/b")).unwrap();
        assert_eq!(route, Route::new("acme", "shop", &["a", "b"]));
    }

    #[test]
    fn test_statics_rewrite_path() {
        let mut c = RoutingConfig::default();
        c.statics
            .insert("/health".into(), "/sys/status/health".into());
        let v = DefaultRequestVisitor::new(c);
        let route = v.visit(&Request::new("GET", "h", "/health")).unwrap();
        assert_eq!(route, Route::new("sys", "status", &["health"]));
    }

    #[test]
    fn test_missing_token_is_unresolved() {
        let v = DefaultRequestVisitor::new(RoutingConfig::default());
        let err = v.visit(&Request::new("GET", "h", "/acme")).unwrap_err();
        assert!(matches!(err, RoutingError::Unresolved { ref target, .. } if target == "api"));
    }

    #[test]
    fn test_guess_inverts_visit() {
        let v = DefaultRequestVisitor::new(endpoint_space());
        let (endpoint, path) = v.guess("example.com", "acme", "shop", "orders/1");
        assert_eq!(endpoint, "acme.example.com");
        assert_eq!(path, "/shop/orders/1");
        let route = v.visit(&Request::new("GET", &endpoint, &path)).unwrap();
        assert_eq!(route, Route::new("acme", "shop", &["orders", "1"]));

        let v = DefaultRequestVisitor::new(RoutingConfig::default());
        let (endpoint, path) = v.guess("example.com", "acme", "shop", "/orders");
        assert_eq!(endpoint, "example.com");
        assert_eq!(path, "/acme/shop/orders");
    }
}
