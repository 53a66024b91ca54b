//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Reject routes whose pattern does not compile or whose handler arity
//!   does not match the pattern's capture groups
//! - Look up the first route matching a request
//!
//! # Design Decisions
//! - Immutable after startup (shared via Arc without locks)
//! - O(n) scan; registration order is the only priority
//! - Rejected routes are logged and dropped, never fatal

use thiserror::Error;

use crate::observability::metrics;
use crate::routing::handler::{Handler, IntoHandler};
use crate::routing::matcher::{HttpMethod, RoutePattern};

/// Reasons a route is refused at registration.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("route {pattern:?} captures {captures} groups but its handler takes {arity}")]
    ArityMismatch {
        pattern: String,
        captures: usize,
        arity: usize,
    },
}

/// A (pattern, method, handler) binding.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: RoutePattern,
    pub method: HttpMethod,
    pub handler: Handler,
}

/// A route selected for a request, with its captured path segments.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub captures: Vec<String>,
}

/// Ordered route table. First full match wins.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    ///
    /// On failure the route is logged, discarded, and the error returned
    /// for callers that want to inspect it.
    pub fn add<H, M>(&mut self, pattern: &str, method: HttpMethod, handler: H) -> Result<(), RouteError>
    where
        H: IntoHandler<M>,
    {
        match Self::compile(pattern, method, handler.into_handler()) {
            Ok(route) => {
                tracing::debug!(pattern = %pattern, method = %method, "Route registered");
                self.routes.push(route);
                Ok(())
            }
            Err(e) => {
                tracing::error!(pattern = %pattern, method = %method, error = %e, "Route rejected");
                metrics::record_route_rejected();
                Err(e)
            }
        }
    }

    fn compile(pattern: &str, method: HttpMethod, handler: Handler) -> Result<Route, RouteError> {
        let compiled = RoutePattern::compile(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let captures = compiled.capture_count();
        if captures != handler.arity() {
            return Err(RouteError::ArityMismatch {
                pattern: pattern.to_string(),
                captures,
                arity: handler.arity(),
            });
        }

        Ok(Route {
            pattern: compiled,
            method,
            handler,
        })
    }

    /// Register a GET route. HEAD requests are served by it as well.
    pub fn get<H, M>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: IntoHandler<M>,
    {
        let _ = self.add(pattern, HttpMethod::Get, handler);
        self
    }

    pub fn post<H, M>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: IntoHandler<M>,
    {
        let _ = self.add(pattern, HttpMethod::Post, handler);
        self
    }

    pub fn put<H, M>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: IntoHandler<M>,
    {
        let _ = self.add(pattern, HttpMethod::Put, handler);
        self
    }

    pub fn delete<H, M>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: IntoHandler<M>,
    {
        let _ = self.add(pattern, HttpMethod::Delete, handler);
        self
    }

    /// Find the first route whose method accepts `method` and whose
    /// pattern matches all of `path`.
    pub fn find(&self, path: &str, method: HttpMethod) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method.accepts(method))
            .find_map(|route| {
                route
                    .pattern
                    .captures(path)
                    .map(|captures| RouteMatch { route, captures })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::Context;

    #[test]
    fn test_registration_order_wins() {
        let mut table = RouteTable::new();
        table
            .get("/user/([a-z]+)", |name: String| format!("regex {}", name))
            .get("/user/admin", || "literal");

        let found = table.find("/user/admin", HttpMethod::Get).unwrap();
        assert_eq!(found.route.pattern.as_str(), "/user/([a-z]+)");
        assert_eq!(found.captures, vec!["admin".to_string()]);
    }

    #[test]
    fn test_literal_first_takes_priority() {
        let mut table = RouteTable::new();
        table
            .get("/user/admin", || "literal")
            .get("/user/([a-z]+)", |name: String| name);

        let found = table.find("/user/admin", HttpMethod::Get).unwrap();
        assert_eq!(found.route.pattern.as_str(), "/user/admin");
        assert!(found.captures.is_empty());
    }

    #[test]
    fn test_prefix_does_not_match() {
        let mut table = RouteTable::new();
        table.get("/foo", || "foo");
        assert!(table.find("/foobar", HttpMethod::Get).is_none());
        assert!(table.find("/foo", HttpMethod::Get).is_some());
    }

    #[test]
    fn test_method_filtering() {
        let mut table = RouteTable::new();
        table
            .get("/item", || "get")
            .post("/item", || "post")
            .delete("/item/([0-9]+)", |_ctx: &mut Context, _id: String| ());

        assert_eq!(table.find("/item", HttpMethod::Post).unwrap().route.method, HttpMethod::Post);
        assert_eq!(table.find("/item", HttpMethod::Head).unwrap().route.method, HttpMethod::Get);
        assert!(table.find("/item", HttpMethod::Put).is_none());
        assert!(table.find("/item/7", HttpMethod::Delete).is_some());
        assert!(table.find("/item/7", HttpMethod::Get).is_none());
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let mut table = RouteTable::new();
        let err = table.add("/bad(", HttpMethod::Get, || "x").unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_arity_mismatch_is_dropped() {
        let mut table = RouteTable::new();
        let err = table
            .add("/hello/([a-z]+)", HttpMethod::Get, |_ctx: &mut Context| "no args")
            .unwrap_err();
        assert!(matches!(err, RouteError::ArityMismatch { captures: 1, arity: 0, .. }));

        let err = table
            .add("/pair/(a)/(b)", HttpMethod::Get, |a: String| a)
            .unwrap_err();
        assert!(matches!(err, RouteError::ArityMismatch { captures: 2, arity: 1, .. }));
        assert!(table.is_empty());

        table.put("/pair/(a)/(b)", |a: String, b: String| a + &b);
        assert_eq!(table.len(), 1);
    }
}
