//! Rule-based request routing: an ordered table of (predicate, handler)
//! bindings evaluated first-match-wins, with a mandatory catch-all binding.

use crate::error::RegistryError;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

/// The contract every endpoint implements: consume a request, produce a
/// response. Errors are translated into well-formed responses at the
/// dispatch boundary, so a failing handler can never tear down the server.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path matcher over whole segments. `{name}` segments match any single
/// segment and capture it; everything else must be equal verbatim. A pattern
/// never matches part of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| {
                match part
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(part.to_string()),
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }

    /// Returns the `{param}` captures for `path`, or `None` when the path
    /// does not match.
    pub fn captures<'p>(&self, path: &'p str) -> Option<Vec<(&str, &'p str)>> {
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.as_str(), *part)),
            }
        }
        Some(params)
    }
}

/// A pure boolean test over the request line, composable with `All`.
#[derive(Debug, Clone)]
pub enum Predicate {
    ByMethod(Method),
    ByPath(PathPattern),
    All(Vec<Predicate>),
    Fallback,
}

impl Predicate {
    pub fn path(pattern: &str) -> Self {
        Self::ByPath(PathPattern::parse(pattern))
    }

    pub fn all(predicates: impl Into<Vec<Predicate>>) -> Self {
        Self::All(predicates.into())
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        match self {
            Self::ByMethod(expected) => method == expected,
            Self::ByPath(pattern) => pattern.matches(path),
            // an empty conjunction is vacuously true
            Self::All(predicates) => predicates.iter().all(|p| p.matches(method, path)),
            Self::Fallback => true,
        }
    }

    fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

/// One row of the routing table.
pub struct Binding {
    predicate: Predicate,
    handler: Arc<dyn Handler>,
}

impl Binding {
    pub fn new(predicate: Predicate, handler: Arc<dyn Handler>) -> Self {
        Self { predicate, handler }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteConfigError {
    #[error("routing table must end with a fallback binding")]
    MissingFallback,
    #[error("no handler registered under id `{0}`")]
    UnknownHandler(String),
}

/// An immutable, ordered routing table. Built once at startup and shared
/// read-only across concurrent dispatches; at most one binding's handler
/// runs per request.
pub struct Router {
    bindings: Vec<Binding>,
}

impl Router {
    /// Validates that the table terminates in a fallback binding. A table
    /// that could leave a request unanswered is a configuration error and
    /// is rejected here, before the server starts listening.
    pub fn new(bindings: Vec<Binding>) -> Result<Self, RouteConfigError> {
        let has_trailing_fallback = bindings
            .last()
            .is_some_and(|binding| binding.predicate.is_fallback());
        if !has_trailing_fallback {
            return Err(RouteConfigError::MissingFallback);
        }
        Ok(Self { bindings })
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        for (index, binding) in self.bindings.iter().enumerate() {
            if !binding.predicate.matches(&method, &path) {
                continue;
            }
            debug!(binding = index, %method, path, "route matched");
            return match binding.handler.handle(req).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };
        }
        // Router::new guarantees the trailing fallback matched above.
        error!(%method, path, "no binding matched despite fallback");
        RegistryError::Internal.into_response()
    }
}
