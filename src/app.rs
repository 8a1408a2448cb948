//! Wires the default gem-registry routing table and exposes it through a
//! single-fallback axum router.

use crate::{
    acl::Acl,
    api::{self, GemInfo, StaticStatus},
    auth::IdentityResolver,
    guard::Guarded,
    registry::{HandlerContext, HandlerRegistry},
    route::{Binding, Handler, Predicate, RouteConfigError, Router},
};
use axum::{
    Router as AxumRouter,
    http::{Method, StatusCode},
    routing::any,
};
use std::sync::Arc;

pub const PERMISSION_PUSH: &str = "push";
pub const PERMISSION_INSTALL: &str = "install";

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
}

pub fn build_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .fallback(any(api::dispatch))
        .with_state(state)
}

/// Builds the default front-door routing table:
///
/// - `POST /api/v1/gems` → push, guarded by "push"
/// - `GET /api/v1/api_key` → api key issuance
/// - `GET /api/v1/gems/{spec}` → gem metadata, no auth
/// - any other `GET` → download, guarded by "install"
/// - everything else → 404, empty body
///
/// Order is significant: the metadata binding must precede the catch-all
/// download binding, and the fallback terminates the table.
pub fn gem_routes(
    registry: &HandlerRegistry,
    ctx: &HandlerContext,
    resolver: Arc<dyn IdentityResolver>,
    acl: Arc<Acl>,
) -> Result<Router, RouteConfigError> {
    let push = guarded(
        registry.resolve("push", ctx)?,
        PERMISSION_PUSH,
        &resolver,
        &acl,
    );
    let api_key = registry.resolve("api_key", ctx)?;
    let gem_info = registry.resolve("gem_info", ctx)?;
    let download = guarded(
        registry.resolve("download", ctx)?,
        PERMISSION_INSTALL,
        &resolver,
        &acl,
    );

    Router::new(vec![
        Binding::new(
            Predicate::all(vec![
                Predicate::ByMethod(Method::POST),
                Predicate::path("/api/v1/gems"),
            ]),
            push,
        ),
        Binding::new(
            Predicate::all(vec![
                Predicate::ByMethod(Method::GET),
                Predicate::path("/api/v1/api_key"),
            ]),
            api_key,
        ),
        Binding::new(
            Predicate::all(vec![
                Predicate::ByMethod(Method::GET),
                Predicate::path(GemInfo::PATH_PATTERN),
            ]),
            gem_info,
        ),
        Binding::new(Predicate::ByMethod(Method::GET), download),
        Binding::new(
            Predicate::Fallback,
            Arc::new(StaticStatus(StatusCode::NOT_FOUND)),
        ),
    ])
}

fn guarded(
    inner: Arc<dyn Handler>,
    permission: &str,
    resolver: &Arc<dyn IdentityResolver>,
    acl: &Arc<Acl>,
) -> Arc<dyn Handler> {
    Arc::new(Guarded::new(
        inner,
        permission,
        resolver.clone(),
        acl.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{AnonymousAuth, AnonymousResolver},
        storage::MemStorage,
    };

    fn context() -> HandlerContext {
        HandlerContext {
            storage: Arc::new(MemStorage::new()),
            auth: Arc::new(AnonymousAuth),
            max_body_size: 1024,
        }
    }

    #[test]
    fn default_table_builds() {
        let registry = HandlerRegistry::with_defaults();
        let router = gem_routes(
            &registry,
            &context(),
            Arc::new(AnonymousResolver),
            Arc::new(Acl::open()),
        );
        assert!(router.is_ok());
    }

    #[test]
    fn missing_handler_fails_table_construction() {
        let registry = HandlerRegistry::new();
        let err = gem_routes(
            &registry,
            &context(),
            Arc::new(AnonymousResolver),
            Arc::new(Acl::open()),
        )
        .err()
        .expect("must fail");
        assert!(matches!(err, RouteConfigError::UnknownHandler(_)));
    }
}
