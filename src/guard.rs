//! Authorization decoration: wraps a handler so that identity resolution and
//! a permission check happen before the handler ever sees the request.

use crate::{
    acl::Acl,
    auth::IdentityResolver,
    error::{RegistryError, forbidden, unauthorized},
    route::Handler,
};
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::sync::Arc;
use tracing::debug;

/// A handler guarded by a required permission. Resolution strictly precedes
/// authorization; an unresolved identity never reaches the permission check.
/// On success the inner handler's response passes through untouched.
pub struct Guarded {
    inner: Arc<dyn Handler>,
    permission: String,
    resolver: Arc<dyn IdentityResolver>,
    acl: Arc<Acl>,
}

impl Guarded {
    pub fn new(
        inner: Arc<dyn Handler>,
        permission: impl Into<String>,
        resolver: Arc<dyn IdentityResolver>,
        acl: Arc<Acl>,
    ) -> Self {
        Self {
            inner,
            permission: permission.into(),
            resolver,
            acl,
        }
    }
}

#[async_trait]
impl Handler for Guarded {
    async fn handle(&self, req: Request<Body>) -> Result<Response, RegistryError> {
        let Some(identity) = self.resolver.resolve(req.headers()).await? else {
            debug!(permission = self.permission, "no identity resolved");
            return Err(unauthorized("authentication required"));
        };
        if !self.acl.allowed(Some(&identity), &self.permission) {
            debug!(
                identity = identity.as_str(),
                permission = self.permission,
                "permission denied"
            );
            return Err(forbidden("permission denied"));
        }
        self.inner.handle(req).await
    }
}
