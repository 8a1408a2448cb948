//! Pluggable handler resolution: string identifiers mapped to handler
//! factories, resolved once while the routing table is built. An
//! unregistered identifier fails startup, never a request.

use crate::{
    api::{ApiKeyIssue, Download, GemInfo, PushGem},
    auth::Authentication,
    route::{Handler, RouteConfigError},
    storage::Storage,
};
use std::{collections::HashMap, sync::Arc};

/// Everything a handler factory may need, bundled so factories keep a
/// uniform signature.
#[derive(Clone)]
pub struct HandlerContext {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<dyn Authentication>,
    pub max_body_size: usize,
}

pub type HandlerFactory = Box<dyn Fn(&HandlerContext) -> Arc<dyn Handler> + Send + Sync>;

pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The built-in endpoint handlers under their well-known identifiers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("push", |ctx| {
            Arc::new(PushGem::new(ctx.storage.clone(), ctx.max_body_size))
        });
        registry.register("api_key", |ctx| Arc::new(ApiKeyIssue::new(ctx.auth.clone())));
        registry.register("gem_info", |ctx| Arc::new(GemInfo::new(ctx.storage.clone())));
        registry.register("download", |ctx| Arc::new(Download::new(ctx.storage.clone())));
        registry
    }

    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&HandlerContext) -> Arc<dyn Handler> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
    }

    pub fn resolve(
        &self,
        id: &str,
        ctx: &HandlerContext,
    ) -> Result<Arc<dyn Handler>, RouteConfigError> {
        self.factories
            .get(id)
            .map(|factory| factory(ctx))
            .ok_or_else(|| RouteConfigError::UnknownHandler(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::AnonymousAuth, storage::MemStorage};

    fn context() -> HandlerContext {
        HandlerContext {
            storage: Arc::new(MemStorage::new()),
            auth: Arc::new(AnonymousAuth),
            max_body_size: 1024,
        }
    }

    #[test]
    fn resolves_default_handlers() {
        let registry = HandlerRegistry::with_defaults();
        let ctx = context();
        for id in ["push", "api_key", "gem_info", "download"] {
            assert!(registry.resolve(id, &ctx).is_ok(), "missing {id}");
        }
    }

    #[test]
    fn unknown_identifier_is_a_config_error() {
        let registry = HandlerRegistry::with_defaults();
        let err = registry
            .resolve("submit_gem_rb", &context())
            .err()
            .expect("must fail");
        assert!(matches!(err, RouteConfigError::UnknownHandler(id) if id == "submit_gem_rb"));
    }
}
