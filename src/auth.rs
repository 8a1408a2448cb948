//! Caller identity: how credentials on a request turn into a principal.
//!
//! RubyGems clients send the API key in the `Authorization` header as
//! `base64(login:secret)`, with or without a `Basic ` prefix. Resolvers only
//! inspect headers; they never mutate the request.

use crate::error::RegistryError;
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

pub const ANONYMOUS: &str = "anonymous";

/// A resolved caller principal. Opaque to the routing core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Credential verification backend, injected at construction time.
#[async_trait]
pub trait Authentication: Send + Sync {
    async fn authenticate(
        &self,
        login: &str,
        secret: &str,
    ) -> Result<Option<Identity>, RegistryError>;
}

/// Accepts any credential pair and resolves it to the anonymous identity.
/// Only installed when open-access mode is explicitly configured.
#[derive(Debug, Default)]
pub struct AnonymousAuth;

#[async_trait]
impl Authentication for AnonymousAuth {
    async fn authenticate(
        &self,
        _login: &str,
        _secret: &str,
    ) -> Result<Option<Identity>, RegistryError> {
        Ok(Some(Identity::anonymous()))
    }
}

/// Static login/secret pairs from configuration.
#[derive(Debug, Default)]
pub struct KeyringAuth {
    users: HashMap<String, String>,
}

impl KeyringAuth {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authentication for KeyringAuth {
    async fn authenticate(
        &self,
        login: &str,
        secret: &str,
    ) -> Result<Option<Identity>, RegistryError> {
        match self.users.get(login) {
            Some(expected) if expected == secret => Ok(Some(Identity::new(login))),
            _ => Ok(None),
        }
    }
}

/// Extracts a caller identity from request credentials.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, RegistryError>;
}

/// Open-access resolver: every request, credentialed or not, is anonymous.
#[derive(Debug, Default)]
pub struct AnonymousResolver;

#[async_trait]
impl IdentityResolver for AnonymousResolver {
    async fn resolve(&self, _headers: &HeaderMap) -> Result<Option<Identity>, RegistryError> {
        Ok(Some(Identity::anonymous()))
    }
}

/// Resolves the RubyGems API key carried in the `Authorization` header
/// against an [`Authentication`] backend.
pub struct ApiKeyIdentities {
    auth: Arc<dyn Authentication>,
}

impl ApiKeyIdentities {
    pub fn new(auth: Arc<dyn Authentication>) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl IdentityResolver for ApiKeyIdentities {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, RegistryError> {
        let Some((login, secret)) = api_key_credentials(headers) else {
            debug!("no usable api key on request");
            return Ok(None);
        };
        self.auth.authenticate(&login, &secret).await
    }
}

/// Decodes `Authorization: [Basic ]base64(login:secret)` into its parts.
/// Malformed base64 or a missing `:` yields no credentials.
pub fn api_key_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .trim();
    let encoded = raw
        .strip_prefix("Basic ")
        .or_else(|| raw.strip_prefix("basic "))
        .unwrap_or(raw);
    let decoded = B64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, secret) = decoded.split_once(':')?;
    Some((login.to_string(), secret.to_string()))
}

/// The API key issued for a credential pair: the same base64 form the
/// client will later send back in the `Authorization` header.
pub fn api_key_for(login: &str, secret: &str) -> String {
    B64.encode(format!("{login}:{secret}"))
}
