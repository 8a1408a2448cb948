use crate::{
    acl::Acl,
    app::{AppState, build_router, gem_routes},
    auth::{
        AnonymousAuth, AnonymousResolver, ApiKeyIdentities, Authentication, IdentityResolver,
        KeyringAuth,
    },
    config::Config,
    error::RegistryError,
    observability,
    registry::{HandlerContext, HandlerRegistry},
    storage::FsStorage,
};
use axum::{http::StatusCode, serve::ListenerExt};
use std::sync::Arc;
use tracing::instrument;

#[instrument(skip(config))]
pub fn build_state(config: &Config) -> Result<AppState, RegistryError> {
    let storage = Arc::new(FsStorage::new(&config.data_dir));

    let (auth, resolver, acl): (Arc<dyn Authentication>, Arc<dyn IdentityResolver>, Acl) =
        if config.open_access {
            tracing::warn!("open access enabled: every caller is anonymous and fully authorized");
            (Arc::new(AnonymousAuth), Arc::new(AnonymousResolver), Acl::open())
        } else {
            let auth: Arc<dyn Authentication> = Arc::new(KeyringAuth::new(config.users.clone()));
            let resolver = Arc::new(ApiKeyIdentities::new(auth.clone()));
            (auth, resolver, Acl::new(config.grants.clone()))
        };

    let ctx = HandlerContext {
        storage,
        auth,
        max_body_size: config.max_body_size,
    };
    let registry = HandlerRegistry::with_defaults();
    let router = gem_routes(&registry, &ctx, resolver, Arc::new(acl)).map_err(|err| {
        RegistryError::http(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid routing configuration: {err}"),
        )
    })?;

    Ok(AppState {
        router: Arc::new(router),
    })
}

pub async fn run(config: Config) -> Result<(), RegistryError> {
    let bind = config.bind;
    let data_dir = config.data_dir.display().to_string();
    let state = build_state(&config)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?.tap_io(|io| {
        let _ = io.set_nodelay(true);
    });

    tracing::info!(
        bind = %bind,
        data_dir,
        open_access = config.open_access,
        "gemgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| RegistryError::Internal)
}

pub async fn run_standalone(config: Config) -> Result<(), RegistryError> {
    let tracing_settings = observability::init_from_env(&config.log_level);
    tracing::debug!(
        log_filter = tracing_settings.filter,
        log_format = tracing_settings.log_format.as_str(),
        "initialized tracing subscriber"
    );
    run(config).await
}

pub async fn run_from_env() -> Result<(), RegistryError> {
    let config = Config::from_env().map_err(|err| {
        RegistryError::http(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid runtime configuration: {err}"),
        )
    })?;
    run_standalone(config).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                let _ = sigterm.recv().await;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
