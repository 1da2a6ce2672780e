use std::{process, sync::Arc, time::Duration};

use scorta::{
    application::error::AppError,
    application::origin::OriginLoader,
    cache::{CacheConfig, CacheStore, CacheWarmer, ContentCacheService, PopularityTracker},
    config,
    infra::{
        content_store::ContentDirOrigin,
        db::PostgresOrigin,
        error::InfraError,
        http::{self, AppState},
        redis::RedisStore,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Warm(_) => run_warm(settings).await,
    }
}

struct ApplicationContext {
    state: AppState,
    warmer: Arc<CacheWarmer>,
}

async fn build_context(
    settings: &config::Settings,
    shutdown: watch::Receiver<bool>,
) -> Result<ApplicationContext, AppError> {
    let store = init_store(settings).await?;
    let origin = init_origin(settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);

    let content = Arc::new(ContentCacheService::new(
        store.clone(),
        origin,
        cache_config.clone(),
    ));
    let popularity = Arc::new(PopularityTracker::new(store.clone()));
    let warmer = Arc::new(CacheWarmer::new(
        store,
        content.clone(),
        popularity.clone(),
        cache_config,
        shutdown,
    ));

    Ok(ApplicationContext {
        state: AppState {
            content,
            popularity,
            warmer: warmer.clone(),
            warm_token: settings.warming.token.clone(),
        },
        warmer,
    })
}

async fn init_store(
    settings: &config::Settings,
) -> Result<Option<Arc<dyn CacheStore>>, AppError> {
    if !settings.store.enabled {
        warn!(
            target: "scorta::bootstrap",
            "cache store disabled, serving origin-only with view tracking off"
        );
        return Ok(None);
    }
    let store = RedisStore::connect(&settings.store.url)
        .await
        .map_err(|err| InfraError::store(err.to_string()))?;
    Ok(Some(Arc::new(store)))
}

async fn init_origin(settings: &config::Settings) -> Result<Arc<dyn OriginLoader>, AppError> {
    match settings.origin.backend {
        config::OriginBackend::Postgres => {
            let url = settings
                .origin
                .database_url
                .as_ref()
                .ok_or_else(|| InfraError::configuration("database url is not configured"))?;
            let pool = PostgresOrigin::connect(url, settings.origin.max_connections.get())
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            let origin = PostgresOrigin::new(pool);
            origin
                .health_check()
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            info!(target: "scorta::bootstrap", "origin backend: postgres");
            Ok(Arc::new(origin))
        }
        config::OriginBackend::ContentDir => {
            let root = settings.origin.content_dir.clone();
            info!(
                target: "scorta::bootstrap",
                root = %root.display(),
                "origin backend: content directory"
            );
            Ok(Arc::new(ContentDirOrigin::new(root)))
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = build_context(&settings, shutdown_rx).await?;

    // Optional in-process warming cadence; external schedulers use the
    // endpoint or the `warm` subcommand instead.
    let warm_handle = settings.warming.interval.map(|interval| {
        let warmer = app.warmer.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                let outcome = warmer.trigger().await;
                info!(
                    target: "scorta::warmer",
                    success = outcome.success(),
                    detail = outcome.message(),
                    "scheduled warm run"
                );
            }
        })
    });

    let router = http::build_router(app.state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(target: "scorta::bootstrap", addr = %settings.server.addr, "listening");

    let drain_limit = drain_deadline(shutdown_tx.subscribe(), settings.server.graceful_shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_limit => {
            warn!(
                target: "scorta::bootstrap",
                "graceful shutdown deadline exceeded, abandoning open connections"
            );
        }
    }

    if let Some(handle) = warm_handle {
        handle.abort();
        let _ = handle.await;
    }

    Ok(())
}

/// Resolves one drain window after the shutdown signal fires; pending forever
/// when no signal ever arrives.
async fn drain_deadline(mut shutdown: watch::Receiver<bool>, limit: Duration) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(limit).await;
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "scorta::bootstrap", error = %err, "failed to listen for ctrl-c");
        return;
    }
    info!(target: "scorta::bootstrap", "shutdown signal received");
    let _ = shutdown_tx.send(true);
}

async fn run_warm(settings: config::Settings) -> Result<(), AppError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = build_context(&settings, shutdown_rx).await?;

    let outcome = app.warmer.trigger().await;
    match &outcome {
        scorta::cache::TriggerOutcome::Completed { message } => {
            info!(target: "scorta::warmer", outcome = %message, "warm run completed");
            Ok(())
        }
        // Another process holds the lock; for a cron caller that is success.
        scorta::cache::TriggerOutcome::AlreadyRunning => {
            info!(target: "scorta::warmer", "a warm run is already in progress");
            Ok(())
        }
        other => Err(AppError::unexpected(other.message().to_string())),
    }
}
