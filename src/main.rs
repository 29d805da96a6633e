use std::{future::IntoFuture, process, sync::Arc};

use dishdash::{
    application::{
        error::AppError,
        orders::{OrderQueryService, OrderStatusService},
        repos::{OrdersRepo, OrdersWriteRepo},
    },
    cache::CacheLayer,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        notify, telemetry,
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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn connect_database(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(PostgresRepositories::new(pool))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect_database(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "dishdash::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = Arc::new(connect_database(&settings).await?);
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let state = build_api_state(repositories, &settings).await?;
    serve_http(&settings, state).await
}

async fn build_api_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApiState, AppError> {
    let orders_repo: Arc<dyn OrdersRepo> = repositories.clone();
    let orders_write_repo: Arc<dyn OrdersWriteRepo> = repositories.clone();

    let cache_config = settings.cache.to_config();
    let cache = CacheLayer::open(&cache_config).await;
    info!(
        target = "dishdash::cache",
        enabled = cache_config.enabled,
        backend = ?cache_config.backend,
        "view cache ready"
    );

    let notifier = notify::build_dispatcher(&settings.notifications)?;

    let statuses = Arc::new(OrderStatusService::new(
        orders_repo.clone(),
        orders_write_repo,
        notifier,
        cache.registry.clone(),
        settings.notifications.delivery_policy(),
    ));
    let queries = Arc::new(OrderQueryService::new(orders_repo, cache.reads.clone()));

    Ok(ApiState {
        statuses,
        queries,
        db: Some(repositories),
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "dishdash::http",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if stop_rx.wait_for(|stopping| *stopping).await.is_err() {
            return std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = deadline => {
            warn!(
                target = "dishdash::http",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target = "dishdash::http", "shutdown requested");
}
