use std::{process, sync::Arc};

use teebox::{
    application::{
        air_quality::{AirQualityCache, CachePolicy, SystemClock},
        content::ContentService,
        error::AppError,
        marketplace::MarketplaceService,
        optimize::{ImageOptimizer, OptimizeSettings, RunMode},
        repos::{InventoryRepo, PagesRepo, PostsRepo, ReviewsRepo},
        reviews::ReviewService,
    },
    config,
    infra::{
        air_quality::GoogleAirQualityClient,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        storage, telemetry,
    },
};
use tokio::sync::oneshot;
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
        config::Command::OptimizeImages(args) => run_optimize_images(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let http_state = build_http_state(repositories, &settings)?;
    serve_http(&settings, http_state).await
}

async fn run_optimize_images(
    settings: config::Settings,
    args: config::OptimizeImagesArgs,
) -> Result<(), AppError> {
    let store = storage::from_settings(&settings.storage)?;
    let job_settings = OptimizeSettings {
        mode: RunMode::from_apply_flag(args.apply),
        prefix: args.prefix.unwrap_or_default(),
        min_bytes: settings.optimize.min_bytes,
        max_dimension: settings.optimize.max_dimension,
        jpeg_quality: settings.optimize.jpeg_quality,
        min_savings_percent: settings.optimize.min_savings_percent,
        protected_prefixes: settings.optimize.protected_prefixes.clone(),
    };

    if !job_settings.mode.is_apply() {
        println!("dry run: storage will not be modified (pass --apply to write changes)");
    }

    let report = ImageOptimizer::new(store, job_settings)
        .run(|item| println!("{item}"))
        .await
        .map_err(|err| AppError::from(InfraError::storage(err.to_string())))?;

    println!("{report}");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let pages_repo: Arc<dyn PagesRepo> = repositories.clone();
    let inventory_repo: Arc<dyn InventoryRepo> = repositories.clone();
    let reviews_repo: Arc<dyn ReviewsRepo> = repositories.clone();

    if settings.air_quality.api_key.is_none() {
        warn!(
            target = "teebox::startup",
            "air_quality.api_key is not set; /api/air-quality will answer 502"
        );
    }

    let provider = GoogleAirQualityClient::new(&settings.air_quality).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to build air-quality client: {err}"
        )))
    })?;
    let policy = CachePolicy {
        ttl: settings.air_quality.ttl,
        upstream_timeout: settings.air_quality.timeout,
        retry_attempts: settings.air_quality.retry_attempts,
        retry_backoff: settings.air_quality.retry_backoff,
        local_index_code: settings.air_quality.local_index_code.clone(),
    };
    let air_quality = AirQualityCache::new(Arc::new(provider), Arc::new(SystemClock), policy);

    Ok(HttpState {
        content: Arc::new(ContentService::new(posts_repo, pages_repo)),
        marketplace: Arc::new(MarketplaceService::new(inventory_repo)),
        reviews: Arc::new(ReviewService::new(reviews_repo)),
        air_quality: Arc::new(air_quality),
        health: repositories,
    })
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "teebox::startup",
        addr = %settings.server.public_addr,
        "Listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {
            info!(target = "teebox::shutdown", "Shutdown signal received");
            let _ = stop_tx.send(());
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "teebox::shutdown",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "Graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "teebox::shutdown", error = %err, "failed to listen for ctrl-c");
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
                error!(target = "teebox::shutdown", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
