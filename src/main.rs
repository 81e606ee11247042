use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    credit_sync::{
        AppState,
        adapters::{self, gateway::GatewayClient},
        config::AppConfig,
        infra::mirror,
        services::{reconcile::Reconciler, sweeper},
    },
    sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    std::{str::FromStr, sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = Arc::new(AppConfig::from_env());

    let connect_opts = SqliteConnectOptions::from_str(&config.database_url)
        .expect("invalid DATABASE_URL")
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(connect_opts)
        .await
        .expect("failed to open database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (mirror_handle, mirror_task) =
        mirror::spawn(config.mirror_url.clone(), shutdown_rx.clone());

    let gateway = Arc::new(
        GatewayClient::new(
            &config.gateway_base_url,
            &config.gateway_api_key,
            config.gateway_timeout,
        )
        .expect("failed to build gateway client"),
    );

    let reconciler = Arc::new(Reconciler::new(
        pool.clone(),
        gateway.clone(),
        config.redirect_policy,
        mirror_handle,
    ));

    let sweeper_task = tokio::spawn(sweeper::run_sweeper(
        reconciler.clone(),
        config.sweep_interval,
        shutdown_rx,
    ));

    let state = AppState {
        pool,
        reconciler,
        gateway,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/packages", get(adapters::checkout::list_packages))
        .route("/checkout", post(adapters::checkout::create_checkout))
        .route(
            "/payments/callback",
            get(adapters::callbacks::gateway_callback),
        )
        .route(
            "/payments/webhook",
            post(adapters::callbacks::gateway_webhook),
        )
        .route(
            "/payments/verify",
            post(adapters::callbacks::verify_payment),
        )
        .route("/credits/{user_id}", get(adapters::credits::get_balance))
        .route(
            "/credits/{user_id}/history",
            get(adapters::credits::get_history),
        )
        .route("/credits/deduct", post(adapters::credits::deduct_credits))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(64 * 1024)) // gateway payloads are small
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.listen_addr, policy = %config.redirect_policy, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Stop background tasks after the listener drains.
    let _ = shutdown_tx.send(true);
    sweeper_task.await.ok();
    if let Some(task) = mirror_task {
        task.await.ok();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
