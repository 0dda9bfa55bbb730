use pulse_messaging::{config, db, error, logging, migrations, routes, state::AppState, websocket};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Schema must be in sync before serving; treat failures as fatal
    migrations::run_all(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let registry = websocket::ConnectionRegistry::new();
    let state = AppState {
        db,
        registry,
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting pulse-messaging");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    axum::serve(listener, routes::build_router(state))
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
