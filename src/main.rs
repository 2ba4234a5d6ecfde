use std::sync::Arc;

use motodispatch::{
    config::DispatchConfig,
    db::Db,
    dispatcher::Dispatcher,
    logger::init_tracing,
    predictor::run_background_refresh,
    routing::RoutingClient,
    routing::http_client::HttpRoutingClient,
    store::Store,
    store::sqlx_store::SqlxStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting dispatch core...");

    let cfg = DispatchConfig::from_env();

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let store: Arc<dyn Store> = Arc::new(SqlxStore::new((*db.pool).clone()));

    let routing: Arc<dyn RoutingClient> = Arc::new(HttpRoutingClient::new(
        cfg.routing_base_url.clone(),
        cfg.routing_api_key.clone(),
        cfg.routing_timeout_ms,
    )?);

    // `Dispatcher::run(tenant_id)` is invoked per-request by the HTTP layer
    // that binds to this core's public surface (§6); that transport is out
    // of scope here (see DESIGN.md). It's still constructed at startup so
    // a bad database or routing configuration fails fast instead of only
    // surfacing on the first inbound dispatch request.
    let _dispatcher = Arc::new(Dispatcher::new(store.clone(), routing, &cfg));

    if let Some(interval_ms) = cfg.pattern_refresh_interval_ms {
        let store_for_refresh = store.clone();
        tokio::spawn(run_background_refresh(store_for_refresh, interval_ms));
    }

    tracing::info!("Dispatch core started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
