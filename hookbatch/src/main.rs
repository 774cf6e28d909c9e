//! Hookbatch Server Entry Point

use hookbatch::cancel::CancelContext;
use hookbatch::config::{config_dir, delivery_timeout, load_server_config};
use hookbatch::engine::AggregationEngine;
use hookbatch::events::create_shared_event_bus;
use hookbatch::sink::HttpDeliverySink;
use hookbatch::store::JsonFileConfigStore;
use hookbatch::{logging, server, AppState};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let config = load_server_config();
    info!(
        bind_addr = %config.bind_addr(),
        config_dir = %config.config_dir,
        delivery_timeout_secs = config.delivery_timeout_secs,
        "Starting hookbatch"
    );

    let sink = match HttpDeliverySink::with_timeout(delivery_timeout(&config)) {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "Failed to build delivery client");
            std::process::exit(1);
        }
    };
    let store = JsonFileConfigStore::new(config_dir(&config));

    let engine =
        AggregationEngine::new(Arc::new(store), Arc::new(sink), create_shared_event_bus()).await;
    let state = AppState { engine };

    if let Err(e) = server::run(state, &config.bind_addr(), CancelContext::new()).await {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
