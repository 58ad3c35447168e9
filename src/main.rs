use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use amp_rs::engine::Engine;
use amp_rs::logging::{init_logging, LogConfig};
use amp_rs::storage::JsonFileStorage;
use amp_rs::{config, server};

/// バッファドレインの猶予
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("amp-rs: {}", e);
            return ExitCode::from(1);
        }
    };

    let _log_guard = match init_logging(&LogConfig::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("amp-rs: failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let storage = match JsonFileStorage::open(&config.db_path).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Fatal storage error at boot: {}", e);
            return ExitCode::from(2);
        }
    };

    let engine = match Engine::bootstrap(config, storage).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Fatal storage error at boot: {}", e);
            return ExitCode::from(2);
        }
    };

    let consolidator = engine.spawn_consolidator();

    if let Err(e) = server::serve(engine.clone()).await {
        error!("Server failed: {}", e);
        engine.shutdown(consolidator, SHUTDOWN_GRACE).await;
        return ExitCode::from(1);
    }

    engine.shutdown(consolidator, SHUTDOWN_GRACE).await;
    ExitCode::SUCCESS
}
