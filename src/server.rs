//! Server Assembly
//!
//! 管理ルートを先に、キャッチオールのプロキシを最後にマウントする。

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::admin;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::proxy;

/// ルーターを組み立てる
pub fn build_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .nest("/admin", admin::router())
        .fallback(proxy::dispatch::handle)
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// リスナーを開いてサーブする。Ctrl-C で graceful shutdown。
pub async fn serve(engine: Arc<Engine>) -> Result<()> {
    let addr = engine.config.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {}: {}", addr, e)))?;

    info!("🚀 Listening on {}", addr);
    if let Some(target) = &engine.config.target_url {
        info!("🎯 Proxying to {}", target);
    }

    let router = build_router(engine);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("🛑 Shutdown signal received");
}
