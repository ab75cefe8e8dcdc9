use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use stationlend_api::app::{self, services::AppServices};
use stationlend_infra::{AppConfig, InMemoryStack};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    stationlend_observability::init(cfg.log_format);

    let services = Arc::new(AppServices::new(InMemoryStack::new()));
    if let Some(interval) = cfg.reconcile_interval {
        spawn_reconciliation(services.clone(), interval);
    }

    let app = app::router(services, &cfg.admin_token);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Verify every tenant on a fixed interval. Discrepancies are logged by the
/// engine; nothing is repaired automatically.
fn spawn_reconciliation(services: Arc<AppServices>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let services = services.clone();
            let pass = tokio::task::spawn_blocking(move || services.reconciliation().verify_all()).await;
            match pass {
                Ok(Ok(report)) => {
                    tracing::info!(tenants_with_drift = report.len(), "reconciliation pass finished");
                }
                Ok(Err(err)) => tracing::warn!(error = %err, "reconciliation pass failed"),
                Err(err) => tracing::warn!(error = %err, "reconciliation task panicked"),
            }
        }
    });
}
