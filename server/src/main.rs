use std::sync::Arc;

use clap::Parser;
use envdiff::differ::DiffScheduler;
use envdiff::{ClusterDiffer, GitStore};
use envdiff_server::cli::Cli;
use envdiff_server::{gen_router, logging, AppState};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    logging::init(cli.log_level.as_deref(), cli.log_format)?;

    run(cli).await?;
    Ok(())
}

async fn run(cli: Cli) -> envdiff::Result<()> {
    let settings = cli.settings();
    let store = Arc::new(GitStore::system(&settings.git_repo_dir));
    let differ = Arc::new(ClusterDiffer::new(settings, store)?);

    let scheduler = Arc::new(DiffScheduler::new(differ));
    let handle = scheduler.start()?;

    let app = gen_router()
        .with_state(AppState::new(Arc::clone(&scheduler)))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen_address).await?;
    info!(listen_address = %cli.listen_address, "starting daemon");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("stopping reconciliation loop");
    scheduler.stop();
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        _ => error!("scheduler thread did not shut down cleanly"),
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
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

    info!("shutdown signal received");
}
