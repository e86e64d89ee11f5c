use anyhow::Result;
use pipeline_monitor::*;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "monitor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<u8> {
    let app_config = config::AppConfig::load()?;

    let store = Arc::new(datastore::SqliteStore::wait_until_ready(&app_config.database).await?);
    store.init().await?;
    store.reset().await?;

    let archive = archive::ArchiveWriter::new(&app_config.archive.dir, &app_config.archive.prefix);
    tokio::fs::create_dir_all(archive.dir()).await?;

    let shutdown = CancellationToken::new();
    let mut poller_handle = poller::spawn(
        poller::PollerDeps {
            counter: store.clone(),
            samples: store.clone(),
            feed: store.clone(),
            marker: store.clone(),
            archive,
            shutdown: shutdown.clone(),
        },
        poller::PollerConfig {
            interval: app_config.poll_interval()?,
            recent_samples: app_config.monitoring.recent_samples,
        },
    );

    let app = routes::app(
        store.clone(),
        store.clone(),
        app_config.monitoring.recent_samples,
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        interval_secs = app_config.monitoring.poll_interval_secs,
        "Listening on http://{}",
        addr
    );
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    let exit = tokio::select! {
        result = &mut poller_handle => result?,
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal. Shutting down monitor...");
            shutdown.cancel();
            poller_handle.await?
        }
    };

    shutdown.cancel();
    if exit.is_fatal() {
        server.abort();
    } else {
        match server.await? {
            Ok(()) => {}
            Err(e) => tracing::warn!(error = %e, "server stopped with error"),
        }
    }
    match &exit {
        poller::PollerExit::Completed { archive } => {
            tracing::info!(archived = archive.is_some(), "Monitoring run complete")
        }
        poller::PollerExit::Cancelled => tracing::info!("Monitoring stopped"),
        poller::PollerExit::Unreachable(e) => tracing::error!(error = %e, "Datastore unreachable"),
    }
    Ok(exit.exit_code())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
