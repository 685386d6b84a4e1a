//! `serve`: the long-running agent.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tern_config::AgentConfig;
use tern_stats::{run_cleaner_loop, run_collector_loop, SampleState, StatsCore};

use tern::modules::{build_router, AGENT_VERSION};
use tern::server::{self, ServerSettings};

/// Maximum time to wait for orderly shutdown before forcing exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Brief pause after cancellation to let in-flight requests complete.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub no_stats: bool,
}

pub async fn serve(mut config: AgentConfig, overrides: ServeOverrides) -> anyhow::Result<()> {
    if let Some(listen) = overrides.listen {
        config.server.listen = listen;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if overrides.no_stats {
        config.statistics.enabled = false;
    }

    tern_config::dirs::ensure_data_dir();
    startup_diagnostics(&config);

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let stats = if config.statistics.enabled {
        match start_statistics(&config, &cancel, &mut tasks).await {
            Ok(core) => core,
            Err(e) => {
                tracing::error!(error = %e, "Statistics disabled: startup failed");
                Arc::new(StatsCore::new())
            }
        }
    } else {
        tracing::info!("Statistics: disabled");
        Arc::new(StatsCore::new())
    };

    let router = Arc::new(build_router(&config, stats));
    let settings = Arc::new(ServerSettings {
        token: config.server.token.clone(),
        max_frame_bytes: config.server.max_frame_bytes,
    });
    let listener = TcpListener::bind((config.server.listen.as_str(), config.server.port)).await?;
    {
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server::start(listener, router, settings, token).await {
                tracing::error!(error = %e, "Control-plane listener failed");
            }
        }));
    }

    tracing::info!("Ready.");

    shutdown_signal().await;
    tracing::info!("Shutting down...");

    let shutdown = async {
        cancel.cancel();
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown)
        .await
        .is_err()
    {
        tracing::warn!("Shutdown timed out after {:?}, forcing exit", SHUTDOWN_TIMEOUT);
    }
    Ok(())
}

/// Discover metrics and spawn the collector and retention loops.
async fn start_statistics(
    config: &AgentConfig,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) -> anyhow::Result<Arc<StatsCore>> {
    let section = &config.statistics;
    let dir = section.dir();
    let interval = Duration::from_secs(section.interval_secs.max(1));
    let retention = Duration::from_secs(section.retention_days * 24 * 3600);
    let clean_interval = Duration::from_secs(section.clean_interval_hours.max(1) * 3600);

    let (core, state) = tokio::task::spawn_blocking(move || {
        let mut state = SampleState::new();
        StatsCore::discover(&dir, interval, &mut state).map(|core| (core, state))
    })
    .await??;
    let core = Arc::new(core);

    tasks.push(tokio::spawn(run_collector_loop(
        core.clone(),
        state,
        interval,
        cancel.clone(),
    )));
    tasks.push(tokio::spawn(run_cleaner_loop(
        core.clone(),
        retention,
        clean_interval,
        cancel.clone(),
    )));
    tracing::info!(
        metrics = core.collectors().len(),
        interval_secs = interval.as_secs(),
        retention_days = section.retention_days,
        "Statistics: collecting"
    );
    Ok(core)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn startup_diagnostics(config: &AgentConfig) {
    tracing::info!("tern v{} starting", AGENT_VERSION);
    tracing::info!("Platform: {}", std::env::consts::OS);

    match hostname::get() {
        Ok(h) => tracing::info!("Hostname: {}", h.to_string_lossy()),
        Err(e) => tracing::warn!(error = %e, "Could not determine hostname"),
    }

    for (name, section) in [("nginx", &config.nginx), ("apache", &config.apache)] {
        if section.is_present() {
            tracing::info!("{name}: {}", section.root_config.display());
        } else {
            tracing::info!("{name}: not found");
        }
    }
    tracing::info!("ACME client: {}", config.acme.binary());
    tracing::info!(
        "TCP {}:{}: control-plane listener",
        config.server.listen,
        config.server.port
    );
    if config.server.token.is_empty() {
        tracing::warn!("No token configured; every request will be refused until `tern generate-token` is run");
    }
}
