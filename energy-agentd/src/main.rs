//! energy-agentd entrypoint: wires the concrete `EnergySource`,
//! `CgroupResolver`, `VmResolver`, and `KernelEventSource` collaborators
//! into `energy_core::manager::SamplingManager`, runs the sampling ticker
//! and the kernel-event reader, and serves the scrape surface over HTTP.

mod cli;
mod http;
mod resolvers;
mod sources;
mod trace_source;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use energy_core::config::ManagerConfig;
use energy_core::energy_source::{read_all_supported, EnergySource};
use energy_core::manager::SamplingManager;
use energy_core::trace::{decode_all, Aggregator, KernelEventSource};

use cli::Cli;
use resolvers::{ProcfsCgroupResolver, ProcfsVmResolver};
use sources::{platform::PlatformSource, qat::QatSource, rapl::RaplSource};

pub struct AgentState {
    manager: Mutex<SamplingManager>,
    hostname: String,
    gzip_min_size: usize,
}

impl AgentState {
    fn gzip_enabled(&self, rendered: &str) -> bool {
        rendered.len() >= self.gzip_min_size
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    if cli::arg_flag("--version") || cli::arg_flag("-V") {
        println!("energy-agentd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cli = Cli::parse();

    let sys = sysinfo::System::new_with_specifics(
        sysinfo::RefreshKind::new().with_cpu(sysinfo::CpuRefreshKind::everything()),
    );
    let cpu_count = (sys.cpus().len() as u32).max(1);
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());

    let config = ManagerConfig {
        sample_period_sec: cli.sample_period_sec,
        cpu_count,
        estimate_idle_power: cli.estimated_idle_power,
        ..ManagerConfig::default()
    };

    let mut energy_sources: Vec<Arc<dyn EnergySource>> = vec![
        Arc::new(RaplSource::new()),
        Arc::new(PlatformSource::new()),
    ];
    if cli.gpu_enabled {
        energy_sources.push(Arc::new(sources::gpu::GpuSource::new(cli.sample_period_sec)));
    }
    if cli.qat_enabled {
        energy_sources.push(Arc::new(QatSource::new()));
    }
    if cli.msr_enabled || cli.hw_counters_enabled {
        warn!("MSR/hardware-counter energy sources are not wired into this build; flag recorded and ignored");
    }
    if cli.apiserver_enabled {
        warn!("apiserver-backed pod discovery is not wired into this build; flag recorded and ignored");
    }
    if let Some(path) = &cli.redfish_credential_file {
        warn!(path = %path, "Redfish credential file supplied but the Redfish reader is not wired into this build");
    }

    let aggregator = Arc::new(Aggregator::new());
    let source_read_timeout = config.source_read_timeout();

    let manager = SamplingManager::new(
        config,
        aggregator.clone(),
        energy_sources,
        Arc::new(ProcfsCgroupResolver),
        Arc::new(ProcfsVmResolver),
    );

    let state = Arc::new(AgentState {
        manager: Mutex::new(manager),
        hostname,
        gzip_min_size: 1024,
    });

    // Sources are read concurrently ahead of each tick and never again
    // need the manager's own lock, so a plain clone of the Arc list taken
    // once up front is enough for both the ticker and shutdown `stop()`.
    let sources_for_tick: Vec<Arc<dyn EnergySource>> =
        state.manager.lock().expect("manager mutex poisoned").energy_sources().to_vec();

    // Cancellation: a single watch sender, cloned into the async ticker
    // and bridged (via its synchronous `borrow`/`has_changed`) into the
    // non-async kernel-reader thread.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let reader_aggregator = aggregator.clone();
    let mut reader_shutdown = shutdown_rx.clone();
    let reader_handle = std::thread::spawn(move || {
        let mut source: Box<dyn KernelEventSource> = Box::new(trace_source::NullEventSource);
        while !*reader_shutdown.borrow_and_update() {
            let batch = source.next_batch();
            if !batch.is_empty() {
                for decoded in decode_all(bytes::Bytes::from(batch)) {
                    match decoded {
                        Ok(event) => reader_aggregator.ingest(event),
                        Err(e) => tracing::debug!(error = %e, "dropping malformed kernel trace record"),
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    });

    let ticker_state = state.clone();
    let mut ticker_shutdown = shutdown_rx.clone();
    let sample_period = Duration::from_secs(cli.sample_period_sec.max(1));
    let shutdown_sources = sources_for_tick.clone();
    let ticker_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sample_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Concurrent fan-out happens before the manager's
                    // std::sync::Mutex is taken, so the lock is never held
                    // across an .await.
                    let outcomes = read_all_supported(&sources_for_tick, source_read_timeout).await;
                    let report = {
                        let mut mgr = ticker_state.manager.lock().expect("manager mutex poisoned");
                        mgr.tick(outcomes)
                    };
                    if !report.failed_sources.is_empty() {
                        warn!(failed = ?report.failed_sources, "tick completed with degraded energy sources");
                    }
                    if report.resolve_fallbacks > 0 {
                        warn!(fallbacks = report.resolve_fallbacks, "processes fell back to the system container this tick");
                    }
                }
                _ = ticker_shutdown.changed() => break,
            }
        }
    });

    let app = http::router(state.clone(), &cli.metrics_path);
    let addr = SocketAddr::from_str(&cli.bind)
        .map_err(|e| anyhow::anyhow!("invalid --bind address {}: {e}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, metrics_path = %cli.metrics_path, "energy-agentd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    ticker_handle.await.ok();
    for source in &shutdown_sources {
        source.stop();
    }
    reader_handle.join().ok();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
