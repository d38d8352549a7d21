mod affinity;
mod config;
mod loader;
mod maps;
mod runtime;
mod telemetry;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use runtime::Runtime;

// ENTRY POINT
fn main() -> Result<()> {
    let config = Config::from_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // before the runtime exists, so every worker inherits the mask
    if let Some(cpu) = config.control_cpu {
        affinity::pin_current_thread(cpu)?;
        info!("control plane pinned to cpu {cpu}");
    }

    let workers = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    // the eBPF logger spawns its readers during init
    let _context = workers.enter();
    let runtime = Runtime::init(config)?;
    workers.block_on(runtime.run())
}
