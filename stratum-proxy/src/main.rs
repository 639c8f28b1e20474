//! Process bootstrap (C10): CLI parsing, config load, wiring C1-C9
//! together, and graceful shutdown. No business logic lives here.

use quai_stratum_proxy::config::Config;
use quai_stratum_proxy::context::ProxyContext;
use quai_stratum_proxy::policy::PermissivePolicy;
use quai_stratum_proxy::{ingest, listener, upstream};

use ii_async_compat::tokio;
use ii_logging::macros::*;

use std::fs;
use std::process;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::sync::watch;

#[derive(Debug, StructOpt)]
#[structopt(name = "quai-stratum-proxy", about = "Stratum proxy for the chain")]
struct Args {
    #[structopt(short, long, default_value = "config.json")]
    config: String,

    /// Overrides RUST_LOG for this run (e.g. "debug", "info", "warn").
    #[structopt(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::from_args();
    if let Some(level) = &args.log_level {
        std::env::set_var("RUST_LOG", level);
    }
    let _log_guard = ii_logging::setup_for_app();

    let config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(1);
        }
    };

    let worker_threads = config.threads;
    ii_async_compat::run(worker_threads, run(config));
}

fn load_config(path: &str) -> Result<Config, String> {
    let data = fs::read_to_string(path).map_err(|e| format!("reading {}: {}", path, e))?;
    Config::from_json(&data).map_err(|e| e.to_string())
}

async fn run(config: Config) {
    let upstreams = match upstream::dial_all(&config) {
        Ok(u) => u,
        Err(e) => {
            error!("failed to dial upstreams: {}", e);
            process::exit(1);
        }
    };

    let stratum_enabled = config.proxy.stratum.enabled;
    let ctx = Arc::new(ProxyContext::new(config, upstreams, Arc::new(PermissivePolicy)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let ctrlc_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        let _ = ctrlc_tx.send(true);
    }) {
        warn!("failed to install ctrl-c handler: {}", e);
    }

    let ingest_ctx = ctx.clone();
    let ingest_handle = ii_async_compat::spawn(async move {
        if let Err(e) = ingest::run(ingest_ctx, shutdown_rx).await {
            error!("ingest loop terminated: {}", e);
        }
    });

    if stratum_enabled {
        let listener_ctx = ctx.clone();
        let listener_handle = ii_async_compat::spawn(async move {
            if let Err(e) = listener::run(listener_ctx).await {
                error!("stratum listener terminated: {}", e);
            }
        });
        let _ = tokio::join!(ingest_handle, listener_handle);
    } else {
        let _ = ingest_handle.await;
    }
}
