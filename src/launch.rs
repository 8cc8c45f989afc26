use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use exitcode::ExitCode;
use tally::{Error, MetricService, ServiceConfig};
use tracing::{error, info};

fn default_worker_threads() -> usize {
    match std::env::var("TALLY_WORKER_THREADS") {
        Ok(value) => value.parse::<usize>().unwrap_or(1),
        // the service is a sampler and a tiny http server
        Err(_) => std::thread::available_parallelism()
            .map(|n| n.get().min(2))
            .unwrap_or(1),
    }
}

#[derive(FromArgs)]
#[argh(
    description = "Tally exposes labeled counters in the Prometheus text format",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(switch, description = "log in json")]
    json: bool,

    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from a yaml file, defaults are used if absent"
    )]
    config: Option<PathBuf>,

    #[argh(
        option,
        short = 't',
        default = "default_worker_threads()",
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: usize,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("Tally {}", env!("CARGO_PKG_VERSION"));
    }

    fn load_config(&self) -> Result<ServiceConfig, Error> {
        match &self.config {
            Some(path) => ServiceConfig::load(path),
            None => Ok(ServiceConfig::default()),
        }
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let log_level = std::env::var("TALLY_LOG").unwrap_or(self.log_level.clone());
        let color = std::io::stdout().is_terminal() && !self.json;
        tally::trace::init(color, self.json, &log_level);

        let config = self.load_config().map_err(|err| {
            error!(message = "load config failed", %err);
            exitcode::CONFIG
        })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("tally-worker")
            .worker_threads(self.threads.max(1))
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            info!(
                message = "Start tally",
                threads = self.threads,
                config = ?self.config
            );

            let mut service = MetricService::new(config);
            service.start().await.map_err(|err| {
                error!(message = "start metric service failed", %err);

                match err {
                    Error::BindListener { .. } => exitcode::UNAVAILABLE,
                    _ => exitcode::CONFIG,
                }
            })?;

            wait_for_shutdown().await;
            info!(message = "Shutdown signal received");

            service.shutdown().await;

            Ok::<(), ExitCode>(())
        })?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            error!(message = "install SIGTERM handler failed", %err);

            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
