use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{Registry, format_labels, global_registry};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::http::{self, Snapshot};
use crate::shutdown::{ShutdownSignal, Trigger};

enum State {
    Created,
    Running {
        local_addr: SocketAddr,
        trigger: Trigger,
        tasks: Vec<JoinHandle<()>>,
    },
    Stopped,
}

/// Periodically renders every metric of a registry and serves the result
/// over HTTP.
///
/// Mutations become visible to scrapes with the next sample, so readers
/// may see values up to one `sample_interval` old.
pub struct MetricService {
    config: ServiceConfig,
    registry: Registry,
    snapshot: Snapshot,
    state: State,
}

impl MetricService {
    /// Exposes the process-wide registry.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_registry(config, global_registry())
    }

    pub fn with_registry(config: ServiceConfig, registry: Registry) -> Self {
        MetricService {
            config,
            registry,
            snapshot: Arc::new(RwLock::new(Bytes::new())),
            state: State::Created,
        }
    }

    /// Binds the listener, publishes a first snapshot and starts the sample
    /// loop and the HTTP server. Returns the bound address.
    ///
    /// # Panics
    ///
    /// Panics if the service has been started before.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match self.state {
            State::Created => {}
            State::Running { .. } => panic!("metric service is already running"),
            State::Stopped => panic!("metric service is stopped and cannot be restarted"),
        }

        self.config.validate()?;

        let address = &self.config.node_exporter_listen_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| Error::BindListener {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::BindListener {
                address: address.clone(),
                source,
            })?;

        let base_labels = format_labels(Some(&self.config.labels));
        publish(&self.registry, &base_labels, &self.snapshot);

        let (trigger, shutdown) = ShutdownSignal::new();
        let sampler = tokio::spawn(sample(
            self.registry.clone(),
            base_labels,
            self.config.sample_interval,
            Arc::clone(&self.snapshot),
            shutdown.clone(),
        ));
        let server = tokio::spawn(http::serve(listener, Arc::clone(&self.snapshot), shutdown));

        info!(
            message = "metric service started",
            %local_addr,
            interval = ?self.config.sample_interval
        );

        self.state = State::Running {
            local_addr,
            trigger,
            tasks: vec![sampler, server],
        };

        Ok(local_addr)
    }

    /// Stops sampling, closes the listener and waits for in-flight scrapes
    /// to complete.
    ///
    /// # Panics
    ///
    /// Panics if the service is not running.
    pub async fn shutdown(&mut self) {
        let (local_addr, trigger, tasks) = match std::mem::replace(&mut self.state, State::Stopped)
        {
            State::Running {
                local_addr,
                trigger,
                tasks,
            } => (local_addr, trigger, tasks),
            other => {
                self.state = other;
                panic!("metric service is not running");
            }
        };

        trigger.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                error!(
                    message = "metric service task failed",
                    %err
                );
            }
        }

        info!(message = "metric service stopped", %local_addr);
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// The bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            State::Running { local_addr, .. } => Some(*local_addr),
            _ => None,
        }
    }

    /// The exposition text currently served
    pub fn snapshot(&self) -> Bytes {
        self.snapshot.read().clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn publish(registry: &Registry, base_labels: &str, snapshot: &Snapshot) {
    let rendered = registry.render(base_labels);
    for name in &rendered.failed {
        warn!(
            message = "render metric failed, it is left out of this sample",
            %name
        );
    }

    *snapshot.write() = Bytes::from(rendered.text);
}

async fn sample(
    registry: Registry,
    base_labels: String,
    interval: Duration,
    snapshot: Snapshot,
    mut shutdown: ShutdownSignal,
) {
    // the first snapshot is published by `start`
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        publish(&registry, &base_labels, &snapshot);
    }

    debug!(message = "sample routine stopped");
}

#[cfg(test)]
mod tests {
    use metrics::{Counter, LabelSet, MetricName, make_counter};

    use super::*;

    fn config(interval: Duration) -> ServiceConfig {
        ServiceConfig {
            node_exporter_listen_address: "127.0.0.1:0".to_string(),
            labels: LabelSet::from([("host_name".to_string(), "host_one".to_string())]),
            sample_interval: interval,
        }
    }

    fn text(service: &MetricService) -> String {
        String::from_utf8(service.snapshot().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn first_snapshot_on_start() {
        let registry = Registry::new();
        let counter =
            Counter::with_registry(MetricName::new("requests", "total requests"), &registry);
        counter.inc(None);

        let mut service = MetricService::with_registry(config(Duration::from_secs(3600)), registry);
        assert!(service.snapshot().is_empty());

        let addr = service.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(service.local_addr(), Some(addr));
        assert!(service.is_running());
        assert_eq!(
            text(&service),
            "# HELP requests total requests\n# TYPE requests counter\nrequests{host_name=\"host_one\"} 1\n"
        );

        service.shutdown().await;
        assert!(!service.is_running());
        assert_eq!(service.local_addr(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_every_interval() {
        let interval = Duration::from_secs(10);
        let registry = Registry::new();
        let counter =
            Counter::with_registry(MetricName::new("requests", "total requests"), &registry);

        let mut service = MetricService::with_registry(config(interval), registry);
        service.start().await.unwrap();
        assert!(text(&service).ends_with(" 0\n"));

        counter.add_uint64(3, None);
        // not visible before the next sample
        assert!(text(&service).ends_with(" 0\n"));

        tokio::time::sleep(interval * 2).await;
        assert!(text(&service).ends_with(" 3\n"), "{}", text(&service));

        counter.deregister(None);
        tokio::time::sleep(interval * 2).await;
        assert_eq!(text(&service), "");

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn default_registry() {
        let interval = Duration::from_secs(10);
        let name = "service_test_default_registry";
        let counter = make_counter(MetricName::new(name, "lives in the global registry"));
        counter.add_uint64(5, None);

        let mut service = MetricService::new(config(interval));
        service.start().await.unwrap();
        assert!(
            text(&service).contains(&format!("{name}{{host_name=\"host_one\"}} 5\n")),
            "{}",
            text(&service)
        );

        counter.deregister(None);
        tokio::time::sleep(interval * 2).await;
        assert!(!text(&service).contains(name), "{}", text(&service));

        // not exposed any more, but still counting
        counter.inc(None);
        assert_eq!(counter.get_uint64_value(), 6);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn zero_interval() {
        let mut service = MetricService::with_registry(config(Duration::ZERO), Registry::new());

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn bad_address() {
        let mut cfg = config(Duration::from_secs(1));
        cfg.node_exporter_listen_address = "not an address".to_string();
        let mut service = MetricService::with_registry(cfg, Registry::new());

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, Error::BindListener { .. }));

        // still in `Created`, a fixed config could be retried by a new instance
        assert!(!service.is_running());
    }

    #[tokio::test]
    #[should_panic(expected = "already running")]
    async fn double_start() {
        let mut service = MetricService::with_registry(config(Duration::from_secs(1)), Registry::new());

        service.start().await.unwrap();
        let _ = service.start().await;
    }

    #[tokio::test]
    #[should_panic(expected = "not running")]
    async fn shutdown_before_start() {
        let mut service = MetricService::with_registry(config(Duration::from_secs(1)), Registry::new());
        service.shutdown().await;
    }

    #[tokio::test]
    #[should_panic(expected = "cannot be restarted")]
    async fn restart_after_shutdown() {
        let mut service = MetricService::with_registry(config(Duration::from_secs(1)), Registry::new());

        service.start().await.unwrap();
        service.shutdown().await;
        let _ = service.start().await;
    }
}
