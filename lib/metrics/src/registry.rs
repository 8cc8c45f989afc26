use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Write};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Types that wish to be exposed by a `Registry` must implement this trait.
///
/// Counters implement it, other metric kinds can be registered the same way.
pub trait Collector: Send + Sync + 'static {
    /// The exposition name, one registry entry per name
    fn name(&self) -> &str;

    /// Write HELP, TYPE and sample lines, `base_labels` is appended to the
    /// labels of every sample.
    fn write_metric(&self, w: &mut dyn Write, base_labels: &str) -> std::fmt::Result;
}

/// The outcome of `Registry::render`.
#[derive(Debug, Default)]
pub struct Rendered {
    pub text: String,

    /// Names of metrics which failed to render, they are left out of `text`
    pub failed: Vec<String>,
}

/// A set of live metrics, keyed by name.
///
/// Cloning is cheap, all clones share the same entries.
#[derive(Clone, Default)]
pub struct Registry {
    metrics: Arc<Mutex<BTreeMap<String, Arc<dyn Collector>>>>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.metrics.lock().keys()).finish()
    }
}

fn same(a: &Arc<dyn Collector>, b: &Arc<dyn Collector>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            metrics: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Adds the metric, a previous metric with the same name is replaced and
    /// returned.
    pub fn register(&self, metric: Arc<dyn Collector>) -> Option<Arc<dyn Collector>> {
        let name = metric.name().to_string();
        self.metrics.lock().insert(name, metric)
    }

    /// Removes the metric if it is still the one registered under its name.
    ///
    /// Removing an absent metric is a no-op, returns whether anything was
    /// removed.
    pub fn deregister(&self, metric: &Arc<dyn Collector>) -> bool {
        let mut metrics = self.metrics.lock();

        match metrics.get(metric.name()) {
            Some(registered) if same(registered, metric) => {
                metrics.remove(metric.name());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    /// Renders all metrics in name order.
    ///
    /// The registry lock is only held while collecting the entries, and every
    /// metric renders into its own buffer, so a failing metric does not
    /// affect the others.
    pub fn render(&self, base_labels: &str) -> Rendered {
        let metrics = self.metrics.lock().values().cloned().collect::<Vec<_>>();

        let mut rendered = Rendered::default();
        let mut buf = String::new();
        for metric in metrics {
            buf.clear();

            match metric.write_metric(&mut buf, base_labels) {
                Ok(()) => rendered.text.push_str(&buf),
                Err(_) => rendered.failed.push(metric.name().to_string()),
            }
        }

        rendered
    }
}

/// The process-wide registry, created on first use.
pub fn global_registry() -> Registry {
    GLOBAL_REGISTRY.get_or_init(Registry::new).clone()
}
