use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::accumulator::{Accumulator, Value};
use crate::labels::{LabelSet, canonicalize, escape_help, format_labels};
use crate::registry::{Collector, Registry, global_registry};

/// The identity of a metric.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetricName {
    pub name: String,
    pub description: String,
}

impl MetricName {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        MetricName {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    // rendered once, `key="value",...`
    labels: String,
    value: Accumulator,
}

#[derive(Debug)]
struct Shared {
    name: MetricName,
    // keyed by the canonical label key
    values: RwLock<BTreeMap<String, Arc<Entry>>>,
}

impl Shared {
    fn entry(&self, labels: Option<&LabelSet>) -> Arc<Entry> {
        let key = canonicalize(labels);

        if let Some(entry) = self.values.read().get(&key) {
            return Arc::clone(entry);
        }

        let mut values = self.values.write();
        let entry = values.entry(key).or_insert_with(|| {
            Arc::new(Entry {
                labels: format_labels(labels),
                value: Accumulator::default(),
            })
        });

        Arc::clone(entry)
    }

    fn write_sample(
        &self,
        w: &mut dyn Write,
        labels: &str,
        base_labels: &str,
        value: Value,
    ) -> std::fmt::Result {
        w.write_str(&self.name.name)?;

        match (labels.is_empty(), base_labels.is_empty()) {
            (true, true) => {}
            (false, true) => write!(w, "{{{labels}}}")?,
            (true, false) => write!(w, "{{{base_labels}}}")?,
            (false, false) => write!(w, "{{{labels},{base_labels}}}")?,
        }

        writeln!(w, " {value}")
    }
}

impl Collector for Shared {
    fn name(&self) -> &str {
        &self.name.name
    }

    fn write_metric(&self, w: &mut dyn Write, base_labels: &str) -> std::fmt::Result {
        let name = &self.name.name;
        let mut help = String::with_capacity(self.name.description.len());
        escape_help(&mut help, &self.name.description);
        writeln!(w, "# HELP {} {}", name, help)?;
        writeln!(w, "# TYPE {} counter", name)?;

        // take a snapshot so the map lock is not held while writing
        let entries = self.values.read().values().cloned().collect::<Vec<_>>();
        if entries.is_empty() {
            // a counter always reports something, even before the first add
            return self.write_sample(w, "", base_labels, Value::default());
        }

        for entry in entries {
            self.write_sample(w, &entry.labels, base_labels, entry.value.value())?;
        }

        Ok(())
    }
}

/// A monotonically increasing metric, partitioned by label set.
///
/// Clones share the same values. A counter stays usable after it has been
/// deregistered, it is only no longer exposed.
#[derive(Clone, Debug)]
pub struct Counter {
    shared: Arc<Shared>,
    registry: Registry,
}

/// Creates a counter registered with the process-wide registry.
pub fn make_counter(name: MetricName) -> Counter {
    Counter::new(name)
}

impl Counter {
    /// Creates a counter registered with the process-wide registry.
    pub fn new(name: MetricName) -> Self {
        Self::with_registry(name, &global_registry())
    }

    /// Creates a counter registered with `registry`, any metric with the
    /// same name is replaced.
    pub fn with_registry(name: MetricName, registry: &Registry) -> Self {
        let counter = Counter {
            shared: Arc::new(Shared {
                name,
                values: RwLock::new(BTreeMap::new()),
            }),
            registry: registry.clone(),
        };

        registry.register(counter.collector());

        counter
    }

    fn collector(&self) -> Arc<dyn Collector> {
        Arc::clone(&self.shared) as Arc<dyn Collector>
    }

    pub fn name(&self) -> &str {
        &self.shared.name.name
    }

    pub fn description(&self) -> &str {
        &self.shared.name.description
    }

    pub fn inc(&self, labels: Option<&LabelSet>) {
        self.shared.entry(labels).value.inc();
    }

    pub fn add(&self, value: f64, labels: Option<&LabelSet>) {
        self.shared.entry(labels).value.add_float(value);
    }

    pub fn add_uint64(&self, value: u64, labels: Option<&LabelSet>) {
        self.shared.entry(labels).value.add_uint(value);
    }

    /// Returns the value of the entry without labels.
    ///
    /// Float values are truncated toward zero, negative and NaN values read
    /// as 0 and values beyond `u64::MAX` saturate. Other label combinations
    /// are not considered.
    pub fn get_uint64_value(&self) -> u64 {
        self.value(None).map(|value| value.as_u64()).unwrap_or(0)
    }

    /// Returns the value of a label combination, `None` if it has never
    /// been touched or was removed.
    pub fn value(&self, labels: Option<&LabelSet>) -> Option<Value> {
        self.shared
            .values
            .read()
            .get(&canonicalize(labels))
            .map(|entry| entry.value.value())
    }

    /// Number of stored label combinations
    pub fn len(&self) -> usize {
        self.shared.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.values.read().is_empty()
    }

    /// With `None` the whole counter is removed from its registry, its values
    /// are kept. With labels only that combination is dropped, a later add
    /// starts it over from zero.
    pub fn deregister(&self, labels: Option<&LabelSet>) {
        match labels {
            None => {
                self.registry.deregister(&self.collector());
            }
            Some(labels) => {
                self.shared
                    .values
                    .write()
                    .remove(&canonicalize(Some(labels)));
            }
        }
    }

    /// Renders the counter in the text exposition format.
    pub fn write_metric(&self, w: &mut impl Write, base_labels: &str) -> std::fmt::Result {
        Collector::write_metric(self.shared.as_ref(), w, base_labels)
    }
}
