#![forbid(unsafe_code)]
#![deny(unused)]
#![deny(dead_code)]

mod accumulator;
mod counter;
mod labels;
mod registry;

pub use accumulator::{Accumulator, Value};
pub use counter::{Counter, MetricName, make_counter};
pub use labels::{LabelSet, canonicalize, format_labels};
pub use registry::{Collector, Registry, Rendered, global_registry};
