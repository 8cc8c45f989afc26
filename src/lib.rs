#[macro_use]
extern crate tracing;

pub mod config;
pub mod duration;
pub mod error;
pub mod http;
pub mod service;
pub mod shutdown;
pub mod trace;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use metrics;
pub use service::MetricService;
