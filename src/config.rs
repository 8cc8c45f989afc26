use std::path::Path;
use std::time::Duration;

use metrics::LabelSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration of the `MetricService`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// The address the exposition endpoint listens at, e.g. "0.0.0.0:9100"
    /// or "localhost:0" for an ephemeral port.
    #[serde(default = "default_listen_address", alias = "NodeExporterListenAddress")]
    pub node_exporter_listen_address: String,

    /// Labels attached to every sample, e.g. host or session identifiers.
    #[serde(default, alias = "Labels")]
    pub labels: LabelSet,

    /// How often the published snapshot is refreshed.
    #[serde(default = "default_sample_interval", with = "crate::duration::serde")]
    pub sample_interval: Duration,
}

fn default_listen_address() -> String {
    "0.0.0.0:9100".to_string()
}

const fn default_sample_interval() -> Duration {
    Duration::from_secs(15)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            node_exporter_listen_address: default_listen_address(),
            labels: LabelSet::new(),
            sample_interval: default_sample_interval(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ServiceConfig =
            serde_yaml::from_str(&content).map_err(|source| Error::ParseConfig {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_exporter_listen_address.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "listen address must not be empty".to_string(),
            ));
        }

        if self.sample_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sample interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
