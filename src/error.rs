use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("bind listener at {address} failed, {source}")]
    BindListener {
        address: String,
        source: std::io::Error,
    },

    #[error("read config file {path:?} failed, {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config file {path:?} failed, {source}")]
    ParseConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
