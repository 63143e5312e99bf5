use crate::channel::timeout_from_micros;
use crate::common::Direction;
use crate::error::{ErioError, Result};
use erio_protocol::Memory;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub path: PathBuf,
    pub direction: Direction,
    #[serde(with = "MemoryDef", default = "default_memory")]
    pub memory: Memory,
    #[serde(default = "default_buffers")]
    pub buffers: usize,
    #[serde(default)]
    pub fixed_size: Option<usize>,
    #[serde(default)]
    pub chdr_length_quirk: bool,
    /// Dequeue timeout in microseconds, negative waits forever.
    #[serde(default = "default_timeout_us")]
    pub timeout_us: i64,
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "Memory", rename_all = "lowercase")]
enum MemoryDef {
    Mmap,
    UserPtr,
    DmaBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_memory() -> Memory {
    Memory::Mmap
}

fn default_buffers() -> usize {
    32
}

fn default_timeout_us() -> i64 {
    250_000
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ErioError::Logging(format!("unknown log level {:?}", self.log_level)))
    }
}

impl ChannelConfig {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_micros(self.timeout_us)
    }
}
