use clap::{Parser, ValueEnum};
use jiff::Timestamp;
use keyway_cache::CacheSettings;
use keyway_shortener::ServiceSettings;
use keyway_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

pub const LISTEN_ADDR_ENV: &str = "KEYWAY_LISTEN_ADDR";
pub const PUBLIC_BASE_URL_ENV: &str = "KEYWAY_PUBLIC_BASE_URL";
pub const NODE_ID_ENV: &str = "KEYWAY_NODE_ID";
pub const ALLOCATOR_ENV: &str = "KEYWAY_ALLOCATOR";
pub const BLOCK_SIZE_ENV: &str = "KEYWAY_BLOCK_SIZE";
pub const FLAKE_EPOCH_ENV: &str = "KEYWAY_FLAKE_EPOCH";
pub const SHARDS_ENV: &str = "KEYWAY_SHARDS";
pub const STORAGE_BACKEND_ENV: &str = "KEYWAY_STORAGE_BACKEND";
pub const MYSQL_SHARD_DSNS_ENV: &str = "KEYWAY_MYSQL_SHARD_DSNS";
pub const MYSQL_AUTHORITY_DSN_ENV: &str = "KEYWAY_MYSQL_AUTHORITY_DSN";
pub const CACHE_CAPACITY_ENV: &str = "KEYWAY_CACHE_CAPACITY";
pub const CACHE_TTL_ENV: &str = "KEYWAY_CACHE_TTL_SECS";
pub const FRESH_CACHE_TTL_ENV: &str = "KEYWAY_FRESH_CACHE_TTL_SECS";
pub const WRITE_TIMEOUT_ENV: &str = "KEYWAY_WRITE_TIMEOUT_MS";
pub const REAPER_INTERVAL_ENV: &str = "KEYWAY_REAPER_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "KEYWAY_LOG_FORMAT";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_FLAKE_EPOCH: &str = "2025-01-01T00:00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AllocatorArg {
    /// Counter blocks reserved from an authority.
    #[value(name = "block")]
    Block,
    /// Coordination-free time, node and sequence identifiers.
    #[value(name = "flake")]
    Flake,
}

impl Display for AllocatorArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocatorArg::Block => write!(f, "block"),
            AllocatorArg::Flake => write!(f, "flake"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        LogFormat::from(*self).fmt(f)
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "keyway-gateway")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    #[arg(long, env = PUBLIC_BASE_URL_ENV, default_value = DEFAULT_PUBLIC_BASE_URL)]
    pub public_base_url: String,

    /// Unique per running node.
    #[arg(long, env = NODE_ID_ENV, default_value_t = 0)]
    pub node_id: u16,

    #[arg(
        long,
        env = ALLOCATOR_ENV,
        value_enum,
        default_value_t = AllocatorArg::Block
    )]
    pub allocator: AllocatorArg,

    #[arg(long, env = BLOCK_SIZE_ENV, default_value_t = keyway_idalloc::DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,

    #[arg(long, env = FLAKE_EPOCH_ENV, default_value = DEFAULT_FLAKE_EPOCH)]
    pub flake_epoch: Timestamp,

    /// Number of in-memory shards.
    #[arg(long, env = SHARDS_ENV, default_value_t = 4)]
    pub shards: u16,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    /// One DSN per shard, comma separated, in shard id order.
    #[arg(
        long,
        env = MYSQL_SHARD_DSNS_ENV,
        value_delimiter = ',',
        required_if_eq("storage", "mysql")
    )]
    pub mysql_shard_dsns: Vec<String>,

    /// Database holding the identifier block counter. Defaults to shard 0.
    #[arg(long, env = MYSQL_AUTHORITY_DSN_ENV)]
    pub mysql_authority_dsn: Option<String>,

    #[arg(long, env = CACHE_CAPACITY_ENV, default_value_t = 100_000)]
    pub cache_capacity: u64,

    #[arg(long, env = CACHE_TTL_ENV, default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = FRESH_CACHE_TTL_ENV)]
    pub fresh_cache_ttl_secs: Option<u64>,

    #[arg(long, env = WRITE_TIMEOUT_ENV, default_value_t = 2000)]
    pub write_timeout_ms: u64,

    #[arg(long, env = REAPER_INTERVAL_ENV, default_value_t = 60)]
    pub reaper_interval_secs: u64,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,
}

impl CLI {
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fresh_cache_ttl: self.fresh_cache_ttl_secs.map(Duration::from_secs),
            ..ServiceSettings::default()
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings::builder()
            .max_capacity(self.cache_capacity)
            .max_ttl(Duration::from_secs(self.cache_ttl_secs))
            .build()
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    /// DSN of the block authority database, if MySQL is in use.
    pub fn authority_dsn(&self) -> Option<&str> {
        self.mysql_authority_dsn
            .as_deref()
            .or_else(|| self.mysql_shard_dsns.first().map(String::as_str))
    }
}
