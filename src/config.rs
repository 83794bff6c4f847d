//! Redis connection and pool configuration.

use std::time::Duration;

use deadpool_redis::{ConnectionAddr, ConnectionInfo, PoolConfig, RedisConnectionInfo, Runtime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the Redis connection pool backing a limiter.
///
/// All fields have defaults suitable for a local Redis; production callers
/// should at least set `address` and `password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis address in `host:port` form.
    #[serde(default = "default_address")]
    pub address: String,

    /// Password for `AUTH`; empty means no authentication.
    #[serde(default)]
    pub password: String,

    /// Maximum open connections in the pool.
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    /// Read timeout for one round trip, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Write timeout for one round trip, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Whether callers block waiting for a connection when the pool is
    /// exhausted. When false (the default), exhaustion fails the call.
    #[serde(default)]
    pub wait_on_exhaustion: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            password: String::new(),
            max_active: default_max_active(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            wait_on_exhaustion: false,
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_max_active() -> usize {
    500
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_write_timeout_ms() -> u64 {
    3000
}

impl RedisConfig {
    /// Configuration for the given address, defaults elsewhere.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::InputParam(format!("cannot read config {path}: {e}")))?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::InputParam(format!("failed to parse redis config: {e}")))
    }

    /// Budget for one script round trip.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms + self.write_timeout_ms)
    }

    fn host_port(&self) -> Result<(String, u16)> {
        let (host, port) = self.address.rsplit_once(':').ok_or_else(|| {
            Error::InputParam(format!("address must be host:port, got {:?}", self.address))
        })?;
        if host.is_empty() {
            return Err(Error::InputParam(format!(
                "address must be host:port, got {:?}",
                self.address
            )));
        }
        let port = port.parse::<u16>().map_err(|_| {
            Error::InputParam(format!("invalid port in address {:?}", self.address))
        })?;
        Ok((host.to_string(), port))
    }

    /// Build the connection pool described by this configuration.
    ///
    /// The password travels as the literal `AUTH` credential, never through a
    /// URL, so reserved URL characters in it need no escaping.
    pub(crate) fn create_pool(&self) -> Result<deadpool_redis::Pool> {
        let (host, port) = self.host_port()?;
        if self.max_active == 0 {
            return Err(Error::InputParam("max_active must be positive".into()));
        }

        let mut cfg = deadpool_redis::Config::default();
        cfg.connection = Some(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                password: (!self.password.is_empty()).then(|| self.password.clone()),
                ..Default::default()
            },
        });
        let mut pool = PoolConfig::new(self.max_active);
        if !self.wait_on_exhaustion {
            pool.timeouts.wait = Some(Duration::ZERO);
        }
        cfg.pool = Some(pool);
        Ok(cfg.create_pool(Some(Runtime::Tokio1))?)
    }
}
