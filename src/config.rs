//! Configuration handling for the datasource registry.
//!
//! Library behavior is controlled by [`RegistryOptions`]; pool sizing comes
//! from [`PoolOptions`], extracted from each host's parameter bag. The `dsreg`
//! binary reads its settings from CLI arguments and environment variables via
//! [`Config`].

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PASSWORD_ENV: &str = "SQL_PW";
pub const DEFAULT_SELECTION_ENV_PREFIX: &str = "DATASOURCE";
pub const DEFAULT_KEY_PREFIX: &str = "dsn";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options parsed from a host's parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Parameter bag keys consumed here and never forwarded to the driver.
    pub const KEYS: &'static [&'static str] = &[
        "max_connections",
        "min_connections",
        "idle_timeout",
        "acquire_timeout",
        "test_before_acquire",
    ];

    /// Split a parameter bag into pool options and driver parameters.
    ///
    /// Unparseable values are ignored, matching keys case-insensitively.
    pub fn extract(params: &BTreeMap<String, String>) -> (Self, BTreeMap<String, String>) {
        let mut opts = BTreeMap::new();
        let mut remaining = BTreeMap::new();
        for (k, v) in params {
            let key_lower = k.to_ascii_lowercase();
            if Self::KEYS.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.clone());
            } else {
                remaining.insert(k.clone(), v.clone());
            }
        }

        let pool_options = Self {
            max_connections: opts.get("max_connections").and_then(|v| v.parse().ok()),
            min_connections: opts.get("min_connections").and_then(|v| v.parse().ok()),
            idle_timeout_secs: opts.get("idle_timeout").and_then(|v| v.parse().ok()),
            acquire_timeout_secs: opts.get("acquire_timeout").and_then(|v| v.parse().ok()),
            test_before_acquire: opts.get("test_before_acquire").and_then(|v| {
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }),
        };
        (pool_options, remaining)
    }

    /// Get max_connections with default value based on backend kind.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Options shared by every datasource in one registry.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Deadline for open plus liveness check.
    pub connect_timeout: Duration,
    /// Environment variable holding the networked backend password.
    pub password_env: String,
    /// Selection key override is read from `<prefix><id + 1>`.
    pub selection_env_prefix: String,
    /// Fallback selection key is `<prefix><id + 1>`.
    pub default_key_prefix: String,
    /// Last-resort directory for embedded files, usually the caller's source dir.
    pub anchor_dir: Option<PathBuf>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            password_env: DEFAULT_PASSWORD_ENV.to_string(),
            selection_env_prefix: DEFAULT_SELECTION_ENV_PREFIX.to_string(),
            default_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            anchor_dir: None,
        }
    }
}

impl RegistryOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_password_env(mut self, name: impl Into<String>) -> Self {
        self.password_env = name.into();
        self
    }

    pub fn with_selection_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.selection_env_prefix = prefix.into();
        self
    }

    pub fn with_default_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_key_prefix = prefix.into();
        self
    }

    pub fn with_anchor_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.anchor_dir = Some(dir.into());
        self
    }
}

/// Directory of the source file that invokes the macro.
///
/// Pass the result to [`RegistryOptions::with_anchor_dir`] so embedded files
/// placed next to the calling code are found regardless of the working
/// directory.
#[macro_export]
macro_rules! call_site_dir {
    () => {
        ::std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join(file!())
            .parent()
            .map(::std::path::Path::to_path_buf)
            .unwrap_or_else(|| ::std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")))
    };
}

/// Configuration for the `dsreg` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dsreg",
    about = "Initialize, inspect and swap configured SQL datasources",
    version,
    author
)]
pub struct Config {
    /// JSON file mapping selection keys to host descriptors
    #[arg(long, value_name = "PATH", env = "DSREG_HOSTS")]
    pub hosts: PathBuf,

    /// Selection key for the primary datasource (id 0)
    #[arg(long, value_name = "KEY")]
    pub primary: Option<String>,

    /// Selection key for the secondary datasource (id 1)
    #[arg(long, value_name = "KEY")]
    pub secondary: Option<String>,

    /// Swap primary and secondary after initialization
    #[arg(long)]
    pub swap: bool,

    /// Trace statements issued through default mappers
    #[arg(long)]
    pub trace: bool,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DSREG_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Environment variable holding the networked backend password
    #[arg(long, default_value = DEFAULT_PASSWORD_ENV, env = "DSREG_PASSWORD_ENV")]
    pub password_env: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DSREG_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DSREG_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Whether the secondary datasource should be initialized.
    pub fn wants_secondary(&self) -> bool {
        self.secondary.is_some() || self.swap
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Registry options; embedded files are also looked up next to the host file.
    pub fn registry_options(&self) -> RegistryOptions {
        let mut options = RegistryOptions::default()
            .with_connect_timeout(self.connect_timeout_duration())
            .with_password_env(self.password_env.clone());
        if let Some(dir) = self.hosts.parent().filter(|d| !d.as_os_str().is_empty()) {
            options = options.with_anchor_dir(dir);
        }
        options
    }
}
