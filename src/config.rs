use std::env;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

const DB_FILE_NAME: &str = "ledgerflow.db";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("unknown LEDGERFLOW_ENV {0:?} (expected development, testing or production)")]
    UnknownEnvironment(String),
    #[error("unsupported DATABASE_URL {0:?}: only sqlite databases are supported")]
    UnsupportedDatabase(String),
    #[error("unable to resolve database path")]
    NoDatabasePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }

    fn default_log_filter(&self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Testing => "warn",
            Environment::Production => "info",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("default") {
            Ok(Environment::Development)
        } else if v.eq_ignore_ascii_case("testing") {
            Ok(Environment::Testing)
        } else if v.eq_ignore_ascii_case("production") {
            Ok(Environment::Production)
        } else {
            Err(ConfigError::UnknownEnvironment(s.to_string()))
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    /// Accepts `sqlite:///abs/path`, `sqlite://rel/path`, `sqlite::memory:`,
    /// `:memory:` or a bare filesystem path.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim();
        if trimmed == ":memory:" || trimmed == "sqlite::memory:" || trimmed == "sqlite://:memory:" {
            return Ok(DatabaseLocation::Memory);
        }
        if let Some(rest) = trimmed.strip_prefix("sqlite:///") {
            return Ok(DatabaseLocation::File(PathBuf::from(format!("/{rest}"))));
        }
        if let Some(rest) = trimmed.strip_prefix("sqlite://") {
            return Ok(DatabaseLocation::File(PathBuf::from(rest)));
        }
        if trimmed.contains("://") || trimmed.is_empty() {
            return Err(ConfigError::UnsupportedDatabase(url.to_string()));
        }
        Ok(DatabaseLocation::File(PathBuf::from(trimmed)))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database: DatabaseLocation,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("LEDGERFLOW_ENV") {
            Some(v) => v.parse()?,
            None => Environment::Development,
        };

        let host = lookup("HOST")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        let database = match lookup("DATABASE_URL") {
            Some(url) => DatabaseLocation::parse(&url)?,
            None => DatabaseLocation::File(resolve_db_path()?),
        };

        let log_filter = lookup("LEDGERFLOW_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| environment.default_log_filter().to_string());

        Ok(Self {
            environment,
            host,
            port,
            database,
            log_filter,
        })
    }

    /// Resolves `host` (an IP literal or a name such as `localhost`) to the
    /// first matching socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port));
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }
}

fn resolve_db_path() -> Result<PathBuf, ConfigError> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(DB_FILE_NAME));
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(DB_FILE_NAME));
        }
    }

    for p in &candidates {
        if p.exists() {
            return Ok(p.clone());
        }
    }

    candidates.into_iter().next().ok_or(ConfigError::NoDatabasePath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let cfg = config_from(&[("DATABASE_URL", ":memory:")]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.database, DatabaseLocation::Memory);
    }

    #[test]
    fn production_env_and_port_are_read() {
        let cfg = config_from(&[
            ("LEDGERFLOW_ENV", "production"),
            ("PORT", "8080"),
            ("DATABASE_URL", "sqlite:///var/lib/ledgerflow.db"),
        ])
        .unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(
            cfg.database,
            DatabaseLocation::File(PathBuf::from("/var/lib/ledgerflow.db"))
        );
    }

    #[test]
    fn listen_addr_accepts_ips_and_hostnames() {
        let cfg = config_from(&[("HOST", "127.0.0.1"), ("PORT", "5050"), ("DATABASE_URL", ":memory:")]).unwrap();
        assert_eq!(cfg.listen_addr().unwrap(), "127.0.0.1:5050".parse::<SocketAddr>().unwrap());

        let cfg = config_from(&[("HOST", "localhost"), ("DATABASE_URL", ":memory:")]).unwrap();
        let addr = cfg.listen_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 5000);

        let cfg = config_from(&[("HOST", "::1"), ("DATABASE_URL", ":memory:")]).unwrap();
        assert!(cfg.listen_addr().unwrap().is_ipv6());
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = config_from(&[("PORT", "http"), ("DATABASE_URL", ":memory:")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let err = config_from(&[("LEDGERFLOW_ENV", "staging")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEnvironment(_)));
    }

    #[test]
    fn database_urls_parse() {
        assert_eq!(
            DatabaseLocation::parse("sqlite://data/app.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/app.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("./ledger.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("./ledger.db"))
        );
        assert!(DatabaseLocation::parse("postgres://localhost/db").is_err());
    }
}
