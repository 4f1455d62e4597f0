//! Configuration loading (`spec.md` §10 expansion), grounded on
//! `ferrex-server::infra::config::loader`: a TOML file, overridden by
//! environment variables (`dotenvy` for a local `.env`), falling back to
//! built-in defaults. Validation problems are collected as warnings and
//! logged at startup rather than aborting.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stats_core::IdentityConfig;
use thiserror::Error;

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["stats-server.toml", "config/stats-server.toml"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub identity: IdentityConfig,
    /// Seconds between `global_calc` ticks (`spec.md` §4.7).
    pub global_calc_interval_secs: u64,
    /// Seconds between `purge` sweeps.
    pub purge_interval_secs: u64,
    /// A source's idle grace period before `purge` considers it expired.
    pub source_expiry_secs: i64,
    /// Shared secret gating `?admin=1` on `/admin/stats.xml` and an admin
    /// subscriber mask on `/admin/stats-events` (`spec.md` §6 expansion —
    /// full auth is out of scope, this is the minimal stand-in).
    pub admin_secret: Option<String>,
    pub build: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            identity: IdentityConfig {
                server_id: "stats-server".to_string(),
                host: "localhost".to_string(),
                location: "Earth".to_string(),
                admin: "admin@localhost".to_string(),
                build: None,
            },
            global_calc_interval_secs: 5,
            purge_interval_secs: 30,
            source_expiry_secs: 60,
            admin_secret: None,
            build: None,
        }
    }
}

/// Raw TOML shape; every field optional so a partial file is legal.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    #[serde(default)]
    server: FileServerSection,
    #[serde(default)]
    identity: FileIdentitySection,
    #[serde(default)]
    housekeeping: FileHousekeepingSection,
    admin_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FileIdentitySection {
    server_id: Option<String>,
    host: Option<String>,
    location: Option<String>,
    admin: Option<String>,
    build: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileHousekeepingSection {
    global_calc_interval_secs: Option<u64>,
    purge_interval_secs: Option<u64>,
    source_expiry_secs: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("explicit config path not found: {0:?}")]
    MissingConfig(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings(Vec<String>);

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct ConfigLoad {
    pub config: ServerConfig,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let _ = dotenvy::dotenv();
        let mut warnings = ConfigWarnings::default();

        let (file, config_present) = self.load_file()?;
        if !config_present {
            warnings.push("no stats-server.toml found; using built-in defaults plus environment overrides");
        }

        let mut config = ServerConfig::default();

        if let Some(host) = env_string("STATS_SERVER_HOST").or(file.server.host) {
            apply_host(&mut config.bind, &host, &mut warnings);
        }
        if let Some(port) = env_u16("STATS_SERVER_PORT").or(file.server.port) {
            config.bind.set_port(port);
        }

        if let Some(v) = env_string("STATS_SERVER_ID").or(file.identity.server_id) {
            config.identity.server_id = v;
        }
        if let Some(v) = env_string("STATS_SERVER_HOSTNAME").or(file.identity.host) {
            config.identity.host = v;
        }
        if let Some(v) = env_string("STATS_SERVER_LOCATION").or(file.identity.location) {
            config.identity.location = v;
        }
        if let Some(v) = env_string("STATS_SERVER_ADMIN").or(file.identity.admin) {
            config.identity.admin = v;
        }
        config.identity.build = env_string("STATS_SERVER_BUILD").or(file.identity.build);
        config.build = config.identity.build.clone();
        config.admin_secret = env_string("STATS_SERVER_ADMIN_SECRET").or(file.admin_secret);

        if let Some(v) = env_u64("STATS_GLOBAL_CALC_INTERVAL_SECS").or(file.housekeeping.global_calc_interval_secs) {
            if v == 0 {
                warnings.push("global_calc_interval_secs must be positive; keeping default");
            } else {
                config.global_calc_interval_secs = v;
            }
        }
        if let Some(v) = env_u64("STATS_PURGE_INTERVAL_SECS").or(file.housekeeping.purge_interval_secs) {
            if v == 0 {
                warnings.push("purge_interval_secs must be positive; keeping default");
            } else {
                config.purge_interval_secs = v;
            }
        }
        if let Some(v) = env_i64("STATS_SOURCE_EXPIRY_SECS").or(file.housekeeping.source_expiry_secs) {
            config.source_expiry_secs = v;
        }

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file(&self) -> Result<(FileConfig, bool), ConfigLoadError> {
        let explicit = self.config_path.is_some();
        let path = self
            .config_path
            .clone()
            .or_else(|| DEFAULT_CONFIG_LOCATIONS.iter().map(PathBuf::from).find(|p: &PathBuf| p.exists()));

        let Some(path) = path else {
            return Ok((FileConfig::default(), false));
        };
        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig(path));
            }
            return Ok((FileConfig::default(), false));
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io { path: path.clone(), source })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse { path: path.clone(), source })?;
        Ok((file, true))
    }
}

fn apply_host(bind: &mut SocketAddr, host: &str, warnings: &mut ConfigWarnings) {
    match host.parse::<IpAddr>() {
        Ok(ip) => bind.set_ip(ip),
        Err(_) => warnings.push(format!("invalid bind host {host:?}; keeping default")),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u16(key: &str) -> Option<u16> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// CLI overrides (`spec.md` §10 expansion, grounded on `ferrex-server`'s
/// top-level `Args` in `main.rs`).
#[derive(Debug, clap::Parser)]
#[command(name = "stats-server", about = "Hierarchical stats engine HTTP server")]
pub struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "STATS_SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind host (overrides config).
    #[arg(long, env = "STATS_SERVER_HOST")]
    pub host: Option<String>,

    /// Bind port (overrides config).
    #[arg(short, long, env = "STATS_SERVER_PORT")]
    pub port: Option<u16>,
}

impl Args {
    pub fn apply(&self, config: &mut ServerConfig, warnings: &mut ConfigWarnings) {
        if let Some(host) = &self.host {
            apply_host(&mut config.bind, host, warnings);
        }
        if let Some(port) = self.port {
            config.bind.set_port(port);
        }
    }
}

pub fn loader_for(path: Option<&Path>) -> ConfigLoader {
    match path {
        Some(path) => ConfigLoader::new().with_config_path(path),
        None => ConfigLoader::new(),
    }
}
