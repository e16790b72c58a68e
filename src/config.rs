//! Configuration loading.
//!
//! Loads `config.toml` from `$ORGKERNEL_CONFIG_PATH`, or from the home
//! directory (`$ORGKERNEL_HOME`, default `~/.orgkernel/`). Environment
//! variables override file values; file values override defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::acl::DEFAULT_MAX_PARAMS;
use crate::host::{Limits, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_ORACLE_DEPTH};
use crate::types::Address;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrgConfig {
    /// Bootstrap identity.
    pub genesis: GenesisConfig,
    /// Chain clock.
    pub chain: ChainConfig,
    /// Host and ACL limits.
    pub limits: LimitsConfig,
    /// Filesystem paths; unset entries live under the home directory.
    pub paths: PathsConfig,
}

/// `[genesis]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Root identity: a `0x` address or a label.
    pub root: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            root: "root".to_owned(),
        }
    }
}

/// `[chain]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Timestamp of block 0.
    pub genesis_timestamp: u64,
    /// Seconds per mined block.
    pub block_time_secs: u64,
    /// Mine a block after every committed invocation.
    pub auto_mine: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            block_time_secs: 12,
            auto_mine: true,
        }
    }
}

/// `[limits]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Nested call depth bound.
    pub max_call_depth: usize,
    /// Oracle nesting bound.
    pub max_oracle_depth: usize,
    /// Params per predicate.
    pub max_params: usize,
    /// Node request channel capacity.
    pub channel_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_oracle_depth: DEFAULT_MAX_ORACLE_DEPTH,
            max_params: DEFAULT_MAX_PARAMS,
            channel_buffer: 64,
        }
    }
}

/// `[paths]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite state database.
    pub state_db: Option<PathBuf>,
    /// Audit log (JSON lines).
    pub audit_log: Option<PathBuf>,
    /// Rotated log files.
    pub logs_dir: Option<PathBuf>,
}

impl PathsConfig {
    /// State database path under `home` unless configured.
    pub fn state_db(&self, home: &Path) -> PathBuf {
        self.state_db.clone().unwrap_or_else(|| home.join("state.db"))
    }

    /// Audit log path under `home` unless configured.
    pub fn audit_log(&self, home: &Path) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| home.join("audit.jsonl"))
    }

    /// Logs directory under `home` unless configured.
    pub fn logs_dir(&self, home: &Path) -> PathBuf {
        self.logs_dir.clone().unwrap_or_else(|| home.join("logs"))
    }
}

impl OrgConfig {
    /// Load with precedence: env vars > TOML file > defaults.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with a custom env resolver.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path_with(&env)?;
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config at {}: {e}",
                    path.display()
                ))
            }
        };
        config.apply_overrides(env);
        Ok(config)
    }

    /// Parse a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or unknown value types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests need not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("ORGKERNEL_ROOT") {
            self.genesis.root = v;
        }
        parse_override(&env, "ORGKERNEL_BLOCK_TIME_SECS", &mut self.chain.block_time_secs);
        parse_override(&env, "ORGKERNEL_AUTO_MINE", &mut self.chain.auto_mine);
        parse_override(&env, "ORGKERNEL_MAX_CALL_DEPTH", &mut self.limits.max_call_depth);
        parse_override(
            &env,
            "ORGKERNEL_MAX_ORACLE_DEPTH",
            &mut self.limits.max_oracle_depth,
        );
        if let Some(v) = env("ORGKERNEL_STATE_DB") {
            self.paths.state_db = Some(PathBuf::from(v));
        }
        if let Some(v) = env("ORGKERNEL_AUDIT_LOG") {
            self.paths.audit_log = Some(PathBuf::from(v));
        }
        if let Some(v) = env("ORGKERNEL_LOGS_DIR") {
            self.paths.logs_dir = Some(PathBuf::from(v));
        }
    }

    /// The root identity as an address.
    pub fn root(&self) -> Address {
        let root = self.genesis.root.trim();
        if root.starts_with("0x") {
            if let Ok(addr) = root.parse() {
                return addr;
            }
        }
        Address::from_label(root)
    }

    /// Host limits.
    pub fn host_limits(&self) -> Limits {
        Limits {
            max_call_depth: self.limits.max_call_depth,
            max_oracle_depth: self.limits.max_oracle_depth,
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) {
    if let Some(v) = env(var) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

/// Resolve the config file path.
fn config_path_with(env: &impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(p) = env("ORGKERNEL_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir_with(env)?.join("config.toml"))
}

/// Resolve the home directory (`$ORGKERNEL_HOME` or `~/.orgkernel/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    config_dir_with(&|key: &str| std::env::var(key).ok())
}

fn config_dir_with(env: &impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(p) = env("ORGKERNEL_HOME") {
        return Ok(PathBuf::from(p));
    }
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".orgkernel"))
}
