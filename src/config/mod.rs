//! Configuration for the remediation engine and its cache

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CACHE_EXPIRATION_FOR_BAD_IP, CACHE_EXPIRATION_FOR_CLEAN_IP, REMEDIATION_BAN,
    REMEDIATION_BYPASS,
};
use crate::error::{ConfigError, Result};

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remediation ordering and fallback
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Cache backend and lifetimes
    pub cache: CacheConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Normalize and validate every section
    pub fn validate(&mut self) -> Result<()> {
        self.remediation.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Remediation ordering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Known remediations, most severe first
    #[serde(default = "default_ordered_remediations")]
    pub ordered_remediations: Vec<String>,

    /// Remediation substituted for unknown decision types
    #[serde(default = "default_fallback_remediation")]
    pub fallback_remediation: String,
}

fn default_ordered_remediations() -> Vec<String> {
    vec![REMEDIATION_BAN.to_string(), REMEDIATION_BYPASS.to_string()]
}

fn default_fallback_remediation() -> String {
    REMEDIATION_BYPASS.to_string()
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            ordered_remediations: default_ordered_remediations(),
            fallback_remediation: default_fallback_remediation(),
        }
    }
}

impl RemediationConfig {
    /// Build a validated configuration
    pub fn new(ordered_remediations: Vec<String>, fallback_remediation: &str) -> Result<Self> {
        let mut config = Self {
            ordered_remediations,
            fallback_remediation: fallback_remediation.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Deduplicate the ordered list, force bypass to the lowest priority and
    /// check that the fallback belongs to the list.
    pub fn validate(&mut self) -> Result<()> {
        if self.ordered_remediations.is_empty() {
            return Err(
                ConfigError::Invalid("ordered_remediations cannot be empty".to_string()).into(),
            );
        }

        let mut normalized: Vec<String> = Vec::with_capacity(self.ordered_remediations.len() + 1);
        for remediation in &self.ordered_remediations {
            let remediation = remediation.trim();
            if remediation.is_empty() {
                return Err(ConfigError::Invalid(
                    "ordered_remediations cannot contain an empty value".to_string(),
                )
                .into());
            }
            if remediation != REMEDIATION_BYPASS && !normalized.iter().any(|r| r == remediation) {
                normalized.push(remediation.to_string());
            }
        }
        normalized.push(REMEDIATION_BYPASS.to_string());
        self.ordered_remediations = normalized;

        if !self
            .ordered_remediations
            .iter()
            .any(|r| *r == self.fallback_remediation)
        {
            return Err(ConfigError::Invalid(
                "Fallback remediation must belong to ordered remediations.".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Index of a remediation in the ordered list (0 is the most severe)
    pub fn priority_of(&self, remediation: &str) -> Option<usize> {
        self.ordered_remediations.iter().position(|r| r == remediation)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Treat the cache as authoritative between feed refreshes
    #[serde(default)]
    pub stream_mode: bool,

    /// Lifetime of a cached clean IP, in seconds
    #[serde(default = "default_clean_ip_cache_duration")]
    pub clean_ip_cache_duration: u64,

    /// Cap on the lifetime of a cached bad IP, in seconds
    #[serde(default = "default_bad_ip_cache_duration")]
    pub bad_ip_cache_duration: u64,

    /// Backend connection string (`memory://`, `sqlite://<dir>`)
    pub dsn: String,
}

fn default_clean_ip_cache_duration() -> u64 {
    CACHE_EXPIRATION_FOR_CLEAN_IP
}

fn default_bad_ip_cache_duration() -> u64 {
    CACHE_EXPIRATION_FOR_BAD_IP
}

impl CacheConfig {
    /// Configuration with default lifetimes for the given DSN
    pub fn with_dsn(dsn: &str) -> Self {
        Self {
            stream_mode: false,
            clean_ip_cache_duration: default_clean_ip_cache_duration(),
            bad_ip_cache_duration: default_bad_ip_cache_duration(),
            dsn: dsn.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.clean_ip_cache_duration < 1 {
            return Err(ConfigError::Invalid(
                "clean_ip_cache_duration must be at least 1".to_string(),
            )
            .into());
        }
        if self.bad_ip_cache_duration < 1 {
            return Err(
                ConfigError::Invalid("bad_ip_cache_duration must be at least 1".to_string()).into(),
            );
        }
        self.backend()?;
        Ok(())
    }

    /// Resolve the DSN into a backend selection
    pub fn backend(&self) -> Result<BackendDsn> {
        BackendDsn::parse(&self.dsn)
    }
}

/// Backend selected by a cache DSN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDsn {
    /// In-process map
    Memory,
    /// SQLite database under the given directory (None: user cache dir)
    Sqlite(Option<PathBuf>),
}

impl BackendDsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        if dsn.is_empty() {
            return Err(ConfigError::EmptyDsn.into());
        }

        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| ConfigError::Invalid(format!("Malformed cache DSN: {}", dsn)))?;

        match scheme {
            "memory" => Ok(BackendDsn::Memory),
            "sqlite" if rest.is_empty() => Ok(BackendDsn::Sqlite(None)),
            "sqlite" => Ok(BackendDsn::Sqlite(Some(PathBuf::from(rest)))),
            "redis" | "memcached" => Err(ConfigError::UnsupportedBackend(scheme.to_string()).into()),
            other => Err(ConfigError::Invalid(format!("Unknown cache DSN scheme: {}", other)).into()),
        }
    }
}
