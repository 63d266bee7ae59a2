//! Configuration management for nftsync.
//!
//! Every field has a default, so running without a config file manages the
//! GitHub Actions ranges in `inet filter`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::classifier::{EmptyFamilyPolicy, Family};
use crate::enforcer::statement::{is_valid_identifier, TableFamily, TableId};

pub const DEFAULT_META_URL: &str = "https://api.github.com/meta";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// nft table family holding both sets
    pub table_family: TableFamily,

    /// nft table name
    pub table_name: String,

    /// Name of the IPv4 set
    pub ipv4_set: String,

    /// Name of the IPv6 set
    pub ipv6_set: String,

    /// Metadata endpoint (must be HTTPS)
    pub meta_url: String,

    /// JSON list fields to read from the metadata document, in order
    pub meta_fields: Vec<String>,

    /// nft binary
    pub nft_path: String,

    /// Deadline for the metadata request
    pub fetch_timeout_secs: u64,

    /// Deadline for each nft invocation
    pub engine_timeout_secs: u64,

    /// Behaviour when one family comes back empty
    pub empty_family_policy: EmptyFamilyPolicy,

    /// Try to delete the sets before updating them
    pub reclaim: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_family: TableFamily::Inet,
            table_name: "filter".to_string(),
            ipv4_set: "github_actions_ipv4".to_string(),
            ipv6_set: "github_actions_ipv6".to_string(),
            meta_url: DEFAULT_META_URL.to_string(),
            meta_fields: vec!["actions".to_string()],
            nft_path: "nft".to_string(),
            fetch_timeout_secs: 30,
            engine_timeout_secs: 30,
            empty_family_policy: EmptyFamilyPolicy::Preserve,
            reclaim: true,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (what, name) in [
            ("table_name", &self.table_name),
            ("ipv4_set", &self.ipv4_set),
            ("ipv6_set", &self.ipv6_set),
        ] {
            if !is_valid_identifier(name) {
                bail!(
                    "Invalid {} '{}'. Use letters, digits and underscores, starting with a letter",
                    what,
                    name
                );
            }
        }

        if self.ipv4_set == self.ipv6_set {
            bail!("ipv4_set and ipv6_set must differ (both are '{}')", self.ipv4_set);
        }

        if !self.table_family.holds(Family::V4) || !self.table_family.holds(Family::V6) {
            bail!(
                "Table family '{}' cannot hold both IPv4 and IPv6 sets; use 'inet'",
                self.table_family
            );
        }

        if !self.meta_url.starts_with("https://") {
            bail!("meta_url must use HTTPS: {}", self.meta_url);
        }

        if self.meta_fields.is_empty() || self.meta_fields.iter().any(|f| f.trim().is_empty()) {
            bail!("meta_fields must name at least one non-empty field");
        }

        if self.nft_path.trim().is_empty() {
            bail!("nft_path cannot be empty");
        }

        if self.fetch_timeout_secs == 0 || self.engine_timeout_secs == 0 {
            bail!("Timeouts must be at least one second");
        }

        Ok(())
    }

    pub fn table(&self) -> TableId {
        TableId::new(self.table_family, self.table_name.clone())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}
