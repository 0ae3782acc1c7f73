//! Per-service engine configuration.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Governance zones for one calling service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceZones {
    /// Zones the caller may read. `None` means unrestricted.
    pub supported: Option<BTreeSet<String>>,
    /// Assigned to new elements created without explicit zones.
    pub default: Vec<String>,
    /// Assigned when an element is published.
    pub publish: Vec<String>,
}

/// Configuration for the mapping engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name reported in audit events
    pub server_name: String,
    pub zones: GovernanceZones,
    /// Upper bound on returned page sizes (0 = unbounded)
    pub max_page_size: usize,
    /// Ask the security verifier before reads as well as writes
    pub check_read_access: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_name: "metaweave".to_string(),
            zones: GovernanceZones::default(),
            max_page_size: 1000,
            check_read_access: false,
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.server_name.trim().is_empty(),
            "server_name must not be empty"
        );
        for zone in self
            .zones
            .default
            .iter()
            .chain(self.zones.publish.iter())
            .chain(self.zones.supported.iter().flatten())
        {
            ensure!(!zone.trim().is_empty(), "zone names must not be empty");
        }
        Ok(())
    }

    /// Page size after applying `max_page_size`; 0 requested means "as many
    /// as allowed".
    pub fn effective_page_size(&self, requested: usize) -> usize {
        capped_page_size(requested, self.max_page_size)
    }
}

pub(crate) fn capped_page_size(requested: usize, max_page_size: usize) -> usize {
    match (requested, max_page_size) {
        (0, max) => max,
        (requested, 0) => requested,
        (requested, max) => requested.min(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_partial_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server_name": "cocoMDS1", "zones": {{"supported": ["quarantine", "data-lake"], "default": ["quarantine"]}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.server_name, "cocoMDS1");
        assert_eq!(config.zones.default, vec!["quarantine".to_string()]);
        assert!(config.zones.publish.is_empty());
        assert_eq!(config.max_page_size, 1000);
        assert!(config
            .zones
            .supported
            .as_ref()
            .unwrap()
            .contains("data-lake"));
    }

    #[test]
    fn rejects_blank_server_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server_name": "  "}}"#).unwrap();
        let err = EngineConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("server_name"));
    }

    #[test]
    fn page_size_is_capped() {
        let config = EngineConfig {
            max_page_size: 50,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_page_size(0), 50);
        assert_eq!(config.effective_page_size(10), 10);
        assert_eq!(config.effective_page_size(500), 50);
    }
}
