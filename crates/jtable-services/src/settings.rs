//! Persisted user-level table defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{MissingPredicatePolicy, MutationPolicy, TableConfig};

/// Defaults applied to tables created by an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Page size for new tables
    pub default_page_size: usize,
    /// Page sizes offered by page-size pickers
    pub available_page_sizes: Vec<usize>,
    pub missing_predicate_policy: MissingPredicatePolicy,
    pub mutation_policy: MutationPolicy,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            available_page_sizes: vec![10, 25, 50, 100],
            missing_predicate_policy: MissingPredicatePolicy::default(),
            mutation_policy: MutationPolicy::default(),
        }
    }
}

impl TableSettings {
    /// Load settings from a JSON file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No table settings at {:?}; using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read table settings from {:?}", path))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse table settings JSON in {:?}", path))?;

        tracing::debug!("Loaded table settings from {:?}", path);
        Ok(settings.sanitized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write table settings to {:?}", path))?;

        tracing::debug!("Saved table settings to {:?}", path);
        Ok(())
    }

    /// Drop zero page sizes and keep the list sorted and unique
    fn sanitized(mut self) -> Self {
        self.default_page_size = self.default_page_size.max(1);
        self.available_page_sizes.retain(|size| *size > 0);
        self.available_page_sizes.sort_unstable();
        self.available_page_sizes.dedup();
        self
    }

    /// Overlay these defaults onto a table configuration
    pub fn apply_to(&self, mut config: TableConfig) -> TableConfig {
        config.page_size = self.default_page_size.max(1);
        config.missing_predicate_policy = self.missing_predicate_policy;
        config.mutation_policy = self.mutation_policy;
        config
    }
}
