use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Optional passes around world expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Refuse to build if any instance names a missing definition or the
    /// definitions reference each other in a cycle
    pub strict_references: bool,
    /// Remove invalid obstacles from the authored definitions before building
    pub delete_invalid: bool,
    pub replace_bases_with_boxes: bool,
    /// Sort each world list by name, then position. Invalidates ids taken
    /// before the build.
    pub sort_output: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            strict_references: false,
            delete_invalid: true,
            replace_bases_with_boxes: false,
            sort_output: false,
        }
    }
}

impl BuildConfig {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("failed to parse build config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read build config {}", path.display()))?;
        Self::from_toml(&s).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = BuildConfig::from_toml("sort_output = true").unwrap();
        assert_eq!(cfg, BuildConfig { sort_output: true, ..Default::default() });
        assert_eq!(BuildConfig::from_toml("").unwrap(), BuildConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BuildConfig::from_toml("strict = true").is_err());
    }
}
