//! Configuration for palace

use crate::PalaceError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Palace Configuration

[chunking]
# Maximum lines per chunk
max_lines = 120
# Maximum bytes per chunk
max_bytes = 8192

[guardrails]
# Paths matching these globs are never traversed or indexed
do_not_touch = [
    "**/.git/**",
    "**/.palace/**",
    "**/node_modules/**",
    "**/target/**",
    "**/__pycache__/**",
]
# Read-only paths are equally excluded from indexing
read_only = []
"#;

/// Palace configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    #[serde(default = "default_do_not_touch")]
    pub do_not_touch: Vec<String>,
    #[serde(default)]
    pub read_only: Vec<String>,
}

// Default value functions
fn default_max_lines() -> usize {
    120
}
fn default_max_bytes() -> usize {
    8192
}
fn default_do_not_touch() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/.palace/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/__pycache__/**".to_string(),
    ]
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            do_not_touch: default_do_not_touch(),
            read_only: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| PalaceError::ConfigParse(e.to_string()))
    }

    /// Load config for a repo root, falling back to defaults when absent
    pub fn load_for_root(root: &Path) -> crate::Result<Self> {
        let config_path = root.join(".palace").join("config.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Compile the guardrail glob lists
    pub fn guardrails(&self) -> crate::Result<Guardrails> {
        Guardrails::new(&self.guardrails.do_not_touch, &self.guardrails.read_only)
    }
}

/// Compiled guardrail matchers. Both lists are exclusionary: a path matching
/// either is never traversed, indexed, or reported.
#[derive(Debug, Clone)]
pub struct Guardrails {
    do_not_touch: GlobSet,
    read_only: GlobSet,
}

impl Guardrails {
    pub fn new(do_not_touch: &[String], read_only: &[String]) -> crate::Result<Self> {
        Ok(Self {
            do_not_touch: compile_globs(do_not_touch)?,
            read_only: compile_globs(read_only)?,
        })
    }

    /// Guardrails that exclude nothing
    pub fn empty() -> Self {
        Self {
            do_not_touch: GlobSet::empty(),
            read_only: GlobSet::empty(),
        }
    }

    /// True when the normalized relative path matches either glob list
    pub fn excludes(&self, relative_path: &str) -> bool {
        self.do_not_touch.is_match(relative_path) || self.read_only.is_match(relative_path)
    }
}

fn compile_globs(patterns: &[String]) -> crate::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| PalaceError::GlobPattern(e.to_string()))?;
        builder.add(glob);
        // A subtree pattern must also match the directory node itself so
        // traversal can prune it instead of descending
        if let Some(prefix) = pattern.strip_suffix("/**") {
            let glob = Glob::new(prefix).map_err(|e| PalaceError::GlobPattern(e.to_string()))?;
            builder.add(glob);
        }
    }
    builder
        .build()
        .map_err(|e| PalaceError::GlobPattern(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.chunking.max_lines, 120);
        assert_eq!(config.chunking.max_bytes, 8192);
        assert!(config
            .guardrails
            .do_not_touch
            .contains(&"**/.git/**".to_string()));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.chunking.max_lines, 120);
        assert!(!config.guardrails.do_not_touch.is_empty());
    }

    #[test]
    fn test_subtree_pattern_matches_directory_node() {
        let g = Guardrails::new(&["**/node_modules/**".to_string()], &[]).unwrap();
        assert!(g.excludes("pkg/node_modules"));
        assert!(g.excludes("pkg/node_modules/lib/a.js"));
    }

    #[test]
    fn test_guardrails_exclude() {
        let g = Guardrails::new(
            &["**/node_modules/**".to_string()],
            &["vendor/**".to_string()],
        )
        .unwrap();
        assert!(g.excludes("pkg/node_modules/lib/a.js"));
        assert!(g.excludes("vendor/dep/mod.go"));
        assert!(!g.excludes("src/main.rs"));
    }

    #[test]
    fn test_guardrails_empty_excludes_nothing() {
        let g = Guardrails::empty();
        assert!(!g.excludes("anything/at/all.rs"));
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let err = Guardrails::new(&["a[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, PalaceError::GlobPattern(_)));
    }
}
