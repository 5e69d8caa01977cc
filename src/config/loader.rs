use crate::analysis::KeepRules;
use crate::graph::{MalformedClassPolicy, ResourceMatching};
use crate::pipeline::ShrinkOptions;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// File names probed next to the input archive, in order
pub const DEFAULT_CONFIG_NAMES: [&str; 7] = [
    ".jarprune.yml",
    ".jarprune.yaml",
    ".jarprune.toml",
    "jarprune.yml",
    "jarprune.yaml",
    "jarprune.toml",
    "jarprune.json",
];

/// Configuration for a shrink run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entry point and forced retentions
    #[serde(flatten)]
    pub keep: KeepRules,

    /// How string literals are matched against resource paths
    pub resource_matching: ResourceMatching,

    /// Treat string literals that name a class in the archive as references
    pub class_name_literals: bool,

    /// What to do with class files that fail to parse
    pub malformed_classes: MalformedClassPolicy,

    /// Deflate stored members when that makes them smaller
    pub recompress: bool,

    /// Report retained resources with identical content
    pub duplicates: bool,

    /// Keep service files for interfaces that live outside the archive
    pub keep_external_services: bool,

    /// Worker threads; 0 uses one per core
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep: KeepRules::default(),
            resource_matching: ResourceMatching::default(),
            class_name_literals: true,
            malformed_classes: MalformedClassPolicy::default(),
            recompress: false,
            duplicates: false,
            keep_external_services: true,
            threads: 0,
        }
    }
}

impl Config {
    /// Load configuration from a YAML, TOML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        debug!("Loading config from {}", path.display());

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            "json" => serde_json::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse JSON config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Load the first config file found in `dir`, or the defaults
    pub fn from_default_locations(dir: &Path) -> Result<Self> {
        for name in &DEFAULT_CONFIG_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                return Self::from_file(&path);
            }
        }

        // No config file found, use defaults
        Ok(Self::default())
    }

    pub fn shrink_options(&self) -> ShrinkOptions {
        ShrinkOptions {
            resource_matching: self.resource_matching,
            class_name_literals: self.class_name_literals,
            malformed_classes: self.malformed_classes,
            recompress: self.recompress,
            find_duplicates: self.duplicates,
            keep_external_services: self.keep_external_services,
        }
    }
}
