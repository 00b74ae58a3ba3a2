//! Configuration for the stencil CLI.
//!
//! Configuration is loaded from `~/.config/stencil/config.toml`. Every field
//! is optional; command-line flags override what the file says.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use stencil_kernel::escape::html_escaper;
use stencil_kernel::lexer::{DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM};
use stencil_kernel::set::{DEFAULT_EXTENSIONS, DEFAULT_MAX_DEPTH};
use stencil_kernel::{OsFileSystemLoader, Set};

/// Settings used to build the template set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory templates are loaded from.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Extensions tried, in order, when resolving a template name.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub delimiters: Delimiters,

    /// Skip the template cache so edits show up immediately.
    #[serde(default)]
    pub development: bool,

    #[serde(default)]
    pub escape: Escape,

    /// Maximum nesting of include, yield and exec.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    #[serde(default = "default_left")]
    pub left: String,
    #[serde(default = "default_right")]
    pub right: String,
}

/// How printed values are escaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escape {
    #[default]
    Html,
    None,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_left() -> String {
    DEFAULT_LEFT_DELIM.to_string()
}

fn default_right() -> String {
    DEFAULT_RIGHT_DELIM.to_string()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            extensions: default_extensions(),
            delimiters: Delimiters::default(),
            development: false,
            escape: Escape::default(),
            max_depth: default_max_depth(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "stencil")
            .context("Could not determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Build a set that loads templates from `root`.
    pub fn build_set(&self) -> Result<Set> {
        let escaper = match self.escape {
            Escape::Html => Some(html_escaper()),
            Escape::None => None,
        };
        Set::builder(OsFileSystemLoader::new(&self.root))
            .extensions(self.extensions.iter().cloned())
            .delimiters(self.delimiters.left.clone(), self.delimiters.right.clone())
            .development(self.development)
            .escaper(escaper)
            .max_depth(self.max_depth)
            .build()
            .context("Invalid template configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.extensions, vec!["", ".jet", ".html.jet", ".jet.html"]);
        assert_eq!(config.delimiters.left, "{{");
        assert_eq!(config.escape, Escape::Html);
        assert!(!config.development);
        assert_eq!(config.max_depth, 256);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
root = "templates"
extensions = [".tmpl"]
development = true
escape = "none"
max_depth = 32

[delimiters]
left = "[["
right = "]]"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.root, PathBuf::from("templates"));
        assert_eq!(config.extensions, vec![".tmpl"]);
        assert!(config.development);
        assert_eq!(config.escape, Escape::None);
        assert_eq!(config.max_depth, 32);
        assert_eq!(config.delimiters.right, "]]");
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str("[delimiters]\nleft = \"<%\"\n").unwrap();
        assert_eq!(config.delimiters.left, "<%");
        assert_eq!(config.delimiters.right, "}}");
        assert_eq!(config.extensions, default_extensions());
    }

    #[test]
    fn test_unknown_escape_is_rejected() {
        assert!(toml::from_str::<Config>("escape = \"xml\"").is_err());
    }

    #[test]
    fn test_bad_delimiters_fail_to_build() {
        let mut config = Config::default();
        config.delimiters.left = String::new();
        assert!(config.build_set().is_err());
    }
}
