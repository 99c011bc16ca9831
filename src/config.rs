//! Scan configuration: extension filters and skip rules.
//!
//! Configuration is supplied by the shell (CLI flags or a TOML file) and
//! compiled once into efficient matchers before a run. The skip *test* —
//! any leaf name containing one of the configured substrings excludes its
//! entire subtree — is part of the scanning contract; only the substring
//! set itself is configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [scan]
//! extensions = ["*.mkv", "*.mp4", "*.avi", "*.m4v"]
//! playlists = ["*.m3u"]
//! skip = ["Featurettes", "SRT", "Artwork", "Extras", "eaDir", "Subs", "subs"]
//! ```

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// Invalid glob pattern in an extension or playlist filter.
    InvalidPattern(String),
    /// IO error while reading configuration.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::InvalidPattern(pattern) => {
                write!(f, "Invalid filter pattern '{}'", pattern)
            }
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub scan: ScanRules,
}

/// Filter rules for a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRules {
    /// Glob patterns for media files accepted by the scan.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns for playlist manifests.
    #[serde(default = "default_playlists")]
    pub playlists: Vec<String>,

    /// Substrings that exclude an entry and its whole subtree from the scan.
    /// Matching is case-sensitive; add case variants explicitly.
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    ["*.mkv", "*.mp4", "*.avi", "*.m4v"]
        .map(String::from)
        .to_vec()
}

fn default_playlists() -> Vec<String> {
    vec!["*.m3u".to_string()]
}

fn default_skip() -> Vec<String> {
    ["Featurettes", "SRT", "Artwork", "Extras", "eaDir", "Subs", "subs"]
        .map(String::from)
        .to_vec()
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            playlists: default_playlists(),
            skip: default_skip(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan: ScanRules::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.mediatidyrc.toml` in the current directory
    /// 3. Look for `~/.config/mediatidy/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read; missing fallback locations are not errors.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        // If explicitly specified, load from that path
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        // Try current directory
        let local_config = PathBuf::from(".mediatidyrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try home directory
        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("mediatidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        // Fall back to defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the rules into matchers usable during a scan.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob pattern is invalid.
    pub fn compile(self) -> Result<ScanFilter, ConfigError> {
        ScanFilter::new(self.scan)
    }
}

/// Pre-compiled scan matchers: glob patterns for file acceptance plus the
/// skip-substring set. Patterns are parsed once here so that per-entry
/// matching during the walk is just a pattern scan.
pub struct ScanFilter {
    media_patterns: Vec<Pattern>,
    playlist_patterns: Vec<Pattern>,
    skip_substrings: Vec<String>,
}

/// Extension globs match case-insensitively, so `*.mkv` accepts `FILM.MKV`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl ScanFilter {
    fn new(rules: ScanRules) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, ConfigError> {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern).map_err(|_| ConfigError::InvalidPattern(pattern.clone()))
                })
                .collect()
        };

        Ok(Self {
            media_patterns: compile(&rules.extensions)?,
            playlist_patterns: compile(&rules.playlists)?,
            skip_substrings: rules.skip,
        })
    }

    /// Check whether a leaf name contains any configured skip substring.
    /// A skipped entry excludes its entire subtree from the scan.
    pub fn skips(&self, leaf_name: &str) -> bool {
        self.skip_substrings
            .iter()
            .any(|needle| leaf_name.contains(needle.as_str()))
    }

    /// Check whether a file name matches the media extension filter.
    pub fn is_media(&self, leaf_name: &str) -> bool {
        self.media_patterns
            .iter()
            .any(|pattern| pattern.matches_with(leaf_name, MATCH_OPTIONS))
    }

    /// Check whether a file name matches the playlist filter.
    pub fn is_playlist(&self, leaf_name: &str) -> bool {
        self.playlist_patterns
            .iter()
            .any(|pattern| pattern.matches_with(leaf_name, MATCH_OPTIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let filter = ScanConfig::default().compile().unwrap();
        assert!(filter.is_media("Alien (1979).mkv"));
        assert!(filter.is_media("Alien (1979).MKV")); // Case-insensitive
        assert!(filter.is_media("Alien (1979).mp4"));
        assert!(!filter.is_media("Alien (1979).srt"));
        assert!(filter.is_playlist("favorites.m3u"));
        assert!(!filter.is_playlist("Alien (1979).mkv"));
    }

    #[test]
    fn test_skip_is_substring_containment() {
        let filter = ScanConfig::default().compile().unwrap();
        assert!(filter.skips("Extras"));
        assert!(filter.skips("Bonus Extras HD"));
        assert!(filter.skips("@eaDir"));
        assert!(!filter.skips("Movies"));
    }

    #[test]
    fn test_skip_is_case_sensitive() {
        let filter = ScanConfig::default().compile().unwrap();
        // Both configured variants match, but only those.
        assert!(filter.skips("Subs"));
        assert!(filter.skips("subs"));
        assert!(!filter.skips("SUBS"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[scan]
extensions = ["*.mkv"]
skip = ["Junk"]
"#,
        )
        .unwrap();

        let config = ScanConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scan.extensions, vec!["*.mkv"]);
        assert_eq!(config.scan.skip, vec!["Junk"]);
        // Unspecified fields fall back to defaults
        assert_eq!(config.scan.playlists, vec!["*.m3u"]);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let result = ScanConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not [valid toml").unwrap();

        let result = ScanConfig::load(Some(&path));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_pattern_fails_compilation() {
        let config = ScanConfig {
            scan: ScanRules {
                extensions: vec!["[invalid".to_string()], // Unclosed bracket
                ..Default::default()
            },
        };
        assert!(config.compile().is_err());
    }
}
