//! Daemon configuration.
//!
//! Loaded from a TOML file at startup. Every field has a default, so the
//! daemon runs without a config file. CLI flags and environment variables
//! are applied on top by `main`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use huddle_core::{Color, NegotiationPolicy, WaitPolicy};

use crate::lobby::LobbySettings;
use crate::server::DEFAULT_LISTEN_ADDR;

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub server: ServerSection,
    pub matchmaking: MatchmakingSection,
    pub negotiation: NegotiationSection,
}

/// Network settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// TCP address to listen on
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.into(),
        }
    }
}

/// Queue and match-size settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSection {
    /// Participants per match
    pub match_size: usize,
    /// Seconds of estimated wait per missing participant
    pub base_wait_secs: u64,
    /// Lower bound of the wait estimate
    pub min_wait_secs: u64,
}

impl Default for MatchmakingSection {
    fn default() -> Self {
        let wait = WaitPolicy::default();
        Self {
            match_size: wait.match_size,
            base_wait_secs: wait.base_wait_secs,
            min_wait_secs: wait.min_wait_secs,
        }
    }
}

/// Negotiation rules applied to every match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationSection {
    /// Clear a participant's ready flag when they change color
    pub reset_ready_on_color_change: bool,
    /// Allowed colors; empty means any valid color
    pub palette: Vec<String>,
}

impl HuddleConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// A missing file yields the defaults with a warning.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if the file exists but cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                error: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                error: e.to_string(),
            }),
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`]; the first violation found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lobby_settings().map(|_| ())
    }

    /// Builds the lobby policies, validating them on the way.
    ///
    /// # Errors
    ///
    /// - `ConfigError::EmptyListen` if no listen address is set
    /// - `ConfigError::MatchSizeTooSmall` if `match_size < 2`
    /// - `ConfigError::InvalidColor` / `DuplicateColor` for bad palette entries
    /// - `ConfigError::PaletteTooSmall` if a palette cannot color a full match
    pub fn lobby_settings(&self) -> Result<LobbySettings, ConfigError> {
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError::EmptyListen);
        }

        let match_size = self.matchmaking.match_size;
        if match_size < 2 {
            return Err(ConfigError::MatchSizeTooSmall(match_size));
        }

        let mut palette = Vec::with_capacity(self.negotiation.palette.len());
        let mut seen = HashSet::new();
        for raw in &self.negotiation.palette {
            let color = Color::parse(raw).map_err(|e| ConfigError::InvalidColor {
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            if !seen.insert(color.clone()) {
                return Err(ConfigError::DuplicateColor(color.to_string()));
            }
            palette.push(color);
        }

        if !palette.is_empty() && palette.len() < match_size {
            return Err(ConfigError::PaletteTooSmall {
                colors: palette.len(),
                match_size,
            });
        }

        Ok(LobbySettings {
            wait: WaitPolicy {
                match_size,
                base_wait_secs: self.matchmaking.base_wait_secs,
                min_wait_secs: self.matchmaking.min_wait_secs,
            },
            negotiation: NegotiationPolicy {
                reset_ready_on_color_change: self.negotiation.reset_ready_on_color_change,
                palette,
            },
        })
    }
}

/// Errors from loading or validating the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("server.listen must not be empty")]
    EmptyListen,

    #[error("matchmaking.match_size must be at least 2, got {0}")]
    MatchSizeTooSmall(usize),

    #[error("Invalid palette color '{value}': {reason}")]
    InvalidColor { value: String, reason: String },

    #[error("Palette color '{0}' is listed twice")]
    DuplicateColor(String),

    #[error("Palette has {colors} colors but a match needs {match_size}")]
    PaletteTooSmall { colors: usize, match_size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = HuddleConfig::default();
        assert_eq!(cfg.server.listen, "127.0.0.1:7400");
        assert_eq!(cfg.matchmaking.match_size, 4);
        assert_eq!(cfg.matchmaking.base_wait_secs, 10);
        assert_eq!(cfg.matchmaking.min_wait_secs, 5);
        assert!(!cfg.negotiation.reset_ready_on_color_change);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [matchmaking]
            match_size = 2

            [negotiation]
            palette = ["Red", "blue", "green"]
        "#;
        let cfg: HuddleConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.matchmaking.match_size, 2);
        assert_eq!(cfg.matchmaking.base_wait_secs, 10);
        assert_eq!(cfg.server.listen, "127.0.0.1:7400");

        let settings = cfg.lobby_settings().unwrap();
        assert_eq!(settings.wait.match_size, 2);
        assert_eq!(settings.negotiation.palette.len(), 3);
        assert!(settings
            .negotiation
            .allows(&Color::parse("red").unwrap()));
    }

    #[test]
    fn test_match_size_too_small() {
        let mut cfg = HuddleConfig::default();
        cfg.matchmaking.match_size = 1;
        assert_eq!(cfg.validate(), Err(ConfigError::MatchSizeTooSmall(1)));
    }

    #[test]
    fn test_palette_duplicates_rejected() {
        let mut cfg = HuddleConfig::default();
        cfg.matchmaking.match_size = 2;
        cfg.negotiation.palette = vec!["red".into(), "RED".into()];
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateColor("red".into()))
        );
    }

    #[test]
    fn test_palette_too_small() {
        let mut cfg = HuddleConfig::default();
        cfg.negotiation.palette = vec!["red".into(), "blue".into()];
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PaletteTooSmall {
                colors: 2,
                match_size: 4
            })
        );
    }

    #[test]
    fn test_palette_invalid_color() {
        let mut cfg = HuddleConfig::default();
        cfg.negotiation.palette = vec!["   ".into()];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidColor { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HuddleConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, HuddleConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nlisten = \"0.0.0.0:9000\"\n\n[negotiation]\nreset_ready_on_color_change = true"
        )
        .unwrap();

        let cfg = HuddleConfig::load(file.path()).unwrap();
        assert_eq!(cfg.server.listen, "0.0.0.0:9000");
        assert!(cfg.negotiation.reset_ready_on_color_change);
        assert_eq!(cfg.matchmaking.match_size, 4);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[matchmaking]\nmatch_size = \"four\"").unwrap();

        let err = HuddleConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
