// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Depth auto-detection options, re-read at device init.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DepthCfg {
    /// Make a backup copy of the selected depth-stencil at clear time
    /// instead of once at present.
    #[serde(default)]
    pub copy_before_clears: bool,
    /// Zero picks the copy point automatically, otherwise copy at the N-th
    /// clear of the frame.
    #[serde(default)]
    pub copy_at_clear_index: u32,
    #[serde(default = "default_aspect_heuristics")]
    pub use_aspect_ratio_heuristics: bool,
}

impl Default for DepthCfg {
    fn default() -> Self {
        DepthCfg {
            copy_before_clears: false,
            copy_at_clear_index: 0,
            use_aspect_ratio_heuristics: default_aspect_heuristics(),
        }
    }
}

fn default_aspect_heuristics() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct Config {
    #[serde(default)]
    pub depth: DepthCfg,
}

impl Config {
    /// Best-effort load; a missing or malformed file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Config {
        match Config::load_from(path) {
            Ok(cfg) => cfg,
            Err(ConfigError::Io(_)) => Config::default(),
            Err(err) => {
                tracing::warn!("config ignored: {err}");
                Config::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&text)?;
        // A sentinel index from older config files means "automatic"
        if cfg.depth.copy_at_clear_index == u32::MAX {
            cfg.depth.copy_at_clear_index = 0;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = Config::load("/nonexistent/prism.toml");
        assert!(!cfg.depth.copy_before_clears);
        assert_eq!(cfg.depth.copy_at_clear_index, 0);
        assert!(cfg.depth.use_aspect_ratio_heuristics);
    }

    #[test]
    fn parses_depth_table() {
        let cfg: Config = toml::from_str(
            "[depth]\ncopy_before_clears = true\ncopy_at_clear_index = 2\n",
        )
        .unwrap();
        assert!(cfg.depth.copy_before_clears);
        assert_eq!(cfg.depth.copy_at_clear_index, 2);
        assert!(cfg.depth.use_aspect_ratio_heuristics);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = std::env::temp_dir().join("prism-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        fs::write(&path, "[depth\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
