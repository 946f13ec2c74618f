use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use regex::Regex;
use serde::{Deserialize, Serialize};

use oz_core::{HighlightConfig, HistoryConfig, RenderConfig, StreamConfig};

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("env var pattern"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub highlight: HighlightConfig,

    #[serde(default)]
    pub tui: TuiConfig,

    /// History file (supports $HOME, $VAR, ~). Defaults to the user data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_file: Option<String>,
}

/// Terminal history browser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuiConfig {
    /// Rows from the bottom at which the next batch is appended
    #[serde(default = "default_scroll_threshold_rows")]
    pub scroll_threshold_rows: u32,

    /// How long copy notices stay visible
    #[serde(default = "default_notice_ms")]
    pub notice_ms: u64,
}

fn default_scroll_threshold_rows() -> u32 {
    8
}

fn default_notice_ms() -> u64 {
    2500
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            scroll_threshold_rows: default_scroll_threshold_rows(),
            notice_ms: default_notice_ms(),
        }
    }
}

impl TuiConfig {
    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let expanded = ENV_VAR.replace_all(&result, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.into_owned())
}

impl Config {
    /// Load defaults, then the TOML file, then `OZ_` environment overrides.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        Self::figment(&path)
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("OZ_").split("__"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("oz"))
    }

    /// Resolved history file path
    pub fn history_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.history_file {
            return Ok(expand_path(path));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("oz").join("history.json"))
    }

    /// History settings for the terminal browser, where scroll distance is in rows.
    pub fn tui_history(&self) -> HistoryConfig {
        self.history
            .clone()
            .with_scroll_threshold(self.tui.scroll_threshold_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            history_file = "~/oz/history.json"

            [render]
            collapse_threshold_lines = 12

            [stream]
            tick_interval_ms = 100

            [tui]
            notice_ms = 1000
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.render.collapse_threshold_lines, 12);
        assert!(config.render.autolink);
        assert_eq!(config.stream.tick_interval_ms, 100);
        assert_eq!(config.stream.max_height, 600);
        assert_eq!(config.history.batch_size, 20);
        assert_eq!(config.tui.notice_ttl(), Duration::from_millis(1000));
        assert_eq!(config.tui.scroll_threshold_rows, 8);
        assert_eq!(config.history_file.as_deref(), Some("~/oz/history.json"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.stream.tick_interval_ms, 200);
        assert_eq!(config.highlight.theme, "base16-ocean.dark");
        assert!(config.history_file.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[stream]\ntick_interval_ms = 150\nmin_height = 80\n",
            )?;
            jail.set_env("OZ_STREAM__TICK_INTERVAL_MS", "50");

            let config = Config::load(Some(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.stream.tick_interval_ms, 50);
            assert_eq!(config.stream.min_height, 80);
            Ok(())
        });
    }

    #[test]
    fn test_tui_history_uses_rows() {
        let config = Config::default();
        assert_eq!(config.tui_history().scroll_threshold, 8);
        assert_eq!(config.history.scroll_threshold, 100);
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("OZ_TEST_EXPAND", "/tmp/oz");
        assert_eq!(
            expand_path("$OZ_TEST_EXPAND/history.json"),
            PathBuf::from("/tmp/oz/history.json")
        );
        assert_eq!(
            expand_path("${OZ_TEST_EXPAND}/h.json"),
            PathBuf::from("/tmp/oz/h.json")
        );
        assert_eq!(expand_path("$OZ_UNSET_VAR_X/a"), PathBuf::from("$OZ_UNSET_VAR_X/a"));
    }

    #[test]
    fn test_explicit_history_path() {
        let config = Config {
            history_file: Some("/var/tmp/oz.json".into()),
            ..Config::default()
        };
        assert_eq!(config.history_path().unwrap(), PathBuf::from("/var/tmp/oz.json"));
    }
}
