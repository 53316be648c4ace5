use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::source::UserId;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerConfigFile,
    #[serde(default)]
    pub feed: FeedConfigFile,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
    #[serde(default)]
    pub playback: PlaybackConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ServerConfigFile {
    pub base_url: Option<String>,
    pub user_id: Option<UserId>,
    pub timeout_ms: Option<u64>,
    pub voice_type: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct FeedConfigFile {
    pub arm_threshold: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub visible_threshold: Option<f32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub scroll_step: Option<u16>,
    pub frame_budget_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PlaybackConfigFile {
    pub enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub server: ServerConfig,
    pub feed: FeedConfig,
    pub viewer: ViewerConfig,
    pub playback_enabled: bool,
}

pub struct ServerConfig {
    pub base_url: String,
    pub user_id: UserId,
    pub timeout: Duration,
    pub voice_type: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConfig {
    /// Feed position at which prefetching arms.
    pub arm_threshold: usize,
    /// Delay between a failed prefetch and its retry.
    pub retry_delay: Duration,
    /// Fraction of a card's area that must be on screen for it to be current.
    pub visible_threshold: f32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            arm_threshold: 3,
            retry_delay: Duration::from_secs(3),
            visible_threshold: 0.5,
        }
    }
}

pub struct ViewerConfig {
    pub scroll_step: u16,
    pub frame_budget: Duration,
}

/// Values given on the command line; they win over the config file.
#[derive(Default, Clone)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub user: Option<UserId>,
    pub no_audio: bool,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref v) = cli.server {
            debug!("config: CLI override base_url={v}");
            self.server.base_url = Some(v.clone());
        }
        if let Some(v) = cli.user {
            debug!("config: CLI override user_id={v}");
            self.server.user_id = Some(v);
        }
        if cli.no_audio {
            debug!("config: CLI override playback.enabled=false");
            self.playback.enabled = Some(false);
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let defaults = FeedConfig::default();
        let config = Config {
            server: ServerConfig {
                base_url: self
                    .server
                    .base_url
                    .unwrap_or_else(|| "http://127.0.0.1:8000/api".into()),
                user_id: self.server.user_id.unwrap_or(1),
                timeout: Duration::from_millis(self.server.timeout_ms.unwrap_or(10_000)),
                voice_type: self.server.voice_type.unwrap_or(3),
            },
            feed: FeedConfig {
                arm_threshold: self.feed.arm_threshold.unwrap_or(defaults.arm_threshold),
                retry_delay: self
                    .feed
                    .retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry_delay),
                visible_threshold: self
                    .feed
                    .visible_threshold
                    .unwrap_or(defaults.visible_threshold)
                    .clamp(0.01, 1.0),
            },
            viewer: ViewerConfig {
                scroll_step: self.viewer.scroll_step.unwrap_or(3).max(1),
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(32)),
            },
            playback_enabled: self.playback.enabled.unwrap_or(true),
        };
        info!(
            "config: resolved base_url={}, user_id={}, timeout={}ms, voice_type={}, \
             arm_threshold={}, retry_delay={}ms, visible_threshold={}, \
             scroll_step={}, frame_budget={}ms, playback={}",
            config.server.base_url,
            config.server.user_id,
            config.server.timeout.as_millis(),
            config.server.voice_type,
            config.feed.arm_threshold,
            config.feed.retry_delay.as_millis(),
            config.feed.visible_threshold,
            config.viewer.scroll_step,
            config.viewer.frame_budget.as_millis(),
            config.playback_enabled,
        );
        config
    }
}

/// Resolve the XDG config path for feedcast.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("feedcast").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml() {
        let cfg: ConfigFile = toml::from_str("").unwrap();
        let resolved = cfg.resolve();
        assert_eq!(resolved.server.base_url, "http://127.0.0.1:8000/api");
        assert_eq!(resolved.server.user_id, 1);
        assert_eq!(resolved.feed.arm_threshold, 3);
        assert_eq!(resolved.feed.retry_delay, Duration::from_secs(3));
        assert_eq!(resolved.feed.visible_threshold, 0.5);
        assert_eq!(resolved.viewer.scroll_step, 3);
        assert!(resolved.playback_enabled);
    }

    #[test]
    fn partial_toml() {
        let text = r#"
            [feed]
            arm_threshold = 5
            retry_delay_ms = 1500
            [playback]
            enabled = false
        "#;
        let cfg: ConfigFile = toml::from_str(text).unwrap();
        let resolved = cfg.resolve();
        assert_eq!(resolved.feed.arm_threshold, 5);
        assert_eq!(resolved.feed.retry_delay, Duration::from_millis(1500));
        assert!(!resolved.playback_enabled);
        // Defaults for unspecified fields
        assert_eq!(resolved.feed.visible_threshold, 0.5);
        assert_eq!(resolved.server.voice_type, 3);
    }

    #[test]
    fn invalid_toml() {
        let text = "this is not valid toml [[[";
        let result = toml::from_str::<ConfigFile>(text);
        assert!(result.is_err());
    }

    #[test]
    fn visible_threshold_is_clamped() {
        let cfg: ConfigFile = toml::from_str("[feed]\nvisible_threshold = 3.0").unwrap();
        assert_eq!(cfg.resolve().feed.visible_threshold, 1.0);
    }

    #[test]
    fn cli_overrides() {
        let mut cfg: ConfigFile = toml::from_str("[server]\nuser_id = 9").unwrap();
        cfg.merge_cli(&CliOverrides {
            server: Some("http://feed.invalid/api".into()),
            user: Some(2),
            no_audio: true,
        });
        let resolved = cfg.resolve();
        assert_eq!(resolved.server.base_url, "http://feed.invalid/api");
        assert_eq!(resolved.server.user_id, 2); // CLI wins
        assert!(!resolved.playback_enabled);
        assert_eq!(resolved.server.timeout, Duration::from_secs(10)); // default
    }
}
