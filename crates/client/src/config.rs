//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::camera::{CameraPolicy, CameraWeighting};
use crate::error::ClientError;
use crate::game::{MergeStrategy, ViewId};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Load configuration from `path`, writing the defaults there if the
    /// file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents)
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ClientError> {
        Ok(toml::from_str(contents)?)
    }
}

/// Server address per view. Views without an address are never opened.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServersConfig {
    #[serde(default = "default_primary")]
    pub primary: Option<String>,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub spectate: Option<String>,
}

impl ServersConfig {
    /// An empty string disables the view.
    pub fn url(&self, view: ViewId) -> Option<&str> {
        let url = match view {
            ViewId::Primary => self.primary.as_deref(),
            ViewId::Secondary => self.secondary.as_deref(),
            ViewId::Spectate => self.spectate.as_deref(),
        };
        url.filter(|url| !url.is_empty())
    }
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: None,
            spectate: None,
        }
    }
}

fn default_primary() -> Option<String> {
    Some("ws://127.0.0.1:11443".to_string())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Length of one interpolation leg.
    #[serde(default = "default_draw_delay")]
    pub draw_delay_ms: u64,
    #[serde(default = "default_jelly_physics")]
    pub jelly_physics: bool,
    /// Ease factor of the jelly radius.
    #[serde(default = "default_jelly_factor")]
    pub jelly_factor: f32,
    /// Interval between published frames.
    #[serde(default = "default_render_tick")]
    pub render_tick_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            draw_delay_ms: default_draw_delay(),
            jelly_physics: default_jelly_physics(),
            jelly_factor: default_jelly_factor(),
            render_tick_ms: default_render_tick(),
        }
    }
}

fn default_draw_delay() -> u64 {
    120
}
fn default_jelly_physics() -> bool {
    true
}
fn default_jelly_factor() -> f32 {
    5.0
}
fn default_render_tick() -> u64 {
    16
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub policy: CameraPolicy,
    #[serde(default)]
    pub weighting: CameraWeighting,
    /// Blend nearby views at all.
    #[serde(default = "default_merge")]
    pub merge: bool,
    #[serde(default = "default_merge_base")]
    pub merge_base: f32,
    #[serde(default = "default_merge_scale")]
    pub merge_scale: f32,
    /// Position ease factor while the view owns cells.
    #[serde(default = "default_smoothness")]
    pub smoothness: f32,
    /// Position ease factor while the view owns nothing.
    #[serde(default = "default_empty_smoothness")]
    pub empty_smoothness: f32,
    #[serde(default = "default_zoom_smoothness")]
    pub zoom_smoothness: f32,
    /// Zoom used by the `fixed` policy.
    #[serde(default = "default_fixed_zoom")]
    pub fixed_zoom: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            policy: CameraPolicy::default(),
            weighting: CameraWeighting::default(),
            merge: default_merge(),
            merge_base: default_merge_base(),
            merge_scale: default_merge_scale(),
            smoothness: default_smoothness(),
            empty_smoothness: default_empty_smoothness(),
            zoom_smoothness: default_zoom_smoothness(),
            fixed_zoom: default_fixed_zoom(),
        }
    }
}

fn default_merge() -> bool {
    true
}
fn default_merge_base() -> f32 {
    1000.0
}
fn default_merge_scale() -> f32 {
    20.0
}
fn default_smoothness() -> f32 {
    6.0
}
fn default_empty_smoothness() -> f32 {
    2.0
}
fn default_zoom_smoothness() -> f32 {
    9.0
}
fn default_fixed_zoom() -> f32 {
    1.0
}

/// Connection timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_ms: u64,
    /// Wait before retrying a connection that never opened.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    #[serde(default = "default_input_tick")]
    pub input_tick_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

impl NetworkConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat(),
            backoff_ms: default_backoff(),
            input_tick_ms: default_input_tick(),
            connect_timeout_ms: default_connect_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

fn default_heartbeat() -> u64 {
    2000
}
fn default_backoff() -> u64 {
    1500
}
fn default_input_tick() -> u64 {
    40
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_handshake_timeout() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.servers.url(ViewId::Primary), Some("ws://127.0.0.1:11443"));
        assert_eq!(config.servers.url(ViewId::Spectate), None);
        assert_eq!(config.sync.strategy, MergeStrategy::Flawless);
        assert_eq!(config.render.draw_delay_ms, 120);
        assert_eq!(config.network.backoff(), Duration::from_millis(1500));
        assert_eq!(config.camera.empty_smoothness, 2.0);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [servers]
            secondary = "ws://eu.example:443"

            [sync]
            strategy = "alpha"

            [camera]
            policy = "weighted"
            weighting = "equal"
            "#,
        )
        .unwrap();
        assert_eq!(config.servers.url(ViewId::Primary), Some("ws://127.0.0.1:11443"));
        assert_eq!(config.servers.url(ViewId::Secondary), Some("ws://eu.example:443"));
        assert_eq!(config.sync.strategy, MergeStrategy::Alpha);
        assert_eq!(config.camera.policy, CameraPolicy::Weighted);
        assert_eq!(config.camera.weighting, CameraWeighting::Equal);
        assert_eq!(config.camera.merge_base, 1000.0);
    }

    #[test]
    fn test_bad_strategy_is_an_error() {
        let err = Config::from_toml_str("[sync]\nstrategy = \"fastest\"").unwrap_err();
        assert!(matches!(err, ClientError::ConfigParse(_)));
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.network.heartbeat_ms, 2000);
        assert_eq!(back.camera.policy, CameraPolicy::Default);
    }
}
