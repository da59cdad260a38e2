use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::Size;
use crate::scheduler::ScheduleConfig;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("VIGIL_CONFIG_PATH").unwrap_or("/usr/local/etc/vigil/config.toml"))
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub roster_url: String,
    pub request_timeout_secs: u64,
    pub camera: String,
    pub display_width: u32,
    pub display_height: u32,
    pub model_dir: PathBuf,
    /// Matcher distance threshold.
    pub threshold: f32,
    pub schedule: ScheduleConfig,
    pub detector: DetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roster_url: "http://localhost:4001/api/activity/known-faces".to_string(),
            request_timeout_secs: 30,
            camera: "/dev/video0".to_string(),
            display_width: 640,
            display_height: 480,
            model_dir: PathBuf::from("/usr/local/share/vigil/models"),
            threshold: 0.6,
            schedule: ScheduleConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl Config {
    pub fn display_size(&self) -> Size {
        Size::new(self.display_width, self.display_height)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.schedule
        .validate()
        .with_context(|| format!("invalid schedule in {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
