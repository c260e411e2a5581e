// SPDX-License-Identifier: CEPL-1.0
//! `lumen.toml` loading. Every field is optional; a missing file yields defaults.

use serde::Deserialize;
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::{info, warn};

pub const MIN_FRAMES_IN_FLIGHT: u32 = 1;
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: u32,
    #[serde(default)]
    pub validation: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            frames_in_flight: default_frames_in_flight(),
            validation: false,
        }
    }
}

impl RenderCfg {
    /// Frames in flight, clamped to what the scheduler supports.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
            .clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT) as usize
    }
}

fn default_title() -> String {
    "lumen".to_owned()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_frames_in_flight() -> u32 {
    2
}

pub fn parse_cfg(src: &str) -> Result<AppCfg, ConfigError> {
    Ok(toml::from_str::<AppCfg>(src)?)
}

fn read_cfg(path: &Path) -> Result<Option<AppCfg>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Loads the config at `path`. Missing or unreadable files fall back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match read_cfg(path) {
        Ok(Some(cfg)) => {
            info!("config loaded from {}", path.display());
            cfg
        }
        Ok(None) => AppCfg::default(),
        Err(e) => {
            warn!("{e}; using defaults");
            AppCfg::default()
        }
    }
}
