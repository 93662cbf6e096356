// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Settings are persisted in TOML format through `confy`. Every field has a
//! serde default so older or hand-edited files keep loading.

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};
use track_playback::playback::{DEFAULT_SPEED_MS, DEFAULT_TRAIL_LENGTH};
use track_playback::{ColorPolicy, PlaybackConfig, RenderSettings, ViewerConfig};

const APP_NAME: &str = "flight-replay";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Directory holding compiled track files and `index.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Playback tick interval in milliseconds
    #[serde(default = "default_speed_ms")]
    pub speed_ms: u64,

    /// Number of samples shown behind the cursor
    #[serde(default = "default_trail_length")]
    pub trail_length: usize,

    /// Trail coloring
    #[serde(default)]
    pub color_policy: ColorPolicy,

    /// Keep the map centered on the cursor while playing
    #[serde(default)]
    pub center_on_cursor: bool,

    /// Track list panel width in pixels
    #[serde(default = "default_track_list_width")]
    pub track_list_width: f32,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_NAME);
    path.push("tracks");
    path
}

fn default_speed_ms() -> u64 {
    DEFAULT_SPEED_MS
}

fn default_trail_length() -> usize {
    DEFAULT_TRAIL_LENGTH
}

fn default_track_list_width() -> f32 {
    260.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            data_dir: default_data_dir(),
            speed_ms: default_speed_ms(),
            trail_length: default_trail_length(),
            color_policy: ColorPolicy::default(),
            center_on_cursor: false,
            track_list_width: default_track_list_width(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Load configuration, falling back to defaults when the file is unusable
    #[must_use]
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("Failed to load configuration, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Session settings for the detail view
    #[must_use]
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            playback: PlaybackConfig {
                speed_ms: self.speed_ms.max(1),
                trail_length: self.trail_length.max(1),
                ..PlaybackConfig::default()
            },
            render: RenderSettings {
                color_policy: self.color_policy,
                center_on_cursor: self.center_on_cursor,
            },
        }
    }
}
