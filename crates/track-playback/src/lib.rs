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

//! Playback and windowed rendering of recorded flight tracks.
//!
//! This library replays a recorded track on a map: a cursor moves over the
//! samples, either scrubbed by the user or advanced by a timer, and a colored
//! trail behind the cursor is pushed to a map overlay. It is organized in
//! layers that can be used independently or composed together:
//!
//! - **Track layer**: immutable track model, JSON track files, IGC import and
//!   the [`TrackSource`] seam
//! - **Derivation layer**: pure window selection ([`window`]) and per-vertex
//!   coloring ([`color`])
//! - **Playback layer**: the cursor state machine with its single timer
//! - **Render layer**: snapshot-to-geometry derivation and the [`MapSurface`]
//!   seam
//!
//! # Quick Start
//!
//! Use the [`Viewer`] type for a complete playback session:
//!
//! ```no_run
//! use track_playback::{DirectorySource, MapSurface, RenderWindow, Viewer, ViewerConfig};
//! use std::time::Duration;
//!
//! struct LogSurface;
//!
//! impl MapSurface for LogSurface {
//!     fn set_path_layer(&mut self, window: RenderWindow) {
//!         println!("{} vertices", window.path.len());
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), track_playback::TrackError> {
//!     let source = DirectorySource::new("tracks");
//!     let viewer = Viewer::open(&source, "2023/07/14-0.json", LogSurface, ViewerConfig::default())?;
//!
//!     viewer.playback().play();
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! The derivation functions are pure and need no runtime:
//!
//! ```
//! use track_playback::window::{select, trail_alpha};
//!
//! let window = select(50, 100, false, 1000);
//! assert_eq!((window.start, window.end), (0, 50));
//! assert_eq!(trail_alpha(0, 100), 0);
//! assert_eq!(trail_alpha(100, 100), 255);
//! ```

pub mod color;
pub mod playback;
pub mod render;
pub mod track;
pub mod window;

use std::sync::Arc;

use log::info;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use color::{ColorPolicy, Rgba};
pub use playback::{PlaybackConfig, PlaybackController, PlaybackState};
pub use render::{derive, MapSurface, RenderSettings, RenderSync, RenderWindow};
pub use track::igc::{IgcError, IgcFile};
pub use track::{
    DirectorySource, FlightState, LoadErrorReason, MemorySource, Position, Track, TrackEntry,
    TrackError, TrackSource,
};
pub use window::WindowRange;

/// Configuration for a viewer session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewerConfig {
    /// Initial playback settings.
    pub playback: PlaybackConfig,
    /// Initial overlay settings.
    pub render: RenderSettings,
}

/// One track detail session.
///
/// Owns the loaded track, the playback controller and the background task
/// that keeps the map surface in sync. Dropping the viewer stops the timer and
/// the sync task.
pub struct Viewer {
    key: String,
    track: Arc<Track>,
    playback: PlaybackController,
    settings_tx: watch::Sender<RenderSettings>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("key", &self.key)
            .field("track_len", &self.track.len())
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

impl Viewer {
    /// Load `key` from `source` and start a session drawing on `surface`.
    ///
    /// Must be called from within a Tokio runtime. Nothing is spawned when
    /// loading fails.
    pub fn open<T, S>(
        source: &T,
        key: &str,
        surface: S,
        config: ViewerConfig,
    ) -> Result<Self, TrackError>
    where
        T: TrackSource + ?Sized,
        S: MapSurface + Send + 'static,
    {
        let track = source.load(key)?;
        Ok(Self::with_track(key, Arc::new(track), surface, config))
    }

    /// Start a session for an already loaded track.
    #[must_use]
    pub fn with_track<S>(
        key: impl Into<String>,
        track: Arc<Track>,
        surface: S,
        config: ViewerConfig,
    ) -> Self
    where
        S: MapSurface + Send + 'static,
    {
        let key = key.into();
        let playback = PlaybackController::new(config.playback);
        playback.attach(track.len());

        let (settings_tx, settings_rx) = watch::channel(config.render);
        let cancel_token = CancellationToken::new();

        let sync = RenderSync::new(Arc::clone(&track), surface);
        tokio::spawn(sync.run(playback.subscribe(), settings_rx, cancel_token.clone()));

        info!("Opened track {} ({} samples)", key, track.len());

        Self {
            key,
            track,
            playback,
            settings_tx,
            cancel_token,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Playback controls for this session.
    #[must_use]
    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    #[must_use]
    pub fn settings(&self) -> RenderSettings {
        *self.settings_tx.borrow()
    }

    pub fn set_color_policy(&self, color_policy: ColorPolicy) {
        self.settings_tx.send_if_modified(|settings| {
            let changed = settings.color_policy != color_policy;
            settings.color_policy = color_policy;
            changed
        });
    }

    pub fn set_center_on_cursor(&self, center_on_cursor: bool) {
        self.settings_tx.send_if_modified(|settings| {
            let changed = settings.center_on_cursor != center_on_cursor;
            settings.center_on_cursor = center_on_cursor;
            changed
        });
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        // Stop the render task first so the detach reset is never drawn
        self.cancel_token.cancel();
        self.playback.detach();
        info!("Closed track {}", self.key);
    }
}
