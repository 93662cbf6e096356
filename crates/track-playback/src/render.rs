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

//! Map overlay synchronization.
//!
//! [`derive`] turns one playback snapshot into the geometry to draw: the
//! visible range, the path slice and one color per vertex. [`RenderSync`]
//! pushes that geometry to a [`MapSurface`] whenever the inputs change,
//! replacing whatever was drawn before.

use std::sync::Arc;

use log::debug;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::color::{ColorPolicy, Rgba};
use crate::playback::PlaybackState;
use crate::track::{Position, Track};
use crate::window::{self, WindowRange};

/// Identifier of the track overlay layer.
pub const PATH_LAYER_ID: &str = "tracklog";

/// Geometry of the visible part of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderWindow {
    pub range: WindowRange,
    pub path: Vec<Position>,
    /// One color per vertex of `path`.
    pub colors: Vec<Rgba>,
}

impl RenderWindow {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Display options that affect the overlay but not playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSettings {
    pub color_policy: ColorPolicy,
    /// Keep the camera centered on the cursor while scrubbing or playing.
    pub center_on_cursor: bool,
}

/// Rendering target for the track overlay.
pub trait MapSurface {
    /// Replace the path layer with `window`.
    fn set_path_layer(&mut self, window: RenderWindow);

    /// Move the camera to `position`.
    fn center_on(&mut self, position: Position) {
        let _ = position;
    }
}

/// Derive the overlay geometry for one playback snapshot.
///
/// In trailing mode each vertex color is faded by its distance from the tail
/// of the window; in full-track mode colors are used as is.
#[must_use]
pub fn derive(track: &Track, state: &PlaybackState, policy: ColorPolicy) -> RenderWindow {
    let range = state.window(track.len());
    let path = track.positions()[range.indices()].to_vec();
    let colors = range
        .indices()
        .enumerate()
        .map(|(i, index)| {
            let color = policy.color_for(track, index, range);
            if state.show_full_track {
                color
            } else {
                color.scale_alpha(window::trail_alpha(i, state.trail_length))
            }
        })
        .collect();

    RenderWindow {
        range,
        path,
        colors,
    }
}

// Inputs that determine the derived geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderKey {
    range: WindowRange,
    show_full_track: bool,
    trail_length: usize,
    policy: ColorPolicy,
}

/// Keeps a [`MapSurface`] in sync with playback snapshots.
pub struct RenderSync<S> {
    track: Arc<Track>,
    surface: S,
    last: Option<RenderKey>,
    last_center: Option<usize>,
}

impl<S> std::fmt::Debug for RenderSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSync")
            .field("track_len", &self.track.len())
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<S: MapSurface> RenderSync<S> {
    #[must_use]
    pub fn new(track: Arc<Track>, surface: S) -> Self {
        Self {
            track,
            surface,
            last: None,
            last_center: None,
        }
    }

    #[must_use]
    pub fn track(&self) -> &Track {
        &self.track
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Bring the surface up to date with one snapshot.
    ///
    /// Returns true when a new path layer was pushed. Snapshots that leave the
    /// geometry unchanged (play/pause, speed) push nothing.
    pub fn apply(&mut self, state: &PlaybackState, settings: &RenderSettings) -> bool {
        let len = self.track.len();

        if settings.center_on_cursor && !state.show_full_track {
            let index = state.cursor.min(len.saturating_sub(1));
            if self.last_center != Some(index) {
                if let Some(position) = self.track.position(index) {
                    self.surface.center_on(position);
                }
                self.last_center = Some(index);
            }
        } else {
            self.last_center = None;
        }

        let key = RenderKey {
            range: state.window(len),
            show_full_track: state.show_full_track,
            trail_length: state.trail_length,
            policy: settings.color_policy,
        };
        if self.last == Some(key) {
            return false;
        }

        let window = derive(&self.track, state, settings.color_policy);
        debug!(
            "Updating {} layer: [{}, {}) with {} vertices",
            PATH_LAYER_ID,
            window.range.start,
            window.range.end,
            window.path.len()
        );
        self.surface.set_path_layer(window);
        self.last = Some(key);
        true
    }

    /// Apply every change from the playback and settings channels until
    /// cancelled or either sender goes away. Returns the surface.
    pub async fn run(
        mut self,
        mut playback: watch::Receiver<PlaybackState>,
        mut settings: watch::Receiver<RenderSettings>,
        cancel: CancellationToken,
    ) -> S {
        loop {
            let state = *playback.borrow_and_update();
            let current = *settings.borrow_and_update();
            self.apply(&state, &current);

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = playback.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Render sync stopped");
        self.into_surface()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackController;
    use crate::track::FlightState;
    use chrono::NaiveDate;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Recorder {
        layers: Vec<RenderWindow>,
        centers: Vec<Position>,
    }

    impl MapSurface for Recorder {
        fn set_path_layer(&mut self, window: RenderWindow) {
            self.layers.push(window);
        }

        fn center_on(&mut self, position: Position) {
            self.centers.push(position);
        }
    }

    fn track(len: usize) -> Arc<Track> {
        let positions = (0..len)
            .map(|i| Position::new(i as f64 * 0.001, 45.0, 1000.0 + (i % 7) as f64))
            .collect();
        let states = (0..len).map(|i| if i % 2 == 0 { FlightState::Climbing } else { FlightState::Gliding }).collect();
        Arc::new(
            Track::new(NaiveDate::from_ymd_opt(2023, 7, 14).unwrap(), positions)
                .unwrap()
                .with_states(states)
                .unwrap(),
        )
    }

    fn trailing(cursor: usize, trail_length: usize) -> PlaybackState {
        PlaybackState {
            cursor,
            trail_length,
            show_full_track: false,
            ..PlaybackState::default()
        }
    }

    #[test]
    fn test_derive_trailing_window() {
        let track = track(1000);
        let window = derive(&track, &trailing(50, 100), ColorPolicy::FlightState);

        assert_eq!(window.range, WindowRange { start: 0, end: 50 });
        assert_eq!(window.path.len(), 50);
        assert_eq!(window.colors.len(), 50);
        assert_eq!(window.path[0], track.positions()[0]);
        assert_eq!(window.colors[0].a, 0);
        assert_eq!(window.colors[49].a, 238);
        assert_eq!(window.colors[49], Rgba::new(255, 0, 0, 238));
    }

    #[test]
    fn test_derive_late_window_starts_after_zero() {
        let track = track(1000);
        let window = derive(&track, &trailing(500, 100), ColorPolicy::FlightState);
        assert_eq!(window.range, WindowRange { start: 400, end: 500 });
        assert_eq!(window.path[0], track.positions()[400]);
        assert_eq!(window.colors[0].a, 0);
    }

    #[test]
    fn test_derive_full_track_is_opaque() {
        let track = track(1000);
        let state = PlaybackState {
            cursor: 10,
            ..PlaybackState::default()
        };
        let window = derive(&track, &state, ColorPolicy::FlightState);

        assert_eq!(window.range, WindowRange { start: 0, end: 1000 });
        assert_eq!(window.path.len(), 1000);
        assert!(window.colors.iter().all(|c| c.a == 255));
    }

    #[test]
    fn test_derive_empty_window() {
        let window = derive(&track(10), &trailing(0, 100), ColorPolicy::ClimbRate);
        assert!(window.is_empty());
        assert!(window.colors.is_empty());
    }

    #[test]
    fn test_derive_climb_rate_in_trailing_mode() {
        let track = track(20);
        let window = derive(&track, &trailing(10, 4), ColorPolicy::ClimbRate);
        assert_eq!(window.range, WindowRange { start: 6, end: 10 });
        assert_eq!(window.colors[0], Rgba::TRANSPARENT);
        // 255 * (1 - 0.25^4) rounds to 254
        assert_eq!(window.colors[3].a, 254);
    }

    #[test]
    fn test_apply_pushes_only_on_change() {
        let mut sync = RenderSync::new(track(100), Recorder::default());
        let settings = RenderSettings::default();

        assert!(sync.apply(&trailing(10, 5), &settings));
        assert!(!sync.apply(&trailing(10, 5), &settings));

        let playing = PlaybackState {
            is_playing: true,
            speed_ms: 20,
            ..trailing(10, 5)
        };
        assert!(!sync.apply(&playing, &settings));

        assert!(sync.apply(&trailing(11, 5), &settings));
        assert!(sync.apply(&trailing(11, 6), &settings));
        let climb = RenderSettings {
            color_policy: ColorPolicy::ClimbRate,
            ..settings
        };
        assert!(sync.apply(&trailing(11, 6), &climb));
        assert_eq!(sync.surface().layers.len(), 4);
    }

    #[test]
    fn test_empty_window_replaces_previous_layer() {
        let mut sync = RenderSync::new(track(100), Recorder::default());
        let settings = RenderSettings::default();
        sync.apply(&trailing(30, 5), &settings);
        sync.apply(&trailing(0, 5), &settings);

        let layers = &sync.surface().layers;
        assert_eq!(layers.len(), 2);
        assert!(layers[1].is_empty());
    }

    #[test]
    fn test_center_on_cursor() {
        let track = track(10);
        let mut sync = RenderSync::new(Arc::clone(&track), Recorder::default());
        let settings = RenderSettings {
            center_on_cursor: true,
            ..RenderSettings::default()
        };

        sync.apply(&trailing(3, 5), &settings);
        sync.apply(&trailing(3, 5), &settings);
        sync.apply(&trailing(10, 5), &settings);
        sync.apply(&PlaybackState::default(), &settings);

        let centers = &sync.surface().centers;
        assert_eq!(centers, &vec![track.positions()[3], track.positions()[9]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_follows_playback() {
        let track = track(10);
        let controller = PlaybackController::default();
        controller.attach(track.len());

        let (settings_tx, settings_rx) = watch::channel(RenderSettings::default());
        let cancel = CancellationToken::new();
        let sync = RenderSync::new(Arc::clone(&track), Recorder::default());
        let task = tokio::spawn(sync.run(controller.subscribe(), settings_rx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(1)).await;

        controller.play();
        tokio::time::sleep(Duration::from_millis(1050)).await;
        settings_tx.send_replace(RenderSettings {
            color_policy: ColorPolicy::ClimbRate,
            center_on_cursor: false,
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let surface = task.await.unwrap();
        let ends: Vec<usize> = surface.layers.iter().map(|l| l.range.end).collect();
        // Full track first, then one layer per cursor value, then the policy change
        assert_eq!(ends, vec![10, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 10]);
        assert_eq!(surface.layers[12].colors[0], Rgba::TRANSPARENT);
    }
}
