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

//! Playback cursor state machine.
//!
//! The [`PlaybackController`] owns the cursor over a track of N samples and a
//! single recurring timer that advances it while playing. State lives behind
//! one mutex: UI operations and timer ticks both take it, so mutations are
//! serialized and the latest call wins. Every change is published as a
//! [`PlaybackState`] snapshot on a watch channel.
//!
//! The timer is a Tokio task with its own [`CancellationToken`]. Tokens are
//! cancelled while the lock is held and each tick re-checks its token under
//! the lock, so once `pause()` returns no further tick can move the cursor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::window::{self, WindowRange};

pub const DEFAULT_SPEED_MS: u64 = 100;
pub const DEFAULT_TRAIL_LENGTH: usize = 100;

/// Snapshot of the playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    /// End of the visible window, in `[0, N]`.
    pub cursor: usize,
    pub is_playing: bool,
    /// Tick interval in milliseconds.
    pub speed_ms: u64,
    /// Samples kept visible behind the cursor.
    pub trail_length: usize,
    /// Show the whole track instead of the trailing window.
    pub show_full_track: bool,
}

impl PlaybackState {
    #[must_use]
    pub fn speed(&self) -> Duration {
        Duration::from_millis(self.speed_ms)
    }

    /// Visible window over a track of `len` samples.
    #[must_use]
    pub fn window(&self, len: usize) -> WindowRange {
        window::select(self.cursor, self.trail_length, self.show_full_track, len)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackConfig::default().initial_state()
    }
}

/// Initial playback settings applied when a track is attached.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    pub speed_ms: u64,
    pub trail_length: usize,
    pub show_full_track: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed_ms: DEFAULT_SPEED_MS,
            trail_length: DEFAULT_TRAIL_LENGTH,
            show_full_track: true,
        }
    }
}

impl PlaybackConfig {
    fn initial_state(self) -> PlaybackState {
        PlaybackState {
            cursor: 0,
            is_playing: false,
            speed_ms: self.speed_ms.max(1),
            trail_length: self.trail_length.max(1),
            show_full_track: self.show_full_track,
        }
    }
}

#[derive(Debug)]
struct Timer {
    token: CancellationToken,
    runtime: Handle,
}

#[derive(Debug)]
struct Inner {
    state: PlaybackState,
    track_len: Option<usize>,
    timer: Option<Timer>,
}

impl Inner {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: PlaybackConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<PlaybackState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: PlaybackState) {
        self.state_tx.send_replace(state);
    }

    /// Handle one timer tick. Returns false when the timer should stop.
    fn advance(&self, token: &CancellationToken) -> bool {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return false;
        }
        let Some(len) = inner.track_len else {
            return false;
        };

        if inner.state.cursor < len {
            inner.state.cursor += 1;
        }
        let more = inner.state.cursor < len;
        if !more {
            debug!("Playback reached end of track ({} samples)", len);
            inner.stop_timer();
            inner.state.is_playing = false;
        }
        self.publish(inner.state);
        more
    }
}

/// Owner of the playback cursor and its timer.
///
/// All operations are infallible. Before a track is attached they do nothing.
#[derive(Debug)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(PlaybackConfig::default())
    }
}

impl PlaybackController {
    #[must_use]
    pub fn new(config: PlaybackConfig) -> Self {
        let state = config.initial_state();
        let (state_tx, _) = watch::channel(state);
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    state,
                    track_len: None,
                    timer: None,
                }),
                state_tx,
            }),
        }
    }

    /// Bind the controller to a track of `len` samples, resetting the state
    /// and stopping any running timer.
    pub fn attach(&self, len: usize) {
        let mut inner = self.shared.lock();
        inner.stop_timer();
        inner.track_len = Some(len);
        inner.state = self.shared.config.initial_state();
        debug!("Playback attached to track of {} samples", len);
        self.shared.publish(inner.state);
    }

    /// Unbind the current track and stop the timer.
    pub fn detach(&self) {
        let mut inner = self.shared.lock();
        inner.stop_timer();
        inner.track_len = None;
        inner.state = self.shared.config.initial_state();
        self.shared.publish(inner.state);
    }

    #[must_use]
    pub fn track_len(&self) -> Option<usize> {
        self.shared.lock().track_len
    }

    #[must_use]
    pub fn snapshot(&self) -> PlaybackState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared.lock().state.is_playing
    }

    /// Watch the latest snapshot. Intermediate states may be coalesced.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    /// Move the cursor, clamped to `[0, N]`, and leave full-track mode.
    pub fn seek(&self, value: usize) {
        let mut inner = self.shared.lock();
        let Some(len) = inner.track_len else {
            return;
        };
        inner.state.show_full_track = false;
        inner.state.cursor = value.min(len);
        self.shared.publish(inner.state);
    }

    /// Start advancing the cursor every `speed_ms`. The cursor never moves
    /// past the end: playing from the end stops on the first tick.
    pub fn play(&self) {
        let mut inner = self.shared.lock();
        if inner.track_len.is_none() {
            return;
        }
        if inner.state.is_playing {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot start playback outside of a Tokio runtime");
            return;
        };

        inner.state.show_full_track = false;
        inner.state.is_playing = true;
        self.start_timer(&mut inner, runtime);
        debug!("Playback started at {} every {} ms", inner.state.cursor, inner.state.speed_ms);
        self.shared.publish(inner.state);
    }

    /// Stop advancing. The cursor keeps its value.
    pub fn pause(&self) {
        let mut inner = self.shared.lock();
        if !inner.state.is_playing {
            return;
        }
        inner.stop_timer();
        inner.state.is_playing = false;
        debug!("Playback paused at {}", inner.state.cursor);
        self.shared.publish(inner.state);
    }

    pub fn toggle(&self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Pause and switch to full-track mode.
    pub fn show_full(&self) {
        let mut inner = self.shared.lock();
        if inner.track_len.is_none() {
            return;
        }
        inner.stop_timer();
        inner.state.is_playing = false;
        inner.state.show_full_track = true;
        self.shared.publish(inner.state);
    }

    /// Change the tick interval. A running timer is replaced by one at the
    /// new cadence whose first tick comes one full interval later.
    pub fn set_speed(&self, speed_ms: u64) {
        let mut inner = self.shared.lock();
        let speed_ms = speed_ms.max(1);
        if inner.track_len.is_none() || inner.state.speed_ms == speed_ms {
            return;
        }
        inner.state.speed_ms = speed_ms;

        if let Some(timer) = inner.timer.take() {
            timer.token.cancel();
            self.start_timer(&mut inner, timer.runtime);
        }
        self.shared.publish(inner.state);
    }

    pub fn set_trail_length(&self, trail_length: usize) {
        let mut inner = self.shared.lock();
        let trail_length = trail_length.max(1);
        if inner.track_len.is_none() || inner.state.trail_length == trail_length {
            return;
        }
        inner.state.trail_length = trail_length;
        self.shared.publish(inner.state);
    }

    fn start_timer(&self, inner: &mut Inner, runtime: Handle) {
        let token = CancellationToken::new();
        let period = inner.state.speed();
        let task_token = token.clone();
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let first_tick = Instant::now() + period;

        runtime.spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = task_token.cancelled() => return,
                    _ = interval.tick() => {
                        let Some(shared) = shared.upgrade() else {
                            return;
                        };
                        if !shared.advance(&task_token) {
                            return;
                        }
                    }
                }
            }
        });

        inner.timer = Some(Timer { token, runtime });
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shared.lock().stop_timer();
    }
}
