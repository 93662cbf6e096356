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

//! Per-vertex trail coloring.
//!
//! Two policies are available, selected through [`ColorPolicy`]:
//! - flight state: a fixed color per [`FlightState`]
//! - climb rate: altitude delta to the previous sample through a continuous
//!   perceptual gradient

use serde::{Deserialize, Serialize};

use crate::track::{FlightState, Track};
use crate::window::WindowRange;

/// Climb rate (meters per sample) mapped to either end of the gradient.
pub const CLIMB_RATE_LIMIT: f64 = 5.0;

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const GREEN: Self = Self::rgb(0, 255, 0);
    pub const RED: Self = Self::rgb(255, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Multiply the alpha channel by `alpha / 255`.
    #[must_use]
    pub fn scale_alpha(self, alpha: u8) -> Self {
        let a = (u16::from(self.a) * u16::from(alpha) + 127) / 255;
        Self { a: a as u8, ..self }
    }

    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Color used for a flight state.
#[must_use]
pub const fn state_color(state: FlightState) -> Rgba {
    match state {
        FlightState::Unknown => Rgba::BLACK,
        FlightState::Landed => Rgba::BLUE,
        FlightState::Climbing => Rgba::GREEN,
        FlightState::Gliding => Rgba::RED,
    }
}

// Viridis control points, evenly spaced over [0, 1]
const GRADIENT_STOPS: [(f64, (f64, f64, f64)); 9] = [
    (0.0, (68.0, 1.0, 84.0)),
    (0.125, (72.0, 40.0, 120.0)),
    (0.25, (62.0, 73.0, 137.0)),
    (0.375, (49.0, 104.0, 142.0)),
    (0.5, (38.0, 130.0, 142.0)),
    (0.625, (31.0, 158.0, 137.0)),
    (0.75, (53.0, 183.0, 121.0)),
    (0.875, (110.0, 206.0, 88.0)),
    (1.0, (253.0, 231.0, 37.0)),
];

/// Sample the gradient at `t`, clamped to `[0, 1]`.
#[must_use]
pub fn gradient(t: f64) -> Rgba {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };

    for pair in GRADIENT_STOPS.windows(2) {
        let (t1, c1) = pair[0];
        let (t2, c2) = pair[1];

        if t <= t2 {
            let f = (t - t1) / (t2 - t1);
            let lerp = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
            return Rgba::rgb(lerp(c1.0, c2.0), lerp(c1.1, c2.1), lerp(c1.2, c2.2));
        }
    }

    let (_, last) = GRADIENT_STOPS[GRADIENT_STOPS.len() - 1];
    Rgba::rgb(last.0 as u8, last.1 as u8, last.2 as u8)
}

/// Color for an altitude delta between consecutive samples.
///
/// `-CLIMB_RATE_LIMIT` and `+CLIMB_RATE_LIMIT` map to the two ends of the
/// gradient, zero to its midpoint; larger deltas clamp.
#[must_use]
pub fn climb_rate_color(delta: f64) -> Rgba {
    gradient((delta + CLIMB_RATE_LIMIT) / (2.0 * CLIMB_RATE_LIMIT))
}

/// Trail coloring policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorPolicy {
    /// Fixed color per flight state.
    #[default]
    FlightState,
    /// Gradient over the altitude change from the previous sample.
    ClimbRate,
}

impl ColorPolicy {
    pub const ALL: [Self; 2] = [Self::FlightState, Self::ClimbRate];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FlightState => "Flight state",
            Self::ClimbRate => "Climb rate",
        }
    }

    /// Color of the vertex at `index` inside `window`, before trail fading.
    ///
    /// Climb rate needs a predecessor, so the first vertex of the window is
    /// transparent under that policy.
    #[must_use]
    pub fn color_for(self, track: &Track, index: usize, window: WindowRange) -> Rgba {
        match self {
            Self::FlightState => state_color(track.state(index)),
            Self::ClimbRate => {
                if index == 0 || index <= window.start {
                    return Rgba::TRANSPARENT;
                }
                match (track.position(index - 1), track.position(index)) {
                    (Some(previous), Some(current)) => {
                        climb_rate_color(previous.altitude - current.altitude)
                    }
                    _ => Rgba::TRANSPARENT,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Position;
    use chrono::NaiveDate;

    fn track(altitudes: &[f64], states: Option<Vec<FlightState>>) -> Track {
        let positions = altitudes
            .iter()
            .enumerate()
            .map(|(i, alt)| Position::new(i as f64 * 0.001, 45.0, *alt))
            .collect();
        let track = Track::new(NaiveDate::from_ymd_opt(2023, 7, 14).unwrap(), positions).unwrap();
        match states {
            Some(states) => track.with_states(states).unwrap(),
            None => track,
        }
    }

    fn full(n: usize) -> WindowRange {
        WindowRange { start: 0, end: n }
    }

    #[test]
    fn test_state_colors() {
        let t = track(
            &[0.0, 0.0, 0.0, 0.0],
            Some(vec![
                FlightState::Landed,
                FlightState::Climbing,
                FlightState::Gliding,
                FlightState::from_tag("Parked"),
            ]),
        );
        let policy = ColorPolicy::FlightState;
        assert_eq!(policy.color_for(&t, 0, full(4)), Rgba::BLUE);
        assert_eq!(policy.color_for(&t, 1, full(4)), Rgba::GREEN);
        assert_eq!(policy.color_for(&t, 2, full(4)), Rgba::RED);
        assert_eq!(policy.color_for(&t, 3, full(4)), Rgba::BLACK);
    }

    #[test]
    fn test_state_color_without_states() {
        let t = track(&[0.0, 0.0], None);
        assert_eq!(ColorPolicy::FlightState.color_for(&t, 1, full(2)), Rgba::BLACK);
        assert_eq!(ColorPolicy::FlightState.color_for(&t, 99, full(2)), Rgba::BLACK);
    }

    #[test]
    fn test_climb_rate_symmetry() {
        assert_eq!(climb_rate_color(-5.0), Rgba::rgb(68, 1, 84));
        assert_eq!(climb_rate_color(5.0), Rgba::rgb(253, 231, 37));
        assert_eq!(climb_rate_color(0.0), Rgba::rgb(38, 130, 142));
    }

    #[test]
    fn test_climb_rate_clamps() {
        assert_eq!(climb_rate_color(-50.0), climb_rate_color(-5.0));
        assert_eq!(climb_rate_color(12.5), climb_rate_color(5.0));
        assert_eq!(climb_rate_color(f64::INFINITY), climb_rate_color(5.0));
    }

    #[test]
    fn test_gradient_interpolates() {
        // Halfway between the first two stops
        assert_eq!(gradient(0.0625), Rgba::rgb(70, 21, 102));
    }

    #[test]
    fn test_climb_rate_uses_previous_sample() {
        // previous - current: 100 -> 97 is +3, 97 -> 97 is 0
        let t = track(&[100.0, 97.0, 97.0], None);
        let policy = ColorPolicy::ClimbRate;
        assert_eq!(policy.color_for(&t, 0, full(3)), Rgba::TRANSPARENT);
        assert_eq!(policy.color_for(&t, 1, full(3)), climb_rate_color(3.0));
        assert_eq!(policy.color_for(&t, 2, full(3)), climb_rate_color(0.0));
    }

    #[test]
    fn test_climb_rate_window_start_is_transparent() {
        let t = track(&[100.0, 97.0, 97.0], None);
        let window = WindowRange { start: 1, end: 3 };
        assert_eq!(ColorPolicy::ClimbRate.color_for(&t, 1, window), Rgba::TRANSPARENT);
        assert_eq!(ColorPolicy::ClimbRate.color_for(&t, 2, window), climb_rate_color(0.0));
    }

    #[test]
    fn test_scale_alpha() {
        assert_eq!(Rgba::RED.scale_alpha(238).a, 238);
        assert_eq!(Rgba::RED.scale_alpha(0).a, 0);
        assert_eq!(Rgba::TRANSPARENT.scale_alpha(255).a, 0);
        assert_eq!(Rgba::new(1, 2, 3, 128).scale_alpha(128).a, 64);
    }
}
