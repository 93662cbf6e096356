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

//! Visible window selection and trail fading.

use std::ops::Range;

/// Half-open index range `[start, end)` of visible samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowRange {
    pub start: usize,
    pub end: usize,
}

impl WindowRange {
    #[must_use]
    pub fn len(self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn indices(self) -> Range<usize> {
        self.start..self.end
    }
}

/// Visible range for a cursor over a track of `len` samples.
///
/// In full-track mode the whole track is visible. Otherwise the window ends at
/// the cursor and reaches back at most `trail_length` samples, clamped at 0.
#[must_use]
pub fn select(cursor: usize, trail_length: usize, show_full_track: bool, len: usize) -> WindowRange {
    if show_full_track {
        return WindowRange { start: 0, end: len };
    }

    let end = cursor.min(len);
    WindowRange {
        start: end.saturating_sub(trail_length),
        end,
    }
}

/// Opacity of the `i`-th vertex from the tail of a trailing window.
///
/// Ease-out quartic: `255 * (1 - (1 - i / trail_length)^4)`, rounded. The
/// tail vertex is fully transparent, the curve reaches 255 at `trail_length`.
#[must_use]
pub fn trail_alpha(i: usize, trail_length: usize) -> u8 {
    if trail_length == 0 {
        return u8::MAX;
    }
    let x = i.min(trail_length) as f64 / trail_length as f64;
    (255.0 * (1.0 - (1.0 - x).powi(4))).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_window() {
        for len in [1, 10, 1000] {
            for trail in [1, 7, 100] {
                for cursor in 0..=len {
                    let window = select(cursor, trail, false, len);
                    assert_eq!(window.end, cursor);
                    assert_eq!(window.start, cursor.saturating_sub(trail));
                }
            }
        }
    }

    #[test]
    fn test_full_track_window() {
        for cursor in [0, 5, 1000, 5000] {
            for trail in [1, 100] {
                assert_eq!(
                    select(cursor, trail, true, 1000),
                    WindowRange { start: 0, end: 1000 }
                );
            }
        }
    }

    #[test]
    fn test_cursor_zero_is_empty() {
        let window = select(0, 100, false, 1000);
        assert!(window.is_empty());
        assert_eq!(window.indices().count(), 0);
    }

    #[test]
    fn test_cursor_beyond_len_is_clamped() {
        assert_eq!(select(50, 10, false, 20), WindowRange { start: 10, end: 20 });
    }

    #[test]
    fn test_alpha_endpoints_and_monotonic() {
        assert_eq!(trail_alpha(0, 100), 0);
        assert_eq!(trail_alpha(100, 100), 255);
        assert_eq!(trail_alpha(250, 100), 255);

        let alphas: Vec<u8> = (0..=100).map(|i| trail_alpha(i, 100)).collect();
        assert!(alphas.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_alpha_curve() {
        // 255 * (1 - 0.51^4) = 237.75
        assert_eq!(trail_alpha(49, 100), 238);
        // 255 * (1 - 0.5^4) = 239.06
        assert_eq!(trail_alpha(50, 100), 239);
        assert_eq!(trail_alpha(0, 0), 255);
    }
}
