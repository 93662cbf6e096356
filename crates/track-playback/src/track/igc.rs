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

//! IGC flight recorder log import.
//!
//! Reads B (fix) and HFDTE (date) records and turns them into a [`Track`]
//! with timestamps, per-sample flight state and flying duration. All other
//! record types are ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Timelike};
use log::debug;
use thiserror::Error;

use super::{FlightState, Position, ShapeError, Track};

/// Below this 3-D speed (m/s) the glider is considered on the ground.
const MIN_FLYING_SPEED: f64 = 2.0;
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const SECONDS_PER_DAY: u32 = 86_400;

/// Errors that can occur while reading an IGC file.
#[derive(Debug, Error)]
pub enum IgcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("missing HFDTE date header")]
    MissingDate,

    #[error("no fixes in file")]
    NoFixes,

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// A single B record.
#[derive(Debug, Clone, PartialEq)]
pub struct IgcFix {
    pub time: NaiveTime,
    pub latitude: f64,
    pub longitude: f64,
    /// GNSS altitude in meters.
    pub altitude: i32,
}

impl IgcFix {
    fn position(&self) -> Position {
        Position::new(self.longitude, self.latitude, f64::from(self.altitude))
    }
}

/// Parsed content of an IGC file.
#[derive(Debug, Clone, Default)]
pub struct IgcFile {
    pub date: Option<NaiveDate>,
    pub fixes: Vec<IgcFix>,
}

impl IgcFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IgcError> {
        Self::parse(BufReader::new(File::open(path)?))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self, IgcError> {
        let mut file = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let record = line?;
            let line = index + 1;
            let invalid = |reason: &str| IgcError::InvalidRecord {
                line,
                reason: reason.to_string(),
            };

            match record.chars().next() {
                Some('B') => file.fixes.push(parse_fix(&record).map_err(invalid)?),
                Some('H') => {
                    if let Some(date) = parse_date_header(&record).map_err(invalid)? {
                        file.date.get_or_insert(date);
                    }
                }
                _ => debug!("unhandled record {}", record),
            }
        }

        Ok(file)
    }

    /// Seconds since the first fix, continuing across midnight.
    #[must_use]
    pub fn timestamps(&self) -> Vec<u32> {
        let mut day_offset = 0;
        let mut previous = None;
        let mut first = None;

        self.fixes
            .iter()
            .map(|fix| {
                let raw = fix.time.num_seconds_from_midnight();
                if previous.is_some_and(|p| raw < p) {
                    day_offset += SECONDS_PER_DAY;
                }
                previous = Some(raw);
                let absolute = raw + day_offset;
                absolute - *first.get_or_insert(absolute)
            })
            .collect()
    }

    /// Build a track with derived flight states and durations.
    pub fn into_track(self) -> Result<Track, IgcError> {
        let date = self.date.ok_or(IgcError::MissingDate)?;
        if self.fixes.is_empty() {
            return Err(IgcError::NoFixes);
        }

        let timestamps = self.timestamps();
        let positions: Vec<Position> = self.fixes.iter().map(IgcFix::position).collect();
        let states = classify(&positions, &timestamps);

        let flying_seconds: u64 = positions
            .windows(2)
            .zip(timestamps.windows(2))
            .filter(|(p, t)| speed(&p[0], &p[1], t[1] - t[0]) > MIN_FLYING_SPEED)
            .map(|(_, t)| u64::from(t[1] - t[0]))
            .sum();
        let track_seconds = u64::from(timestamps.last().copied().unwrap_or_default());

        Ok(Track::new(date, positions)?
            .with_states(states)?
            .with_timestamps(timestamps)?
            .with_durations(flying_seconds, track_seconds))
    }
}

fn parse_fix(record: &str) -> Result<IgcFix, &'static str> {
    let field = |range: std::ops::Range<usize>| record.get(range).ok_or("truncated B record");

    let time = NaiveTime::parse_from_str(field(1..7)?, "%H%M%S")
        .ok()
        .ok_or("invalid fix time")?;
    let latitude = parse_degrees(field(7..15)?, 2, 'N', 'S').ok_or("invalid latitude")?;
    let longitude = parse_degrees(field(15..24)?, 3, 'E', 'W').ok_or("invalid longitude")?;
    let altitude = field(30..35)?
        .parse()
        .ok()
        .ok_or("invalid GNSS altitude")?;

    Ok(IgcFix {
        time,
        latitude,
        longitude,
        altitude,
    })
}

/// Parse `DD(D)MMmmmH` where `H` is the hemisphere letter.
fn parse_degrees(field: &str, degree_digits: usize, positive: char, negative: char) -> Option<f64> {
    let degrees: f64 = field.get(..degree_digits)?.parse().ok()?;
    let milliminutes: f64 = field.get(degree_digits..degree_digits + 5)?.parse().ok()?;
    let total = degrees + milliminutes / 60_000.0;
    match field.chars().last()? {
        c if c == positive => Some(total),
        c if c == negative => Some(-total),
        _ => None,
    }
}

fn parse_date_header(record: &str) -> Result<Option<NaiveDate>, &'static str> {
    let value = match record.split_once(':') {
        Some(("HFDTEDATE", value)) => value,
        Some(_) => return Ok(None),
        None => match record.strip_prefix("HFDTE") {
            Some(value) => value,
            None => return Ok(None),
        },
    };

    NaiveDate::parse_and_remainder(value, "%d%m%y")
        .ok()
        .map(|(date, _)| Some(date))
        .ok_or("invalid date header")
}

fn haversine_meters(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

/// 3-D speed in m/s between two samples `seconds` apart.
fn speed(a: &Position, b: &Position, seconds: u32) -> f64 {
    if seconds == 0 {
        return 0.0;
    }
    let horizontal = haversine_meters(a, b);
    let vertical = b.altitude - a.altitude;
    horizontal.hypot(vertical) / f64::from(seconds)
}

/// Classify each sample from the interval that ends at it (the first sample
/// uses the first interval).
fn classify(positions: &[Position], timestamps: &[u32]) -> Vec<FlightState> {
    if positions.len() < 2 {
        return vec![FlightState::Unknown; positions.len()];
    }

    (0..positions.len())
        .map(|i| {
            let (a, b) = if i == 0 { (0, 1) } else { (i - 1, i) };
            let seconds = timestamps[b] - timestamps[a];
            if seconds == 0 {
                FlightState::Unknown
            } else if speed(&positions[a], &positions[b], seconds) < MIN_FLYING_SPEED {
                FlightState::Landed
            } else if positions[b].altitude > positions[a].altitude {
                FlightState::Climbing
            } else {
                FlightState::Gliding
            }
        })
        .collect()
}
