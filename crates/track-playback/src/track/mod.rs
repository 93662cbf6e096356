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

//! Track model and track sources.
//!
//! A [`Track`] is one recorded flight: an ordered, immutable sequence of
//! positions with optional per-sample flight state and timestamps. Tracks are
//! loaded through the [`TrackSource`] trait, which hides where the data lives
//! (a directory of compiled JSON files, memory, ...).
//!
//! Loading either yields a complete track or a [`TrackError`]; partially
//! built tracks are never handed out.

pub mod igc;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the index file at the root of a track directory.
pub const INDEX_FILE: &str = "index.json";

/// A single track sample in WGS84 degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

impl Position {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

/// Flight state classification of a sample.
///
/// Tags outside the enumeration deserialize to [`FlightState::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlightState {
    Landed,
    Climbing,
    Gliding,
    #[default]
    #[serde(other)]
    Unknown,
}

impl FlightState {
    /// Parse a state tag, falling back to `Unknown` for anything unrecognized.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Landed" => Self::Landed,
            "Climbing" => Self::Climbing,
            "Gliding" => Self::Gliding,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Landed => "Landed",
            Self::Climbing => "Climbing",
            Self::Gliding => "Gliding",
        }
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a track could not be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorReason {
    NotFound,
    Malformed,
}

/// Errors returned by track sources.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("track not found: {key}")]
    NotFound { key: String },

    #[error("malformed track {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl TrackError {
    #[must_use]
    pub fn reason(&self) -> LoadErrorReason {
        match self {
            Self::NotFound { .. } => LoadErrorReason::NotFound,
            Self::Malformed { .. } => LoadErrorReason::Malformed,
        }
    }

    fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    fn malformed(key: &str, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Structural problems with track data, independent of where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("track has no positions")]
    Empty,

    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("geometry type must be LineString, got {0}")]
    NotALineString(String),

    #[error("coordinate {index} has {components} components, expected 3")]
    BadCoordinate { index: usize, components: usize },
}

/// One recorded flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    date: NaiveDate,
    duration_seconds: u64,
    track_duration_seconds: u64,
    positions: Vec<Position>,
    states: Option<Vec<FlightState>>,
    timestamps: Option<Vec<u32>>,
}

impl Track {
    /// Create a track from its positions. At least one position is required.
    pub fn new(date: NaiveDate, positions: Vec<Position>) -> Result<Self, ShapeError> {
        if positions.is_empty() {
            return Err(ShapeError::Empty);
        }
        Ok(Self {
            date,
            duration_seconds: 0,
            track_duration_seconds: 0,
            positions,
            states: None,
            timestamps: None,
        })
    }

    /// Attach per-sample flight states, aligned with the positions.
    pub fn with_states(mut self, states: Vec<FlightState>) -> Result<Self, ShapeError> {
        check_aligned("states", self.positions.len(), states.len())?;
        self.states = Some(states);
        Ok(self)
    }

    /// Attach per-sample timestamps (seconds since the first sample).
    pub fn with_timestamps(mut self, timestamps: Vec<u32>) -> Result<Self, ShapeError> {
        check_aligned("timestamps", self.positions.len(), timestamps.len())?;
        self.timestamps = Some(timestamps);
        Ok(self)
    }

    #[must_use]
    pub fn with_durations(mut self, flying_seconds: u64, track_seconds: u64) -> Self {
        self.duration_seconds = flying_seconds;
        self.track_duration_seconds = track_seconds;
        self
    }

    /// Number of samples (N).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false for a constructed track; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[must_use]
    pub fn position(&self, index: usize) -> Option<Position> {
        self.positions.get(index).copied()
    }

    #[must_use]
    pub fn states(&self) -> Option<&[FlightState]> {
        self.states.as_deref()
    }

    /// Flight state at `index`, `Unknown` when absent.
    #[must_use]
    pub fn state(&self, index: usize) -> FlightState {
        self.states
            .as_ref()
            .and_then(|states| states.get(index).copied())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn timestamps(&self) -> Option<&[u32]> {
        self.timestamps.as_deref()
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Time spent flying, in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Time between the first and last sample, in seconds.
    #[must_use]
    pub fn track_duration_seconds(&self) -> u64 {
        self.track_duration_seconds
    }

    /// Flying duration formatted as `"1h 2m 3s"`.
    #[must_use]
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }

    /// Bounding box as `(min_lon, min_lat, max_lon, max_lat)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.positions.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_lon, min_lat, max_lon, max_lat), p| {
                (
                    min_lon.min(p.longitude),
                    min_lat.min(p.latitude),
                    max_lon.max(p.longitude),
                    max_lat.max(p.latitude),
                )
            },
        )
    }

    /// Parse a track file. `key` is only used for error reporting.
    pub fn from_json(key: &str, text: &str) -> Result<Self, TrackError> {
        let file: TrackFile =
            serde_json::from_str(text).map_err(|e| TrackError::malformed(key, e))?;
        file.flight
            .into_track()
            .map_err(|e| TrackError::malformed(key, e))
    }

    /// Serialize into the track file format read by [`Track::from_json`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&TrackFile {
            flight: FlightRecord::from_track(self),
        })
    }
}

fn check_aligned(field: &'static str, expected: usize, actual: usize) -> Result<(), ShapeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ShapeError::LengthMismatch {
            field,
            expected,
            actual,
        })
    }
}

/// Format seconds as `"{h}h {m}m {s}s"`.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    let secs = seconds % 60;
    format!("{hours}h {minutes}m {secs}s")
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackFile {
    flight: FlightRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct FlightRecord {
    date: NaiveDate,
    #[serde(default)]
    duration_seconds: u64,
    #[serde(default)]
    track_duration_seconds: u64,
    geojson: LineString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    states: Option<Vec<FlightState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamps: Option<Vec<u32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LineString {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<f64>>,
}

impl FlightRecord {
    fn into_track(self) -> Result<Track, ShapeError> {
        if self.geojson.kind != "LineString" {
            return Err(ShapeError::NotALineString(self.geojson.kind));
        }

        let positions = self
            .geojson
            .coordinates
            .iter()
            .enumerate()
            .map(|(index, coordinate)| match coordinate.as_slice() {
                [lon, lat, alt] => Ok(Position::new(*lon, *lat, *alt)),
                other => Err(ShapeError::BadCoordinate {
                    index,
                    components: other.len(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut track = Track::new(self.date, positions)?
            .with_durations(self.duration_seconds, self.track_duration_seconds);
        if let Some(states) = self.states {
            track = track.with_states(states)?;
        }
        if let Some(timestamps) = self.timestamps {
            track = track.with_timestamps(timestamps)?;
        }
        Ok(track)
    }

    fn from_track(track: &Track) -> Self {
        Self {
            date: track.date,
            duration_seconds: track.duration_seconds,
            track_duration_seconds: track.track_duration_seconds,
            geojson: LineString {
                kind: "LineString".to_string(),
                coordinates: track
                    .positions
                    .iter()
                    .map(|p| vec![p.longitude, p.latitude, p.altitude])
                    .collect(),
            },
            states: track.states.clone(),
            timestamps: track.timestamps.clone(),
        }
    }
}

/// Entry of a track listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub date: NaiveDate,
    /// Display name, e.g. `2023-07-14-0`.
    pub name: String,
    /// Key to pass to [`TrackSource::load`].
    pub path: String,
}

/// Contents of `index.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrackIndex {
    pub entries: Vec<TrackEntry>,
}

/// Supplier of tracks keyed by identifier.
pub trait TrackSource {
    /// Load the track stored under `key`.
    fn load(&self, key: &str) -> Result<Track, TrackError>;

    /// List the available tracks, newest first.
    fn list(&self) -> Result<Vec<TrackEntry>, TrackError>;
}

/// Tracks stored as JSON files below a root directory.
///
/// Keys are paths relative to the root using `/` separators. Keys that would
/// escape the root are treated as not found.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }

    fn scan(&self, dir: &Path, entries: &mut Vec<TrackEntry>) -> io::Result<()> {
        for item in fs::read_dir(dir)? {
            let path = item?.path();
            if path.is_dir() {
                self.scan(&path, entries)?;
                continue;
            }
            let is_track = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != INDEX_FILE);
            if !is_track {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match self.load(&key) {
                Ok(track) => entries.push(TrackEntry {
                    date: track.date(),
                    name: key.trim_end_matches(".json").replace('/', "-"),
                    path: key,
                }),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

impl TrackSource for DirectorySource {
    fn load(&self, key: &str) -> Result<Track, TrackError> {
        let path = self.resolve(key).ok_or_else(|| TrackError::not_found(key))?;
        debug!("Loading track {}", path.display());
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TrackError::not_found(key));
            }
            Err(e) => return Err(TrackError::malformed(key, format!("unreadable: {e}"))),
        };
        Track::from_json(key, &text)
    }

    fn list(&self) -> Result<Vec<TrackEntry>, TrackError> {
        let root_key = self.root.display().to_string();
        if !self.root.is_dir() {
            return Err(TrackError::not_found(&root_key));
        }

        let index_path = self.root.join(INDEX_FILE);
        let mut entries = if index_path.is_file() {
            let text = fs::read_to_string(&index_path)
                .map_err(|e| TrackError::malformed(INDEX_FILE, e))?;
            serde_json::from_str::<TrackIndex>(&text)
                .map_err(|e| TrackError::malformed(INDEX_FILE, e))?
                .entries
        } else {
            let mut entries = Vec::new();
            self.scan(&self.root, &mut entries)
                .map_err(|e| TrackError::malformed(&root_key, e))?;
            entries
        };

        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }
}

/// Tracks held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    tracks: HashMap<String, Track>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, track: Track) {
        self.tracks.insert(key.into(), track);
    }
}

impl TrackSource for MemorySource {
    fn load(&self, key: &str) -> Result<Track, TrackError> {
        self.tracks
            .get(key)
            .cloned()
            .ok_or_else(|| TrackError::not_found(key))
    }

    fn list(&self) -> Result<Vec<TrackEntry>, TrackError> {
        let mut entries: Vec<_> = self
            .tracks
            .iter()
            .map(|(key, track)| TrackEntry {
                date: track.date(),
                name: key.clone(),
                path: key.clone(),
            })
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "flight": {
            "date": "2023-07-14",
            "duration_seconds": 3723,
            "geojson": {
                "type": "LineString",
                "coordinates": [[6.1, 45.2, 1200.0], [6.2, 45.3, 1250.0], [6.3, 45.4, 1190.0]]
            },
            "states": ["Landed", "Climbing", "Parked"]
        }
    }"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 7, 14).unwrap()
    }

    #[test]
    fn test_from_json() {
        let track = Track::from_json("sample", SAMPLE).unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track.date(), date());
        assert_eq!(track.position(1), Some(Position::new(6.2, 45.3, 1250.0)));
        assert_eq!(track.state(0), FlightState::Landed);
        assert_eq!(track.duration_label(), "1h 2m 3s");
        assert!(track.timestamps().is_none());
    }

    #[test]
    fn test_unknown_state_tag_falls_back() {
        let track = Track::from_json("sample", SAMPLE).unwrap();
        assert_eq!(track.state(2), FlightState::Unknown);
        assert_eq!(FlightState::from_tag("Parked"), FlightState::Unknown);
        assert_eq!(FlightState::from_tag("Gliding"), FlightState::Gliding);
    }

    #[test]
    fn test_state_tags_serde() {
        let parked: FlightState = serde_json::from_str(r#""Parked""#).unwrap();
        assert_eq!(parked, FlightState::Unknown);
        let gliding: FlightState = serde_json::from_str(r#""Gliding""#).unwrap();
        assert_eq!(gliding, FlightState::Gliding);
        assert_eq!(serde_json::to_string(&FlightState::Landed).unwrap(), r#""Landed""#);
        assert_eq!(FlightState::default(), FlightState::Unknown);
    }

    #[test]
    fn test_missing_geometry_is_malformed() {
        let err = Track::from_json("x", r#"{"flight": {"date": "2023-07-14"}}"#).unwrap_err();
        assert_eq!(err.reason(), LoadErrorReason::Malformed);
    }

    #[test]
    fn test_state_length_mismatch_is_malformed() {
        let text = r#"{"flight": {"date": "2023-07-14",
            "geojson": {"type": "LineString", "coordinates": [[1.0, 2.0, 3.0]]},
            "states": ["Landed", "Gliding"]}}"#;
        let err = Track::from_json("x", text).unwrap_err();
        assert_eq!(err.reason(), LoadErrorReason::Malformed);
        assert!(err.to_string().contains("states has 2 entries"));
    }

    #[test]
    fn test_bad_geometry_is_malformed() {
        let empty = r#"{"flight": {"date": "2023-07-14",
            "geojson": {"type": "LineString", "coordinates": []}}}"#;
        let short = r#"{"flight": {"date": "2023-07-14",
            "geojson": {"type": "LineString", "coordinates": [[1.0, 2.0]]}}}"#;
        let point = r#"{"flight": {"date": "2023-07-14",
            "geojson": {"type": "Point", "coordinates": [[1.0, 2.0, 3.0]]}}}"#;
        for text in [empty, short, point] {
            let err = Track::from_json("x", text).unwrap_err();
            assert_eq!(err.reason(), LoadErrorReason::Malformed, "{text}");
        }
    }

    #[test]
    fn test_json_write_then_read() {
        let track = Track::new(date(), vec![Position::new(1.0, 2.0, 3.0), Position::new(1.5, 2.5, 4.0)])
            .unwrap()
            .with_states(vec![FlightState::Landed, FlightState::Climbing])
            .unwrap()
            .with_timestamps(vec![0, 4])
            .unwrap()
            .with_durations(4, 4);
        let text = track.to_json().unwrap();
        assert_eq!(Track::from_json("x", &text).unwrap(), track);
    }

    #[test]
    fn test_bounds() {
        let track = Track::from_json("sample", SAMPLE).unwrap();
        let (min_lon, min_lat, max_lon, max_lat) = track.bounds();
        assert!((min_lon - 6.1).abs() < 1e-9);
        assert!((min_lat - 45.2).abs() < 1e-9);
        assert!((max_lon - 6.3).abs() < 1e-9);
        assert!((max_lat - 45.4).abs() < 1e-9);
    }

    #[test]
    fn test_memory_source_not_found() {
        let mut source = MemorySource::new();
        source.insert("a", Track::from_json("a", SAMPLE).unwrap());
        assert!(source.load("a").is_ok());
        let err = source.load("b").unwrap_err();
        assert_eq!(err.reason(), LoadErrorReason::NotFound);
        assert_eq!(source.list().unwrap().len(), 1);
    }

    #[test]
    fn test_directory_source_load_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2023/07")).unwrap();
        fs::write(root.join("2023/07/14-0.json"), SAMPLE).unwrap();
        fs::write(root.join("broken.json"), "{").unwrap();

        let source = DirectorySource::new(root);
        assert_eq!(source.load("2023/07/14-0.json").unwrap().len(), 3);
        assert_eq!(
            source.load("missing.json").unwrap_err().reason(),
            LoadErrorReason::NotFound
        );
        assert_eq!(
            source.load("../escape.json").unwrap_err().reason(),
            LoadErrorReason::NotFound
        );
        assert_eq!(
            source.load("broken.json").unwrap_err().reason(),
            LoadErrorReason::Malformed
        );

        let entries = source.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "2023/07/14-0.json");
        assert_eq!(entries[0].name, "2023-07-14-0");
    }

    #[test]
    fn test_directory_source_reads_index() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let index = TrackIndex {
            entries: vec![
                TrackEntry {
                    date: date(),
                    name: "2023-07-14-0".to_string(),
                    path: "2023/07/14-0.json".to_string(),
                },
                TrackEntry {
                    date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                    name: "2024-05-01-0".to_string(),
                    path: "2024/05/01-0.json".to_string(),
                },
            ],
        };
        fs::write(root.join(INDEX_FILE), serde_json::to_string(&index).unwrap()).unwrap();

        let entries = DirectorySource::new(root).list().unwrap();
        assert_eq!(entries[0].name, "2024-05-01-0");
        assert_eq!(entries[1].name, "2023-07-14-0");
    }

    #[test]
    fn test_directory_source_missing_root() {
        let source = DirectorySource::new("/nonexistent/flight-replay/tracks");
        assert_eq!(source.list().unwrap_err().reason(), LoadErrorReason::NotFound);
    }
}
