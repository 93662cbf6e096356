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

//! Conversion of a directory of IGC logs into track files.
//!
//! Each flight is written to `YYYY/MM/DD-<n>.json` below the output
//! directory, where `n` counts flights of the same day in input order. An
//! `index.json` listing every flight, newest first, is written last.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, error, info};
use track_playback::track::{format_duration, TrackIndex, INDEX_FILE};
use track_playback::{IgcFile, TrackEntry};

/// Outcome of a compile run.
#[derive(Debug, Default)]
pub struct CompileSummary {
    pub written: Vec<TrackEntry>,
    pub failed: usize,
    pub total_flight_seconds: u64,
}

/// Convert every `*.igc` file below `input` into a track file below `output`.
///
/// Files that fail to parse are logged and skipped. Only output errors abort
/// the run.
pub fn compile(input: &Path, output: &Path) -> io::Result<CompileSummary> {
    let mut files = Vec::new();
    collect_igc_files(input, &mut files)?;
    files.sort();
    info!("Compiling {} IGC files from {}", files.len(), input.display());

    let mut summary = CompileSummary::default();
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();

    for file in &files {
        info!("Processing {}", file.display());
        let track = match IgcFile::from_path(file).and_then(IgcFile::into_track) {
            Ok(track) => track,
            Err(e) => {
                error!("Skipping {}: {}", file.display(), e);
                summary.failed += 1;
                continue;
            }
        };

        let date = track.date();
        let counter = per_day.entry(date).or_insert(0);
        let date_index = *counter;
        *counter += 1;

        let key = format!("{}-{}.json", date.format("%Y/%m/%d"), date_index);
        let path = output.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, track.to_json().map_err(io::Error::other)?)?;
        debug!("Wrote {}", path.display());

        summary.total_flight_seconds += track.duration_seconds();
        summary.written.push(TrackEntry {
            date,
            name: format!("{}-{}", date.format("%Y-%m-%d"), date_index),
            path: key,
        });
    }

    write_index(output, &summary.written)?;
    info!(
        "Compiled {} flights ({} failed), total flight time {}",
        summary.written.len(),
        summary.failed,
        format_duration(summary.total_flight_seconds)
    );
    Ok(summary)
}

fn write_index(output: &Path, written: &[TrackEntry]) -> io::Result<()> {
    let mut entries = written.to_vec();
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));

    let text = serde_json::to_string_pretty(&TrackIndex { entries }).map_err(io::Error::other)?;
    fs::create_dir_all(output)?;
    fs::write(output.join(INDEX_FILE), text)
}

fn collect_igc_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_igc_files(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("igc"))
        {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use track_playback::{DirectorySource, TrackSource};

    const FLIGHT: &str = "\
AXXX001
HFDTEDATE:140723,01
B1101355206343N00006198WA0058700558
B1101405206343N00006198WA0058700558
B1101455206443N00006198WA0060000600
B1101505206543N00006198WA0059000580
";

    #[test]
    fn test_compile_directory() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path();
        let output = output_dir.path();
        fs::create_dir_all(input.join("2023")).unwrap();
        fs::write(input.join("a.igc"), FLIGHT).unwrap();
        fs::write(input.join("2023/b.IGC"), FLIGHT).unwrap();
        fs::write(input.join("broken.igc"), "B11\n").unwrap();
        fs::write(input.join("notes.txt"), "not a log").unwrap();

        let summary = compile(input, output).unwrap();
        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_flight_seconds, 20);

        // "2023/b.IGC" sorts before "a.igc"
        assert_eq!(summary.written[0].path, "2023/07/14-0.json");
        assert_eq!(summary.written[1].name, "2023-07-14-1");

        let source = DirectorySource::new(output);
        let listed = source.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "2023-07-14-1");

        let track = source.load("2023/07/14-1.json").unwrap();
        assert_eq!(track.len(), 4);
        assert_eq!(track.duration_seconds(), 10);
    }

    #[test]
    fn test_compile_missing_input() {
        let output = tempfile::tempdir().unwrap();
        assert!(compile(&output.path().join("nope"), output.path()).is_err());
    }
}
