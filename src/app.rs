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

//! Desktop UI: track list on the left, detail view with map and playback
//! controls in the center.

use std::path::Path;
use std::sync::Arc;

use eframe::egui;
use log::{error, info, warn};
use track_playback::{
    ColorPolicy, DirectorySource, IgcFile, LoadErrorReason, Track, TrackEntry, TrackError,
    TrackSource, Viewer,
};

use crate::config::AppConfig;
use crate::map::TrackMap;

const SPEED_RANGE_MS: std::ops::RangeInclusive<u64> = 10..=2000;

/// Open track detail view. Dropping it ends the playback session.
struct Detail {
    title: String,
    viewer: Viewer,
    map: TrackMap,
}

pub struct ReplayApp {
    config: AppConfig,
    source: DirectorySource,
    entries: Vec<TrackEntry>,
    list_error: Option<String>,
    selected: Option<String>,
    detail: Option<Detail>,
    detail_error: Option<String>,
}

impl std::fmt::Debug for ReplayApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayApp")
            .field("data_dir", &self.source.root())
            .field("entries", &self.entries.len())
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

/// Message shown in the detail view for a load failure.
fn describe_load_error(error: &TrackError) -> String {
    match error.reason() {
        LoadErrorReason::NotFound => format!("Track not found. {error}"),
        LoadErrorReason::Malformed => format!("Track file is damaged. {error}"),
    }
}

impl ReplayApp {
    pub fn new(config: AppConfig) -> Self {
        let source = DirectorySource::new(config.data_dir.clone());
        let mut app = Self {
            config,
            source,
            entries: Vec::new(),
            list_error: None,
            selected: None,
            detail: None,
            detail_error: None,
        };
        app.refresh();
        app
    }

    fn refresh(&mut self) {
        match self.source.list() {
            Ok(entries) => {
                info!("Found {} tracks in {}", entries.len(), self.source.root().display());
                self.entries = entries;
                self.list_error = None;
            }
            Err(e) => {
                warn!("Could not list tracks: {}", e);
                self.entries.clear();
                self.list_error = Some(e.to_string());
            }
        }
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save() {
            warn!("Failed to save configuration: {}", e);
        }
    }

    fn open_entry(&mut self, ctx: &egui::Context, entry: &TrackEntry) {
        self.selected = Some(entry.path.clone());
        self.detail = None;

        match self.source.load(&entry.path) {
            Ok(track) => self.start_session(ctx, entry.path.clone(), entry.name.clone(), track),
            Err(e) => {
                error!("Failed to open {}: {}", entry.path, e);
                self.detail_error = Some(describe_load_error(&e));
            }
        }
    }

    fn open_igc(&mut self, ctx: &egui::Context, path: &Path) {
        self.selected = None;
        self.detail = None;

        match IgcFile::from_path(path).and_then(IgcFile::into_track) {
            Ok(track) => {
                let title = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                self.start_session(ctx, path.display().to_string(), title, track);
            }
            Err(e) => {
                error!("Failed to import {}: {}", path.display(), e);
                self.detail_error = Some(format!("Could not read IGC file. {e}"));
            }
        }
    }

    fn start_session(&mut self, ctx: &egui::Context, key: String, title: String, track: Track) {
        let track = Arc::new(track);
        let (map, surface) = TrackMap::new(&track, ctx);
        let viewer = Viewer::with_track(key, track, surface, self.config.viewer_config());
        self.detail_error = None;
        self.detail = Some(Detail { title, viewer, map });
    }

    fn draw_track_list(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Flights");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⟳").on_hover_text("Reload").clicked() {
                    self.refresh();
                }
            });
        });
        ui.label(
            egui::RichText::new(self.source.root().display().to_string())
                .size(9.0)
                .color(egui::Color32::from_gray(140)),
        );

        if ui.button("Open IGC file…").clicked() {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("IGC", &["igc", "IGC"])
                .pick_file()
            {
                self.open_igc(ctx, &path);
            }
        }
        ui.separator();

        if let Some(ref message) = self.list_error {
            ui.colored_label(egui::Color32::from_rgb(220, 120, 80), message);
            return;
        }
        if self.entries.is_empty() {
            ui.label("No tracks. Run `flight-replay compile` to import IGC logs.");
            return;
        }

        let mut clicked = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for entry in &self.entries {
                let is_selected = self.selected.as_ref() == Some(&entry.path);
                if ui.selectable_label(is_selected, &entry.name).clicked() {
                    clicked = Some(entry.clone());
                }
            }
        });
        if let Some(entry) = clicked {
            self.open_entry(ctx, &entry);
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        let config = &mut self.config;
        let playback = detail.viewer.playback();
        let track = Arc::clone(detail.viewer.track());
        let state = playback.snapshot();
        let mut close = false;
        let mut config_changed = false;

        ui.horizontal(|ui| {
            ui.heading(&detail.title);
            ui.label(format!(
                "{} | flying {} | {} samples",
                track.date().format("%Y-%m-%d"),
                track.duration_label(),
                track.len()
            ));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                close = ui.button("Close").clicked();
                if ui.button("Fit").clicked() {
                    detail.map.reset_view();
                }
            });
        });

        ui.horizontal(|ui| {
            let label = if state.is_playing { "⏸ Pause" } else { "▶ Play" };
            if ui.button(label).clicked() {
                playback.toggle();
            }
            if ui
                .add_enabled(!state.show_full_track, egui::Button::new("Full track"))
                .clicked()
            {
                playback.show_full();
            }

            let mut cursor = state.cursor;
            ui.spacing_mut().slider_width = (ui.available_width() - 120.0).max(100.0);
            if ui
                .add(egui::Slider::new(&mut cursor, 0..=track.len()).text("cursor"))
                .changed()
            {
                playback.seek(cursor);
            }
        });

        ui.horizontal(|ui| {
            let mut speed_ms = state.speed_ms;
            if ui
                .add(
                    egui::Slider::new(&mut speed_ms, SPEED_RANGE_MS)
                        .logarithmic(true)
                        .suffix(" ms")
                        .text("tick"),
                )
                .changed()
            {
                playback.set_speed(speed_ms);
                config.speed_ms = speed_ms;
                config_changed = true;
            }

            let mut trail_length = state.trail_length;
            if ui
                .add(
                    egui::Slider::new(&mut trail_length, 1..=track.len().max(1))
                        .logarithmic(true)
                        .text("trail"),
                )
                .changed()
            {
                playback.set_trail_length(trail_length);
                config.trail_length = trail_length;
                config_changed = true;
            }

            let settings = detail.viewer.settings();
            let mut policy = settings.color_policy;
            egui::ComboBox::from_label("color")
                .selected_text(policy.label())
                .show_ui(ui, |ui| {
                    for option in ColorPolicy::ALL {
                        ui.selectable_value(&mut policy, option, option.label());
                    }
                });
            if policy != settings.color_policy {
                detail.viewer.set_color_policy(policy);
                config.color_policy = policy;
                config_changed = true;
            }

            let mut center = settings.center_on_cursor;
            if ui.checkbox(&mut center, "Follow cursor").changed() {
                detail.viewer.set_center_on_cursor(center);
                config.center_on_cursor = center;
                config_changed = true;
            }
        });

        if !state.show_full_track && state.cursor > 0 {
            let index = state.cursor.min(track.len()) - 1;
            if let Some(position) = track.position(index) {
                ui.label(
                    egui::RichText::new(format!(
                        "#{index} {:>8.5}° {:>9.5}° {:.0} m {}",
                        position.latitude,
                        position.longitude,
                        position.altitude,
                        track.state(index)
                    ))
                    .monospace()
                    .size(11.0),
                );
            }
        }

        if config_changed {
            self.save_config();
        }
        if close {
            self.selected = None;
            self.detail = None;
        }
    }
}

impl eframe::App for ReplayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::SidePanel::left("track_list")
            .resizable(true)
            .default_width(self.config.track_list_width)
            .show(ctx, |ui| {
                self.draw_track_list(ctx, ui);
            });

        if self.detail.is_some() {
            egui::TopBottomPanel::bottom("playback_controls").show(ctx, |ui| {
                self.draw_controls(ui);
            });
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                if let Some(detail) = self.detail.as_mut() {
                    detail.map.show(ui);
                } else if let Some(ref message) = self.detail_error {
                    ui.centered_and_justified(|ui| {
                        ui.colored_label(egui::Color32::from_rgb(220, 80, 80), message);
                    });
                } else {
                    ui.centered_and_justified(|ui| {
                        ui.label("Select a flight");
                    });
                }
            });
    }
}
