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

//! Painter-based map view for the track overlay.
//!
//! The render task runs on the Tokio runtime and pushes geometry through
//! [`OverlaySurface`]; the UI thread draws whatever was pushed last with
//! [`TrackMap::show`].

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eframe::egui;
use log::debug;
use track_playback::render::PATH_LAYER_ID;
use track_playback::{MapSurface, Position, RenderWindow, Track};

const TILE_PIXEL_SIZE: f64 = 256.0;
const MIN_ZOOM: f64 = 2.0;
const MAX_ZOOM: f64 = 18.0;
const MAX_LATITUDE: f64 = 85.0;

/// Web Mercator projection utilities
#[derive(Debug)]
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y in tile units at `zoom`
    #[must_use]
    pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
        let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
        y * zoom.exp2()
    }

    /// Convert longitude to Web Mercator X in tile units at `zoom`
    #[must_use]
    pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
        ((lon + 180.0) / 360.0) * zoom.exp2()
    }

    /// Convert tile units back to latitude
    #[must_use]
    pub fn y_to_lat(y: f64, zoom: f64) -> f64 {
        let lat_rad = (PI * (1.0 - 2.0 * y / zoom.exp2())).sinh().atan();
        lat_rad.to_degrees()
    }

    /// Convert tile units back to longitude
    #[must_use]
    pub fn x_to_lon(x: f64, zoom: f64) -> f64 {
        x / zoom.exp2() * 360.0 - 180.0
    }

    /// Largest zoom at which the bounding box fits in `width` x `height`
    /// pixels, with the center of the box.
    #[must_use]
    pub fn fit(
        (min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64),
        width: f64,
        height: f64,
    ) -> (f64, f64, f64) {
        let center_lat = Self::y_to_lat(
            (Self::lat_to_y(min_lat, 0.0) + Self::lat_to_y(max_lat, 0.0)) / 2.0,
            0.0,
        );
        let center_lon = (min_lon + max_lon) / 2.0;

        // Extent in pixels at zoom 0
        let dx = (Self::lon_to_x(max_lon, 0.0) - Self::lon_to_x(min_lon, 0.0)) * TILE_PIXEL_SIZE;
        let dy = (Self::lat_to_y(min_lat, 0.0) - Self::lat_to_y(max_lat, 0.0)) * TILE_PIXEL_SIZE;

        let zoom_x = if dx > 0.0 { (width / dx).log2() } else { MAX_ZOOM };
        let zoom_y = if dy > 0.0 { (height / dy).log2() } else { MAX_ZOOM };
        let zoom = zoom_x.min(zoom_y).clamp(MIN_ZOOM, MAX_ZOOM);

        (center_lat, center_lon, zoom)
    }
}

/// Latest overlay pushed by the render task.
#[derive(Debug, Default)]
struct Overlay {
    path: Option<RenderWindow>,
    pending_center: Option<Position>,
    generation: u64,
}

fn lock(overlay: &Mutex<Overlay>) -> MutexGuard<'_, Overlay> {
    overlay.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`MapSurface`] handed to the viewer session.
///
/// Stores the layer for the UI thread and asks egui for a repaint.
#[derive(Debug, Clone)]
pub struct OverlaySurface {
    overlay: Arc<Mutex<Overlay>>,
    ctx: egui::Context,
}

impl MapSurface for OverlaySurface {
    fn set_path_layer(&mut self, window: RenderWindow) {
        {
            let mut overlay = lock(&self.overlay);
            overlay.generation += 1;
            debug!(
                "Layer {} update {}: {} vertices",
                PATH_LAYER_ID,
                overlay.generation,
                window.path.len()
            );
            overlay.path = Some(window);
        }
        self.ctx.request_repaint();
    }

    fn center_on(&mut self, position: Position) {
        lock(&self.overlay).pending_center = Some(position);
        self.ctx.request_repaint();
    }
}

/// Map widget showing one track.
#[derive(Debug)]
pub struct TrackMap {
    overlay: Arc<Mutex<Overlay>>,
    center_lat: f64,
    center_lon: f64,
    zoom: f64,
    fitted: bool,
    bounds: (f64, f64, f64, f64),
}

impl TrackMap {
    /// Create a map for `track` and the surface that feeds it.
    pub fn new(track: &Track, ctx: &egui::Context) -> (Self, OverlaySurface) {
        let overlay = Arc::new(Mutex::new(Overlay::default()));
        let bounds = track.bounds();
        let map = Self {
            overlay: Arc::clone(&overlay),
            center_lat: (bounds.1 + bounds.3) / 2.0,
            center_lon: (bounds.0 + bounds.2) / 2.0,
            zoom: 12.0,
            fitted: false,
            bounds,
        };
        let surface = OverlaySurface {
            overlay,
            ctx: ctx.clone(),
        };
        (map, surface)
    }

    /// Fit the whole track on the next frame.
    pub fn reset_view(&mut self) {
        self.fitted = false;
    }

    fn project(&self, center: egui::Pos2, lat: f64, lon: f64) -> egui::Pos2 {
        let x = WebMercator::lon_to_x(lon, self.zoom) - WebMercator::lon_to_x(self.center_lon, self.zoom);
        let y = WebMercator::lat_to_y(lat, self.zoom) - WebMercator::lat_to_y(self.center_lat, self.zoom);
        egui::pos2(
            center.x + (x * TILE_PIXEL_SIZE) as f32,
            center.y + (y * TILE_PIXEL_SIZE) as f32,
        )
    }

    pub fn show(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), ui.available_height()),
            egui::Sense::click_and_drag(),
        );
        let rect = response.rect;
        let center = rect.center();

        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(24, 28, 34));

        if !self.fitted && rect.width() > 0.0 && rect.height() > 0.0 {
            let (lat, lon, zoom) = WebMercator::fit(
                self.bounds,
                f64::from(rect.width()) * 0.9,
                f64::from(rect.height()) * 0.9,
            );
            self.center_lat = lat;
            self.center_lon = lon;
            self.zoom = zoom;
            self.fitted = true;
        }

        // Handle pinch-zoom and scroll
        if response.hovered() {
            let zoom_delta = ui.ctx().input(|i| i.zoom_delta());
            let scroll = ui.ctx().input(|i| i.smooth_scroll_delta.y);
            let change = f64::from(zoom_delta.log2()) + f64::from(scroll) / 200.0;
            if change.abs() > 0.001 {
                self.zoom = (self.zoom + change).clamp(MIN_ZOOM, MAX_ZOOM);
            }
        }

        // Handle dragging
        if response.dragged() {
            let delta = response.drag_delta();
            let x = WebMercator::lon_to_x(self.center_lon, self.zoom)
                - f64::from(delta.x) / TILE_PIXEL_SIZE;
            let y = WebMercator::lat_to_y(self.center_lat, self.zoom)
                - f64::from(delta.y) / TILE_PIXEL_SIZE;
            self.center_lon = WebMercator::x_to_lon(x, self.zoom);
            self.center_lat = WebMercator::y_to_lat(y, self.zoom).clamp(-MAX_LATITUDE, MAX_LATITUDE);
        }

        let path = {
            let mut overlay = lock(&self.overlay);
            if let Some(position) = overlay.pending_center.take() {
                self.center_lat = position.latitude;
                self.center_lon = position.longitude;
            }
            overlay.path.clone()
        };

        if let Some(window) = path {
            let points: Vec<egui::Pos2> = window
                .path
                .iter()
                .map(|p| self.project(center, p.latitude, p.longitude))
                .collect();

            // Each segment takes the color of its end vertex
            for (i, segment) in points.windows(2).enumerate() {
                let color = window.colors[i + 1];
                if color.a == 0 {
                    continue;
                }
                painter.line_segment(
                    [segment[0], segment[1]],
                    egui::Stroke::new(
                        2.5,
                        egui::Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a),
                    ),
                );
            }

            if let Some(last) = points.last() {
                painter.circle_filled(*last, 5.0, egui::Color32::WHITE);
            }
        }

        painter.text(
            rect.left_top() + egui::vec2(10.0, 10.0),
            egui::Align2::LEFT_TOP,
            "Drag to pan | Scroll to zoom",
            egui::FontId::proportional(12.0),
            egui::Color32::from_gray(180),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn track() -> Track {
        Track::new(
            NaiveDate::from_ymd_opt(2023, 7, 14).unwrap(),
            vec![
                Position::new(6.0, 45.0, 1000.0),
                Position::new(6.1, 45.1, 1100.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_projection_origin() {
        assert!((WebMercator::lon_to_x(0.0, 0.0) - 0.5).abs() < 1e-12);
        assert!((WebMercator::lat_to_y(0.0, 0.0) - 0.5).abs() < 1e-12);
        assert!((WebMercator::lon_to_x(180.0, 3.0) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_projection_inverse() {
        let y = WebMercator::lat_to_y(45.5, 10.0);
        let x = WebMercator::lon_to_x(6.25, 10.0);
        assert!((WebMercator::y_to_lat(y, 10.0) - 45.5).abs() < 1e-9);
        assert!((WebMercator::x_to_lon(x, 10.0) - 6.25).abs() < 1e-9);
    }

    #[test]
    fn test_fit_contains_bounds() {
        let bounds = (6.0, 45.0, 6.1, 45.1);
        let (lat, lon, zoom) = WebMercator::fit(bounds, 800.0, 600.0);
        assert!((lon - 6.05).abs() < 1e-9);
        assert!(lat > 45.0 && lat < 45.1);

        let width = (WebMercator::lon_to_x(6.1, zoom) - WebMercator::lon_to_x(6.0, zoom)) * 256.0;
        assert!(width <= 800.0 + 1e-6);
        assert!(zoom > 10.0);
    }

    #[test]
    fn test_fit_single_point_uses_max_zoom() {
        let (_, _, zoom) = WebMercator::fit((6.0, 45.0, 6.0, 45.0), 800.0, 600.0);
        assert!((zoom - MAX_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_surface_feeds_map() {
        let ctx = egui::Context::default();
        let (map, mut surface) = TrackMap::new(&track(), &ctx);

        surface.set_path_layer(RenderWindow {
            range: track_playback::WindowRange { start: 0, end: 2 },
            path: track().positions().to_vec(),
            colors: vec![track_playback::Rgba::BLUE; 2],
        });
        surface.center_on(Position::new(6.1, 45.1, 0.0));

        let overlay = lock(&map.overlay);
        assert_eq!(overlay.generation, 1);
        assert_eq!(overlay.path.as_ref().map(RenderWindow::is_empty), Some(false));
        assert_eq!(overlay.pending_center, Some(Position::new(6.1, 45.1, 0.0)));
    }
}
