//! Map of the user and the selected stop, as OpenStreetMap references
use std::f64::consts::PI;

use crate::{
    model::stop_model::{Coordinate, SearchRadius},
    utils::midpoint,
};

pub const OSM_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkerIcon {
    User,
    BusStop,
}

impl MarkerIcon {
    pub fn label(self) -> &'static str {
        match self {
            MarkerIcon::User => "[you]",
            MarkerIcon::BusStop => "[bus]",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Marker {
    pub position: Coordinate,
    pub icon: MarkerIcon,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapView {
    pub center: Coordinate,
    pub zoom: u8,
    pub markers: [Marker; 2],
}

impl MapView {
    /// Centered between the user and the stop, zoomed according to the search radius
    pub fn new(user: Coordinate, stop: Coordinate, radius: SearchRadius) -> Self {
        MapView {
            center: midpoint(user, stop),
            zoom: radius.zoom_level(),
            markers: [
                Marker {
                    position: user,
                    icon: MarkerIcon::User,
                },
                Marker {
                    position: stop,
                    icon: MarkerIcon::BusStop,
                },
            ],
        }
    }

    /// Slippy map tile holding the center
    pub fn center_tile(&self) -> (u32, u32) {
        let n = f64::from(1u32 << self.zoom);
        let lat = self.center.latitude.to_radians();

        let x = ((self.center.longitude + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - lat.tan().asinh() / PI) / 2.0 * n).floor();

        let max = n - 1.0;
        (x.clamp(0.0, max) as u32, y.clamp(0.0, max) as u32)
    }

    pub fn tile_url(&self) -> String {
        let (x, y) = self.center_tile();

        OSM_TILE_URL
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    /// Link that opens the same view on openstreetmap.org with the stop pinned
    pub fn view_url(&self) -> String {
        let stop = self.markers[1].position;

        format!(
            "https://www.openstreetmap.org/?mlat={:.6}&mlon={:.6}#map={}/{:.6}/{:.6}",
            stop.latitude, stop.longitude, self.zoom, self.center.latitude, self.center.longitude
        )
    }

    pub fn render(&self) -> String {
        let mut out = format!("Map (zoom {}): {}\n", self.zoom, self.view_url());
        out.push_str(&format!("  tile {}\n", self.tile_url()));
        for marker in &self.markers {
            out.push_str(&format!("  {} {}\n", marker.icon.label(), marker.position));
        }
        out
    }
}
