use std::{fmt, num::ParseIntError, str::FromStr};

use anyhow::{Context, Error, bail};
use chrono::{DateTime, Utc};

use super::kmb_api_model::{Direction, KmbStop};

/// A point on the earth's surface, in degrees
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn try_new(latitude: f64, longitude: f64) -> anyhow::Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            bail!("latitude {latitude} is outside of [-90, 90]");
        }
        if !(-180.0..=180.0).contains(&longitude) {
            bail!("longitude {longitude} is outside of [-180, 180]");
        }

        Ok(Coordinate {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    /// Unique stop code assigned by KMB
    pub code: String,
    pub name_en: String,
    pub location: Coordinate,
}

impl TryFrom<KmbStop> for Stop {
    type Error = Error;

    fn try_from(value: KmbStop) -> Result<Self, Self::Error> {
        let lat = value.lat.to_f64().context("bad lat")?;
        let long = value.long.to_f64().context("bad long")?;

        Ok(Stop {
            location: Coordinate::try_new(lat, long)?,
            code: value.stop,
            name_en: value.name_en,
        })
    }
}

/// A stop together with its distance from the search origin
#[derive(Clone, Debug, PartialEq)]
pub struct NearbyStop {
    pub stop: Stop,
    pub distance_m: f64,
}

/// The radii offered by the radius selector
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SearchRadius {
    #[default]
    M100,
    M200,
    M300,
    M400,
    M500,
}

impl SearchRadius {
    pub const ALL: [SearchRadius; 5] = [
        SearchRadius::M100,
        SearchRadius::M200,
        SearchRadius::M300,
        SearchRadius::M400,
        SearchRadius::M500,
    ];

    pub fn meters(self) -> u32 {
        match self {
            SearchRadius::M100 => 100,
            SearchRadius::M200 => 200,
            SearchRadius::M300 => 300,
            SearchRadius::M400 => 400,
            SearchRadius::M500 => 500,
        }
    }

    /// Map zoom used when showing a stop found with this radius.
    /// Smaller radius means the stop is closer, so zoom in further.
    pub fn zoom_level(self) -> u8 {
        match self {
            SearchRadius::M100 => 19,
            SearchRadius::M200 => 18,
            SearchRadius::M300 => 17,
            SearchRadius::M400 | SearchRadius::M500 => 16,
        }
    }
}

impl fmt::Display for SearchRadius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.meters())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SearchRadiusError {
    #[error("radius must be a whole number of meters")]
    NotANumber(#[from] ParseIntError),

    #[error("{0}m isn't one of the supported radii (100, 200, 300, 400, 500)")]
    Unsupported(u32),
}

impl TryFrom<u32> for SearchRadius {
    type Error = SearchRadiusError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SearchRadius::ALL
            .into_iter()
            .find(|r| r.meters() == value)
            .ok_or(SearchRadiusError::Unsupported(value))
    }
}

impl FromStr for SearchRadius {
    type Err = SearchRadiusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let meters: u32 = s.strip_suffix('m').unwrap_or(s).parse()?;
        meters.try_into()
    }
}

/// Arrivals of one route in one direction at a stop
#[derive(Clone, Debug, PartialEq)]
pub struct RouteEta {
    pub route: String,
    pub direction: Direction,
    pub service_type: String,
    pub destination: String,
    pub eta_seq: i32,
    /// In the order the API sent them, never more than [`RouteEta::MAX_ETAS`]
    pub eta: Vec<DateTime<Utc>>,
}

impl RouteEta {
    pub const MAX_ETAS: usize = 3;
}
