use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

use crate::{
    api::{DEFAULT_ETA_URL, DEFAULT_STOP_URL},
    model::stop_model::{Coordinate, SearchRadius},
    services::locator::{ConfiguredLocator, DEFAULT_LOCATE_URL, FixedLocator, IpLocator},
};

/// Finds the KMB bus stops around you and shows when the next buses arrive
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Your latitude. Located from your IP address when left out.
    #[arg(long, env = "USER_LAT", requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Your longitude
    #[arg(long, env = "USER_LON", requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Search radius in meters: 100, 200, 300, 400 or 500
    #[arg(short, long, env = "SEARCH_RADIUS", default_value = "100")]
    pub radius: SearchRadius,

    #[arg(long, env = "KMB_STOP_URL", default_value = DEFAULT_STOP_URL)]
    pub stop_url: String,

    /// Stop code is appended as the last path segment
    #[arg(long, env = "KMB_ETA_URL", default_value = DEFAULT_ETA_URL)]
    pub eta_url: String,

    /// IP geolocation service. Empty disables locating.
    #[arg(long, env = "LOCATE_URL", default_value = DEFAULT_LOCATE_URL)]
    pub locate_url: String,

    /// Time zone arrival times are shown in
    #[arg(
        long,
        env = "DISPLAY_TIMEZONE",
        default_value = "Asia/Hong_Kong",
        value_parser = parse_timezone
    )]
    pub timezone: Tz,

    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Spans are exported over OTLP when set
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>().map_err(|e| e.to_string())
}

impl Config {
    pub fn locator(&self) -> anyhow::Result<ConfiguredLocator> {
        Ok(match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                ConfiguredLocator::Fixed(FixedLocator(Coordinate::try_new(lat, lon)?))
            }
            _ if self.locate_url.trim().is_empty() => ConfiguredLocator::Unsupported,
            _ => ConfiguredLocator::Ip(IpLocator::new(self.locate_url.trim())),
        })
    }
}
