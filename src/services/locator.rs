//! Where the user is
use reqwest::Client;
use serde::Deserialize;
use tracing::{Instrument, info, info_span};

use crate::{error::LookupError, model::stop_model::Coordinate};

pub const DEFAULT_LOCATE_URL: &str = "http://ip-api.com/json";

pub trait Locator {
    async fn locate(&self) -> Result<Coordinate, LookupError>;
}

/// Position given up front on the command line or in the environment
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator(pub Coordinate);

impl Locator for FixedLocator {
    async fn locate(&self) -> Result<Coordinate, LookupError> {
        Ok(self.0)
    }
}

/// Approximates the position from the public IP address
#[derive(Debug, Clone)]
pub struct IpLocator {
    client: Client,
    url: String,
}

impl IpLocator {
    pub fn new(url: impl Into<String>) -> Self {
        IpLocator {
            client: Client::new(),
            url: url.into(),
        }
    }

    async fn fetch_body(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .instrument(info_span!("Fetching location"))
            .await?
            .error_for_status()?
            .text()
            .instrument(info_span!("Reading body of response"))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct IpLocation {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

fn parse_ip_location(body: &str) -> Result<Coordinate, LookupError> {
    let location: IpLocation = serde_json::from_str(body)
        .map_err(|e| LookupError::location_unavailable(format!("unreadable response: {e}")))?;

    if location.status != "success" {
        return Err(LookupError::location_unavailable(
            location.message.unwrap_or(location.status),
        ));
    }

    match (location.lat, location.lon) {
        (Some(lat), Some(lon)) => Coordinate::try_new(lat, lon)
            .map_err(|e| LookupError::location_unavailable(e.to_string())),
        _ => Err(LookupError::location_unavailable(
            "response is missing coordinates",
        )),
    }
}

impl Locator for IpLocator {
    #[tracing::instrument(err, skip(self))]
    async fn locate(&self) -> Result<Coordinate, LookupError> {
        let body = self
            .fetch_body()
            .await
            .map_err(|e| LookupError::location_unavailable(e.to_string()))?;

        let coordinate = parse_ip_location(&body)?;

        info!("located user at {coordinate}");

        Ok(coordinate)
    }
}

/// The locator picked by the configuration
#[derive(Debug, Clone)]
pub enum ConfiguredLocator {
    Fixed(FixedLocator),
    Ip(IpLocator),
    /// No way of locating the user was configured
    Unsupported,
}

impl Locator for ConfiguredLocator {
    async fn locate(&self) -> Result<Coordinate, LookupError> {
        match self {
            ConfiguredLocator::Fixed(locator) => locator.locate().await,
            ConfiguredLocator::Ip(locator) => locator.locate().await,
            ConfiguredLocator::Unsupported => Err(LookupError::location_unavailable(
                "geolocation is not supported",
            )),
        }
    }
}
