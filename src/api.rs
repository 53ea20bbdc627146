//! Access to the KMB open data endpoints
use reqwest::Client;
use tracing::{Instrument, info, info_span};

use crate::{
    error::FetchError,
    model::kmb_api_model::{KmbStopEta, KmbStopList},
};

pub const DEFAULT_STOP_URL: &str = "https://data.etabus.gov.hk/v1/transport/kmb/stop";
pub const DEFAULT_ETA_URL: &str = "https://data.etabus.gov.hk/v1/transport/kmb/stop-eta";

pub trait KmbApi {
    /// Every stop KMB serves
    async fn stop_list(&self) -> Result<KmbStopList, FetchError>;

    /// Raw arrival predictions for one stop, all routes and directions mixed together
    async fn stop_eta(&self, stop_code: &str) -> Result<KmbStopEta, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpKmbApi {
    client: Client,
    stop_url: String,
    eta_url: String,
}

impl HttpKmbApi {
    pub fn new(stop_url: impl Into<String>, eta_url: impl Into<String>) -> Self {
        HttpKmbApi {
            client: Client::new(),
            stop_url: stop_url.into(),
            eta_url: eta_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .send()
            .instrument(info_span!("Sending request"))
            .await?
            .error_for_status()?;

        response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await
    }
}

impl KmbApi for HttpKmbApi {
    #[tracing::instrument(err, skip(self))]
    async fn stop_list(&self) -> Result<KmbStopList, FetchError> {
        let stops_string = self
            .get_text(&self.stop_url)
            .instrument(info_span!("Fetching stops"))
            .await?;

        let stops: KmbStopList = serde_json::from_str(&stops_string)?;

        info!("got {} stops", stops.data.len());

        Ok(stops)
    }

    #[tracing::instrument(err, skip(self))]
    async fn stop_eta(&self, stop_code: &str) -> Result<KmbStopEta, FetchError> {
        let request = format!("{}/{}", self.eta_url, stop_code);

        let etas_string = self
            .get_text(&request)
            .instrument(info_span!("Fetching stop ETA"))
            .await?;

        let etas: KmbStopEta = serde_json::from_str(&etas_string)?;

        info!("got {} arrival records", etas.data.len());

        Ok(etas)
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`KmbApi`] used by the service and app tests
    use std::{
        cell::{Cell, RefCell},
        collections::HashMap,
    };

    use super::*;
    use crate::model::kmb_api_model::KmbStop;

    #[derive(Default)]
    pub struct FakeKmbApi {
        pub stops: Option<Vec<KmbStop>>,
        pub etas: RefCell<HashMap<String, Result<KmbStopEta, String>>>,
        pub stop_list_calls: Cell<usize>,
        pub stop_eta_calls: RefCell<Vec<String>>,
    }

    impl FakeKmbApi {
        pub fn with_stops(stops: Vec<KmbStop>) -> Self {
            FakeKmbApi {
                stops: Some(stops),
                ..Default::default()
            }
        }

        pub fn set_eta_json(&self, stop_code: &str, json: &str) {
            let parsed = serde_json::from_str(json).map_err(|e| e.to_string());
            self.etas.borrow_mut().insert(stop_code.to_string(), parsed);
        }
    }

    fn parse_failure() -> FetchError {
        FetchError::ParsingError(serde_json::from_str::<KmbStopList>("not json").unwrap_err())
    }

    impl KmbApi for FakeKmbApi {
        async fn stop_list(&self) -> Result<KmbStopList, FetchError> {
            self.stop_list_calls.set(self.stop_list_calls.get() + 1);
            tokio::task::yield_now().await;

            match &self.stops {
                Some(stops) => Ok(KmbStopList { data: stops.clone() }),
                None => Err(parse_failure()),
            }
        }

        async fn stop_eta(&self, stop_code: &str) -> Result<KmbStopEta, FetchError> {
            self.stop_eta_calls.borrow_mut().push(stop_code.to_string());
            tokio::task::yield_now().await;

            match self.etas.borrow().get(stop_code) {
                Some(Ok(etas)) => Ok(etas.clone()),
                _ => Err(parse_failure()),
            }
        }
    }
}
