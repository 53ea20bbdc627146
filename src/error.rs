//! Failures that end up in front of the user

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("error fetching data")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("error parsing the response")]
    ParsingError(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("location unavailable: {reason}")]
    LocationUnavailable { reason: String },

    #[error("error fetching the stop catalog")]
    CatalogFetch(#[source] FetchError),

    #[error("error fetching arrivals")]
    EtaFetch(#[source] FetchError),
}

impl LookupError {
    pub fn location_unavailable(reason: impl Into<String>) -> Self {
        LookupError::LocationUnavailable {
            reason: reason.into(),
        }
    }

    /// The message shown in place of the UI region the failed operation owns
    pub fn user_message(&self) -> &'static str {
        match self {
            LookupError::LocationUnavailable { .. } => "Unable to retrieve your location",
            LookupError::CatalogFetch(_) => "Error fetching bus stop data",
            LookupError::EtaFetch(_) => "Error fetching ETA data",
        }
    }
}
