//! Responsible for getting the stop list and finding the stops around a point
use itertools::Itertools;
use tracing::{error, info, warn};

use crate::{
    api::KmbApi,
    error::LookupError,
    model::{
        kmb_api_model::KmbStopList,
        stop_model::{Coordinate, NearbyStop, Stop},
    },
    services::session_store::SessionStore,
    utils::haversine_distance,
};

pub const STOP_LIST_CACHE_KEY: &str = "stop_lists";

pub struct StopCatalog<'a, A, S> {
    api: &'a A,
    store: &'a S,
}

impl<'a, A: KmbApi, S: SessionStore> StopCatalog<'a, A, S> {
    pub fn new(api: &'a A, store: &'a S) -> Self {
        StopCatalog { api, store }
    }

    /// Returns every stop, from the session store if it's been fetched before.
    /// The store is only written after a successful fetch.
    #[tracing::instrument(err, skip(self))]
    pub async fn load(&self) -> Result<Vec<Stop>, LookupError> {
        let stop_list = match self.cached() {
            Some(stop_list) => stop_list,
            None => {
                let stop_list = self
                    .api
                    .stop_list()
                    .await
                    .map_err(LookupError::CatalogFetch)?;

                match serde_json::to_string(&stop_list) {
                    Ok(serialized) => self.store.set(STOP_LIST_CACHE_KEY, serialized),
                    Err(e) => warn!("couldn't cache the stop list {e}"),
                }

                stop_list
            }
        };

        let stops = stop_list
            .data
            .into_iter()
            .map(Stop::try_from)
            .filter_map(|s| match s {
                Err(e) => {
                    error!("Error turning KmbStop to Stop {e}");
                    None
                }
                Ok(s) => Some(s),
            })
            .collect_vec();

        Ok(stops)
    }

    fn cached(&self) -> Option<KmbStopList> {
        let cached = self.store.get(STOP_LIST_CACHE_KEY)?;

        match serde_json::from_str(&cached) {
            Ok(stop_list) => {
                info!("using cached stop list");
                Some(stop_list)
            }
            Err(e) => {
                warn!("discarding unreadable cached stop list {e}");
                None
            }
        }
    }
}

/// Every stop within `radius_m` meters of `origin`, including ones exactly on the boundary.
/// The result is in catalog order.
pub fn find_nearby(origin: Coordinate, radius_m: f64, stops: &[Stop]) -> Vec<NearbyStop> {
    stops
        .iter()
        .filter_map(|stop| {
            let distance_m = haversine_distance(origin, stop.location);

            (distance_m <= radius_m).then(|| NearbyStop {
                stop: stop.clone(),
                distance_m,
            })
        })
        .collect_vec()
}
