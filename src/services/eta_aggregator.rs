//! Turns the raw per-bus arrival records of a stop into one entry per route and direction
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use tracing::info;

use crate::{
    api::KmbApi,
    error::LookupError,
    model::{
        kmb_api_model::{Direction, KmbEta},
        stop_model::RouteEta,
    },
};

/// Arrivals at a stop once they've been fetched
#[derive(Clone, Debug, PartialEq)]
pub enum Arrivals {
    Routes(Vec<RouteEta>),
    /// Every record had a null ETA, or there were no records at all
    NoRouteInfo,
}

#[tracing::instrument(err, skip(api))]
pub async fn fetch_arrivals<A: KmbApi>(api: &A, stop_code: &str) -> Result<Arrivals, LookupError> {
    let stop_eta = api
        .stop_eta(stop_code)
        .await
        .map_err(LookupError::EtaFetch)?;

    let arrivals = aggregate(stop_eta.data);

    if let Arrivals::Routes(routes) = &arrivals {
        info!("{} routes serve stop {}", routes.len(), stop_code);
    }

    Ok(arrivals)
}

/// Groups records by route and direction, keeping the groups in the order they first appear.
///
/// The first record of a group decides its destination, service type and sequence number.
/// Each record adds its ETA until the group has [`RouteEta::MAX_ETAS`], the rest are dropped.
/// Records without an ETA are ignored entirely.
pub fn aggregate(records: Vec<KmbEta>) -> Arrivals {
    let mut routes: Vec<RouteEta> = vec![];
    let mut index: HashMap<(String, Direction), usize> = HashMap::new();

    for record in records {
        let Some(eta) = record.eta else {
            continue;
        };

        let key = (record.route.clone(), record.dir);
        let i = *index.entry(key).or_insert_with(|| {
            routes.push(RouteEta {
                route: record.route,
                direction: record.dir,
                service_type: record.service_type,
                destination: record.dest_en,
                eta_seq: record.eta_seq,
                eta: Vec::with_capacity(RouteEta::MAX_ETAS),
            });
            routes.len() - 1
        });

        let route = &mut routes[i];
        if route.eta.len() < RouteEta::MAX_ETAS {
            route.eta.push(eta);
        }
    }

    if routes.is_empty() {
        Arrivals::NoRouteInfo
    } else {
        Arrivals::Routes(routes)
    }
}

/// Wall clock time like "07:05 PM"
pub fn format_eta(eta: DateTime<Utc>, tz: Tz) -> String {
    eta.with_timezone(&tz).format("%I:%M %p").to_string()
}

pub fn format_etas(route: &RouteEta, tz: Tz) -> String {
    route.eta.iter().map(|eta| format_eta(*eta, tz)).join(" ")
}
