//! State of one interactive session: where the user is, what radius they picked,
//! which stops are listed and which one is expanded.
//!
//! Every ETA request is tagged with the [`SelectionToken`] of the selection that made it.
//! A response is only applied if its token still belongs to the active selection, so a slow
//! response for a stop the user has since moved away from never lands in the wrong pane.
use tracing::info;

use crate::{
    error::LookupError,
    model::stop_model::{Coordinate, NearbyStop, SearchRadius},
    services::eta_aggregator::Arrivals,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectionToken(pub(crate) u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EtaRequest {
    pub token: SelectionToken,
    pub stop_code: String,
}

#[derive(Debug)]
pub struct EtaResponse {
    pub token: SelectionToken,
    pub stop_code: String,
    pub result: Result<Arrivals, LookupError>,
}

/// What the detail pane of the expanded stop shows
#[derive(Debug)]
pub enum DetailPane {
    Loading,
    Loaded(Arrivals),
    Failed(LookupError),
}

#[derive(Debug)]
pub struct Selection {
    pub token: SelectionToken,
    pub stop: NearbyStop,
    pub pane: DetailPane,
}

#[derive(Debug, Default)]
pub struct SessionContext {
    position: Option<Coordinate>,
    radius: SearchRadius,
    nearby: Vec<NearbyStop>,
    active: Option<Selection>,
    last_token: u64,
}

impl SessionContext {
    pub fn new(radius: SearchRadius) -> Self {
        SessionContext {
            radius,
            ..Default::default()
        }
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    /// The position is only acquired once, later calls are ignored
    pub fn set_position(&mut self, position: Coordinate) -> bool {
        if self.position.is_some() {
            return false;
        }
        self.position = Some(position);
        true
    }

    pub fn radius(&self) -> SearchRadius {
        self.radius
    }

    /// Drops the listed stops and any expanded one, they belong to the old radius
    pub fn set_radius(&mut self, radius: SearchRadius) {
        self.radius = radius;
        self.nearby.clear();
        self.active = None;
    }

    pub fn nearby(&self) -> &[NearbyStop] {
        &self.nearby
    }

    /// Replaces the listed stops, closest first
    pub fn set_nearby(&mut self, mut nearby: Vec<NearbyStop>) {
        sort_by_distance(&mut nearby);
        self.nearby = nearby;
        self.active = None;
    }

    pub fn active(&self) -> Option<&Selection> {
        self.active.as_ref()
    }

    /// Expands the listed stop at `index`, collapsing whatever was expanded before.
    /// Selecting the same stop again makes a new request.
    pub fn select(&mut self, index: usize) -> Option<EtaRequest> {
        let stop = self.nearby.get(index)?.clone();

        self.last_token += 1;
        let token = SelectionToken(self.last_token);
        let request = EtaRequest {
            token,
            stop_code: stop.stop.code.clone(),
        };

        self.active = Some(Selection {
            token,
            stop,
            pane: DetailPane::Loading,
        });

        Some(request)
    }

    pub fn is_active(&self, token: SelectionToken) -> bool {
        self.active.as_ref().is_some_and(|a| a.token == token)
    }

    /// Puts the response into the detail pane if it's for the active selection.
    /// Returns the updated selection, or `None` if the response was stale.
    pub fn apply(&mut self, response: EtaResponse) -> Option<&Selection> {
        if !self.is_active(response.token) {
            info!(
                "discarding stale arrivals for stop {} ({:?})",
                response.stop_code, response.token
            );
            return None;
        }
        let active = self.active.as_mut()?;

        active.pane = match response.result {
            Ok(arrivals) => DetailPane::Loaded(arrivals),
            Err(e) => DetailPane::Failed(e),
        };

        Some(&*active)
    }
}

pub fn sort_by_distance(stops: &mut [NearbyStop]) {
    stops.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
}
