//! Text for the terminal. Nothing in here does IO.
pub mod map;

use chrono_tz::Tz;
use itertools::Itertools;

use crate::{
    model::stop_model::{NearbyStop, SearchRadius},
    services::eta_aggregator::{Arrivals, format_etas},
    session::{DetailPane, Selection, sort_by_distance},
};

pub const NO_NEARBY_STOPS: &str = "Cannot locate nearby bus stops";
pub const NO_ROUTE_INFO: &str = "No bus route information";

/// Numbered list of stops, closest first. The selected stop is marked with `>`.
pub fn render_stop_list(
    stops: &[NearbyStop],
    radius: SearchRadius,
    selected: Option<&str>,
) -> String {
    if stops.is_empty() {
        return format!("{NO_NEARBY_STOPS}\n");
    }

    let mut sorted = stops.to_vec();
    sort_by_distance(&mut sorted);

    let mut out = format!("Bus stops within {radius}:\n");
    for (i, nearby) in sorted.iter().enumerate() {
        let marker = if selected == Some(nearby.stop.code.as_str()) {
            '>'
        } else {
            ' '
        };
        out.push_str(&format!(
            "{marker}{:>3}. Distance: {}m {}\n",
            i + 1,
            nearby.distance_m.round(),
            nearby.stop.name_en
        ));
    }
    out
}

/// The expanded stop: its name and whatever the arrivals pane currently holds
pub fn render_detail(selection: &Selection, tz: Tz) -> String {
    let mut out = format!(
        "== {} ({}m) ==\n",
        selection.stop.stop.name_en,
        selection.stop.distance_m.round()
    );

    match &selection.pane {
        DetailPane::Loading => out.push_str("Loading arrivals...\n"),
        DetailPane::Loaded(Arrivals::NoRouteInfo) => {
            out.push_str(NO_ROUTE_INFO);
            out.push('\n');
        }
        DetailPane::Loaded(Arrivals::Routes(routes)) => {
            let route_width = routes.iter().map(|r| r.route.len()).max().unwrap_or(0);
            let dest_width = routes.iter().map(|r| r.destination.len()).max().unwrap_or(0);

            let lines = routes
                .iter()
                .map(|r| {
                    format!(
                        "  {:<route_width$}  {:<dest_width$}  {}",
                        r.route,
                        r.destination,
                        format_etas(r, tz)
                    )
                })
                .join("\n");
            out.push_str(&lines);
            out.push('\n');
        }
        DetailPane::Failed(e) => {
            out.push_str(e.user_message());
            out.push('\n');
        }
    }
    out
}

pub const HELP: &str = "\
Commands:
  <n>         show arrivals and map for stop n
  r <meters>  search again with radius 100, 200, 300, 400 or 500
  l           list the stops again
  h           this help
  q           quit
";
