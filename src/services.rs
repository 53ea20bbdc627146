pub mod eta_aggregator;
pub mod locator;
pub mod session_store;
pub mod stop_catalog;
