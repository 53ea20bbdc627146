pub mod kmb_api_model;
pub mod stop_model;
