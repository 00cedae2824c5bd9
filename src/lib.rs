pub mod auth;
pub mod config;
pub mod constants;
pub mod departures;
pub mod export;
pub mod extractors;
pub mod ftp;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod workers;
