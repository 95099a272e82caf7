pub mod access;
pub mod app;
pub mod archive;
pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod storage;
pub mod upload;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub const VERSION: &str = "0.1.0";
