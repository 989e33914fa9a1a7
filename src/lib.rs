pub mod clients;
pub mod config;
pub mod cron;
pub mod db;
pub mod errors;
pub mod logging;
pub mod models;
pub mod server;
pub mod workflows;
