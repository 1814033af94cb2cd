pub mod auth;
pub mod chart;
pub mod db;
pub mod history_csv;
pub mod models;
pub mod service;
pub mod stats;
pub mod units;
