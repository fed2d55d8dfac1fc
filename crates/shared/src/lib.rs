pub mod appointment_api;
pub mod catalog;
pub mod config;
mod config_env;
pub mod dialog;
pub mod models;
pub mod timezone;
