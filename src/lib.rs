pub mod aggregate;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod pipeline;
